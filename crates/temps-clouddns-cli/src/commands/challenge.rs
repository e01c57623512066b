use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, ValueEnum};
use colored::Colorize;
use temps_clouddns::{CloudDnsConfig, CloudDnsProvider, ZoneSelection};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// How to choose between managed zones sharing the apex name
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ZoneSelectionArg {
    Unique,
    First,
    PreferPublic,
    PreferPrivate,
}

impl From<ZoneSelectionArg> for ZoneSelection {
    fn from(arg: ZoneSelectionArg) -> Self {
        match arg {
            ZoneSelectionArg::Unique => ZoneSelection::Unique,
            ZoneSelectionArg::First => ZoneSelection::First,
            ZoneSelectionArg::PreferPublic => ZoneSelection::PreferPublic,
            ZoneSelectionArg::PreferPrivate => ZoneSelection::PreferPrivate,
        }
    }
}

#[derive(Args, Debug)]
pub struct ProviderArgs {
    /// Google Cloud project that owns the managed zones
    #[arg(long, env = "GCE_PROJECT")]
    pub project: String,

    /// Service account key JSON file (Application Default Credentials when omitted)
    #[arg(long, env = "GCE_SERVICE_ACCOUNT_FILE")]
    pub service_account_file: Option<PathBuf>,

    /// Managed zone selection when several zones match
    #[arg(long, value_enum, default_value = "unique")]
    pub zone_selection: ZoneSelectionArg,

    /// Seconds to wait for Cloud DNS to apply a change
    #[arg(long, default_value_t = 180)]
    pub change_timeout: u64,
}

impl ProviderArgs {
    pub fn config(&self) -> CloudDnsConfig {
        CloudDnsConfig {
            service_account_file: self
                .service_account_file
                .clone()
                .filter(|path| !path.as_os_str().is_empty()),
            zone_selection: self.zone_selection.into(),
            change_timeout: Duration::from_secs(self.change_timeout),
            ..CloudDnsConfig::new(self.project.clone())
        }
    }

    async fn provider(&self) -> anyhow::Result<CloudDnsProvider> {
        let config = self.config();
        debug!("Provider configuration: {:?}", config);
        CloudDnsProvider::new(config)
            .await
            .context("Failed to initialize Google Cloud DNS provider")
    }
}

#[derive(Args, Debug)]
pub struct ChallengeArgs {
    #[command(flatten)]
    pub provider: ProviderArgs,

    /// Domain being validated, e.g. example.com or *.example.com
    #[arg(long)]
    pub domain: String,

    /// ACME challenge token
    #[arg(long, default_value = "")]
    pub token: String,

    /// ACME key authorization (token.thumbprint)
    #[arg(long)]
    pub key_auth: String,
}

#[derive(Args)]
pub struct PresentCommand {
    #[command(flatten)]
    pub args: ChallengeArgs,
}

#[derive(Args)]
pub struct CleanupCommand {
    #[command(flatten)]
    pub args: ChallengeArgs,
}

/// Cancelled on Ctrl-C
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, abandoning change wait");
            on_interrupt.cancel();
        }
    });
    cancel
}

impl PresentCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let args = self.args;
        info!("Presenting DNS-01 challenge for {}", args.domain);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let provider = args.provider.provider().await?;
            let cancel = interrupt_token();

            provider
                .present_with_cancel(&args.domain, &args.token, &args.key_auth, &cancel)
                .await
                .with_context(|| format!("Failed to present challenge for {}", args.domain))?;

            println!(
                "{} {}",
                "✅ TXT record published for".bright_green(),
                args.domain.bright_cyan()
            );
            Ok(())
        })
    }
}

impl CleanupCommand {
    pub fn execute(self) -> anyhow::Result<()> {
        let args = self.args;
        info!("Cleaning up DNS-01 challenge for {}", args.domain);

        let rt = tokio::runtime::Runtime::new()?;
        rt.block_on(async {
            let provider = args.provider.provider().await?;

            provider
                .cleanup(&args.domain, &args.token, &args.key_auth)
                .await
                .with_context(|| format!("Failed to clean up challenge for {}", args.domain))?;

            println!(
                "{} {}",
                "✅ TXT records removed for".bright_green(),
                args.domain.bright_cyan()
            );
            Ok(())
        })
    }
}
