//! Temps Cloud DNS CLI
//!
//! Drives the Google Cloud DNS challenge provider from the command line, for
//! manual certificate issuance and ACME client hook scripts.

mod commands;

use anyhow::Context;
use clap::{Parser, Subcommand};
use commands::{CleanupCommand, PresentCommand, TimeoutCommand};
use tracing_subscriber::{layer::SubscriberExt, Layer};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "TEMPS_LOG_LEVEL", global = true)]
    log_level: String,

    /// Log format: compact, full
    #[arg(
        long,
        default_value = "compact",
        env = "TEMPS_LOG_FORMAT",
        global = true
    )]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the DNS-01 TXT record and wait for Cloud DNS to apply it
    Present(PresentCommand),
    /// Remove the DNS-01 TXT records
    Cleanup(CleanupCommand),
    /// Print the advised propagation timeout and polling interval in seconds
    Timeout(TimeoutCommand),
}

fn init_tracing(log_level: &str, log_format: &str) -> anyhow::Result<()> {
    // RUST_LOG takes full control when set
    let filter = if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .context("Invalid RUST_LOG environment variable")?
    } else {
        tracing_subscriber::EnvFilter::try_new(format!(
            "temps_clouddns={level},\
             temps_clouddns_cli={level},\
             hickory_proto=warn,\
             hickory_resolver=warn,\
             h2=warn,\
             hyper=warn,\
             reqwest=warn,\
             rustls=warn",
            level = log_level
        ))
        .context("Invalid log level")?
    };

    let fmt_layer = match log_format {
        "full" => tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
        _ => tracing_subscriber::fmt::layer() // "compact" or any other value
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_writer(std::io::stderr)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set global default subscriber")
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    init_tracing(&cli.log_level, &cli.log_format)?;

    match cli.command {
        Commands::Present(present_cmd) => present_cmd.execute(),
        Commands::Cleanup(cleanup_cmd) => cleanup_cmd.execute(),
        Commands::Timeout(timeout_cmd) => timeout_cmd.execute(),
    }
}
