use clap::Args;
use temps_clouddns::{POLLING_INTERVAL, PROPAGATION_TIMEOUT};

#[derive(Args)]
pub struct TimeoutCommand {}

impl TimeoutCommand {
    /// Prints `<timeout> <interval>` in seconds
    pub fn execute(self) -> anyhow::Result<()> {
        println!(
            "{} {}",
            PROPAGATION_TIMEOUT.as_secs(),
            POLLING_INTERVAL.as_secs()
        );
        Ok(())
    }
}
