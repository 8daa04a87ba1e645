//! relay-reset - force every relay line to the OFF level.
//!
//! Useful when a crashed controller left lines claimed or relays energised.
//! Exits non-zero when some pin could be driven by neither mechanism.

use anyhow::{bail, Context};
use pi_relay::reset::{self, ResetOptions};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

fn main() -> anyhow::Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("failed to install logger")?;

    println!("GPIO Reset Tool for Relay Controller");
    println!("====================================");

    let report = reset::reset_all(&ResetOptions::default(), &reset::KNOWN_PINS);
    let failed = report.failed_pins();
    if !failed.is_empty() {
        bail!("could not reset GPIO pins {:?}", failed);
    }

    println!("GPIO reset completed");
    Ok(())
}
