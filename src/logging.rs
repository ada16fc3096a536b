//! Logging initialization.
//!
//! Verbosity flags set a base level which `FLEECE_LOG` (an `EnvFilter`
//! directive string) can override. Logs go to stderr so stdout stays
//! clean for command output.

use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `quiet` wins over `verbose`: errors only. Otherwise `verbose` counts
/// up from warn (0) through info (1) to debug (2+).
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let base_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };

    let filter = EnvFilter::try_from_env("FLEECE_LOG")
        .unwrap_or_else(|_| EnvFilter::new(format!("fleece_rust={base_level}")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))?;

    Ok(())
}
