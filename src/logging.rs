//! Logging bootstrap for embedding services.
//!
//! The engine itself only emits `tracing` events (compiled statement shapes at
//! DEBUG, silent-degradation warnings at WARN); hosts that want them on a
//! console can call [`init_logging`] once at startup.

use crate::Result;

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    let level = match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .try_init()
        .map_err(|e| {
            crate::error::EngineError::configuration(format!(
                "failed to initialize logging: {}",
                e
            ))
        })?;

    Ok(())
}
