//! Logging bootstrap for applications embedding the crate.
//!
//! Library code only emits `tracing` events; installing a subscriber is
//! the host's call. [`init_logging`] is a convenience for binaries and
//! examples that want console output filtered through `RUST_LOG`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs a console subscriber, filtered by `RUST_LOG` and defaulting
/// to `info`.
///
/// # Errors
///
/// Fails when a global subscriber is already installed.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let console_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_ansi(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .try_init()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repeated_init_reports_conflict() {
        // Whichever call lands second must report the conflict instead of
        // panicking.
        let results = [init_logging(), init_logging()];
        assert!(results.iter().any(|r| r.is_err()));
    }
}
