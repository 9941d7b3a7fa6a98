//! Logging setup for the positioning service
//!
//! Log lines go to stderr so that position output on stdout stays machine
//! readable. Filtering is controlled by `RUST_LOG` and defaults to `info`.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Install the global tracing subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber has already been installed.
pub fn init_logging() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_init_fails() {
        // Whichever call comes first wins; at most one succeeds in a process
        let first = init_logging();
        let second = init_logging();
        assert!(first.is_err() || second.is_err());
    }
}
