// Logging setup
// Installs a tracing subscriber filtered by RUST_LOG

use anyhow::Result;
use tracing::{debug, info};
use tracing_subscriber::{fmt, EnvFilter};

use crate::version;

/// Initialize logging with colored output
pub fn init() -> Result<()> {
    init_with_logger(true)
}

/// Initialize logging.
///
/// Logs always go to stderr so stdout stays free for the rewritten code.
/// With `ansi_colors` false the output is plain and untimed. Calling this
/// again once a subscriber is installed does nothing.
pub fn init_with_logger(ansi_colors: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let result = if ansi_colors {
        fmt::Subscriber::builder()
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        fmt::Subscriber::builder()
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .with_env_filter(filter)
            .with_target(false)
            .without_time()
            .try_init()
    };
    match result {
        Ok(()) => info!("Initializing RefineML v{}", version()),
        Err(e) => debug!("Tracing subscriber already installed: {}", e),
    }
    Ok(())
}

/// Filter directive for the CLI verbosity flag
pub fn verbosity_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "refineml=info",
        2 => "refineml=debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_filter() {
        assert_eq!(verbosity_filter(0), "warn");
        assert_eq!(verbosity_filter(1), "refineml=info");
        assert_eq!(verbosity_filter(2), "refineml=debug");
        assert_eq!(verbosity_filter(9), "trace");
    }

    #[test]
    fn test_init_is_idempotent() {
        assert!(init_with_logger(false).is_ok());
        assert!(init_with_logger(false).is_ok());
        assert!(init().is_ok());
    }
}
