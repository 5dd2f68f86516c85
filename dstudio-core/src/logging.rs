//! Shared logging setup for the dstudio binary and integration harnesses.

use crate::Result;
use tracing_subscriber::EnvFilter;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Human-readable single-line output
    #[default]
    Text,
    /// One JSON object per event
    Json,
}

/// Maps CLI verbosity flags to a tracing level.
pub const fn level_for(verbose: u8, quiet: bool) -> tracing::Level {
    match (quiet, verbose) {
        (true, _) => tracing::Level::ERROR,
        (false, 0) => tracing::Level::INFO,
        (false, 1) => tracing::Level::DEBUG,
        (false, _) => tracing::Level::TRACE,
    }
}

/// Initializes structured logging based on verbosity level.
///
/// # Arguments
/// * `verbose` - Verbosity level (0=INFO, 1=DEBUG, 2+=TRACE)
/// * `quiet` - If true, only show ERROR level logs
/// * `format` - Text or JSON output
///
/// `RUST_LOG`, when set, takes precedence over the computed level.
///
/// # Example
/// ```rust,no_run
/// use dstudio_core::logging::{LogFormat, init_logging};
///
/// init_logging(1, false, LogFormat::Text).expect("Failed to initialize logging");
/// ```
pub fn init_logging(verbose: u8, quiet: bool, format: LogFormat) -> Result<()> {
    let level = level_for(verbose, quiet);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level.as_str().to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| {
        crate::error::StudioError::configuration(format!("Failed to initialize logging: {}", e))
    })
}
