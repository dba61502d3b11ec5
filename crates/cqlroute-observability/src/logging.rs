//! Structured logging setup
//!
//! Installs a global `tracing` subscriber. `RUST_LOG` takes precedence over the
//! configured level when it is set.

use tracing::Level;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

pub type InitError = Box<dyn std::error::Error + Send + Sync>;

/// Parse a configured log level, defaulting to INFO for unknown values
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the filter for the given level
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(parse_level(level).to_string()))
}

/// Initialize the global tracing subscriber
///
/// # Errors
/// Fails if a global subscriber has already been installed.
pub fn init_tracing(level: &str, json: bool) -> Result<(), InitError> {
    let filter = build_filter(level);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    }

    Ok(())
}
