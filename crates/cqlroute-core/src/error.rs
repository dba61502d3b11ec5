//! Error types for cqlroute core

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Routing configuration errors (raised by `initialize`)
    #[error("Illegal configuration: {0}")]
    IllegalConfiguration(String),

    #[error("No SessionFactory with name [{name}] registered")]
    LookupFailure { name: String },

    // Runtime resolution errors (raised by `get_session`)
    #[error("Session factory resolution failed: {0}")]
    Resolution(String),

    // Delegate errors, produced by sessions and their factories
    #[error("Session error: {0}")]
    Session(String),

    // Configuration loading errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Configuration not found")]
    ConfigNotFound,

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a lookup failure for a symbolic session factory name
    pub fn lookup_failure(name: impl Into<String>) -> Self {
        Self::LookupFailure { name: name.into() }
    }

    /// Whether this error was raised while building a routing table
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::IllegalConfiguration(_) | Self::LookupFailure { .. }
        )
    }

    /// Whether this error was raised while selecting a session factory at runtime
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::Resolution(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
