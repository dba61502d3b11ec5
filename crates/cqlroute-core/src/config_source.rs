//! Configuration source trait
//!
//! A `ConfigSource` loads the routing configuration and reports when it
//! changes, so routing tables can be rebuilt without restarting the process.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::{Result, config::RoutingConfig};

/// Type alias for configuration change streams
pub type ConfigChangeStream<'a> = BoxStream<'a, Result<ConfigChange>>;

/// Configuration change notification
#[derive(Debug, Clone)]
pub struct ConfigChange {
    /// Timestamp of the change
    pub timestamp: chrono::DateTime<chrono::Utc>,

    /// Configuration version
    pub version: u32,
}

/// Configuration source trait
///
/// # Example
/// ```no_run
/// # use cqlroute_core::config_source::ConfigSource;
/// # async fn example(source: &dyn ConfigSource) -> cqlroute_core::Result<()> {
/// let config = source.load().await?;
/// source.validate(&config)?;
/// # Ok(())
/// # }
/// ```
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Load the current configuration
    ///
    /// # Errors
    /// - `Error::ConfigNotFound` if the configuration doesn't exist
    /// - `Error::Config` if it can't be parsed
    async fn load(&self) -> Result<RoutingConfig>;

    /// Watch for configuration changes
    ///
    /// The stream emits whenever the underlying configuration is modified.
    async fn watch_changes(&self) -> Result<ConfigChangeStream<'_>>;

    /// Validate configuration before it is applied
    fn validate(&self, config: &RoutingConfig) -> Result<()> {
        config.validate()
    }
}
