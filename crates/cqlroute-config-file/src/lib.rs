//! File-based routing configuration for cqlroute
//!
//! This crate implements the `ConfigSource` trait on top of a single file.
//! It's designed for deployments where the routing configuration lives next
//! to the application and is edited in place.
//!
//! # Features
//! - YAML, TOML and JSON formats, chosen by file extension
//! - Real-time file watching with `notify`
//! - Validation before writing
//!
//! # Example
//! ```no_run
//! # use cqlroute_config_file::FileConfigSource;
//! # use cqlroute_core::ConfigSource;
//! # async fn example() -> cqlroute_core::Result<()> {
//! let source = FileConfigSource::new("~/.cqlroute/routes.yaml").await?;
//! let config = source.load().await?;
//! # Ok(())
//! # }
//! ```

mod file_source;

pub use file_source::{ConfigFormat, FileConfigSource};
