//! cqlroute Core Types and Traits
//!
//! This crate provides the fundamental types and traits used throughout cqlroute:
//! - Session and session factory capabilities
//! - Lookup key abstraction
//! - Routing configuration model and configuration sources
//! - Core error types

pub mod config;
pub mod config_source;
pub mod error;
pub mod key;
pub mod memory;
pub mod session;

pub use config::{LoggingConfig, RoutingConfig, SessionDefinition};
pub use config_source::{ConfigChange, ConfigChangeStream, ConfigSource};
pub use error::{Error, Result};
pub use key::{LookupKey, TenantId};
pub use session::{
    DefaultSessionFactory, LazySessionFactory, QueryResult, Session, SessionFactory,
    SessionFactoryProvider, Statement,
};
