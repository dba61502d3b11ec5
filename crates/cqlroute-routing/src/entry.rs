//! Raw routing entries and the sources they come from
//!
//! Entries are stored as configured and only resolved when the router is
//! initialized. Configuration read from files can carry arbitrary values, so
//! anything that is neither a factory nor a name is kept as `Unsupported` and
//! rejected at that point.

use cqlroute_core::{Error, LookupKey, Result, SessionFactory};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::lookup::{MapSessionFactoryLookup, SessionFactoryLookup};

#[derive(Clone)]
pub enum SessionFactoryEntry {
    /// A ready-made factory, used as-is
    Factory(Arc<dyn SessionFactory>),
    /// A symbolic name resolved through the configured lookup
    Named(String),
    /// Any other configured value
    Unsupported(serde_json::Value),
}

impl SessionFactoryEntry {
    pub fn factory(factory: impl SessionFactory + 'static) -> Self {
        Self::Factory(Arc::new(factory))
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self::Named(name.into())
    }

    /// Resolve this entry into a factory
    ///
    /// # Errors
    /// - `Error::LookupFailure` if a named entry is not registered in `lookup`
    /// - `Error::IllegalConfiguration` for unsupported values
    pub fn resolve(&self, lookup: &dyn SessionFactoryLookup) -> Result<Arc<dyn SessionFactory>> {
        match self {
            Self::Factory(factory) => Ok(Arc::clone(factory)),
            Self::Named(name) => lookup.resolve(name),
            Self::Unsupported(value) => Err(Error::IllegalConfiguration(format!(
                "Illegal session factory value [{}]; only session factories and session factory names are supported",
                value
            ))),
        }
    }
}

impl fmt::Debug for SessionFactoryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Factory(_) => f.write_str("Factory(..)"),
            Self::Named(name) => f.debug_tuple("Named").field(name).finish(),
            Self::Unsupported(value) => f.debug_tuple("Unsupported").field(value).finish(),
        }
    }
}

impl From<Arc<dyn SessionFactory>> for SessionFactoryEntry {
    fn from(factory: Arc<dyn SessionFactory>) -> Self {
        Self::Factory(factory)
    }
}

impl From<&str> for SessionFactoryEntry {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for SessionFactoryEntry {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

/// Strings become named entries; every other value is unsupported
impl From<serde_json::Value> for SessionFactoryEntry {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(name) => Self::Named(name),
            other => Self::Unsupported(other),
        }
    }
}

/// Supplies the raw target entries for a routing table.
///
/// The router takes a fresh snapshot on every initialization.
pub trait TargetFactorySource<K>: Send + Sync {
    fn target_entries(&self) -> Vec<(K, SessionFactoryEntry)>;
}

impl<K: LookupKey> TargetFactorySource<K> for HashMap<K, SessionFactoryEntry> {
    fn target_entries(&self) -> Vec<(K, SessionFactoryEntry)> {
        self.iter()
            .map(|(key, entry)| (key.clone(), entry.clone()))
            .collect()
    }
}

/// A lookup used as a live target source: its names are the lookup keys and
/// its registrations the targets.
impl<K: LookupKey + From<String>> TargetFactorySource<K> for MapSessionFactoryLookup {
    fn target_entries(&self) -> Vec<(K, SessionFactoryEntry)> {
        self.session_factories()
            .into_iter()
            .map(|(name, factory)| (K::from(name), SessionFactoryEntry::Factory(factory)))
            .collect()
    }
}
