//! Resolution of symbolic session factory names
//!
//! Routing entries may name a session factory instead of holding one. A
//! [`SessionFactoryLookup`] turns such a name into the registered factory
//! when the routing table is built.

use cqlroute_core::{Error, Result, SessionFactory};
use dashmap::DashMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves a symbolic name to a registered session factory
pub trait SessionFactoryLookup: Send + Sync {
    /// # Errors
    /// - `Error::LookupFailure` if no factory is registered under `name`
    fn resolve(&self, name: &str) -> Result<Arc<dyn SessionFactory>>;
}

/// In-memory name → factory registry.
///
/// Uses DashMap so registrations can change while other threads resolve
/// names. Changes are visible to later `resolve` calls only; routing tables
/// that were already built keep the factories they resolved.
#[derive(Default)]
pub struct MapSessionFactoryLookup {
    factories: DashMap<String, Arc<dyn SessionFactory>>,
}

impl MapSessionFactoryLookup {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a lookup with a single registration
    pub fn with_factory(name: impl Into<String>, factory: Arc<dyn SessionFactory>) -> Self {
        let lookup = Self::new();
        lookup.add_session_factory(name, factory);
        lookup
    }

    /// Create a lookup from an existing map
    pub fn from_map(factories: HashMap<String, Arc<dyn SessionFactory>>) -> Self {
        Self {
            factories: factories.into_iter().collect(),
        }
    }

    /// Register a factory, replacing any previous registration under `name`
    pub fn add_session_factory(&self, name: impl Into<String>, factory: Arc<dyn SessionFactory>) {
        let name = name.into();
        tracing::debug!(name = %name, "Registering session factory");
        self.factories.insert(name, factory);
    }

    /// Register every entry of `factories`
    pub fn set_session_factories(&self, factories: HashMap<String, Arc<dyn SessionFactory>>) {
        for (name, factory) in factories {
            self.add_session_factory(name, factory);
        }
    }

    /// Remove a registration, returning the factory if it was present
    pub fn remove_session_factory(&self, name: &str) -> Option<Arc<dyn SessionFactory>> {
        self.factories.remove(name).map(|(_, factory)| factory)
    }

    /// Snapshot of the current registrations
    pub fn session_factories(&self) -> HashMap<String, Arc<dyn SessionFactory>> {
        self.factories
            .iter()
            .map(|entry| (entry.key().clone(), Arc::clone(entry.value())))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        self.factories.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl SessionFactoryLookup for MapSessionFactoryLookup {
    fn resolve(&self, name: &str) -> Result<Arc<dyn SessionFactory>> {
        self.factories
            .get(name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::lookup_failure(name))
    }
}

impl fmt::Debug for MapSessionFactoryLookup {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort();
        f.debug_struct("MapSessionFactoryLookup")
            .field("names", &names)
            .finish()
    }
}

/// Lookup that resolves every name to the same factory
pub struct SingleSessionFactoryLookup {
    factory: Arc<dyn SessionFactory>,
}

impl SingleSessionFactoryLookup {
    pub fn new(factory: Arc<dyn SessionFactory>) -> Self {
        Self { factory }
    }
}

impl SessionFactoryLookup for SingleSessionFactoryLookup {
    fn resolve(&self, _name: &str) -> Result<Arc<dyn SessionFactory>> {
        Ok(Arc::clone(&self.factory))
    }
}

/// An externally owned registry of named components
pub trait ComponentRegistry: Send + Sync {
    fn component(&self, name: &str) -> Option<Arc<dyn SessionFactory>>;
}

/// Lookup backed by an external [`ComponentRegistry`]
pub struct RegistrySessionFactoryLookup<R> {
    registry: Arc<R>,
}

impl<R: ComponentRegistry> RegistrySessionFactoryLookup<R> {
    pub fn new(registry: Arc<R>) -> Self {
        Self { registry }
    }
}

impl<R: ComponentRegistry> SessionFactoryLookup for RegistrySessionFactoryLookup<R> {
    fn resolve(&self, name: &str) -> Result<Arc<dyn SessionFactory>> {
        self.registry
            .component(name)
            .ok_or_else(|| Error::lookup_failure(name))
    }
}
