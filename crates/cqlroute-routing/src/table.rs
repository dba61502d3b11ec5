//! Resolved routing table
//!
//! A `RoutingTable` is built in one pass from raw entries and is immutable
//! afterwards. Routers publish a new table instead of mutating the old one.

use cqlroute_core::{Error, LookupKey, Result, SessionFactory};
use cqlroute_observability::{LookupOutcome, ResolutionFailureReason};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{entry::SessionFactoryEntry, lookup::SessionFactoryLookup};

/// A factory chosen for one lookup, and how it was chosen
pub struct Selection {
    pub factory: Arc<dyn SessionFactory>,
    pub outcome: LookupOutcome,
}

/// A failed selection with its metric reason
#[derive(Debug)]
pub struct SelectionFailure {
    pub reason: ResolutionFailureReason,
    pub error: Error,
}

pub struct RoutingTable<K> {
    factories: HashMap<K, Arc<dyn SessionFactory>>,
    default_factory: Option<Arc<dyn SessionFactory>>,
    lenient_fallback: bool,
    generation: u64,
}

impl<K: LookupKey> RoutingTable<K> {
    /// Resolve every raw entry into a table.
    ///
    /// Nothing is returned unless every entry, and the default entry if
    /// present, resolves.
    ///
    /// # Errors
    /// - `Error::LookupFailure` for names the lookup doesn't know
    /// - `Error::IllegalConfiguration` for unsupported entries
    pub fn resolve(
        targets: Vec<(K, SessionFactoryEntry)>,
        default_target: Option<&SessionFactoryEntry>,
        lookup: &dyn SessionFactoryLookup,
        lenient_fallback: bool,
        generation: u64,
    ) -> Result<Self> {
        let mut factories = HashMap::with_capacity(targets.len());

        for (key, entry) in targets {
            let factory = entry.resolve(lookup).map_err(|err| match err {
                Error::IllegalConfiguration(message) => Error::IllegalConfiguration(format!(
                    "{} for lookup key [{}]",
                    message, key
                )),
                other => other,
            })?;
            factories.insert(key, factory);
        }

        let default_factory = default_target
            .map(|entry| entry.resolve(lookup))
            .transpose()?;

        Ok(Self {
            factories,
            default_factory,
            lenient_fallback,
            generation,
        })
    }

    /// Choose the factory for `key`.
    ///
    /// - a matching key selects its factory;
    /// - an unmatched key selects the default only in lenient mode;
    /// - an absent key selects the default.
    pub fn select(&self, key: Option<&K>) -> std::result::Result<Selection, SelectionFailure> {
        let Some(key) = key else {
            return match &self.default_factory {
                Some(factory) => Ok(Selection {
                    factory: Arc::clone(factory),
                    outcome: LookupOutcome::Default,
                }),
                None => Err(SelectionFailure {
                    reason: ResolutionFailureReason::EmptyKey,
                    error: Error::Resolution(
                        "Cannot determine target SessionFactory for empty lookup key".to_string(),
                    ),
                }),
            };
        };

        if let Some(factory) = self.factories.get(key) {
            return Ok(Selection {
                factory: Arc::clone(factory),
                outcome: LookupOutcome::Matched,
            });
        }

        if !self.lenient_fallback {
            return Err(SelectionFailure {
                reason: ResolutionFailureReason::UnmatchedKey,
                error: Error::Resolution(format!(
                    "Cannot determine target SessionFactory for lookup key [{}]; lenient fallback is disabled",
                    key
                )),
            });
        }

        match &self.default_factory {
            Some(factory) => Ok(Selection {
                factory: Arc::clone(factory),
                outcome: LookupOutcome::Fallback,
            }),
            None => Err(SelectionFailure {
                reason: ResolutionFailureReason::UnmatchedKey,
                error: Error::Resolution(format!(
                    "No SessionFactory found for lookup key [{}] and no default fallback set",
                    key
                )),
            }),
        }
    }

    pub fn get(&self, key: &K) -> Option<&Arc<dyn SessionFactory>> {
        self.factories.get(key)
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.factories.contains_key(key)
    }

    pub fn default_factory(&self) -> Option<&Arc<dyn SessionFactory>> {
        self.default_factory.as_ref()
    }

    pub fn has_default(&self) -> bool {
        self.default_factory.is_some()
    }

    pub fn is_lenient(&self) -> bool {
        self.lenient_fallback
    }

    /// Number of successful initializations that preceded this table, plus one
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn keys(&self) -> impl Iterator<Item = &K> {
        self.factories.keys()
    }

    pub fn len(&self) -> usize {
        self.factories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl<K: LookupKey> fmt::Debug for RoutingTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RoutingTable")
            .field("keys", &self.factories.keys().collect::<Vec<_>>())
            .field("has_default", &self.has_default())
            .field("lenient_fallback", &self.lenient_fallback)
            .field("generation", &self.generation)
            .finish()
    }
}
