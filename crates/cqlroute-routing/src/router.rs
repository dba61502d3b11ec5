//! Routing session factory
//!
//! Multiplexes lookup keys (tenant, keyspace, ...) onto session factories.
//! Each session request:
//! 1. asks the key resolver for the current lookup key (exactly once),
//! 2. selects a factory from the published routing table, falling back to
//!    the default factory where allowed,
//! 3. returns whatever the selected factory produces, errors included.
//!
//! Configuration setters only store raw values. `initialize` resolves them
//! into a new [`RoutingTable`] and publishes it with a single atomic swap, so
//! concurrent readers see either the old table or the new one. A failed
//! `initialize` publishes nothing.

use arc_swap::ArcSwapOption;
use cqlroute_core::{Error, LookupKey, Result, Session, SessionFactory};
use cqlroute_observability::{ResolutionFailureReason, RoutingMetrics};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use crate::{
    entry::{SessionFactoryEntry, TargetFactorySource},
    key_resolver::LookupKeyResolver,
    lookup::{MapSessionFactoryLookup, SessionFactoryLookup},
    table::RoutingTable,
};

/// Raw configuration, resolved on every `initialize`
struct RouterSettings<K> {
    targets: Arc<dyn TargetFactorySource<K>>,
    default_target: Option<SessionFactoryEntry>,
    lenient_fallback: bool,
    lookup: Arc<dyn SessionFactoryLookup>,
}

/// Session factory that delegates to one of several target factories based
/// on a lookup key.
///
/// # Example
/// ```no_run
/// # use cqlroute_core::{SessionFactory, Result};
/// # use cqlroute_routing::{RoutingSessionFactory, key_resolver::ContextLookupKeyResolver};
/// # use std::sync::Arc;
/// # fn example(tenant_a: Arc<dyn SessionFactory>, shared: Arc<dyn SessionFactory>) -> Result<()> {
/// let router = RoutingSessionFactory::<String>::new(ContextLookupKeyResolver::new());
/// router.set_target_session_factories([("tenant-a".to_string(), tenant_a)]);
/// router.set_default_target_session_factory(shared);
/// router.initialize()?;
///
/// let session = router.get_session()?;
/// # Ok(())
/// # }
/// ```
pub struct RoutingSessionFactory<K: LookupKey> {
    key_resolver: Arc<dyn LookupKeyResolver<K>>,
    settings: Mutex<RouterSettings<K>>,
    table: ArcSwapOption<RoutingTable<K>>,
    generation: AtomicU64,
    metrics: Option<Arc<RoutingMetrics>>,
}

impl<K: LookupKey> RoutingSessionFactory<K> {
    /// Create an uninitialized router.
    ///
    /// Lenient fallback is enabled and names resolve against an empty
    /// [`MapSessionFactoryLookup`] until configured otherwise.
    pub fn new(key_resolver: impl LookupKeyResolver<K> + 'static) -> Self {
        Self::with_resolver(Arc::new(key_resolver))
    }

    pub fn with_resolver(key_resolver: Arc<dyn LookupKeyResolver<K>>) -> Self {
        Self {
            key_resolver,
            settings: Mutex::new(RouterSettings {
                targets: Arc::new(HashMap::<K, SessionFactoryEntry>::new()),
                default_target: None,
                lenient_fallback: true,
                lookup: Arc::new(MapSessionFactoryLookup::new()),
            }),
            table: ArcSwapOption::empty(),
            generation: AtomicU64::new(0),
            metrics: None,
        }
    }

    /// Record lookups and initializations in `metrics`
    pub fn with_metrics(mut self, metrics: Arc<RoutingMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    fn settings(&self) -> MutexGuard<'_, RouterSettings<K>> {
        self.settings
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Store the raw target map. Entries are resolved by `initialize`.
    pub fn set_target_session_factories<I, E>(&self, targets: I)
    where
        I: IntoIterator<Item = (K, E)>,
        E: Into<SessionFactoryEntry>,
    {
        let targets: HashMap<K, SessionFactoryEntry> = targets
            .into_iter()
            .map(|(key, entry)| (key, entry.into()))
            .collect();
        self.settings().targets = Arc::new(targets);
    }

    /// Take raw targets from `source`, snapshotted on every `initialize`
    pub fn set_target_factory_source(&self, source: Arc<dyn TargetFactorySource<K>>) {
        self.settings().targets = source;
    }

    /// Store the raw default entry (a factory or a name)
    pub fn set_default_target_session_factory(&self, entry: impl Into<SessionFactoryEntry>) {
        self.settings().default_target = Some(entry.into());
    }

    pub fn clear_default_target_session_factory(&self) {
        self.settings().default_target = None;
    }

    /// Whether an unmatched key falls back to the default factory.
    ///
    /// Takes effect at the next `initialize`.
    pub fn set_lenient_fallback(&self, lenient_fallback: bool) {
        self.settings().lenient_fallback = lenient_fallback;
    }

    /// Lookup used to resolve named entries at the next `initialize`
    pub fn set_session_factory_lookup(&self, lookup: Arc<dyn SessionFactoryLookup>) {
        self.settings().lookup = lookup;
    }

    /// Resolve the raw configuration and publish the resulting table.
    ///
    /// Safe to call repeatedly, e.g. after registering new factories in the
    /// lookup. Concurrent calls are serialized.
    ///
    /// # Errors
    /// - `Error::LookupFailure` if a named entry is not registered
    /// - `Error::IllegalConfiguration` for unsupported entries
    ///
    /// On error the previously published table (if any) stays in place.
    pub fn initialize(&self) -> Result<()> {
        let settings = self.settings();
        let started = Instant::now();
        let generation = self.generation.load(Ordering::Acquire) + 1;

        let result = RoutingTable::resolve(
            settings.targets.target_entries(),
            settings.default_target.as_ref(),
            settings.lookup.as_ref(),
            settings.lenient_fallback,
            generation,
        );
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(table) => {
                let size = table.len();
                let has_default = table.has_default();
                self.table.store(Some(Arc::new(table)));
                self.generation.store(generation, Ordering::Release);

                if let Some(metrics) = &self.metrics {
                    metrics.record_initialize_success(size, elapsed);
                }

                tracing::info!(
                    generation,
                    keys = size,
                    has_default,
                    lenient_fallback = settings.lenient_fallback,
                    "Published routing table"
                );
                Ok(())
            }
            Err(err) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_initialize_failure(elapsed);
                }

                tracing::warn!(
                    error = %err,
                    initialized = self.is_initialized(),
                    "Routing table initialization failed, keeping previous table"
                );
                Err(err)
            }
        }
    }

    /// Select the factory for the current lookup key.
    ///
    /// # Errors
    /// - `Error::Resolution` if the router is not initialized, or no factory
    ///   matches and no fallback applies
    pub fn determine_target_session_factory(&self) -> Result<Arc<dyn SessionFactory>> {
        let table = self.table.load();
        let Some(table) = table.as_ref() else {
            self.record_failure(ResolutionFailureReason::NotInitialized);
            return Err(Error::Resolution(
                "SessionFactory router not initialized".to_string(),
            ));
        };

        let key = self.key_resolver.determine_current_lookup_key();

        match table.select(key.as_ref()) {
            Ok(selection) => {
                if let Some(metrics) = &self.metrics {
                    metrics.record_lookup(selection.outcome);
                }
                tracing::debug!(
                    key = ?key,
                    outcome = selection.outcome.as_str(),
                    generation = table.generation(),
                    "Selected session factory"
                );
                Ok(selection.factory)
            }
            Err(failure) => {
                self.record_failure(failure.reason);
                tracing::debug!(
                    key = ?key,
                    reason = failure.reason.as_str(),
                    "No session factory for lookup key"
                );
                Err(failure.error)
            }
        }
    }

    fn record_failure(&self, reason: ResolutionFailureReason) {
        if let Some(metrics) = &self.metrics {
            metrics.record_resolution_failure(reason);
        }
    }

    /// The currently published table, if any
    pub fn routing_table(&self) -> Option<Arc<RoutingTable<K>>> {
        self.table.load_full()
    }

    pub fn is_initialized(&self) -> bool {
        self.table.load().is_some()
    }

    /// Number of successful initializations so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }
}

impl<K: LookupKey> SessionFactory for RoutingSessionFactory<K> {
    fn get_session(&self) -> Result<Arc<dyn Session>> {
        self.determine_target_session_factory()?.get_session()
    }
}
