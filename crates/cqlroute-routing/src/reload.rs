//! Applying routing configuration to a live router
//!
//! [`apply_config`] turns a [`RoutingConfig`] into session factories, target
//! entries and router settings, then re-initializes the router.
//! [`ConfigReloader`] repeats that whenever its [`ConfigSource`] reports a
//! change.

use cqlroute_core::{
    ConfigSource, Error, LookupKey, Result, RoutingConfig, SessionFactory, SessionFactoryProvider,
};
use futures::StreamExt;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::{entry::SessionFactoryEntry, lookup::MapSessionFactoryLookup, router::RoutingSessionFactory};

/// Apply `config` to `router`, registering its sessions in `lookup`.
///
/// Every session factory is built and every route key parsed before anything
/// is modified, so those failures leave both the lookup and the router
/// untouched. Resolution failures surface from `initialize` and leave the
/// previously published table in place.
///
/// # Errors
/// - `Error::Config` for invalid session definitions
/// - `Error::IllegalConfiguration` for unparsable route keys or unsupported
///   route values
/// - `Error::LookupFailure` for routes naming an undefined session
pub fn apply_config<K>(
    router: &RoutingSessionFactory<K>,
    lookup: &MapSessionFactoryLookup,
    provider: &dyn SessionFactoryProvider,
    config: &RoutingConfig,
) -> Result<()>
where
    K: LookupKey + FromStr,
    K::Err: fmt::Display,
{
    config.validate()?;

    let mut factories: HashMap<String, Arc<dyn SessionFactory>> = HashMap::new();
    for (name, definition) in &config.sessions {
        factories.insert(name.clone(), provider.create(name, definition)?);
    }

    let mut targets = Vec::with_capacity(config.routes.len());
    for (raw_key, value) in &config.routes {
        let key = raw_key.parse::<K>().map_err(|e| {
            Error::IllegalConfiguration(format!("Illegal lookup key [{}]: {}", raw_key, e))
        })?;
        targets.push((key, SessionFactoryEntry::from(value.clone())));
    }

    for stale in lookup
        .names()
        .into_iter()
        .filter(|name| !factories.contains_key(name))
    {
        lookup.remove_session_factory(&stale);
        tracing::debug!(name = %stale, "Dropped session factory no longer configured");
    }
    lookup.set_session_factories(factories);

    router.set_target_session_factories(targets);
    match &config.default_target {
        Some(value) => router.set_default_target_session_factory(value.clone()),
        None => router.clear_default_target_session_factory(),
    }
    router.set_lenient_fallback(config.lenient_fallback);

    router.initialize()
}

/// Keeps a router in sync with a configuration source
pub struct ConfigReloader<K: LookupKey> {
    router: Arc<RoutingSessionFactory<K>>,
    lookup: Arc<MapSessionFactoryLookup>,
    provider: Arc<dyn SessionFactoryProvider>,
    source: Arc<dyn ConfigSource>,
}

impl<K> ConfigReloader<K>
where
    K: LookupKey + FromStr,
    K::Err: fmt::Display,
{
    /// The router should resolve names through `lookup`; this is set up here.
    pub fn new(
        router: Arc<RoutingSessionFactory<K>>,
        lookup: Arc<MapSessionFactoryLookup>,
        provider: Arc<dyn SessionFactoryProvider>,
        source: Arc<dyn ConfigSource>,
    ) -> Self {
        router.set_session_factory_lookup(lookup.clone());
        Self {
            router,
            lookup,
            provider,
            source,
        }
    }

    pub fn router(&self) -> &Arc<RoutingSessionFactory<K>> {
        &self.router
    }

    /// Load, validate and apply the current configuration once
    pub async fn reload(&self) -> Result<()> {
        let mut config = self.source.load().await?;
        config.merge_env();
        self.source.validate(&config)?;

        apply_config(
            &self.router,
            &self.lookup,
            self.provider.as_ref(),
            &config,
        )
    }

    /// Reload on every change until the source stops reporting changes.
    ///
    /// Failed reloads are logged and the router keeps its previous table.
    pub async fn run(&self) -> Result<()> {
        let mut changes = self.source.watch_changes().await?;

        while let Some(change) = changes.next().await {
            match change {
                Ok(change) => {
                    tracing::info!(
                        version = change.version,
                        timestamp = %change.timestamp,
                        "Configuration changed, reloading routes"
                    );
                    match self.reload().await {
                        Ok(()) => tracing::info!(
                            generation = self.router.generation(),
                            "Routing configuration reloaded"
                        ),
                        Err(e) => tracing::warn!(
                            error = %e,
                            "Failed to reload routing configuration, keeping previous routes"
                        ),
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Configuration watch error");
                }
            }
        }

        Ok(())
    }
}
