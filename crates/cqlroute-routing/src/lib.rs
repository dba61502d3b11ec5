//! cqlroute routing engine
//!
//! This crate routes session requests to one of several session factories:
//! - Lookup key resolution (task-scoped, thread-scoped or custom)
//! - Name-based session factory lookups
//! - Immutable routing tables published by atomic swap
//! - Applying and hot-reloading routing configuration

pub mod entry;
pub mod key_resolver;
pub mod lookup;
pub mod reload;
pub mod router;
pub mod table;

// Re-export commonly used types
pub use entry::{SessionFactoryEntry, TargetFactorySource};
pub use key_resolver::{
    ContextLookupKeyResolver, LookupKeyGuard, LookupKeyResolver, current_lookup_key,
    set_thread_lookup_key, with_lookup_key, without_lookup_key,
};
pub use lookup::{
    ComponentRegistry, MapSessionFactoryLookup, RegistrySessionFactoryLookup,
    SessionFactoryLookup, SingleSessionFactoryLookup,
};
pub use reload::{ConfigReloader, apply_config};
pub use router::RoutingSessionFactory;
pub use table::{RoutingTable, Selection, SelectionFailure};
