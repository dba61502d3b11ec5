//! Integration tests for RoutingSessionFactory
//!
//! These tests drive the router through its public API the way an embedding
//! application would: task-scoped lookup keys, name lookups, re-initialization
//! while other threads keep requesting sessions.

use cqlroute_core::{
    DefaultSessionFactory, Error, Session, SessionFactory, Statement, TenantId,
    memory::InMemorySession,
};
use cqlroute_routing::{
    ContextLookupKeyResolver, MapSessionFactoryLookup, RoutingSessionFactory,
    SessionFactoryEntry, with_lookup_key, without_lookup_key,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

fn session(name: &str) -> Arc<dyn Session> {
    Arc::new(InMemorySession::new(name, Some(name)))
}

fn factory_for(session: &Arc<dyn Session>) -> Arc<dyn SessionFactory> {
    Arc::new(DefaultSessionFactory::new(Arc::clone(session)))
}

fn context_router() -> RoutingSessionFactory<String> {
    RoutingSessionFactory::new(ContextLookupKeyResolver::new())
}

fn fixed_router(key: Option<&str>) -> RoutingSessionFactory<String> {
    let key = key.map(str::to_string);
    RoutingSessionFactory::new(move || key.clone())
}

#[tokio::test]
async fn test_lenient_without_default() {
    let a = session("a");
    let router = context_router();
    router.set_target_session_factories([("key".to_string(), factory_for(&a))]);
    router.initialize().unwrap();

    let routed = with_lookup_key("key", async { router.get_session() }).await;
    assert!(Arc::ptr_eq(&routed.unwrap(), &a));

    let unknown = with_lookup_key("unknown", async { router.get_session() })
        .await
        .err()
        .unwrap();
    assert!(unknown.is_resolution_failure());
    assert!(unknown.to_string().contains("[unknown]"));

    let empty = without_lookup_key(async { router.get_session() })
        .await
        .err()
        .unwrap();
    assert!(empty.is_resolution_failure());
    assert!(empty.to_string().contains("empty lookup key"));
}

#[tokio::test]
async fn test_strict_mode_ignores_default_for_unknown_keys() {
    let a = session("a");
    let d = session("d");
    let router = context_router();
    router.set_target_session_factories([("key".to_string(), factory_for(&a))]);
    router.set_default_target_session_factory(factory_for(&d));
    router.set_lenient_fallback(false);
    router.initialize().unwrap();

    let unknown = with_lookup_key("unknown", async { router.get_session() }).await;
    assert!(unknown.err().unwrap().is_resolution_failure());

    // An absent key still uses the default in strict mode
    let empty = without_lookup_key(async { router.get_session() }).await;
    assert!(Arc::ptr_eq(&empty.unwrap(), &d));
}

#[test]
fn test_unresolvable_name_on_first_initialize() {
    let router = fixed_router(Some("key"));
    router.set_session_factory_lookup(Arc::new(MapSessionFactoryLookup::new()));
    router.set_target_session_factories([("key".to_string(), "lookup-name")]);

    let err = router.initialize().unwrap_err();
    assert!(matches!(err, Error::LookupFailure { .. }));
    assert!(err.to_string().contains("lookup-name"));

    assert!(!router.is_initialized());
    assert!(router.get_session().err().unwrap().is_resolution_failure());
}

#[test]
fn test_unresolvable_default_name_fails_initialize() {
    let router = fixed_router(None);
    router.set_default_target_session_factory("primarySessionFactory");

    let err = router.initialize().unwrap_err();
    assert!(err
        .to_string()
        .contains("No SessionFactory with name [primarySessionFactory] registered"));
}

#[test]
fn test_mixed_entries_resolve_through_lookup() {
    let a = session("a");
    let b = session("b");
    let lookup = Arc::new(MapSessionFactoryLookup::with_factory("tenant_b", factory_for(&b)));

    let router = fixed_router(Some("tenant-b"));
    router.set_session_factory_lookup(lookup);
    router.set_target_session_factories([
        ("tenant-a".to_string(), SessionFactoryEntry::from(factory_for(&a))),
        ("tenant-b".to_string(), SessionFactoryEntry::named("tenant_b")),
    ]);
    router.initialize().unwrap();

    let table = router.routing_table().unwrap();
    assert_eq!(table.len(), 2);
    assert!(Arc::ptr_eq(&router.get_session().unwrap(), &b));
}

#[test]
fn test_dynamic_update_requires_reinitialize() {
    let new_session = session("new");
    let lookup = Arc::new(MapSessionFactoryLookup::new());
    let router = fixed_router(Some("new-key"));
    router.set_session_factory_lookup(lookup.clone());
    router.set_target_factory_source(lookup.clone());
    router.initialize().unwrap();

    lookup.add_session_factory("new-key", factory_for(&new_session));
    assert!(router.get_session().is_err());

    router.initialize().unwrap();
    assert!(Arc::ptr_eq(&router.get_session().unwrap(), &new_session));
}

#[test]
fn test_initialize_is_idempotent() {
    let a = session("a");
    let d = session("d");
    let router = fixed_router(Some("key"));
    router.set_target_session_factories([("key".to_string(), factory_for(&a))]);
    router.set_default_target_session_factory(factory_for(&d));

    router.initialize().unwrap();
    let first = router.routing_table().unwrap();
    router.initialize().unwrap();
    let second = router.routing_table().unwrap();

    assert_eq!(first.len(), second.len());
    assert!(Arc::ptr_eq(first.get(&"key".to_string()).unwrap(), second.get(&"key".to_string()).unwrap()));
    assert!(Arc::ptr_eq(
        first.default_factory().unwrap(),
        second.default_factory().unwrap()
    ));
    assert_eq!(second.generation(), first.generation() + 1);
}

#[test]
fn test_failed_reinitialize_keeps_serving_previous_table() {
    let a = session("a");
    let router = fixed_router(Some("key"));
    router.set_target_session_factories([("key".to_string(), factory_for(&a))]);
    router.initialize().unwrap();

    router.set_target_session_factories([
        ("key".to_string(), SessionFactoryEntry::named("lookup-name")),
    ]);
    assert!(router.initialize().is_err());

    assert!(Arc::ptr_eq(&router.get_session().unwrap(), &a));
    assert_eq!(router.generation(), 1);
}

#[test]
fn test_readers_never_see_partial_tables() {
    let old_sessions: Vec<_> = (0..8).map(|i| session(&format!("old-{}", i))).collect();
    let new_sessions: Vec<_> = (0..8).map(|i| session(&format!("new-{}", i))).collect();

    let router = Arc::new(RoutingSessionFactory::<String>::new(|| {
        Some(format!("key-{}", thread_index()))
    }));
    router.set_target_session_factories(
        old_sessions
            .iter()
            .enumerate()
            .map(|(i, s)| (format!("key-{}", i), factory_for(s))),
    );
    router.initialize().unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let readers: Vec<_> = (0..8)
        .map(|i| {
            let router = Arc::clone(&router);
            let stop = Arc::clone(&stop);
            let old = Arc::clone(&old_sessions[i]);
            let new = Arc::clone(&new_sessions[i]);
            thread::spawn(move || {
                THREAD_INDEX.with(|index| index.set(i));
                while !stop.load(Ordering::Acquire) {
                    // Every request sees a complete table, old or new
                    let table = router.routing_table().unwrap();
                    assert_eq!(table.len(), 8);

                    let got = router.get_session().unwrap();
                    assert!(Arc::ptr_eq(&got, &old) || Arc::ptr_eq(&got, &new));
                }
            })
        })
        .collect();

    for round in 0..50 {
        let sessions = if round % 2 == 0 { &new_sessions } else { &old_sessions };
        router.set_target_session_factories(
            sessions
                .iter()
                .enumerate()
                .map(|(i, s)| (format!("key-{}", i), factory_for(s))),
        );
        router.initialize().unwrap();
    }

    stop.store(true, Ordering::Release);
    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(router.generation(), 51);
}

thread_local! {
    static THREAD_INDEX: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

fn thread_index() -> usize {
    THREAD_INDEX.with(|index| index.get())
}

#[tokio::test]
async fn test_tenant_id_keys_route_statements() {
    let tenant = TenantId::new();
    let tenant_session = session("tenant_a");
    let shared = session("shared");

    let router = RoutingSessionFactory::<TenantId>::new(ContextLookupKeyResolver::new());
    router.set_target_session_factories([(tenant, factory_for(&tenant_session))]);
    router.set_default_target_session_factory(factory_for(&shared));
    router.initialize().unwrap();

    let result = with_lookup_key(tenant.to_string(), async {
        let session = router.get_session().unwrap();
        session
            .execute(Statement::new("SELECT * FROM users WHERE id = ?").bind("u1"))
            .await
    })
    .await
    .unwrap();
    assert_eq!(result.rows[0]["keyspace"], "tenant_a");

    let fallback = with_lookup_key(TenantId::new().to_string(), async {
        router.get_session()
    })
    .await
    .unwrap();
    assert!(Arc::ptr_eq(&fallback, &shared));
}

#[test]
fn test_router_is_a_session_factory() {
    let a = session("a");
    let inner = fixed_router(Some("key"));
    inner.set_target_session_factories([("key".to_string(), factory_for(&a))]);
    inner.initialize().unwrap();

    // A router can itself be a target of another router
    let outer = fixed_router(None);
    outer.set_default_target_session_factory(Arc::new(inner) as Arc<dyn SessionFactory>);
    outer.initialize().unwrap();

    assert!(Arc::ptr_eq(&outer.get_session().unwrap(), &a));
}
