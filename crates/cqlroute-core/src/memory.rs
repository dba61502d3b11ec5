//! In-memory session implementation
//!
//! Echoes every executed statement back as a single row and keeps a log of
//! what was executed. Used by tests and by the CLI to exercise routing without
//! a live cluster.

use async_trait::async_trait;
use serde_json::json;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crate::{
    Error, Result,
    config::SessionDefinition,
    session::{
        DefaultSessionFactory, LazySessionFactory, QueryResult, Session, SessionFactory,
        SessionFactoryProvider, Statement,
    },
};

pub struct InMemorySession {
    name: String,
    keyspace: Option<String>,
    executed: Mutex<Vec<Statement>>,
    closed: AtomicBool,
}

impl InMemorySession {
    pub fn new(name: impl Into<String>, keyspace: Option<&str>) -> Self {
        Self {
            name: name.into(),
            keyspace: keyspace.map(str::to_string),
            executed: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Statements executed so far, oldest first
    pub fn executed(&self) -> Vec<Statement> {
        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl Session for InMemorySession {
    async fn execute(&self, statement: Statement) -> Result<QueryResult> {
        if self.is_closed() {
            return Err(Error::Session(format!("Session [{}] is closed", self.name)));
        }

        let row = json!({
            "session": self.name,
            "keyspace": self.keyspace,
            "cql": statement.cql,
            "values": statement.values,
        });

        self.executed
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(statement);

        Ok(QueryResult { rows: vec![row] })
    }

    fn keyspace(&self) -> Option<&str> {
        self.keyspace.as_deref()
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Builds [`InMemorySession`]-backed factories from session definitions.
///
/// Definitions marked `lazy` get a [`LazySessionFactory`]; the others get a
/// [`DefaultSessionFactory`] around a session created up front.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemorySessionProvider;

impl SessionFactoryProvider for InMemorySessionProvider {
    fn create(&self, name: &str, definition: &SessionDefinition) -> Result<Arc<dyn SessionFactory>> {
        definition.validate(name)?;

        if definition.lazy {
            let name = name.to_string();
            let keyspace = definition.keyspace.clone();
            return Ok(Arc::new(LazySessionFactory::new(move || {
                Ok(Arc::new(InMemorySession::new(name.clone(), keyspace.as_deref()))
                    as Arc<dyn Session>)
            })));
        }

        let session = InMemorySession::new(name, definition.keyspace.as_deref());
        Ok(Arc::new(DefaultSessionFactory::new(Arc::new(session))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_execute_echoes_statement() {
        let session = InMemorySession::new("tenant_a", Some("tenant_a"));
        let result = session
            .execute(Statement::new("SELECT * FROM users WHERE id = ?").bind("u1"))
            .await
            .unwrap();

        assert_eq!(result.len(), 1);
        assert_eq!(result.rows[0]["session"], "tenant_a");
        assert_eq!(result.rows[0]["keyspace"], "tenant_a");
        assert_eq!(result.rows[0]["values"][0], "u1");
        assert_eq!(session.executed().len(), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_statements() {
        let session = InMemorySession::new("primary", None);
        session.close().await.unwrap();

        let err = session.execute(Statement::new("SELECT 1")).await.unwrap_err();
        assert!(matches!(err, Error::Session(_)));
        assert!(session.executed().is_empty());
    }

    #[test]
    fn test_provider_builds_eager_and_lazy_factories() {
        let provider = InMemorySessionProvider;

        let eager = SessionDefinition::new(["10.0.0.1:9042"]).with_keyspace("main");
        let factory = provider.create("primary", &eager).unwrap();
        let session = factory.get_session().unwrap();
        assert_eq!(session.keyspace(), Some("main"));

        let lazy = SessionDefinition::new(["10.0.0.2:9042"])
            .with_keyspace("tenant_b")
            .lazy();
        let factory = provider.create("tenant_b", &lazy).unwrap();
        let first = factory.get_session().unwrap();
        let second = factory.get_session().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.keyspace(), Some("tenant_b"));
    }

    #[test]
    fn test_provider_rejects_invalid_definition() {
        let provider = InMemorySessionProvider;
        let definition = SessionDefinition::new(Vec::<String>::new());

        assert!(provider.create("broken", &definition).is_err());
    }
}
