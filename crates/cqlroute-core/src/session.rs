//! Session and session factory capabilities
//!
//! A [`Session`] is one established context for issuing statements against the
//! database. A [`SessionFactory`] hands out sessions on demand. Both are opaque
//! to the router: it only selects a factory and returns whatever that factory
//! produces, errors included.

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::Arc;

use crate::{Result, config::SessionDefinition};

pub type Row = serde_json::Value;
pub type Value = serde_json::Value;

/// A CQL statement with positional bind values
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub cql: String,
    pub values: Vec<Value>,
}

impl Statement {
    pub fn new(cql: impl Into<String>) -> Self {
        Self {
            cql: cql.into(),
            values: Vec::new(),
        }
    }

    /// Append a positional bind value
    pub fn bind(mut self, value: impl Into<Value>) -> Self {
        self.values.push(value.into());
        self
    }
}

/// Rows returned from executing a statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub rows: Vec<Row>,
}

impl QueryResult {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Session trait
///
/// The lifecycle of a session is owned by whoever created it; routers never
/// close the sessions they hand out.
#[async_trait]
pub trait Session: Send + Sync {
    /// Execute a statement
    ///
    /// # Errors
    /// - `Error::Session` for driver-level failures
    async fn execute(&self, statement: Statement) -> Result<QueryResult>;

    /// Keyspace this session is bound to, if any
    fn keyspace(&self) -> Option<&str> {
        None
    }

    /// Release resources held by the session
    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// Produces sessions on demand.
///
/// `get_session` is synchronous and must not block on I/O for an already
/// established session, so factories compose into both blocking and async
/// callers.
pub trait SessionFactory: Send + Sync {
    fn get_session(&self) -> Result<Arc<dyn Session>>;
}

/// Factory that always returns the same, already established session.
#[derive(Clone)]
pub struct DefaultSessionFactory {
    session: Arc<dyn Session>,
}

impl DefaultSessionFactory {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self { session }
    }
}

impl SessionFactory for DefaultSessionFactory {
    fn get_session(&self) -> Result<Arc<dyn Session>> {
        Ok(Arc::clone(&self.session))
    }
}

impl fmt::Debug for DefaultSessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DefaultSessionFactory")
            .field("keyspace", &self.session.keyspace())
            .finish()
    }
}

type SessionInitializer = Box<dyn Fn() -> Result<Arc<dyn Session>> + Send + Sync>;

/// Factory that establishes its session on first use and caches it.
///
/// A failed initialization is not cached; the next call tries again.
pub struct LazySessionFactory {
    initializer: SessionInitializer,
    session: OnceCell<Arc<dyn Session>>,
}

impl LazySessionFactory {
    pub fn new<F>(initializer: F) -> Self
    where
        F: Fn() -> Result<Arc<dyn Session>> + Send + Sync + 'static,
    {
        Self {
            initializer: Box::new(initializer),
            session: OnceCell::new(),
        }
    }

    /// Whether the session has been established
    pub fn is_connected(&self) -> bool {
        self.session.get().is_some()
    }
}

impl SessionFactory for LazySessionFactory {
    fn get_session(&self) -> Result<Arc<dyn Session>> {
        self.session
            .get_or_try_init(|| (self.initializer)())
            .map(Arc::clone)
    }
}

impl fmt::Debug for LazySessionFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySessionFactory")
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builds session factories from named session definitions.
///
/// Configuration loading calls this once per definition; the embedding
/// application supplies the implementation backed by its database driver.
pub trait SessionFactoryProvider: Send + Sync {
    fn create(&self, name: &str, definition: &SessionDefinition) -> Result<Arc<dyn SessionFactory>>;
}
