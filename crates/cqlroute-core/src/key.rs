//! Lookup key types used to select a session factory
//!
//! A lookup key is any value with equality and hashing. Routers are generic
//! over the key type; `String` covers keyspace or tenant names read from
//! configuration, and [`TenantId`] covers UUID-identified tenants.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::Hash;
use std::str::FromStr;
use uuid::Uuid;

use crate::{Error, Result};

/// Marker trait for routing table keys.
///
/// Blanket-implemented for every type with the required bounds.
pub trait LookupKey: Eq + Hash + Clone + fmt::Debug + fmt::Display + Send + Sync + 'static {}

impl<T> LookupKey for T where T: Eq + Hash + Clone + fmt::Debug + fmt::Display + Send + Sync + 'static
{}

/// Unique identifier for a tenant in multi-tenant deployments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(Uuid);

impl TenantId {
    /// Create a new random tenant ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a tenant ID from a UUID
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parse a tenant ID from a string
    pub fn from_string(s: &str) -> Result<Self> {
        let uuid = Uuid::parse_str(s).map_err(|e| {
            Error::IllegalConfiguration(format!("Invalid tenant ID format [{}]: {}", s, e))
        })?;
        Ok(Self(uuid))
    }
}

impl Default for TenantId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TenantId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_string(s)
    }
}
