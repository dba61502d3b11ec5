//! Routing configuration model
//!
//! The configuration names a set of session definitions, maps lookup keys to
//! raw target entries and optionally names a default target. Route values are
//! kept as raw JSON: resolving them (and rejecting unsupported ones) is the
//! router's job at initialization time.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::{Error, Result};

static KEYSPACE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{1,48}$").expect("keyspace name pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_true")]
    pub lenient_fallback: bool,

    /// Raw default entry, normally the name of a session definition
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_target: Option<serde_json::Value>,

    #[serde(default)]
    pub sessions: BTreeMap<String, SessionDefinition>,

    /// Lookup key to raw entry
    #[serde(default)]
    pub routes: BTreeMap<String, serde_json::Value>,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How to reach one database session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDefinition {
    #[serde(default = "default_contact_points")]
    pub contact_points: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub keyspace: Option<String>,

    /// Defer connecting until the first session request
    #[serde(default = "default_false")]
    pub lazy: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_false")]
    pub json: bool,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            lenient_fallback: true,
            default_target: None,
            sessions: BTreeMap::new(),
            routes: BTreeMap::new(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SessionDefinition {
    pub fn new<I, S>(contact_points: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            contact_points: contact_points.into_iter().map(Into::into).collect(),
            keyspace: None,
            lazy: false,
        }
    }

    pub fn with_keyspace(mut self, keyspace: impl Into<String>) -> Self {
        self.keyspace = Some(keyspace.into());
        self
    }

    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Check the definition registered under `name`
    pub fn validate(&self, name: &str) -> Result<()> {
        if name.trim().is_empty() {
            return Err(Error::Config("Session names must not be empty".to_string()));
        }

        if self.contact_points.is_empty() {
            return Err(Error::Config(format!(
                "Session [{}] needs at least one contact point",
                name
            )));
        }

        if let Some(keyspace) = &self.keyspace
            && !KEYSPACE_NAME.is_match(keyspace)
        {
            return Err(Error::Config(format!(
                "Session [{}] has invalid keyspace name [{}]",
                name, keyspace
            )));
        }

        Ok(())
    }
}

impl RoutingConfig {
    /// A small two-tenant configuration, used by `cqlroute init`
    pub fn sample() -> Self {
        let mut sessions = BTreeMap::new();
        sessions.insert(
            "primary".to_string(),
            SessionDefinition::new(["127.0.0.1:9042"]).with_keyspace("main"),
        );
        sessions.insert(
            "tenant_a".to_string(),
            SessionDefinition::new(["127.0.0.1:9042"]).with_keyspace("tenant_a"),
        );
        sessions.insert(
            "tenant_b".to_string(),
            SessionDefinition::new(["127.0.0.1:9042"])
                .with_keyspace("tenant_b")
                .lazy(),
        );

        let mut routes = BTreeMap::new();
        routes.insert("tenant-a".to_string(), "tenant_a".into());
        routes.insert("tenant-b".to_string(), "tenant_b".into());

        Self {
            lenient_fallback: true,
            default_target: Some("primary".into()),
            sessions,
            routes,
            logging: LoggingConfig::default(),
        }
    }

    /// Structural checks that do not require resolving any entry
    pub fn validate(&self) -> Result<()> {
        for (name, definition) in &self.sessions {
            definition.validate(name)?;
        }

        if self.routes.keys().any(|key| key.is_empty()) {
            return Err(Error::Config("Route keys must not be empty".to_string()));
        }

        Ok(())
    }

    /// Merge environment variables into config (env vars take precedence)
    pub fn merge_env(&mut self) {
        if let Ok(val) = std::env::var("CQLROUTE_LENIENT_FALLBACK") {
            match val.parse::<bool>() {
                Ok(lenient) => self.lenient_fallback = lenient,
                Err(_) => tracing::warn!(
                    value = %val,
                    "Ignoring invalid CQLROUTE_LENIENT_FALLBACK"
                ),
            }
        }

        if let Ok(val) = std::env::var("CQLROUTE_DEFAULT_TARGET") {
            self.default_target = if val.is_empty() {
                None
            } else {
                Some(serde_json::Value::String(val))
            };
        }

        if let Ok(val) = std::env::var("CQLROUTE_LOG_LEVEL") {
            self.logging.level = val;
        }
    }
}

fn default_contact_points() -> Vec<String> {
    vec!["127.0.0.1:9042".to_string()]
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

fn default_false() -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_document() {
        let config: RoutingConfig = serde_json::from_str("{}").unwrap();

        assert!(config.lenient_fallback);
        assert!(config.default_target.is_none());
        assert!(config.sessions.is_empty());
        assert!(config.routes.is_empty());
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_route_values_stay_raw() {
        let config: RoutingConfig = serde_json::from_str(
            r#"{
                "routes": { "tenant-a": "tenant_a", "tenant-b": 42 },
                "sessions": { "tenant_a": { "keyspace": "tenant_a" } }
            }"#,
        )
        .unwrap();

        assert_eq!(config.routes["tenant-a"], "tenant_a");
        assert_eq!(config.routes["tenant-b"], 42);
        assert_eq!(
            config.sessions["tenant_a"].contact_points,
            vec!["127.0.0.1:9042".to_string()]
        );
    }

    #[test]
    fn test_non_mapping_routes_rejected_by_parser() {
        let result: std::result::Result<RoutingConfig, _> =
            serde_json::from_str(r#"{ "routes": ["tenant_a"] }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_sample_is_valid() {
        let config = RoutingConfig::sample();
        assert!(config.validate().is_ok());
        assert_eq!(config.routes.len(), 2);
        assert!(config.sessions["tenant_b"].lazy);
    }

    #[test]
    fn test_validate_rejects_bad_keyspace() {
        let mut config = RoutingConfig::default();
        config.sessions.insert(
            "broken".to_string(),
            SessionDefinition::new(["127.0.0.1:9042"]).with_keyspace("no-dashes-allowed"),
        );

        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no-dashes-allowed"));
    }

    #[test]
    fn test_validate_rejects_missing_contact_points() {
        let mut config = RoutingConfig::default();
        config
            .sessions
            .insert("empty".to_string(), SessionDefinition::new(Vec::<String>::new()));

        assert!(config.validate().is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_overrides() {
        unsafe {
            std::env::set_var("CQLROUTE_LENIENT_FALLBACK", "false");
            std::env::set_var("CQLROUTE_DEFAULT_TARGET", "fallback_session");
            std::env::set_var("CQLROUTE_LOG_LEVEL", "debug");
        }

        let mut config = RoutingConfig::default();
        config.merge_env();

        assert!(!config.lenient_fallback);
        assert_eq!(
            config.default_target,
            Some(serde_json::Value::String("fallback_session".to_string()))
        );
        assert_eq!(config.logging.level, "debug");

        unsafe {
            std::env::remove_var("CQLROUTE_LENIENT_FALLBACK");
            std::env::remove_var("CQLROUTE_DEFAULT_TARGET");
            std::env::remove_var("CQLROUTE_LOG_LEVEL");
        }
    }

    #[test]
    #[serial_test::serial]
    fn test_merge_env_ignores_invalid_flag() {
        unsafe {
            std::env::set_var("CQLROUTE_LENIENT_FALLBACK", "maybe");
        }

        let mut config = RoutingConfig::default();
        config.merge_env();
        assert!(config.lenient_fallback);

        unsafe {
            std::env::remove_var("CQLROUTE_LENIENT_FALLBACK");
        }
    }
}
