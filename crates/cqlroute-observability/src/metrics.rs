//! Metrics collection with Prometheus
//!
//! This module provides Prometheus metrics for session routing:
//! - Session lookups by outcome (matched key, lenient fallback, default for empty key)
//! - Resolution failures by reason
//! - Routing table initializations and their duration
//! - Current routing table size

use prometheus::{
    CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};
use std::sync::Arc;

/// How a session factory was selected for a lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupOutcome {
    /// The lookup key matched a routing table entry
    Matched,
    /// The key did not match and lenient fallback used the default factory
    Fallback,
    /// No key was determined and the default factory was used
    Default,
}

impl LookupOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Matched => "matched",
            Self::Fallback => "fallback",
            Self::Default => "default",
        }
    }
}

/// Why no session factory could be selected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionFailureReason {
    UnmatchedKey,
    EmptyKey,
    NotInitialized,
}

impl ResolutionFailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UnmatchedKey => "unmatched_key",
            Self::EmptyKey => "empty_key",
            Self::NotInitialized => "not_initialized",
        }
    }
}

/// Metrics collector for session routing
#[derive(Clone)]
pub struct RoutingMetrics {
    /// Prometheus registry
    registry: Arc<Registry>,

    /// Session lookups by outcome
    pub session_lookups_total: CounterVec,
    /// Lookups that could not select a session factory
    pub resolution_failures_total: CounterVec,
    /// Routing table initializations by result
    pub initializations_total: CounterVec,
    /// Time spent resolving a routing table
    pub initialize_duration_seconds: Histogram,
    /// Number of keys in the published routing table
    pub routing_table_size: Gauge,
}

impl RoutingMetrics {
    /// Create a new metrics collector with its own registry
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let session_lookups_total = CounterVec::new(
            Opts::new(
                "cqlroute_session_lookups_total",
                "Total number of routed session lookups",
            ),
            &["outcome"],
        )?;

        let resolution_failures_total = CounterVec::new(
            Opts::new(
                "cqlroute_resolution_failures_total",
                "Total number of session lookups that selected no factory",
            ),
            &["reason"],
        )?;

        let initializations_total = CounterVec::new(
            Opts::new(
                "cqlroute_initializations_total",
                "Total number of routing table initializations",
            ),
            &["result"],
        )?;

        let initialize_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "cqlroute_initialize_duration_seconds",
                "Routing table initialization duration in seconds",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0]),
        )?;

        let routing_table_size = Gauge::with_opts(Opts::new(
            "cqlroute_routing_table_size",
            "Number of lookup keys in the published routing table",
        ))?;

        registry.register(Box::new(session_lookups_total.clone()))?;
        registry.register(Box::new(resolution_failures_total.clone()))?;
        registry.register(Box::new(initializations_total.clone()))?;
        registry.register(Box::new(initialize_duration_seconds.clone()))?;
        registry.register(Box::new(routing_table_size.clone()))?;

        Ok(Self {
            registry: Arc::new(registry),
            session_lookups_total,
            resolution_failures_total,
            initializations_total,
            initialize_duration_seconds,
            routing_table_size,
        })
    }

    /// Get the Prometheus registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn record_lookup(&self, outcome: LookupOutcome) {
        self.session_lookups_total
            .with_label_values(&[outcome.as_str()])
            .inc();
    }

    pub fn record_resolution_failure(&self, reason: ResolutionFailureReason) {
        self.resolution_failures_total
            .with_label_values(&[reason.as_str()])
            .inc();
    }

    /// Record a successful initialization that published `table_size` keys
    pub fn record_initialize_success(&self, table_size: usize, duration_secs: f64) {
        self.initializations_total
            .with_label_values(&["success"])
            .inc();
        self.initialize_duration_seconds.observe(duration_secs);
        self.routing_table_size.set(table_size as f64);
    }

    pub fn record_initialize_failure(&self, duration_secs: f64) {
        self.initializations_total
            .with_label_values(&["failure"])
            .inc();
        self.initialize_duration_seconds.observe(duration_secs);
    }

    /// Render all metrics in the Prometheus text format
    pub fn gather_text(&self) -> Result<String, prometheus::Error> {
        TextEncoder::new().encode_to_string(&self.registry.gather())
    }
}
