//! cqlroute Observability
//!
//! This crate provides observability features:
//! - Routing metrics collection (Prometheus)
//! - Structured logging setup

pub mod logging;
pub mod metrics;

pub use metrics::{LookupOutcome, ResolutionFailureReason, RoutingMetrics};
