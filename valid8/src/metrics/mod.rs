//! Verification metrics
//!
//! Tracks per-adapter and per-service figures derived from bus events:
//! - Request counts by outcome (success, failure, pending)
//! - Latency (running mean, min, max) and a bounded raw sample window
//! - Error rate, always recomputed from counters
//! - A process-wide rollup over every adapter's overall bucket

mod collector;
mod types;

pub use collector::{CollectorOptions, DEFAULT_MAX_RESPONSE_TIME_SAMPLES, MetricsCollector};
pub use types::{AdapterMetrics, GlobalMetrics, MetricsSnapshot, ServiceMetrics};
