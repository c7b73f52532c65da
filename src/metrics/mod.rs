//! Metrics Module
//!
//! Security event counters for reporting, plus Prometheus export.

pub mod collector;
pub mod types;

pub use collector::SecurityMetrics;
pub use types::SecurityMetricsSnapshot;
