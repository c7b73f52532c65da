//! Sentinel Library
//!
//! Security event auditing for web services: a typed event model,
//! sliding-window threat analyzers, an asynchronous auditor with a bounded
//! queue, per-address DDoS protection and a read-only reporting API.

pub mod clock;
pub mod config;
pub mod metrics;
pub mod reporting;
pub mod security;
pub mod shutdown;

pub use clock::{Clock, ManualClock, SharedClock, SystemClock};
pub use config::Config;
pub use security::{DdosProtection, SecurityAuditor};
pub use shutdown::ShutdownCoordinator;

/// Common error type for the crate
pub type Result<T> = anyhow::Result<T>;
