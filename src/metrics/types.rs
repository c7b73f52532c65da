//! Metrics Types

use serde::{Deserialize, Serialize};

/// Point-in-time copy of the security counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityMetricsSnapshot {
    pub total_events: u64,
    pub blocked_requests: u64,
    pub high_risk_events: u64,
    pub active_threats: u64,
    pub login_failures: u64,
    pub access_denied: u64,
    pub rate_limit_hits: u64,
    pub ddos_attempts: u64,
    pub sql_injection_attempts: u64,
    pub xss_attempts: u64,
}
