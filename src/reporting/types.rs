//! Reporting API Types

use serde::Serialize;
use std::time::SystemTime;

use crate::security::AuditorHealth;

/// API response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
    pub timestamp: SystemTime,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            timestamp: SystemTime::now(),
        }
    }

    pub fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message),
            timestamp: SystemTime::now(),
        }
    }
}

/// Addresses currently considered hostile
#[derive(Debug, Serialize)]
pub struct ThreatSummary {
    /// Addresses the DDoS tracker is blocking right now
    pub blocked_addresses: Vec<String>,
    /// Addresses named by recent alerts, most recent first
    pub suspicious_addresses: Vec<String>,
    pub active_threats: u64,
}

/// Service health
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub uptime_seconds: u64,
    pub ddos_enabled: bool,
    pub auditor: AuditorHealth,
}
