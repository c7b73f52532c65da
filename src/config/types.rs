//! Configuration Types

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::security::{AnalyzerConfig, AuditorConfig, DdosConfig};

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub auditor: AuditorConfig,
    pub analyzers: AnalyzerConfig,
    pub ddos: DdosConfig,
    pub reporting: ReportingConfig,
    pub logging: LoggingConfig,
}

/// Read-only reporting API
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub enabled: bool,
    pub bind_addr: SocketAddr,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 9095)),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub log_level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json: false,
        }
    }
}
