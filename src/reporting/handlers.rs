//! Reporting API Handlers

use super::types::*;
use crate::metrics::SecurityMetricsSnapshot;
use crate::security::{DdosProtection, DdosStats, SecurityAlert, SecurityAuditor, SecurityEvent};
use axum::{
    extract::{OriginalUri, Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use std::time::SystemTime;

const DEFAULT_LIMIT: usize = 50;
const MAX_LIMIT: usize = 1000;

/// Shared application state for handlers
#[derive(Clone)]
pub struct AppState {
    pub auditor: Arc<SecurityAuditor>,
    pub ddos: Arc<DdosProtection>,
    pub start_time: SystemTime,
}

impl AppState {
    pub fn new(auditor: Arc<SecurityAuditor>, ddos: Arc<DdosProtection>) -> Self {
        Self {
            auditor,
            ddos,
            start_time: SystemTime::now(),
        }
    }
}

/// Query parameters for list endpoints
#[derive(Debug, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIMIT).min(MAX_LIMIT)
    }
}

/// Metrics snapshot
pub async fn get_stats(State(state): State<AppState>) -> Json<ApiResponse<SecurityMetricsSnapshot>> {
    Json(ApiResponse::success(state.auditor.get_security_stats()))
}

/// Recent alerts, newest first
pub async fn get_alerts(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<SecurityAlert>>> {
    let alerts = state.auditor.recent().recent_alerts(query.resolve());
    Json(ApiResponse::success(alerts))
}

/// Recent events, newest first
pub async fn get_events(
    State(state): State<AppState>,
    Query(query): Query<LimitQuery>,
) -> Json<ApiResponse<Vec<SecurityEvent>>> {
    let events = state.auditor.recent().recent_events(query.resolve());
    Json(ApiResponse::success(events))
}

/// Blocked and suspicious addresses
pub async fn get_threats(State(state): State<AppState>) -> Json<ApiResponse<ThreatSummary>> {
    let mut blocked_addresses: Vec<String> = state
        .ddos
        .blocked_addresses()
        .into_iter()
        .map(|ip| ip.to_string())
        .collect();
    blocked_addresses.sort();

    let mut suspicious_addresses: Vec<String> = Vec::new();
    for alert in state.auditor.recent().recent_alerts(MAX_LIMIT) {
        let Some(ip) = alert.metadata.get("ip_address").and_then(|v| v.as_str()) else {
            continue;
        };
        if !ip.is_empty() && !suspicious_addresses.iter().any(|known| known == ip) {
            suspicious_addresses.push(ip.to_string());
        }
    }

    Json(ApiResponse::success(ThreatSummary {
        blocked_addresses,
        suspicious_addresses,
        active_threats: state.auditor.get_security_stats().active_threats,
    }))
}

/// Health check handler
pub async fn health_check(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    let auditor = state.auditor.health();
    let status = if auditor.running { "healthy" } else { "degraded" };

    Json(ApiResponse::success(HealthStatus {
        status: status.to_string(),
        uptime_seconds: SystemTime::now()
            .duration_since(state.start_time)
            .unwrap_or_default()
            .as_secs(),
        ddos_enabled: state.ddos.config().enabled,
        auditor,
    }))
}

/// DDoS tracker statistics
pub async fn get_ddos_stats(State(state): State<AppState>) -> Json<ApiResponse<DdosStats>> {
    Json(ApiResponse::success(state.ddos.get_stats()))
}

/// Prometheus text exposition
pub async fn prometheus_metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
        state.auditor.metrics().export_prometheus(),
    )
}

/// Fallback for paths no route matches
pub async fn not_found(OriginalUri(uri): OriginalUri) -> (StatusCode, Json<ApiResponse<()>>) {
    (
        StatusCode::NOT_FOUND,
        Json(ApiResponse::error(format!("No route for {}", uri.path()))),
    )
}
