//! Metrics Collector

use super::SecurityMetricsSnapshot;
use crate::security::{SecurityAlert, SecurityEvent, SecurityEventKind};
use prometheus::{IntCounter, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error};

/// Scores strictly above this count as high risk
pub const HIGH_RISK_SCORE: u8 = 50;

/// Security event counters
///
/// Plain bookkeeping for reporting. The atomic counters back snapshots and
/// can be reset; the Prometheus counters are cumulative for the process
/// lifetime, as scrapers expect.
pub struct SecurityMetrics {
    prometheus_registry: Registry,

    // Prometheus metrics
    events_total: IntCounterVec,
    alerts_total: IntCounterVec,
    blocked_requests_total: IntCounter,

    // Internal counters
    total_events: AtomicU64,
    blocked_requests: AtomicU64,
    high_risk_events: AtomicU64,
    active_threats: AtomicU64,
    login_failures: AtomicU64,
    access_denied: AtomicU64,
    rate_limit_hits: AtomicU64,
    ddos_attempts: AtomicU64,
    sql_injection_attempts: AtomicU64,
    xss_attempts: AtomicU64,
}

impl SecurityMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        let prometheus_registry = Registry::new();

        let events_total = IntCounterVec::new(
            Opts::new("sentinel_security_events_total", "Total processed security events"),
            &["event_type", "severity"],
        )
        .expect("Failed to create events_total counter");

        let alerts_total = IntCounterVec::new(
            Opts::new("sentinel_security_alerts_total", "Total security alerts raised"),
            &["severity"],
        )
        .expect("Failed to create alerts_total counter");

        let blocked_requests_total = IntCounter::new(
            "sentinel_blocked_requests_total",
            "Total security events for blocked requests",
        )
        .expect("Failed to create blocked_requests_total counter");

        prometheus_registry
            .register(Box::new(events_total.clone()))
            .expect("Failed to register events_total");
        prometheus_registry
            .register(Box::new(alerts_total.clone()))
            .expect("Failed to register alerts_total");
        prometheus_registry
            .register(Box::new(blocked_requests_total.clone()))
            .expect("Failed to register blocked_requests_total");

        Self {
            prometheus_registry,
            events_total,
            alerts_total,
            blocked_requests_total,
            total_events: AtomicU64::new(0),
            blocked_requests: AtomicU64::new(0),
            high_risk_events: AtomicU64::new(0),
            active_threats: AtomicU64::new(0),
            login_failures: AtomicU64::new(0),
            access_denied: AtomicU64::new(0),
            rate_limit_hits: AtomicU64::new(0),
            ddos_attempts: AtomicU64::new(0),
            sql_injection_attempts: AtomicU64::new(0),
            xss_attempts: AtomicU64::new(0),
        }
    }

    /// Count one processed event
    pub fn record_event(&self, event: &SecurityEvent) {
        self.events_total
            .with_label_values(&[event.kind.as_str(), event.severity.as_str()])
            .inc();
        self.total_events.fetch_add(1, Ordering::Relaxed);

        if event.blocked {
            self.blocked_requests_total.inc();
            self.blocked_requests.fetch_add(1, Ordering::Relaxed);
        }

        if event.score() > HIGH_RISK_SCORE {
            self.high_risk_events.fetch_add(1, Ordering::Relaxed);
        }

        let counter = match event.kind {
            SecurityEventKind::LoginFailure => Some(&self.login_failures),
            SecurityEventKind::AccessDenied => Some(&self.access_denied),
            SecurityEventKind::RateLimitExceeded => Some(&self.rate_limit_hits),
            SecurityEventKind::DdosDetected => Some(&self.ddos_attempts),
            SecurityEventKind::SqlInjectionAttempt => Some(&self.sql_injection_attempts),
            SecurityEventKind::XssAttempt => Some(&self.xss_attempts),
            _ => None,
        };
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }

        debug!(event_type = %event.kind, blocked = event.blocked, "Recorded security event");
    }

    /// Count one raised alert
    pub fn record_alert(&self, alert: &SecurityAlert) {
        self.alerts_total
            .with_label_values(&[alert.severity.as_str()])
            .inc();
        self.active_threats.fetch_add(1, Ordering::Relaxed);
    }

    /// Copy of the current counters
    pub fn snapshot(&self) -> SecurityMetricsSnapshot {
        SecurityMetricsSnapshot {
            total_events: self.total_events.load(Ordering::Relaxed),
            blocked_requests: self.blocked_requests.load(Ordering::Relaxed),
            high_risk_events: self.high_risk_events.load(Ordering::Relaxed),
            active_threats: self.active_threats.load(Ordering::Relaxed),
            login_failures: self.login_failures.load(Ordering::Relaxed),
            access_denied: self.access_denied.load(Ordering::Relaxed),
            rate_limit_hits: self.rate_limit_hits.load(Ordering::Relaxed),
            ddos_attempts: self.ddos_attempts.load(Ordering::Relaxed),
            sql_injection_attempts: self.sql_injection_attempts.load(Ordering::Relaxed),
            xss_attempts: self.xss_attempts.load(Ordering::Relaxed),
        }
    }

    /// Zero every snapshot counter
    pub fn reset(&self) {
        for counter in [
            &self.total_events,
            &self.blocked_requests,
            &self.high_risk_events,
            &self.active_threats,
            &self.login_failures,
            &self.access_denied,
            &self.rate_limit_hits,
            &self.ddos_attempts,
            &self.sql_injection_attempts,
            &self.xss_attempts,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
        debug!("Security metrics reset");
    }

    /// Export metrics in Prometheus format
    pub fn export_prometheus(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.prometheus_registry.gather();

        match encoder.encode_to_string(&metric_families) {
            Ok(output) => output,
            Err(e) => {
                error!(error = %e, "Failed to encode Prometheus metrics");
                String::new()
            }
        }
    }
}

impl Default for SecurityMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Severity;
    use std::time::SystemTime;

    fn event(kind: SecurityEventKind, severity: Severity, blocked: bool) -> SecurityEvent {
        let mut e = SecurityEvent::new(kind, severity).blocked(blocked);
        e.normalize(SystemTime::now());
        e
    }

    #[test]
    fn test_counts_by_kind() {
        let metrics = SecurityMetrics::new();
        metrics.record_event(&event(SecurityEventKind::LoginFailure, Severity::Medium, false));
        metrics.record_event(&event(SecurityEventKind::LoginFailure, Severity::Medium, false));
        metrics.record_event(&event(SecurityEventKind::AccessDenied, Severity::Medium, false));
        metrics.record_event(&event(SecurityEventKind::RateLimitExceeded, Severity::High, false));
        metrics.record_event(&event(SecurityEventKind::DdosDetected, Severity::Critical, true));
        metrics.record_event(&event(SecurityEventKind::SqlInjectionAttempt, Severity::High, true));
        metrics.record_event(&event(SecurityEventKind::XssAttempt, Severity::High, true));
        metrics.record_event(&event(SecurityEventKind::LoginSuccess, Severity::Low, false));

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.total_events, 8);
        assert_eq!(snapshot.login_failures, 2);
        assert_eq!(snapshot.access_denied, 1);
        assert_eq!(snapshot.rate_limit_hits, 1);
        assert_eq!(snapshot.ddos_attempts, 1);
        assert_eq!(snapshot.sql_injection_attempts, 1);
        assert_eq!(snapshot.xss_attempts, 1);
        assert_eq!(snapshot.blocked_requests, 3);
        // ddos 95, sqli 75, xss 70; rate limit is exactly 45
        assert_eq!(snapshot.high_risk_events, 3);
    }

    #[test]
    fn test_snapshot_is_a_copy_and_reset_zeroes() {
        let metrics = SecurityMetrics::new();
        metrics.record_event(&event(SecurityEventKind::LoginFailure, Severity::Medium, false));
        metrics.record_alert(&SecurityAlert::new(SystemTime::now(), Severity::High, "t", "d"));

        let before = metrics.snapshot();
        metrics.reset();
        let after = metrics.snapshot();

        assert_eq!(before.total_events, 1);
        assert_eq!(before.active_threats, 1);
        assert_eq!(after, SecurityMetricsSnapshot::default());
    }

    #[test]
    fn test_prometheus_export() {
        let metrics = SecurityMetrics::new();
        metrics.record_event(&event(SecurityEventKind::DdosDetected, Severity::Critical, true));

        let output = metrics.export_prometheus();
        assert!(output.contains("sentinel_security_events_total"));
        assert!(output.contains("event_type=\"ddos_detected\""));
        assert!(output.contains("sentinel_blocked_requests_total 1"));
    }
}
