//! Audit Sinks
//!
//! Destinations for processed events and raised alerts. The tracing sink is
//! the structured log; [`RecentActivity`] keeps bounded in-memory history for
//! the reporting API.

use std::collections::VecDeque;
use std::sync::RwLock;

use tracing::{debug, error, info, warn};

use super::event::{SecurityAlert, SecurityEvent, Severity};

/// Receiver of processed events and alerts
pub trait AuditSink: Send + Sync {
    fn record_event(&self, event: &SecurityEvent);
    fn record_alert(&self, alert: &SecurityAlert);
}

/// Emit `$msg` at the tracing level matching `$severity`
macro_rules! log_by_severity {
    ($severity:expr, $($rest:tt)+) => {
        match $severity {
            Severity::Critical => error!($($rest)+),
            Severity::High => warn!($($rest)+),
            Severity::Medium => info!($($rest)+),
            Severity::Low => debug!($($rest)+),
        }
    };
}

/// Structured log sink
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl AuditSink for TracingSink {
    fn record_event(&self, event: &SecurityEvent) {
        let details = serde_json::to_string(&event.details).unwrap_or_default();
        let user_id = event.user_id.map(|u| u.to_string()).unwrap_or_default();

        log_by_severity!(
            event.severity,
            security_event = true,
            event_id = %event.id_str(),
            event_type = %event.kind,
            severity = %event.severity,
            ip_address = %event.ip_address,
            user_id = %user_id,
            user_agent = %event.user_agent,
            request_id = %event.request_id,
            endpoint = %event.endpoint,
            method = %event.method,
            status = ?event.status,
            risk_score = event.score(),
            blocked = event.blocked,
            details = %details,
            "Security event: {}",
            event.kind
        );
    }

    fn record_alert(&self, alert: &SecurityAlert) {
        let metadata = serde_json::to_string(&alert.metadata).unwrap_or_default();

        log_by_severity!(
            alert.severity,
            security_alert = true,
            alert_id = %alert.id,
            severity = %alert.severity,
            title = %alert.title,
            description = %alert.description,
            risk_score = alert.risk_score,
            event_ids = ?alert.event_ids,
            actions = ?alert.actions,
            metadata = %metadata,
            "SECURITY ALERT: {}",
            alert.title
        );
    }
}

/// Bounded history of recent events and alerts, newest last
#[derive(Debug)]
pub struct RecentActivity {
    event_capacity: usize,
    alert_capacity: usize,
    events: RwLock<VecDeque<SecurityEvent>>,
    alerts: RwLock<VecDeque<SecurityAlert>>,
}

impl RecentActivity {
    pub fn new(event_capacity: usize, alert_capacity: usize) -> Self {
        Self {
            event_capacity,
            alert_capacity,
            events: RwLock::new(VecDeque::with_capacity(event_capacity.min(1024))),
            alerts: RwLock::new(VecDeque::with_capacity(alert_capacity.min(1024))),
        }
    }

    /// Up to `limit` most recent events, newest first
    pub fn recent_events(&self, limit: usize) -> Vec<SecurityEvent> {
        match self.events.read() {
            Ok(events) => events.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Up to `limit` most recent alerts, newest first
    pub fn recent_alerts(&self, limit: usize) -> Vec<SecurityAlert> {
        match self.alerts.read() {
            Ok(alerts) => alerts.iter().rev().take(limit).cloned().collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn event_count(&self) -> usize {
        self.events.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn alert_count(&self) -> usize {
        self.alerts.read().map(|a| a.len()).unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut events) = self.events.write() {
            events.clear();
        }
        if let Ok(mut alerts) = self.alerts.write() {
            alerts.clear();
        }
    }
}

fn push_bounded<T>(buffer: &mut VecDeque<T>, item: T, capacity: usize) {
    if capacity == 0 {
        return;
    }
    while buffer.len() >= capacity {
        buffer.pop_front();
    }
    buffer.push_back(item);
}

impl AuditSink for RecentActivity {
    fn record_event(&self, event: &SecurityEvent) {
        if let Ok(mut events) = self.events.write() {
            push_bounded(&mut events, event.clone(), self.event_capacity);
        }
    }

    fn record_alert(&self, alert: &SecurityAlert) {
        if let Ok(mut alerts) = self.alerts.write() {
            push_bounded(&mut alerts, alert.clone(), self.alert_capacity);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::event::SecurityEventKind;
    use std::time::SystemTime;

    fn event(n: usize) -> SecurityEvent {
        let mut e = SecurityEvent::new(SecurityEventKind::AccessGranted, Severity::Low);
        e.id = Some(format!("evt-{}", n));
        e
    }

    #[test]
    fn test_recent_events_are_bounded_and_newest_first() {
        let recent = RecentActivity::new(3, 3);
        for n in 0..5 {
            recent.record_event(&event(n));
        }

        assert_eq!(recent.event_count(), 3);
        let ids: Vec<_> = recent
            .recent_events(10)
            .into_iter()
            .map(|e| e.id.unwrap())
            .collect();
        assert_eq!(ids, vec!["evt-4", "evt-3", "evt-2"]);
        assert_eq!(recent.recent_events(1).len(), 1);
    }

    #[test]
    fn test_recent_alerts_and_clear() {
        let recent = RecentActivity::new(10, 2);
        for title in ["a", "b", "c"] {
            recent.record_alert(&SecurityAlert::new(SystemTime::now(), Severity::High, title, ""));
        }
        let titles: Vec<_> = recent.recent_alerts(5).into_iter().map(|a| a.title).collect();
        assert_eq!(titles, vec!["c", "b"]);

        recent.clear();
        assert_eq!(recent.alert_count(), 0);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let recent = RecentActivity::new(0, 0);
        recent.record_event(&event(1));
        assert_eq!(recent.event_count(), 0);
    }

    #[test]
    fn test_tracing_sink_handles_every_severity() {
        let sink = TracingSink;
        for severity in [Severity::Low, Severity::Medium, Severity::High, Severity::Critical] {
            let mut e = SecurityEvent::new(SecurityEventKind::UnusualActivity, severity);
            e.normalize(SystemTime::now());
            sink.record_event(&e);
            sink.record_alert(&SecurityAlert::new(SystemTime::now(), severity, "t", "d"));
        }
    }
}
