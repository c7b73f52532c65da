//! Security Event and Alert Types

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::time::SystemTime;
use uuid::Uuid;

use super::window::Timestamped;

/// Free-form key/value details attached to events and alerts
pub type Details = BTreeMap<String, Value>;

/// Kind of security-relevant occurrence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventKind {
    // Authentication
    LoginSuccess,
    LoginFailure,
    Logout,
    TokenRefresh,
    TokenExpired,
    InvalidToken,

    // Authorization
    AccessGranted,
    AccessDenied,
    PrivilegeEscalation,

    // Rate limiting
    RateLimitExceeded,
    DdosDetected,
    IpBlocked,

    // Input validation
    ValidationFailed,
    SqlInjectionAttempt,
    XssAttempt,
    SuspiciousInput,

    // API keys
    ApiKeyCreated,
    ApiKeyUsed,
    ApiKeyRevoked,

    // System
    SystemStartup,
    SystemShutdown,
    ConfigChange,

    // Suspicious activity
    SuspiciousUserAgent,
    MultipleFailures,
    UnusualActivity,
}

impl SecurityEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login_success",
            Self::LoginFailure => "login_failure",
            Self::Logout => "logout",
            Self::TokenRefresh => "token_refresh",
            Self::TokenExpired => "token_expired",
            Self::InvalidToken => "invalid_token",
            Self::AccessGranted => "access_granted",
            Self::AccessDenied => "access_denied",
            Self::PrivilegeEscalation => "privilege_escalation",
            Self::RateLimitExceeded => "rate_limit_exceeded",
            Self::DdosDetected => "ddos_detected",
            Self::IpBlocked => "ip_blocked",
            Self::ValidationFailed => "validation_failed",
            Self::SqlInjectionAttempt => "sql_injection_attempt",
            Self::XssAttempt => "xss_attempt",
            Self::SuspiciousInput => "suspicious_input",
            Self::ApiKeyCreated => "api_key_created",
            Self::ApiKeyUsed => "api_key_used",
            Self::ApiKeyRevoked => "api_key_revoked",
            Self::SystemStartup => "system_startup",
            Self::SystemShutdown => "system_shutdown",
            Self::ConfigChange => "config_change",
            Self::SuspiciousUserAgent => "suspicious_user_agent",
            Self::MultipleFailures => "multiple_failures",
            Self::UnusualActivity => "unusual_activity",
        }
    }

    /// Base risk contribution of the kind
    pub fn base_risk(&self) -> u32 {
        match self {
            Self::LoginFailure => 20,
            Self::AccessDenied => 15,
            Self::RateLimitExceeded => 25,
            Self::DdosDetected => 50,
            Self::SqlInjectionAttempt => 40,
            Self::XssAttempt => 35,
            Self::SuspiciousInput => 30,
            Self::SuspiciousUserAgent => 20,
            Self::MultipleFailures => 35,
            Self::UnusualActivity => 25,
            _ => 0,
        }
    }
}

impl fmt::Display for SecurityEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Severity level shared by events and alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Risk bonus added on top of the kind's base amount
    pub fn risk_bonus(&self) -> u32 {
        match self {
            Self::Critical => 30,
            Self::High => 20,
            Self::Medium => 10,
            Self::Low => 5,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Highest possible risk score
pub const MAX_RISK_SCORE: u8 = 100;

/// Bonus applied when the request was already blocked
const BLOCKED_RISK_BONUS: u32 = 15;

/// Deterministic risk score in `[0, 100]`
pub fn calculate_risk_score(kind: SecurityEventKind, severity: Severity, blocked: bool) -> u8 {
    let mut score = kind.base_risk() + severity.risk_bonus();
    if blocked {
        score += BLOCKED_RISK_BONUS;
    }
    score.min(MAX_RISK_SCORE as u32) as u8
}

/// A single security-relevant occurrence
///
/// `id`, `timestamp` and `risk_score` may be left unset by producers; the
/// auditor fills them in before the event reaches any sink or analyzer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityEvent {
    pub id: Option<String>,
    pub timestamp: Option<SystemTime>,
    pub kind: SecurityEventKind,
    pub severity: Severity,
    pub user_id: Option<Uuid>,
    pub ip_address: String,
    pub user_agent: String,
    pub request_id: String,
    pub endpoint: String,
    pub method: String,
    pub status: Option<u16>,
    pub details: Details,
    pub risk_score: Option<u8>,
    pub blocked: bool,
}

impl SecurityEvent {
    pub fn new(kind: SecurityEventKind, severity: Severity) -> Self {
        Self {
            id: None,
            timestamp: None,
            kind,
            severity,
            user_id: None,
            ip_address: String::new(),
            user_agent: String::new(),
            request_id: String::new(),
            endpoint: String::new(),
            method: String::new(),
            status: None,
            details: Details::new(),
            risk_score: None,
            blocked: false,
        }
    }

    pub fn with_ip(mut self, ip_address: impl Into<String>) -> Self {
        self.ip_address = ip_address.into();
        self
    }

    pub fn with_user(mut self, user_id: Option<Uuid>) -> Self {
        self.user_id = user_id;
        self
    }

    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn with_risk_score(mut self, score: u8) -> Self {
        self.risk_score = Some(score.min(MAX_RISK_SCORE));
        self
    }

    pub fn blocked(mut self, blocked: bool) -> Self {
        self.blocked = blocked;
        self
    }

    /// Score derived from kind, severity and blocked flag
    pub fn computed_risk_score(&self) -> u8 {
        calculate_risk_score(self.kind, self.severity, self.blocked)
    }

    /// Fill missing identifier, timestamp and score; clamp a provided score
    pub fn normalize(&mut self, now: SystemTime) {
        if self.id.as_deref().map_or(true, str::is_empty) {
            self.id = Some(Uuid::new_v4().to_string());
        }
        if self.timestamp.is_none() {
            self.timestamp = Some(now);
        }
        self.risk_score = Some(match self.risk_score {
            Some(score) => score.min(MAX_RISK_SCORE),
            None => self.computed_risk_score(),
        });
    }

    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or("")
    }

    pub fn score(&self) -> u8 {
        self.risk_score.unwrap_or_else(|| self.computed_risk_score())
    }

    /// Key used for per-actor tracking: user id when known, else source address
    pub fn actor_key(&self) -> String {
        match self.user_id {
            Some(user_id) => user_id.to_string(),
            None => self.ip_address.clone(),
        }
    }
}

impl Timestamped for SecurityEvent {
    fn timestamp(&self) -> SystemTime {
        self.timestamp.unwrap_or(SystemTime::UNIX_EPOCH)
    }
}

/// Alert raised by an analyzer when a pattern crosses its threshold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityAlert {
    pub id: String,
    pub timestamp: SystemTime,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub event_ids: Vec<String>,
    pub risk_score: u8,
    pub actions: Vec<String>,
    pub metadata: Details,
}

impl SecurityAlert {
    pub fn new(
        timestamp: SystemTime,
        severity: Severity,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            timestamp,
            severity,
            title: title.into(),
            description: description.into(),
            event_ids: Vec::new(),
            risk_score: 0,
            actions: Vec::new(),
            metadata: Details::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    const ALL_KINDS: [SecurityEventKind; 25] = [
        SecurityEventKind::LoginSuccess,
        SecurityEventKind::LoginFailure,
        SecurityEventKind::Logout,
        SecurityEventKind::TokenRefresh,
        SecurityEventKind::TokenExpired,
        SecurityEventKind::InvalidToken,
        SecurityEventKind::AccessGranted,
        SecurityEventKind::AccessDenied,
        SecurityEventKind::PrivilegeEscalation,
        SecurityEventKind::RateLimitExceeded,
        SecurityEventKind::DdosDetected,
        SecurityEventKind::IpBlocked,
        SecurityEventKind::ValidationFailed,
        SecurityEventKind::SqlInjectionAttempt,
        SecurityEventKind::XssAttempt,
        SecurityEventKind::SuspiciousInput,
        SecurityEventKind::ApiKeyCreated,
        SecurityEventKind::ApiKeyUsed,
        SecurityEventKind::ApiKeyRevoked,
        SecurityEventKind::SystemStartup,
        SecurityEventKind::SystemShutdown,
        SecurityEventKind::ConfigChange,
        SecurityEventKind::SuspiciousUserAgent,
        SecurityEventKind::MultipleFailures,
        SecurityEventKind::UnusualActivity,
    ];

    const ALL_SEVERITIES: [Severity; 4] =
        [Severity::Low, Severity::Medium, Severity::High, Severity::Critical];

    #[test]
    fn test_risk_score_bounded_and_deterministic() {
        for kind in ALL_KINDS {
            for severity in ALL_SEVERITIES {
                for blocked in [false, true] {
                    let a = calculate_risk_score(kind, severity, blocked);
                    let b = calculate_risk_score(kind, severity, blocked);
                    assert_eq!(a, b);
                    assert!(a <= MAX_RISK_SCORE);
                }
            }
        }
    }

    #[test]
    fn test_risk_score_values() {
        assert_eq!(calculate_risk_score(SecurityEventKind::LoginFailure, Severity::Medium, false), 30);
        assert_eq!(calculate_risk_score(SecurityEventKind::LoginSuccess, Severity::Low, false), 5);
        assert_eq!(calculate_risk_score(SecurityEventKind::SuspiciousInput, Severity::High, true), 65);
        assert_eq!(calculate_risk_score(SecurityEventKind::DdosDetected, Severity::Critical, true), 95);
        assert_eq!(calculate_risk_score(SecurityEventKind::SqlInjectionAttempt, Severity::Critical, true), 85);
    }

    #[test]
    fn test_normalize_fills_defaults() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut event = SecurityEvent::new(SecurityEventKind::AccessDenied, Severity::Medium);
        event.normalize(now);

        assert!(!event.id_str().is_empty());
        assert_eq!(event.timestamp, Some(now));
        assert_eq!(event.risk_score, Some(25));
    }

    #[test]
    fn test_normalize_keeps_provided_values() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let earlier = now - Duration::from_secs(5);
        let mut event = SecurityEvent::new(SecurityEventKind::AccessDenied, Severity::Medium)
            .with_timestamp(earlier)
            .with_risk_score(42);
        event.id = Some("evt-1".to_string());
        event.normalize(now);

        assert_eq!(event.id_str(), "evt-1");
        assert_eq!(event.timestamp, Some(earlier));
        assert_eq!(event.risk_score, Some(42));
    }

    #[test]
    fn test_actor_key_prefers_user() {
        let user = Uuid::new_v4();
        let event = SecurityEvent::new(SecurityEventKind::ApiKeyUsed, Severity::Low).with_ip("1.2.3.4");
        assert_eq!(event.actor_key(), "1.2.3.4");
        assert_eq!(event.with_user(Some(user)).actor_key(), user.to_string());
    }

    #[test]
    fn test_kind_serializes_snake_case() {
        let json = serde_json::to_string(&SecurityEventKind::DdosDetected).unwrap();
        assert_eq!(json, "\"ddos_detected\"");
        let json = serde_json::to_string(&SecurityEventKind::SqlInjectionAttempt).unwrap();
        assert_eq!(json, "\"sql_injection_attempt\"");
        assert_eq!(serde_json::to_string(&Severity::Critical).unwrap(), "\"critical\"");
    }
}
