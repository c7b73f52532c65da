//! Security Analyzers
//!
//! Stateful rules that inspect one event at a time and raise an alert when a
//! windowed pattern crosses its threshold. Each analyzer guards its own
//! window behind a mutex so direct calls from request paths stay safe.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use super::event::{SecurityAlert, SecurityEvent, SecurityEventKind, Severity};
use super::window::{SlidingWindowTracker, Timestamped};
use crate::clock::SharedClock;
use crate::Result;

/// A rule evaluated against every processed event
pub trait SecurityAnalyzer: Send + Sync {
    /// Short identifier used in logs
    fn name(&self) -> &'static str;

    /// Inspect one event, returning an alert when the pattern fires
    fn analyze(&self, event: &SecurityEvent) -> Result<Option<SecurityAlert>>;

    /// Evict keys with nothing left inside the window; returns how many
    fn prune_expired(&self) -> Result<usize> {
        Ok(0)
    }
}

/// Analyzer configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    pub brute_force: BruteForceConfig,
    pub suspicious_activity: SuspiciousActivityConfig,
    pub rate_limit: RateLimitAbuseConfig,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            brute_force: BruteForceConfig::default(),
            suspicious_activity: SuspiciousActivityConfig::default(),
            rate_limit: RateLimitAbuseConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BruteForceConfig {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_failures: usize,
}

impl Default for BruteForceConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(15 * 60),
            max_failures: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SuspiciousActivityConfig {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    /// Events needed in-window before the actor is classified at all
    pub min_events: usize,
    /// Alert when more than this many in-window events were blocked
    pub blocked_threshold: usize,
    /// Alert when more than this many in-window events were high risk
    pub high_risk_threshold: usize,
    /// Scores strictly above this count as high risk
    pub high_risk_score: u8,
}

impl Default for SuspiciousActivityConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            min_events: 10,
            blocked_threshold: 3,
            high_risk_threshold: 5,
            high_risk_score: 50,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RateLimitAbuseConfig {
    #[serde(with = "humantime_serde")]
    pub window: Duration,
    pub max_violations: usize,
}

impl Default for RateLimitAbuseConfig {
    fn default() -> Self {
        Self {
            window: Duration::from_secs(60 * 60),
            max_violations: 10,
        }
    }
}

/// Build the standard analyzer set in evaluation order
pub fn default_analyzers(config: &AnalyzerConfig, clock: SharedClock) -> Vec<Arc<dyn SecurityAnalyzer>> {
    vec![
        Arc::new(BruteForceAnalyzer::new(config.brute_force.clone(), clock.clone())),
        Arc::new(SuspiciousActivityAnalyzer::new(config.suspicious_activity.clone(), clock.clone())),
        Arc::new(RateLimitAnalyzer::new(config.rate_limit.clone(), clock)),
    ]
}

fn lock<'a, T>(name: &str, mutex: &'a Mutex<T>) -> Result<MutexGuard<'a, T>> {
    mutex
        .lock()
        .map_err(|_| anyhow!("{} analyzer state lock poisoned", name))
}

fn human_window(window: Duration) -> String {
    humantime::format_duration(window).to_string()
}

/// Detects repeated login failures from one source address
pub struct BruteForceAnalyzer {
    config: BruteForceConfig,
    clock: SharedClock,
    failures: Mutex<SlidingWindowTracker<String>>,
}

impl BruteForceAnalyzer {
    pub fn new(config: BruteForceConfig, clock: SharedClock) -> Self {
        let failures = Mutex::new(SlidingWindowTracker::new(config.window, clock.clone()));
        Self {
            config,
            clock,
            failures,
        }
    }

    /// Addresses with failures still inside the window
    pub fn tracked_addresses(&self) -> usize {
        self.failures.lock().map(|t| t.tracked_keys()).unwrap_or(0)
    }
}

impl SecurityAnalyzer for BruteForceAnalyzer {
    fn name(&self) -> &'static str {
        "brute_force"
    }

    fn analyze(&self, event: &SecurityEvent) -> Result<Option<SecurityAlert>> {
        if event.kind != SecurityEventKind::LoginFailure {
            return Ok(None);
        }

        let mut failures = lock(self.name(), &self.failures)?;
        let at = event.timestamp.unwrap_or_else(|| self.clock.now());
        let count = failures.record(event.ip_address.clone(), at);

        if count < self.config.max_failures {
            debug!(ip = %event.ip_address, count, "Login failure recorded");
            return Ok(None);
        }

        // Start over so the next failure does not fire again immediately
        failures.clear(&event.ip_address);

        let window = human_window(self.config.window);
        let mut alert = SecurityAlert::new(
            self.clock.now(),
            Severity::High,
            "Brute Force Attack Detected",
            format!(
                "IP {} has made {} failed login attempts in the last {}",
                event.ip_address, count, window
            ),
        );
        alert.event_ids = vec![event.id_str().to_string()];
        alert.risk_score = 75;
        alert.actions = vec![
            "Consider blocking IP address".to_string(),
            "Increase rate limiting for this IP".to_string(),
            "Monitor for additional suspicious activity".to_string(),
        ];
        alert.metadata.insert("ip_address".into(), json!(event.ip_address));
        alert.metadata.insert("failure_count".into(), json!(count));
        alert.metadata.insert("time_window".into(), json!(window));
        alert.metadata.insert("attack_type".into(), json!("brute_force"));

        info!(ip = %event.ip_address, count, "Brute force threshold crossed");
        Ok(Some(alert))
    }

    fn prune_expired(&self) -> Result<usize> {
        Ok(lock(self.name(), &self.failures)?.prune_all())
    }
}

/// Compact view of an event kept in the suspicious-activity window
#[derive(Debug, Clone)]
struct ActivityRecord {
    at: SystemTime,
    event_id: String,
    kind: SecurityEventKind,
    blocked: bool,
    risk_score: u8,
}

impl Timestamped for ActivityRecord {
    fn timestamp(&self) -> SystemTime {
        self.at
    }
}

/// Flags actors whose recent activity is dominated by blocked or risky events
///
/// State is not cleared on alert; continued activity keeps re-triggering.
pub struct SuspiciousActivityAnalyzer {
    config: SuspiciousActivityConfig,
    clock: SharedClock,
    activity: Mutex<SlidingWindowTracker<String, ActivityRecord>>,
}

impl SuspiciousActivityAnalyzer {
    pub fn new(config: SuspiciousActivityConfig, clock: SharedClock) -> Self {
        let activity = Mutex::new(SlidingWindowTracker::new(config.window, clock.clone()));
        Self {
            config,
            clock,
            activity,
        }
    }

    pub fn tracked_actors(&self) -> usize {
        self.activity.lock().map(|t| t.tracked_keys()).unwrap_or(0)
    }
}

impl SecurityAnalyzer for SuspiciousActivityAnalyzer {
    fn name(&self) -> &'static str {
        "suspicious_activity"
    }

    fn analyze(&self, event: &SecurityEvent) -> Result<Option<SecurityAlert>> {
        let key = event.actor_key();
        let record = ActivityRecord {
            at: event.timestamp.unwrap_or_else(|| self.clock.now()),
            event_id: event.id_str().to_string(),
            kind: event.kind,
            blocked: event.blocked,
            risk_score: event.score(),
        };

        let mut activity = lock(self.name(), &self.activity)?;
        let total = activity.record(key.clone(), record);
        if total < self.config.min_events {
            return Ok(None);
        }

        let mut kinds: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut blocked_count = 0;
        let mut high_risk_count = 0;
        let mut event_ids = Vec::with_capacity(total);

        for record in activity.entries(&key) {
            *kinds.entry(record.kind.as_str()).or_default() += 1;
            if record.blocked {
                blocked_count += 1;
            }
            if record.risk_score > self.config.high_risk_score {
                high_risk_count += 1;
            }
            event_ids.push(record.event_id.clone());
        }

        if blocked_count <= self.config.blocked_threshold
            && high_risk_count <= self.config.high_risk_threshold
        {
            return Ok(None);
        }

        let window = human_window(self.config.window);
        let mut alert = SecurityAlert::new(
            self.clock.now(),
            Severity::Medium,
            "Suspicious Activity Detected",
            format!(
                "User/IP {} has shown suspicious activity with {} events, {} blocked, {} high-risk",
                key, total, blocked_count, high_risk_count
            ),
        );
        alert.event_ids = event_ids;
        alert.risk_score = 60;
        alert.actions = vec![
            "Review user activity".to_string(),
            "Consider additional monitoring".to_string(),
            "Check for account compromise".to_string(),
        ];
        alert.metadata.insert("user_key".into(), json!(key));
        if !event.ip_address.is_empty() {
            alert.metadata.insert("ip_address".into(), json!(event.ip_address));
        }
        alert.metadata.insert("total_events".into(), json!(total));
        alert.metadata.insert("blocked_count".into(), json!(blocked_count));
        alert.metadata.insert("high_risk_count".into(), json!(high_risk_count));
        alert.metadata.insert("event_types".into(), json!(kinds));
        alert.metadata.insert("time_window".into(), json!(window));

        info!(actor = %key, total, blocked_count, high_risk_count, "Suspicious activity pattern");
        Ok(Some(alert))
    }

    fn prune_expired(&self) -> Result<usize> {
        Ok(lock(self.name(), &self.activity)?.prune_all())
    }
}

/// Detects addresses that keep tripping rate limits or DDoS protection
pub struct RateLimitAnalyzer {
    config: RateLimitAbuseConfig,
    clock: SharedClock,
    violations: Mutex<SlidingWindowTracker<String>>,
}

impl RateLimitAnalyzer {
    pub fn new(config: RateLimitAbuseConfig, clock: SharedClock) -> Self {
        let violations = Mutex::new(SlidingWindowTracker::new(config.window, clock.clone()));
        Self {
            config,
            clock,
            violations,
        }
    }

    pub fn tracked_addresses(&self) -> usize {
        self.violations.lock().map(|t| t.tracked_keys()).unwrap_or(0)
    }
}

impl SecurityAnalyzer for RateLimitAnalyzer {
    fn name(&self) -> &'static str {
        "rate_limit_abuse"
    }

    fn analyze(&self, event: &SecurityEvent) -> Result<Option<SecurityAlert>> {
        if !matches!(
            event.kind,
            SecurityEventKind::RateLimitExceeded | SecurityEventKind::DdosDetected
        ) {
            return Ok(None);
        }

        let mut violations = lock(self.name(), &self.violations)?;
        let at = event.timestamp.unwrap_or_else(|| self.clock.now());
        let count = violations.record(event.ip_address.clone(), at);

        if count < self.config.max_violations {
            return Ok(None);
        }

        violations.clear(&event.ip_address);

        let window = human_window(self.config.window);
        let mut alert = SecurityAlert::new(
            self.clock.now(),
            Severity::High,
            "Persistent Rate Limiting",
            format!(
                "IP {} has exceeded rate limits {} times in the last {}",
                event.ip_address, count, window
            ),
        );
        alert.event_ids = vec![event.id_str().to_string()];
        alert.risk_score = 70;
        alert.actions = vec![
            "Consider permanent IP blocking".to_string(),
            "Increase rate limiting restrictions".to_string(),
            "Monitor for DDoS attack patterns".to_string(),
        ];
        alert.metadata.insert("ip_address".into(), json!(event.ip_address));
        alert.metadata.insert("violation_count".into(), json!(count));
        alert.metadata.insert("time_window".into(), json!(window));
        alert.metadata.insert("attack_type".into(), json!("rate_limit_abuse"));

        info!(ip = %event.ip_address, count, "Persistent rate limiting detected");
        Ok(Some(alert))
    }

    fn prune_expired(&self) -> Result<usize> {
        Ok(lock(self.name(), &self.violations)?.prune_all())
    }
}
