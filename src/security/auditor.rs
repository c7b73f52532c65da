//! Security Auditor
//!
//! Accepts security events from request-handling code without blocking,
//! and runs a single background worker that logs each event, updates the
//! metrics and feeds every analyzer in order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::analyzers::{default_analyzers, AnalyzerConfig, SecurityAnalyzer};
use super::detection::{classify_input, is_suspicious_user_agent, sanitize_input};
use super::event::{SecurityAlert, SecurityEvent, SecurityEventKind, Severity};
use super::sink::{AuditSink, RecentActivity, TracingSink};
use crate::clock::SharedClock;
use crate::metrics::{SecurityMetrics, SecurityMetricsSnapshot};
use crate::Result;

/// Longest raw input copied into event details
const MAX_LOGGED_INPUT: usize = 256;

/// Auditor configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditorConfig {
    /// Bounded queue between producers and the worker
    pub queue_capacity: usize,
    /// Events kept for the reporting API
    pub recent_events: usize,
    /// Alerts kept for the reporting API
    pub recent_alerts: usize,
    /// How often the worker evicts idle keys from the analyzer windows
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for AuditorConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1000,
            recent_events: 500,
            recent_alerts: 200,
            sweep_interval: Duration::from_secs(60),
        }
    }
}

/// Request attributes shared by the convenience constructors
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub ip_address: String,
    pub user_agent: String,
    pub request_id: String,
    pub endpoint: String,
    pub method: String,
}

impl RequestContext {
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
            ..Default::default()
        }
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub fn request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = request_id.into();
        self
    }

    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    fn event(&self, kind: SecurityEventKind, severity: Severity) -> SecurityEvent {
        SecurityEvent::new(kind, severity)
            .with_ip(self.ip_address.clone())
            .with_user_agent(self.user_agent.clone())
            .with_request_id(self.request_id.clone())
            .with_endpoint(self.endpoint.clone())
            .with_method(self.method.clone())
    }
}

/// Auditor health summary for the reporting API
#[derive(Debug, Clone, Serialize)]
pub struct AuditorHealth {
    pub running: bool,
    pub analyzers_active: usize,
    pub queue_depth: usize,
    pub queue_capacity: usize,
    pub processed_events: u64,
    pub fallback_events: u64,
    pub alerts_generated: u64,
}

/// Everything the worker (and the fallback path) needs
struct Pipeline {
    sinks: Vec<Arc<dyn AuditSink>>,
    analyzers: Vec<Arc<dyn SecurityAnalyzer>>,
    metrics: Arc<SecurityMetrics>,
    processed: AtomicU64,
    alerts: AtomicU64,
}

impl Pipeline {
    /// Log and count an event without analysis
    fn record(&self, event: &SecurityEvent) {
        self.metrics.record_event(event);
        for sink in &self.sinks {
            sink.record_event(event);
        }
    }

    /// Full processing: record, then run every analyzer in order
    fn process(&self, event: &SecurityEvent) {
        self.record(event);

        for analyzer in &self.analyzers {
            let outcome = catch_unwind(AssertUnwindSafe(|| analyzer.analyze(event)));
            match outcome {
                Ok(Ok(Some(alert))) => self.raise(&alert),
                Ok(Ok(None)) => {}
                Ok(Err(e)) => {
                    warn!(analyzer = analyzer.name(), event_id = %event.id_str(), "Analyzer failed: {:#}", e);
                }
                Err(_) => {
                    error!(analyzer = analyzer.name(), event_id = %event.id_str(), "Analyzer panicked");
                }
            }
        }

        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Evict idle keys from every analyzer window
    fn prune_analyzers(&self) -> usize {
        let mut evicted = 0;
        for analyzer in &self.analyzers {
            match analyzer.prune_expired() {
                Ok(n) => evicted += n,
                Err(e) => warn!(analyzer = analyzer.name(), "Analyzer sweep failed: {:#}", e),
            }
        }
        if evicted > 0 {
            debug!(evicted, "Evicted idle analyzer keys");
        }
        evicted
    }

    fn raise(&self, alert: &SecurityAlert) {
        self.alerts.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_alert(alert);
        for sink in &self.sinks {
            sink.record_alert(alert);
        }
    }
}

/// Security event auditor
pub struct SecurityAuditor {
    clock: SharedClock,
    pipeline: Arc<Pipeline>,
    recent: Arc<RecentActivity>,
    queue_capacity: usize,
    sweep_interval: Duration,
    sender: mpsc::Sender<SecurityEvent>,
    receiver: Mutex<Option<mpsc::Receiver<SecurityEvent>>>,
    shutdown_tx: broadcast::Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    fallback: AtomicU64,
}

impl SecurityAuditor {
    /// Auditor with the standard analyzers and sinks
    pub fn new(config: &AuditorConfig, analyzer_config: &AnalyzerConfig, clock: SharedClock) -> Self {
        let analyzers = default_analyzers(analyzer_config, clock.clone());
        Self::with_components(config, analyzers, Vec::new(), clock)
    }

    /// Auditor with explicit analyzers and extra sinks
    ///
    /// The tracing sink and the recent-activity buffer are always installed;
    /// `extra_sinks` run after them.
    pub fn with_components(
        config: &AuditorConfig,
        analyzers: Vec<Arc<dyn SecurityAnalyzer>>,
        extra_sinks: Vec<Arc<dyn AuditSink>>,
        clock: SharedClock,
    ) -> Self {
        let queue_capacity = config.queue_capacity.max(1);
        let (sender, receiver) = mpsc::channel(queue_capacity);
        let (shutdown_tx, _) = broadcast::channel(1);
        let recent = Arc::new(RecentActivity::new(config.recent_events, config.recent_alerts));

        let mut sinks: Vec<Arc<dyn AuditSink>> = vec![Arc::new(TracingSink), recent.clone()];
        sinks.extend(extra_sinks);

        let pipeline = Arc::new(Pipeline {
            sinks,
            analyzers,
            metrics: Arc::new(SecurityMetrics::new()),
            processed: AtomicU64::new(0),
            alerts: AtomicU64::new(0),
        });

        Self {
            clock,
            pipeline,
            recent,
            queue_capacity,
            sweep_interval: config.sweep_interval,
            sender,
            receiver: Mutex::new(Some(receiver)),
            shutdown_tx,
            worker: Mutex::new(None),
            fallback: AtomicU64::new(0),
        }
    }

    /// Start the background worker
    ///
    /// Events logged before `start` wait in the queue.
    pub fn start(&self) -> Result<()> {
        if self.sweep_interval.is_zero() {
            anyhow::bail!("auditor sweep_interval must be greater than 0");
        }
        let mut worker = self
            .worker
            .lock()
            .map_err(|_| anyhow::anyhow!("auditor worker lock poisoned"))?;
        let mut receiver = self
            .receiver
            .lock()
            .map_err(|_| anyhow::anyhow!("auditor receiver lock poisoned"))?
            .take()
            .ok_or_else(|| anyhow::anyhow!("security auditor already started"))?;

        let pipeline = Arc::clone(&self.pipeline);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let sweep_interval = self.sweep_interval;

        *worker = Some(tokio::spawn(async move {
            info!(analyzers = pipeline.analyzers.len(), "Security auditor worker started");

            let mut sweep = tokio::time::interval(sweep_interval);
            sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately
            sweep.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = shutdown_rx.recv() => {
                        debug!("Security auditor received shutdown signal");
                        break;
                    }
                    next = receiver.recv() => match next {
                        Some(event) => pipeline.process(&event),
                        None => break,
                    },
                    _ = sweep.tick() => {
                        pipeline.prune_analyzers();
                    }
                }
            }

            // Whatever is still queued gets logged, not analyzed
            receiver.close();
            let mut drained = 0usize;
            while let Ok(event) = receiver.try_recv() {
                pipeline.record(&event);
                drained += 1;
            }
            if drained > 0 {
                debug!(drained, "Logged queued security events without analysis");
            }

            info!("Security auditor worker stopped");
        }));

        Ok(())
    }

    /// Signal the worker to stop and wait for it
    pub async fn stop(&self) {
        let handle = match self.worker.lock() {
            Ok(mut worker) => worker.take(),
            Err(_) => None,
        };

        if let Some(handle) = handle {
            let _ = self.shutdown_tx.send(());
            if let Err(e) = handle.await {
                error!("Security auditor worker ended abnormally: {}", e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.worker
            .lock()
            .map(|worker| worker.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }

    /// Queue a security event for processing
    ///
    /// Fills in missing id, timestamp and risk score. Never blocks: when the
    /// queue is full (or the worker is gone) the event is logged directly.
    pub fn log_event(&self, mut event: SecurityEvent) {
        event.normalize(self.clock.now());

        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.fallback.fetch_add(1, Ordering::Relaxed);
                debug!(event_id = %event.id_str(), "Security event queue full, logging directly");
                self.pipeline.record(&event);
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                self.fallback.fetch_add(1, Ordering::Relaxed);
                self.pipeline.record(&event);
            }
        }
    }

    pub fn log_login_success(&self, user_id: Uuid, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::LoginSuccess, Severity::Low)
                .with_user(Some(user_id))
                .with_detail("action", "user_login"),
        );
    }

    pub fn log_login_failure(&self, email: &str, reason: &str, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::LoginFailure, Severity::Medium)
                .with_detail("email", email)
                .with_detail("reason", reason),
        );
    }

    pub fn log_access_denied(&self, user_id: Option<Uuid>, reason: &str, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::AccessDenied, Severity::Medium)
                .with_user(user_id)
                .with_detail("reason", reason),
        );
    }

    pub fn log_rate_limit_exceeded(&self, limit: u32, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::RateLimitExceeded, Severity::High)
                .with_detail("limit", limit),
        );
    }

    pub fn log_ddos_detected(&self, request_count: usize, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::DdosDetected, Severity::Critical)
                .blocked(true)
                .with_detail("request_count", request_count),
        );
    }

    pub fn log_validation_failed(&self, errors: &[String], ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::ValidationFailed, Severity::Medium)
                .with_detail("validation_errors", json!(errors)),
        );
    }

    pub fn log_suspicious_input(&self, input_type: &str, input: &str, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::SuspiciousInput, Severity::High)
                .blocked(true)
                .with_detail("input_type", input_type)
                .with_detail("input", loggable_input(input)),
        );
    }

    pub fn log_api_key_usage(&self, api_key_id: Uuid, user_id: Option<Uuid>, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::ApiKeyUsed, Severity::Low)
                .with_user(user_id)
                .with_detail("api_key_id", api_key_id.to_string()),
        );
    }

    pub fn log_suspicious_user_agent(&self, ctx: &RequestContext) {
        self.log_event(
            ctx.event(SecurityEventKind::SuspiciousUserAgent, Severity::Medium)
                .with_detail("user_agent", ctx.user_agent.clone())
                .with_detail("reason", "suspicious_user_agent"),
        );
    }

    /// Log an SQL-injection or XSS attempt
    pub fn log_injection_attempt(&self, kind: SecurityEventKind, input: &str, ctx: &RequestContext) {
        self.log_event(
            ctx.event(kind, Severity::High)
                .blocked(true)
                .with_detail("input", loggable_input(input)),
        );
    }

    /// Log a suspicious user agent if the context carries one
    pub fn inspect_user_agent(&self, ctx: &RequestContext) -> bool {
        let suspicious = is_suspicious_user_agent(&ctx.user_agent);
        if suspicious {
            self.log_suspicious_user_agent(ctx);
        }
        suspicious
    }

    /// Classify `input` and log an injection attempt when it matches
    pub fn inspect_input(&self, input: &str, ctx: &RequestContext) -> Option<SecurityEventKind> {
        let kind = classify_input(input)?;
        self.log_injection_attempt(kind, input, ctx);
        Some(kind)
    }

    /// Log an error response as a security event
    ///
    /// Returns whether anything was logged; statuses below 400 are ignored.
    pub fn log_http_status(&self, status: u16, ctx: &RequestContext) -> bool {
        if status < 400 {
            return false;
        }

        let (kind, severity) = match status {
            401 | 403 => (SecurityEventKind::AccessDenied, Severity::Medium),
            429 => (SecurityEventKind::RateLimitExceeded, Severity::High),
            500 => (SecurityEventKind::UnusualActivity, Severity::High),
            _ => (SecurityEventKind::UnusualActivity, Severity::Low),
        };

        self.log_event(
            ctx.event(kind, severity)
                .with_status(status)
                .with_detail("status_code", status)
                .with_detail("reason", "http_status_code"),
        );
        true
    }

    pub fn get_security_stats(&self) -> SecurityMetricsSnapshot {
        self.pipeline.metrics.snapshot()
    }

    pub fn metrics(&self) -> Arc<SecurityMetrics> {
        Arc::clone(&self.pipeline.metrics)
    }

    pub fn recent(&self) -> Arc<RecentActivity> {
        Arc::clone(&self.recent)
    }

    /// Evict idle keys from the analyzer windows now; returns how many
    pub fn prune_analyzers(&self) -> usize {
        self.pipeline.prune_analyzers()
    }

    pub fn analyzer_count(&self) -> usize {
        self.pipeline.analyzers.len()
    }

    /// Events fully processed by the worker
    pub fn processed_count(&self) -> u64 {
        self.pipeline.processed.load(Ordering::Relaxed)
    }

    /// Events that took the direct logging path
    pub fn fallback_count(&self) -> u64 {
        self.fallback.load(Ordering::Relaxed)
    }

    pub fn queue_depth(&self) -> usize {
        self.queue_capacity.saturating_sub(self.sender.capacity())
    }

    pub fn health(&self) -> AuditorHealth {
        AuditorHealth {
            running: self.is_running(),
            analyzers_active: self.analyzer_count(),
            queue_depth: self.queue_depth(),
            queue_capacity: self.queue_capacity,
            processed_events: self.processed_count(),
            fallback_events: self.fallback_count(),
            alerts_generated: self.pipeline.alerts.load(Ordering::Relaxed),
        }
    }
}

fn loggable_input(input: &str) -> String {
    sanitize_input(input).chars().take(MAX_LOGGED_INPUT).collect()
}
