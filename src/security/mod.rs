//! Security Module
//!
//! Security event model, sliding-window analyzers, the asynchronous auditor
//! and per-address DDoS protection.

pub mod analyzers;
pub mod auditor;
pub mod ddos_protection;
pub mod detection;
pub mod event;
pub mod sink;
pub mod window;

pub use analyzers::{
    default_analyzers, AnalyzerConfig, BruteForceAnalyzer, BruteForceConfig, RateLimitAbuseConfig,
    RateLimitAnalyzer, SecurityAnalyzer, SuspiciousActivityAnalyzer, SuspiciousActivityConfig,
};
pub use auditor::{AuditorConfig, AuditorHealth, RequestContext, SecurityAuditor};
pub use ddos_protection::{BlockReason, DdosConfig, DdosDecision, DdosProtection, DdosStats, FailMode};
pub use detection::{classify_input, is_suspicious_user_agent, sanitize_input};
pub use event::{
    calculate_risk_score, Details, SecurityAlert, SecurityEvent, SecurityEventKind, Severity,
    MAX_RISK_SCORE,
};
pub use sink::{AuditSink, RecentActivity, TracingSink};
pub use window::{SlidingWindowTracker, Timestamped};
