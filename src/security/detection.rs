//! Request Inspection Helpers
//!
//! Cheap classifiers request-handling code runs before deciding which
//! security event, if any, to log.

use std::sync::OnceLock;

use regex::Regex;

use super::event::SecurityEventKind;

/// Scanner and attack-tool signatures matched case-insensitively
const SUSPICIOUS_USER_AGENTS: &[&str] = &[
    "sqlmap",
    "nikto",
    "nmap",
    "masscan",
    "zap",
    "burp",
    "w3af",
    "havij",
    "acunetix",
    "nessus",
    "openvas",
    "metasploit",
    "curl/7.0",
    "wget/1.0",
];

const SQL_INJECTION_PATTERN: &str = r"(?ix)
    '\s*or\s*'?1'?\s*=\s*'?1
  | '\s*;\s*drop\s
  | \bunion\s+(all\s+)?select\b
  | \binsert\s+into\b
  | \bdelete\s+from\b
  | \bupdate\s+\w*\s*set\b
  | \b(drop|create|alter)\s+table\b
  | \bexec(ute)?\s*\(
  | '\s*--
";

const XSS_PATTERN: &str = r"(?ix)
    <\s*/?\s*script
  | \b(java|vb)script\s*:
  | \bon(load|error|click|mouseover|focus|blur|change|submit|reset|keydown|keyup|keypress)\s*=
  | <\s*(iframe|object|embed|applet|meta|link|style)\b
  | \bexpression\s*\(
  | \burl\s*\(
  | @import
";

fn sql_injection_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(SQL_INJECTION_PATTERN).expect("valid SQL injection pattern"))
}

fn xss_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(XSS_PATTERN).expect("valid XSS pattern"))
}

/// Empty user agents and known scanner signatures are suspicious
pub fn is_suspicious_user_agent(user_agent: &str) -> bool {
    if user_agent.trim().is_empty() {
        return true;
    }

    let lower = user_agent.to_lowercase();
    SUSPICIOUS_USER_AGENTS.iter().any(|pattern| lower.contains(pattern))
}

/// Classify raw input as an injection attempt
///
/// Returns [`SecurityEventKind::SqlInjectionAttempt`] or
/// [`SecurityEventKind::XssAttempt`] on a match.
pub fn classify_input(input: &str) -> Option<SecurityEventKind> {
    if sql_injection_regex().is_match(input) {
        Some(SecurityEventKind::SqlInjectionAttempt)
    } else if xss_regex().is_match(input) {
        Some(SecurityEventKind::XssAttempt)
    } else {
        None
    }
}

/// Strip NUL bytes and control characters other than newline, tab and CR
pub fn sanitize_input(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t' | '\r'))
        .collect()
}
