//! Configuration Manager

use super::Config;
use crate::security::FailMode;
use crate::Result;
use anyhow::{bail, Context};
use ipnet::IpNet;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "SENTINEL_";

/// Manages configuration loading and validation
pub struct ConfigManager;

impl ConfigManager {
    /// Load configuration from file
    ///
    /// A missing file yields the defaults.
    pub fn load_from_file(path: &Path) -> Result<Config> {
        let config = if path.exists() {
            tracing::info!("Loading configuration from: {}", path.display());
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;

            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            tracing::warn!("Configuration file not found at {}, using defaults", path.display());
            Config::default()
        };

        config.validate().context("Configuration validation failed")?;
        tracing::info!("Configuration loaded and validated successfully");
        Ok(config)
    }

    /// Defaults with `SENTINEL_*` overrides applied
    pub fn load_from_env() -> Result<Config> {
        let mut config = Config::default();
        Self::apply_env(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides looked up through `lookup`
    ///
    /// `lookup` receives full variable names such as `SENTINEL_DDOS_MAX_REQUESTS`.
    pub fn apply_env<F>(config: &mut Config, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| {
            let key = format!("{}{}", ENV_PREFIX, name);
            lookup(&key).map(|value| (key, value))
        };

        if let Some((key, v)) = var("AUDITOR_QUEUE_CAPACITY") {
            config.auditor.queue_capacity = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("AUDITOR_SWEEP_INTERVAL") {
            config.auditor.sweep_interval = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("BRUTE_FORCE_MAX_FAILURES") {
            config.analyzers.brute_force.max_failures = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("BRUTE_FORCE_WINDOW") {
            config.analyzers.brute_force.window = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("RATE_LIMIT_MAX_VIOLATIONS") {
            config.analyzers.rate_limit.max_violations = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("RATE_LIMIT_WINDOW") {
            config.analyzers.rate_limit.window = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_ENABLED") {
            config.ddos.enabled = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_MAX_REQUESTS") {
            config.ddos.max_requests = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_WINDOW") {
            config.ddos.window_duration = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_BLOCK_DURATION") {
            config.ddos.block_duration = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_CLEANUP_INTERVAL") {
            config.ddos.cleanup_interval = parse_duration(&key, &v)?;
        }
        if let Some((key, v)) = var("DDOS_FAIL_MODE") {
            config.ddos.fail_mode = match v.to_ascii_lowercase().as_str() {
                "open" => FailMode::Open,
                "closed" => FailMode::Closed,
                _ => bail!("Invalid {}: {} (expected 'open' or 'closed')", key, v),
            };
        }
        if let Some((key, v)) = var("DDOS_TRUSTED_NETWORKS") {
            config.ddos.trusted_networks = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(|s| parse::<IpNet>(&key, s))
                .collect::<Result<_>>()?;
        }
        if let Some((key, v)) = var("REPORTING_ENABLED") {
            config.reporting.enabled = parse(&key, &v)?;
        }
        if let Some((key, v)) = var("REPORTING_BIND_ADDR") {
            config.reporting.bind_addr = parse::<SocketAddr>(&key, &v)?;
        }
        if let Some((_, v)) = var("LOG_LEVEL") {
            config.logging.log_level = v;
        }

        Ok(())
    }
}

fn parse<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .parse::<T>()
        .with_context(|| format!("Invalid {}: {}", key, value))
}

fn parse_duration(key: &str, value: &str) -> Result<std::time::Duration> {
    humantime::parse_duration(value).with_context(|| format!("Invalid {}: {}", key, value))
}

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        self.validate_auditor_config()
            .context("Auditor configuration validation failed")?;
        self.validate_analyzer_config()
            .context("Analyzer configuration validation failed")?;
        self.validate_ddos_config()
            .context("DDoS configuration validation failed")?;
        self.validate_logging_config()
            .context("Logging configuration validation failed")?;
        Ok(())
    }

    fn validate_auditor_config(&self) -> Result<()> {
        if self.auditor.queue_capacity == 0 {
            bail!("queue_capacity must be greater than 0");
        }
        if self.auditor.sweep_interval.is_zero() {
            bail!("sweep_interval must be greater than 0");
        }
        Ok(())
    }

    fn validate_analyzer_config(&self) -> Result<()> {
        let brute_force = &self.analyzers.brute_force;
        if brute_force.max_failures == 0 {
            bail!("brute_force.max_failures must be greater than 0");
        }
        if brute_force.window.is_zero() {
            bail!("brute_force.window must be greater than 0");
        }

        let suspicious = &self.analyzers.suspicious_activity;
        if suspicious.min_events == 0 {
            bail!("suspicious_activity.min_events must be greater than 0");
        }
        if suspicious.window.is_zero() {
            bail!("suspicious_activity.window must be greater than 0");
        }

        let rate_limit = &self.analyzers.rate_limit;
        if rate_limit.max_violations == 0 {
            bail!("rate_limit.max_violations must be greater than 0");
        }
        if rate_limit.window.is_zero() {
            bail!("rate_limit.window must be greater than 0");
        }

        Ok(())
    }

    fn validate_ddos_config(&self) -> Result<()> {
        if self.ddos.max_requests == 0 {
            bail!("max_requests must be greater than 0");
        }
        if self.ddos.window_duration.is_zero() {
            bail!("window_duration must be greater than 0");
        }
        if self.ddos.block_duration.is_zero() {
            bail!("block_duration must be greater than 0");
        }
        if self.ddos.cleanup_interval.is_zero() {
            bail!("cleanup_interval must be greater than 0");
        }
        Ok(())
    }

    fn validate_logging_config(&self) -> Result<()> {
        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&self.logging.log_level.as_str()) {
            bail!("logging.log_level must be one of: {}", valid_log_levels.join(", "));
        }
        Ok(())
    }

    /// Merge with CLI arguments
    ///
    /// Returns a description of each override applied. Tracing is usually
    /// not initialised yet, so the caller logs them.
    pub fn merge_with_cli_args(
        &mut self,
        log_level: Option<&str>,
        reporting_addr: Option<SocketAddr>,
        no_reporting: bool,
    ) -> Vec<String> {
        let mut applied = Vec::new();

        if let Some(level) = log_level {
            self.logging.log_level = level.to_string();
            applied.push(format!("log level set to {}", level));
        }

        if let Some(addr) = reporting_addr {
            self.reporting.bind_addr = addr;
            applied.push(format!("reporting address set to {}", addr));
        }

        if no_reporting {
            self.reporting.enabled = false;
            applied.push("reporting API disabled".to_string());
        }

        applied
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.auditor.queue_capacity, 1000);
        assert_eq!(config.ddos.max_requests, 100);
        assert_eq!(config.analyzers.brute_force.max_failures, 5);
    }

    #[test]
    fn test_load_partial_file() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[ddos]
max_requests = 20
window_duration = "30s"
fail_mode = "closed"
trusted_networks = ["10.0.0.0/8"]

[analyzers.brute_force]
max_failures = 3

[logging]
log_level = "debug"
"#
        )
        .unwrap();

        let config = ConfigManager::load_from_file(file.path()).unwrap();
        assert_eq!(config.ddos.max_requests, 20);
        assert_eq!(config.ddos.window_duration, Duration::from_secs(30));
        assert_eq!(config.ddos.block_duration, Duration::from_secs(300));
        assert_eq!(config.ddos.fail_mode, FailMode::Closed);
        assert_eq!(config.ddos.trusted_networks.len(), 1);
        assert_eq!(config.analyzers.brute_force.max_failures, 3);
        assert_eq!(config.analyzers.brute_force.window, Duration::from_secs(900));
        assert_eq!(config.logging.log_level, "debug");
        assert_eq!(config.auditor.recent_events, 500);
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = ConfigManager::load_from_file(&dir.path().join("absent.toml")).unwrap();
        assert!(config.reporting.enabled);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[ddos]\nmax_requests = 0").unwrap();
        assert!(ConfigManager::load_from_file(file.path()).is_err());

        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[ddos]\ncleanup_interval = \"0s\"").unwrap();
        assert!(ConfigManager::load_from_file(file.path()).is_err());

        let mut config = Config::default();
        config.auditor.queue_capacity = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.auditor.sweep_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.logging.log_level = "loud".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let vars: HashMap<&str, &str> = [
            ("SENTINEL_DDOS_MAX_REQUESTS", "42"),
            ("SENTINEL_AUDITOR_SWEEP_INTERVAL", "30s"),
            ("SENTINEL_DDOS_BLOCK_DURATION", "10m"),
            ("SENTINEL_DDOS_FAIL_MODE", "Closed"),
            ("SENTINEL_DDOS_TRUSTED_NETWORKS", "127.0.0.0/8, ::1/128"),
            ("SENTINEL_REPORTING_BIND_ADDR", "0.0.0.0:9100"),
            ("SENTINEL_LOG_LEVEL", "warn"),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        ConfigManager::apply_env(&mut config, |key| vars.get(key).map(|v| v.to_string())).unwrap();

        assert_eq!(config.ddos.max_requests, 42);
        assert_eq!(config.auditor.sweep_interval, Duration::from_secs(30));
        assert_eq!(config.ddos.block_duration, Duration::from_secs(600));
        assert_eq!(config.ddos.fail_mode, FailMode::Closed);
        assert_eq!(config.ddos.trusted_networks.len(), 2);
        assert_eq!(config.reporting.bind_addr.port(), 9100);
        assert_eq!(config.logging.log_level, "warn");
    }

    #[test]
    fn test_env_override_errors_name_the_variable() {
        let mut config = Config::default();
        let err = ConfigManager::apply_env(&mut config, |key| {
            (key == "SENTINEL_DDOS_MAX_REQUESTS").then(|| "lots".to_string())
        })
        .unwrap_err();
        assert!(err.to_string().contains("SENTINEL_DDOS_MAX_REQUESTS"));
    }

    #[test]
    fn test_cli_merge() {
        let mut config = Config::default();
        let applied = config.merge_with_cli_args(Some("trace"), Some("127.0.0.1:9999".parse().unwrap()), true);
        assert_eq!(
            applied,
            vec![
                "log level set to trace",
                "reporting address set to 127.0.0.1:9999",
                "reporting API disabled",
            ]
        );
        assert_eq!(config.logging.log_level, "trace");
        assert_eq!(config.reporting.bind_addr.port(), 9999);
        assert!(!config.reporting.enabled);
    }
}
