//! Sentinel - Security Event Auditor
//!
//! Runs the security auditor, the DDoS tracker's cleanup loop and the
//! read-only reporting API until SIGINT/SIGTERM.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sentinel::{
    clock::SystemClock,
    config::{Config, ConfigManager},
    reporting::ReportingServer,
    security::{DdosProtection, SecurityAuditor, SecurityEvent, SecurityEventKind, Severity},
    ShutdownCoordinator,
};

/// Time allowed for background components to stop
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(10);

/// CLI arguments for Sentinel
#[derive(Parser, Debug)]
#[command(name = "sentinel")]
#[command(about = "Sentinel - security event auditing and DDoS protection")]
#[command(version)]
#[command(long_about = "
Sentinel - security event auditing and DDoS protection

Configuration priority (highest to lowest):
1. Command-line arguments
2. Configuration file
3. Environment variables (used when the configuration file is absent)
4. Built-in defaults

Environment variables:
  SENTINEL_AUDITOR_QUEUE_CAPACITY  - Event queue capacity
  SENTINEL_AUDITOR_SWEEP_INTERVAL  - Analyzer window sweep interval (e.g., 1m)
  SENTINEL_BRUTE_FORCE_MAX_FAILURES - Login failures before a brute-force alert
  SENTINEL_BRUTE_FORCE_WINDOW      - Brute-force window (e.g., 15m)
  SENTINEL_RATE_LIMIT_MAX_VIOLATIONS - Rate-limit hits before an abuse alert
  SENTINEL_RATE_LIMIT_WINDOW       - Rate-limit abuse window (e.g., 1h)
  SENTINEL_DDOS_ENABLED            - Enable DDoS protection (true/false)
  SENTINEL_DDOS_MAX_REQUESTS       - Requests per address per window
  SENTINEL_DDOS_WINDOW             - DDoS window (e.g., 60s)
  SENTINEL_DDOS_BLOCK_DURATION     - Block duration (e.g., 5m)
  SENTINEL_DDOS_CLEANUP_INTERVAL   - Cleanup interval (e.g., 1m)
  SENTINEL_DDOS_FAIL_MODE          - open or closed
  SENTINEL_DDOS_TRUSTED_NETWORKS   - Comma-separated CIDRs that always pass
  SENTINEL_REPORTING_ENABLED       - Enable the reporting API (true/false)
  SENTINEL_REPORTING_BIND_ADDR     - Reporting API address
  SENTINEL_LOG_LEVEL               - Log level (trace, debug, info, warn, error)
")]
pub struct CliArgs {
    /// Configuration file path
    #[arg(short, long, default_value = "sentinel.toml", help = "Path to configuration file")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, help = "Log level (overrides config file)")]
    pub log_level: Option<String>,

    /// Enable verbose logging (sets log level to debug)
    #[arg(short, long, help = "Enable verbose logging")]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    /// Reporting API address (overrides config file)
    #[arg(long, help = "Reporting API bind address (e.g., 127.0.0.1:9095)")]
    pub reporting_addr: Option<SocketAddr>,

    /// Disable the reporting API
    #[arg(long, help = "Disable the reporting API")]
    pub no_reporting: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration and exit")]
    pub validate_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    let mut config = if args.config.exists() {
        ConfigManager::load_from_file(&args.config)?
    } else {
        ConfigManager::load_from_env()?
    };

    let cli_overrides =
        config.merge_with_cli_args(args.log_level.as_deref(), args.reporting_addr, args.no_reporting);

    init_tracing(&args, &config)?;

    for applied in &cli_overrides {
        info!("CLI override: {}", applied);
    }

    config
        .validate()
        .context("Final configuration validation failed")?;

    if args.validate_config {
        info!("Configuration is valid");
        log_config_summary(&config);
        return Ok(());
    }

    info!("Starting Sentinel v{}", env!("CARGO_PKG_VERSION"));
    log_config_summary(&config);

    let clock = SystemClock::shared();
    let shutdown_coordinator = ShutdownCoordinator::new(SHUTDOWN_TIMEOUT);

    let auditor = Arc::new(SecurityAuditor::new(&config.auditor, &config.analyzers, clock.clone()));
    auditor.start()?;

    let ddos = Arc::new(DdosProtection::new(config.ddos.clone(), clock));
    ddos.start()?;

    let reporting_handle = if config.reporting.enabled {
        let server = ReportingServer::new(config.reporting.bind_addr, auditor.clone(), ddos.clone());
        let shutdown_rx = shutdown_coordinator.subscribe();

        Some(tokio::spawn(async move {
            if let Err(e) = server.start(shutdown_rx).await {
                error!("Reporting API server error: {:#}", e);
            }
        }))
    } else {
        info!("Reporting API disabled");
        None
    };

    auditor.log_event(
        SecurityEvent::new(SecurityEventKind::SystemStartup, Severity::Low)
            .with_detail("version", env!("CARGO_PKG_VERSION")),
    );

    info!("Sentinel started; press Ctrl+C or send SIGTERM/SIGINT to shut down");

    if let Err(e) = shutdown_coordinator.listen_for_signals().await {
        error!("Error setting up signal handlers: {}", e);
        shutdown_coordinator.trigger();
    }

    info!("Initiating graceful shutdown...");

    auditor.log_event(SecurityEvent::new(SecurityEventKind::SystemShutdown, Severity::Low));

    if let Err(e) = shutdown_coordinator.shutdown_components(&auditor, &ddos).await {
        error!("{:#}", e);
    }

    if let Some(handle) = reporting_handle {
        if let Err(e) = handle.await {
            error!("Reporting API task failed: {}", e);
        }
    }

    info!("Shutdown complete");
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(args: &CliArgs, config: &Config) -> Result<()> {
    let log_level = if args.verbose {
        "debug"
    } else {
        config.logging.log_level.as_str()
    };

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    if args.json_logs || config.logging.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_target(false))
            .try_init()
            .context("Failed to initialize tracing")?;
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_thread_ids(true)
                    .with_level(true),
            )
            .try_init()
            .context("Failed to initialize tracing")?;
    }

    Ok(())
}

fn log_config_summary(config: &Config) {
    let enabled = |on: bool| if on { "enabled" } else { "disabled" };

    info!("Configuration summary:");
    info!("  Event queue capacity: {}", config.auditor.queue_capacity);
    info!(
        "  Analyzer sweep interval: {}",
        humantime::format_duration(config.auditor.sweep_interval)
    );
    info!(
        "  Brute force: {} failures in {}",
        config.analyzers.brute_force.max_failures,
        humantime::format_duration(config.analyzers.brute_force.window)
    );
    info!(
        "  Rate limit abuse: {} violations in {}",
        config.analyzers.rate_limit.max_violations,
        humantime::format_duration(config.analyzers.rate_limit.window)
    );
    info!(
        "  DDoS protection: {} ({} requests per {}, block {}, fail {:?})",
        enabled(config.ddos.enabled),
        config.ddos.max_requests,
        humantime::format_duration(config.ddos.window_duration),
        humantime::format_duration(config.ddos.block_duration),
        config.ddos.fail_mode
    );
    info!("  Trusted networks: {}", config.ddos.trusted_networks.len());
    info!(
        "  Reporting API: {} ({})",
        enabled(config.reporting.enabled),
        config.reporting.bind_addr
    );
}
