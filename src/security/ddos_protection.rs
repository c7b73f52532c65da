//! DDoS Protection Implementation
//!
//! Per-address request flood detection. `protect` answers synchronously on
//! the request path; a background sweep evicts idle addresses.
//!
//! Internal faults never surface as errors. They resolve through
//! [`FailMode`]: `Open` (the default) lets the request through so a bug in
//! this layer cannot deny all legitimate traffic, `Closed` denies it. This
//! layer is a defense-in-depth signal, which is why `Open` is the default;
//! deployments that treat it as a hard gate should choose `Closed`.

use std::collections::HashMap;
use std::fmt;
use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, SystemTime};

use ipnet::IpNet;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::window::SlidingWindowTracker;
use crate::clock::SharedClock;
use crate::Result;

/// What to do when the tracker cannot reach a decision
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailMode {
    #[default]
    Open,
    Closed,
}

/// DDoS protection configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DdosConfig {
    pub enabled: bool,
    /// Requests allowed per address inside `window_duration`
    pub max_requests: usize,
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
    pub fail_mode: FailMode,
    /// Networks that always pass
    pub trusted_networks: Vec<IpNet>,
}

impl Default for DdosConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 100,
            window_duration: Duration::from_secs(60),
            block_duration: Duration::from_secs(5 * 60),
            cleanup_interval: Duration::from_secs(60),
            fail_mode: FailMode::Open,
            trusted_networks: Vec::new(),
        }
    }
}

impl DdosConfig {
    /// Entries are kept this long so recent blocks stay visible
    pub fn retention(&self) -> Duration {
        self.block_duration.saturating_mul(2).max(self.window_duration)
    }
}

/// Why a request was denied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    /// This request pushed the address over the limit
    ThresholdExceeded { request_count: usize },
    /// The address is serving an earlier block
    ActiveBlock,
    /// The tracker failed and `FailMode::Closed` is configured
    InternalFault,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ThresholdExceeded { request_count } => {
                write!(f, "request threshold exceeded ({} requests)", request_count)
            }
            Self::ActiveBlock => f.write_str("address temporarily blocked due to suspicious activity"),
            Self::InternalFault => f.write_str("protection unavailable"),
        }
    }
}

/// Decision result from a DDoS protection check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DdosDecision {
    Allow,
    Block {
        reason: BlockReason,
        retry_after: Duration,
    },
}

impl DdosDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// DDoS protection statistics, computed on demand
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DdosStats {
    pub enabled: bool,
    pub total_ips: usize,
    pub active_requests: usize,
    pub blocked_ips: usize,
    pub max_requests: usize,
    #[serde(with = "humantime_serde")]
    pub window_duration: Duration,
    #[serde(with = "humantime_serde")]
    pub block_duration: Duration,
    pub total_requests_checked: u64,
    pub total_requests_blocked: u64,
}

#[derive(Debug)]
struct TrackerState {
    requests: SlidingWindowTracker<IpAddr>,
    /// When each currently blocked address was blocked
    blocked: HashMap<IpAddr, SystemTime>,
}

impl TrackerState {
    /// Remaining block time when `ip` is still blocked
    ///
    /// A block lasts `block_duration` from the address's most recent recorded
    /// activity; denied requests are not recorded, so that is the block marker.
    fn remaining_block(&self, ip: &IpAddr, now: SystemTime, block_duration: Duration) -> Option<Duration> {
        let blocked_at = self.blocked.get(ip)?;
        let last = self.requests.last(ip).copied().unwrap_or(*blocked_at).max(*blocked_at);
        let elapsed = now.duration_since(last).unwrap_or_default();
        block_duration.checked_sub(elapsed).filter(|d| !d.is_zero())
    }
}

/// Main DDoS protection implementation
pub struct DdosProtection {
    config: DdosConfig,
    clock: SharedClock,
    state: RwLock<TrackerState>,
    requests_checked: AtomicU64,
    requests_blocked: AtomicU64,
    shutdown_tx: broadcast::Sender<()>,
    cleanup_task: Mutex<Option<JoinHandle<()>>>,
}

impl DdosProtection {
    /// Create a new DDoS protection instance
    pub fn new(config: DdosConfig, clock: SharedClock) -> Self {
        let requests = SlidingWindowTracker::new(config.retention(), clock.clone());
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            config,
            clock,
            state: RwLock::new(TrackerState {
                requests,
                blocked: HashMap::new(),
            }),
            requests_checked: AtomicU64::new(0),
            requests_blocked: AtomicU64::new(0),
            shutdown_tx,
            cleanup_task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &DdosConfig {
        &self.config
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.config.trusted_networks.iter().any(|net| net.contains(ip))
    }

    /// Record a request from `ip` and decide whether it may proceed
    pub fn protect(&self, ip: IpAddr) -> DdosDecision {
        if !self.config.enabled || self.is_trusted(&ip) {
            return DdosDecision::Allow;
        }

        self.requests_checked.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => return self.on_internal_fault(ip, "tracker state lock poisoned"),
        };

        if let Some(remaining) = state.remaining_block(&ip, now, self.config.block_duration) {
            debug!("Request from {} blocked due to active DDoS protection", ip);
            self.requests_blocked.fetch_add(1, Ordering::Relaxed);
            return DdosDecision::Block {
                reason: BlockReason::ActiveBlock,
                retry_after: remaining,
            };
        }
        if state.blocked.remove(&ip).is_some() {
            info!("DDoS block expired for {}, allowing requests", ip);
        }

        state.requests.record(ip, now);
        let count = state.requests.count_within(&ip, self.config.window_duration);

        if count > self.config.max_requests {
            // Marker entry: the block runs from here
            state.requests.record(ip, now);
            state.blocked.insert(ip, now);
            self.requests_blocked.fetch_add(1, Ordering::Relaxed);

            warn!(
                "IP blocked due to DDoS: {} ({} requests in {:?}, blocking for {:?})",
                ip, count, self.config.window_duration, self.config.block_duration
            );

            return DdosDecision::Block {
                reason: BlockReason::ThresholdExceeded { request_count: count },
                retry_after: self.config.block_duration,
            };
        }

        DdosDecision::Allow
    }

    fn on_internal_fault(&self, ip: IpAddr, what: &str) -> DdosDecision {
        match self.config.fail_mode {
            FailMode::Open => {
                error!("DDoS protection fault ({}), allowing request from {}", what, ip);
                DdosDecision::Allow
            }
            FailMode::Closed => {
                error!("DDoS protection fault ({}), denying request from {}", what, ip);
                self.requests_blocked.fetch_add(1, Ordering::Relaxed);
                DdosDecision::Block {
                    reason: BlockReason::InternalFault,
                    retry_after: self.config.block_duration,
                }
            }
        }
    }

    /// Check if an address is currently blocked
    pub fn is_blocked(&self, ip: IpAddr) -> bool {
        let now = self.clock.now();
        self.state
            .read()
            .map(|state| state.remaining_block(&ip, now, self.config.block_duration).is_some())
            .unwrap_or(false)
    }

    /// Addresses currently serving a block
    pub fn blocked_addresses(&self) -> Vec<IpAddr> {
        let now = self.clock.now();
        match self.state.read() {
            Ok(state) => state
                .blocked
                .keys()
                .filter(|ip| state.remaining_block(ip, now, self.config.block_duration).is_some())
                .copied()
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    /// Lift a block early and forget the address's history
    pub fn unblock(&self, ip: IpAddr) -> bool {
        match self.state.write() {
            Ok(mut state) => {
                let was_blocked = state.blocked.remove(&ip).is_some();
                state.requests.clear(&ip);
                if was_blocked {
                    info!("Unblocked IP {} from DDoS protection", ip);
                }
                was_blocked
            }
            Err(_) => false,
        }
    }

    /// Drop entries older than the retention horizon and evict idle addresses
    ///
    /// Returns the number of addresses evicted.
    pub fn cleanup_expired(&self) -> usize {
        let now = self.clock.now();
        let block_duration = self.config.block_duration;

        let mut state = match self.state.write() {
            Ok(state) => state,
            Err(_) => {
                error!("DDoS cleanup skipped: tracker state lock poisoned");
                return 0;
            }
        };

        let removed = state.requests.prune_all();
        let TrackerState { requests, blocked } = &mut *state;
        blocked.retain(|ip, blocked_at| {
            let last = requests.last(ip).copied().unwrap_or(*blocked_at).max(*blocked_at);
            now.duration_since(last).unwrap_or_default() < block_duration
        });

        if removed > 0 {
            debug!("Cleaned up {} idle DDoS tracker entries", removed);
        }
        removed
    }

    /// Get DDoS protection statistics
    pub fn get_stats(&self) -> DdosStats {
        let now = self.clock.now();
        let (total_ips, active_requests, blocked_ips) = match self.state.read() {
            Ok(state) => (
                state.requests.tracked_keys(),
                state.requests.total_within(self.config.window_duration),
                state
                    .blocked
                    .keys()
                    .filter(|ip| state.remaining_block(ip, now, self.config.block_duration).is_some())
                    .count(),
            ),
            Err(_) => (0, 0, 0),
        };

        DdosStats {
            enabled: self.config.enabled,
            total_ips,
            active_requests,
            blocked_ips,
            max_requests: self.config.max_requests,
            window_duration: self.config.window_duration,
            block_duration: self.config.block_duration,
            total_requests_checked: self.requests_checked.load(Ordering::Relaxed),
            total_requests_blocked: self.requests_blocked.load(Ordering::Relaxed),
        }
    }

    /// Start the periodic cleanup loop
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let mut task = self
            .cleanup_task
            .lock()
            .map_err(|_| anyhow::anyhow!("DDoS cleanup task lock poisoned"))?;
        if task.is_some() {
            anyhow::bail!("DDoS cleanup loop already running");
        }
        if self.config.cleanup_interval.is_zero() {
            anyhow::bail!("DDoS cleanup_interval must be greater than 0");
        }

        let protection = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let period = self.config.cleanup_interval;

        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // The first tick completes immediately
            ticker.tick().await;
            info!("DDoS cleanup loop started (interval {:?})", period);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        protection.cleanup_expired();
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("DDoS cleanup loop received shutdown signal");
                        break;
                    }
                }
            }
        }));

        Ok(())
    }

    /// Stop the cleanup loop and wait for it to exit
    pub async fn stop(&self) {
        let handle = match self.cleanup_task.lock() {
            Ok(mut task) => task.take(),
            Err(_) => None,
        };

        if let Some(handle) = handle {
            let _ = self.shutdown_tx.send(());
            if let Err(e) = handle.await {
                warn!("DDoS cleanup loop ended abnormally: {}", e);
            }
            info!("DDoS cleanup loop stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.cleanup_task
            .lock()
            .map(|task| task.as_ref().map_or(false, |h| !h.is_finished()))
            .unwrap_or(false)
    }
}
