//! Graceful Shutdown Handling
//!
//! Listens for SIGTERM/SIGINT, broadcasts the shutdown signal and stops the
//! auditor worker and the DDoS cleanup loop within a bounded time.

use crate::security::{DdosProtection, SecurityAuditor};
use crate::Result;
use std::time::{Duration, Instant};
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Shutdown coordinator that manages graceful shutdown process
pub struct ShutdownCoordinator {
    /// Broadcast sender for shutdown signal
    shutdown_tx: broadcast::Sender<()>,
    /// Upper bound for stopping background components
    timeout: Duration,
}

impl ShutdownCoordinator {
    pub fn new(timeout: Duration) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self { shutdown_tx, timeout }
    }

    /// Get a shutdown receiver for components to listen for shutdown signals
    pub fn subscribe(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Broadcast the shutdown signal
    pub fn trigger(&self) {
        if self.shutdown_tx.send(()).is_err() {
            warn!("Shutdown signal sent with no listeners");
        }
    }

    /// Wait for SIGTERM, SIGINT or Ctrl+C, then broadcast
    pub async fn listen_for_signals(&self) -> Result<()> {
        info!("Starting shutdown signal listener");

        #[cfg(unix)]
        {
            let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
            let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())?;

            tokio::select! {
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, initiating graceful shutdown");
                }
                _ = sigint.recv() => {
                    info!("Received SIGINT, initiating graceful shutdown");
                }
                _ = signal::ctrl_c() => {
                    info!("Received Ctrl+C, initiating graceful shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            signal::ctrl_c().await?;
            info!("Received Ctrl+C, initiating graceful shutdown");
        }

        self.trigger();
        Ok(())
    }

    /// Stop the auditor worker and DDoS cleanup loop
    ///
    /// Errors if both do not finish within the coordinator's timeout.
    pub async fn shutdown_components(&self, auditor: &SecurityAuditor, ddos: &DdosProtection) -> Result<()> {
        let start_time = Instant::now();
        info!("Stopping security components (timeout: {:?})", self.timeout);

        let stopped = tokio::time::timeout(self.timeout, async {
            ddos.stop().await;
            auditor.stop().await;
        })
        .await;

        match stopped {
            Ok(()) => {
                info!("Security components stopped in {:?}", start_time.elapsed());
                Ok(())
            }
            Err(_) => {
                warn!("Shutdown timeout reached after {:?}", start_time.elapsed());
                Err(anyhow::anyhow!("Shutdown did not complete within {:?}", self.timeout))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::security::{AnalyzerConfig, AuditorConfig, DdosConfig};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_shutdown_signal_broadcast() {
        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        let mut first = coordinator.subscribe();
        let mut second = coordinator.subscribe();

        coordinator.trigger();

        assert!(first.recv().await.is_ok());
        assert!(second.recv().await.is_ok());
    }

    #[tokio::test]
    async fn test_trigger_without_listeners_does_not_panic() {
        ShutdownCoordinator::new(Duration::from_secs(1)).trigger();
    }

    #[tokio::test]
    async fn test_shutdown_components_stops_background_work() {
        let clock = SystemClock::shared();
        let auditor = SecurityAuditor::new(&AuditorConfig::default(), &AnalyzerConfig::default(), clock.clone());
        let ddos = Arc::new(DdosProtection::new(DdosConfig::default(), clock));
        auditor.start().unwrap();
        ddos.start().unwrap();

        let coordinator = ShutdownCoordinator::new(Duration::from_secs(5));
        coordinator.shutdown_components(&auditor, &ddos).await.unwrap();

        assert!(!auditor.is_running());
        assert!(!ddos.is_running());
    }
}
