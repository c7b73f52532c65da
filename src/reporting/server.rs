//! Reporting API Server

use super::{api::ReportingApi, handlers::AppState};
use crate::security::{DdosProtection, SecurityAuditor};
use crate::Result;
use anyhow::Context;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// Reporting API server
pub struct ReportingServer {
    bind_addr: SocketAddr,
    app_state: AppState,
}

impl ReportingServer {
    pub fn new(bind_addr: SocketAddr, auditor: Arc<SecurityAuditor>, ddos: Arc<DdosProtection>) -> Self {
        Self {
            bind_addr,
            app_state: AppState::new(auditor, ddos),
        }
    }

    /// Serve until `shutdown` fires
    pub async fn start(self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let app = ReportingApi::create_router(self.app_state);

        let listener = TcpListener::bind(self.bind_addr)
            .await
            .with_context(|| format!("Failed to bind reporting API server to {}", self.bind_addr))?;

        info!("Reporting API server listening on {}", self.bind_addr);

        let served = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
            })
            .await;

        if let Err(e) = served {
            error!("Reporting API server error: {}", e);
            return Err(e.into());
        }

        info!("Reporting API server stopped");
        Ok(())
    }

    /// Create a router for testing
    pub fn create_test_router(&self) -> Router {
        ReportingApi::create_router(self.app_state.clone())
    }
}
