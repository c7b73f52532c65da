//! Reporting API Module
//!
//! Read-only HTTP API over the auditor's metrics, recent history and the
//! DDoS tracker.

pub mod api;
pub mod handlers;
pub mod server;
pub mod types;

pub use api::ReportingApi;
pub use handlers::AppState;
pub use server::ReportingServer;
pub use types::*;
