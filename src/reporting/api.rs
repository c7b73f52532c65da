//! Reporting API Routes

use super::handlers::*;
use axum::{routing::get, Router};
use tower_http::cors::CorsLayer;

/// Reporting API router
pub struct ReportingApi;

impl ReportingApi {
    /// Create the reporting API router
    pub fn create_router(state: AppState) -> Router {
        let security_routes = Router::new()
            .route("/stats", get(get_stats))
            .route("/alerts", get(get_alerts))
            .route("/events", get(get_events))
            .route("/threats", get(get_threats))
            .route("/health", get(health_check))
            .route("/ddos", get(get_ddos_stats));

        Router::new()
            .nest("/api/v1/security", security_routes)
            .route("/metrics", get(prometheus_metrics))
            .fallback(not_found)
            .with_state(state)
            .layer(CorsLayer::permissive())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::security::{AnalyzerConfig, AuditorConfig, DdosConfig, DdosProtection, SecurityAuditor};
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use std::sync::Arc;
    use tower::ServiceExt;

    fn create_test_state() -> AppState {
        let clock = Arc::new(ManualClock::new());
        let auditor = SecurityAuditor::new(&AuditorConfig::default(), &AnalyzerConfig::default(), clock.clone());
        let ddos = DdosProtection::new(DdosConfig::default(), clock);
        AppState::new(Arc::new(auditor), Arc::new(ddos))
    }

    async fn status_of(uri: &str) -> StatusCode {
        let app = ReportingApi::create_router(create_test_state());
        let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
        app.oneshot(request).await.unwrap().status()
    }

    #[tokio::test]
    async fn test_every_route_answers() {
        for uri in [
            "/api/v1/security/stats",
            "/api/v1/security/alerts",
            "/api/v1/security/events?limit=5",
            "/api/v1/security/threats",
            "/api/v1/security/health",
            "/api/v1/security/ddos",
            "/metrics",
        ] {
            assert_eq!(status_of(uri).await, StatusCode::OK, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_unknown_route_and_method() {
        let app = ReportingApi::create_router(create_test_state());
        let request = Request::builder()
            .uri("/api/v1/security/config")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"], "No route for /api/v1/security/config");
        assert!(json["data"].is_null());

        let app = ReportingApi::create_router(create_test_state());
        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/security/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_bad_limit_is_rejected() {
        assert_eq!(status_of("/api/v1/security/alerts?limit=many").await, StatusCode::BAD_REQUEST);
    }
}
