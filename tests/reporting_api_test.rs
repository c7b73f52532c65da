//! Reporting API Integration Tests

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use sentinel::{
    clock::ManualClock,
    config::Config,
    reporting::ReportingServer,
    security::{DdosProtection, RequestContext, SecurityAuditor},
};
use serde_json::Value;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

struct Harness {
    auditor: Arc<SecurityAuditor>,
    ddos: Arc<DdosProtection>,
    router: Router,
}

fn harness() -> Harness {
    let mut config = Config::default();
    config.ddos.max_requests = 1;

    let clock = Arc::new(ManualClock::new());
    let auditor = Arc::new(SecurityAuditor::new(&config.auditor, &config.analyzers, clock.clone()));
    let ddos = Arc::new(DdosProtection::new(config.ddos.clone(), clock));
    let server = ReportingServer::new(config.reporting.bind_addr, auditor.clone(), ddos.clone());
    let router = server.create_test_router();

    Harness { auditor, ddos, router }
}

async fn get_json(router: &Router, uri: &str) -> Value {
    let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn settle(auditor: &SecurityAuditor, n: u64) {
    for _ in 0..400 {
        if auditor.processed_count() >= n {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("auditor did not process {} events", n);
}

#[tokio::test]
async fn test_stats_and_events_reflect_logged_activity() {
    let h = harness();
    h.auditor.start().unwrap();

    let ctx = RequestContext::new("203.0.113.50");
    for _ in 0..5 {
        h.auditor.log_login_failure("a@example.com", "bad_password", &ctx);
    }
    settle(&h.auditor, 5).await;

    let stats = get_json(&h.router, "/api/v1/security/stats").await;
    assert_eq!(stats["success"], true);
    assert_eq!(stats["data"]["login_failures"], 5);
    assert_eq!(stats["data"]["active_threats"], 1);

    let events = get_json(&h.router, "/api/v1/security/events?limit=2").await;
    assert_eq!(events["data"].as_array().unwrap().len(), 2);
    assert_eq!(events["data"][0]["kind"], "login_failure");

    let alerts = get_json(&h.router, "/api/v1/security/alerts").await;
    assert_eq!(alerts["data"][0]["title"], "Brute Force Attack Detected");

    let threats = get_json(&h.router, "/api/v1/security/threats").await;
    assert_eq!(threats["data"]["suspicious_addresses"][0], "203.0.113.50");

    h.auditor.stop().await;
}

#[tokio::test]
async fn test_threats_and_ddos_show_blocked_addresses() {
    let h = harness();
    let ip: IpAddr = "198.51.100.23".parse().unwrap();
    h.ddos.protect(ip);
    h.ddos.protect(ip);

    let threats = get_json(&h.router, "/api/v1/security/threats").await;
    assert_eq!(threats["data"]["blocked_addresses"][0], "198.51.100.23");

    let ddos = get_json(&h.router, "/api/v1/security/ddos").await;
    assert_eq!(ddos["data"]["blocked_ips"], 1);
    assert_eq!(ddos["data"]["total_requests_blocked"], 1);
}

#[tokio::test]
async fn test_health_reports_worker_state() {
    let h = harness();

    let before = get_json(&h.router, "/api/v1/security/health").await;
    assert_eq!(before["data"]["status"], "degraded");

    h.auditor.start().unwrap();
    let running = get_json(&h.router, "/api/v1/security/health").await;
    assert_eq!(running["data"]["status"], "healthy");
    assert_eq!(running["data"]["auditor"]["analyzers_active"], 3);

    h.auditor.stop().await;
}

#[tokio::test]
async fn test_prometheus_endpoint() {
    let h = harness();
    h.auditor.start().unwrap();
    h.auditor.log_http_status(403, &RequestContext::new("192.0.2.10"));
    settle(&h.auditor, 1).await;

    let request = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/plain"));

    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("event_type=\"access_denied\""));

    h.auditor.stop().await;
}
