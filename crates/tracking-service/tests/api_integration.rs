//! Integration tests for the tracking service HTTP surface.

use std::sync::OnceLock;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::CorrelationId;
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{CartEnvelope, CartEvent};
use tower::ServiceExt;
use tracking_service::TrackingService;
use tracking_service::config::Config;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

async fn setup_with(config: Config) -> (axum::Router, TrackingService) {
    let service = TrackingService::start(&config).await.unwrap();
    let app = tracking_service::create_app(service.state(), get_metrics_handle());
    (app, service)
}

async fn setup() -> (axum::Router, TrackingService) {
    setup_with(Config::default()).await
}

async fn send(app: &axum::Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null)
    };
    (status, json)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_string(body).unwrap()))
        .unwrap()
}

fn item_added(user_name: &str) -> serde_json::Value {
    serde_json::to_value(CartEvent::item_added(user_name)).unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let (app, service) = setup().await;

    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["storage"], "open");
    assert_eq!(json["scheduler"], "Running");

    service.stop().await;
}

#[tokio::test]
async fn test_item_added_creates_active_cart() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();

    let (status, json) = send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("alice")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "transitioned");
    assert_eq!(json["state"], "Active");

    let (status, json) = send(&app, get(&format!("/carts/{id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["id"], id.to_string());
    assert_eq!(json["state"], "Active");
    assert_eq!(json["user_name"], "alice");
    assert_eq!(json["version"], 1);
    assert!(json["expiration_id"].is_string());

    service.stop().await;
}

#[tokio::test]
async fn test_order_flow_and_late_events() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();
    let order_id = uuid::Uuid::new_v4();

    send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("bob")),
    )
    .await;

    let order = serde_json::to_value(CartEvent::order_submitted(order_id)).unwrap();
    let (status, json) = send(&app, post_json(&format!("/carts/{id}/events"), &order)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "Ordered");

    // Duplicate delivery is acknowledged and ignored
    let (status, json) = send(&app, post_json(&format!("/carts/{id}/events"), &order)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["outcome"], "ignored");

    // Adding items to an ordered cart is rejected
    let (status, json) = send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("bob")),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(json["error"].as_str().unwrap().contains("ItemAdded"));

    let (_, json) = send(&app, get(&format!("/carts/{id}"))).await;
    assert_eq!(json["order_id"], order_id.to_string());

    service.stop().await;
}

#[tokio::test]
async fn test_order_without_items_is_conflict() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();

    let order = serde_json::to_value(CartEvent::order_submitted(uuid::Uuid::new_v4())).unwrap();
    let (status, _) = send(&app, post_json(&format!("/carts/{id}/events"), &order)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(&app, get(&format!("/carts/{id}"))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    service.stop().await;
}

#[tokio::test]
async fn test_bad_input_is_400() {
    let (app, service) = setup().await;

    let (status, json) = send(&app, get("/carts/not-a-uuid")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(json["error"].as_str().unwrap().contains("Invalid ID"));

    let id = CorrelationId::new();
    let (status, _) = send(
        &app,
        post_json(
            &format!("/carts/{id}/events"),
            &serde_json::json!({"type": "Unknown"}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        post_json(
            "/scheduler/schedule",
            &serde_json::json!({"token": "", "destination": "q", "payload": {}}),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    service.stop().await;
}

#[tokio::test]
async fn test_idle_cart_expires_via_scheduler_and_bus() {
    let config = Config {
        cart_expiry: Duration::from_millis(50),
        ..Config::default()
    };
    let (app, service) = setup_with(config).await;
    let id = CorrelationId::new();

    send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("carol")),
    )
    .await;

    let mut state = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, json) = send(&app, get(&format!("/carts/{id}"))).await;
        state = json["state"].clone();
        if state == "Expired" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state, "Expired");

    service.stop().await;
}

#[tokio::test]
async fn test_schedule_cancel_and_status() {
    let (app, service) = setup().await;
    let later = chrono::Utc::now() + chrono::Duration::minutes(10);

    let (status, _) = send(
        &app,
        post_json(
            "/scheduler/schedule",
            &serde_json::json!({
                "token": "reminder-1",
                "destination": "notifications",
                "payload": {"text": "hello"},
                "delivery_time": later,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (status, json) = send(&app, get("/scheduler/jobs/reminder-1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Pending");

    let (status, _) = send(
        &app,
        post_json("/scheduler/cancel", &serde_json::json!({"token": "reminder-1"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, json) = send(&app, get("/scheduler/jobs/reminder-1")).await;
    assert_eq!(json["status"], "Cancelled");

    // Unknown tokens cancel fine but have no status
    let (status, _) = send(
        &app,
        post_json("/scheduler/cancel", &serde_json::json!({"token": "unknown"})),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    let (status, _) = send(&app, get("/scheduler/jobs/unknown")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    service.stop().await;
}

#[tokio::test]
async fn test_scheduled_cart_message_is_delivered_to_the_cart() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();

    send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("dave")),
    )
    .await;

    let envelope = serde_json::to_value(CartEnvelope::new(id, CartEvent::CartExpired)).unwrap();
    let (status, _) = send(
        &app,
        post_json(
            "/scheduler/schedule",
            &serde_json::json!({
                "token": "manual-expiry",
                "destination": "cart_state",
                "payload": envelope,
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let mut state = serde_json::Value::Null;
    for _ in 0..100 {
        let (_, json) = send(&app, get(&format!("/carts/{id}"))).await;
        state = json["state"].clone();
        if state == "Expired" {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(state, "Expired");

    service.stop().await;
}

#[tokio::test]
async fn test_stopped_service_reports_unavailable() {
    let (app, service) = setup().await;
    service.stop().await;

    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["storage"], "closed");
    assert_eq!(json["scheduler"], "Stopped");

    let id = CorrelationId::new();
    let (status, _) = send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("erin")),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(
        &app,
        post_json("/scheduler/cancel", &serde_json::json!({"token": "x"})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();

    send(
        &app,
        post_json(&format!("/carts/{id}/events"), &item_added("frank")),
    )
    .await;

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("saga_events_total"));

    service.stop().await;
}

#[tokio::test]
async fn test_rejected_events_are_timed() {
    let (app, service) = setup().await;
    let id = CorrelationId::new();

    let order = serde_json::to_value(CartEvent::order_submitted(uuid::Uuid::new_v4())).unwrap();
    let (status, _) = send(&app, post_json(&format!("/carts/{id}/events"), &order)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let response = app.clone().oneshot(get("/metrics")).await.unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(
        text.lines()
            .any(|line| line.starts_with("saga_handle_duration_seconds")
                && line.contains("result=\"rejected\""))
    );

    service.stop().await;
}

#[tokio::test]
async fn test_finished_job_statuses_are_bounded() {
    let config = Config {
        scheduler_history_capacity: 2,
        ..Config::default()
    };
    let (app, service) = setup_with(config).await;

    for token in ["job-1", "job-2", "job-3"] {
        let (status, _) = send(
            &app,
            post_json(
                "/scheduler/schedule",
                &serde_json::json!({
                    "token": token,
                    "destination": "notifications",
                    "payload": {},
                }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        // Wait for each job to fire so eviction order is deterministic
        for _ in 0..100 {
            let (_, json) = send(&app, get(&format!("/scheduler/jobs/{token}"))).await;
            if json["status"] == "Fired" {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    let (status, _) = send(&app, get("/scheduler/jobs/job-1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    for token in ["job-2", "job-3"] {
        let (status, json) = send(&app, get(&format!("/scheduler/jobs/{token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["status"], "Fired");
    }

    service.stop().await;
}
