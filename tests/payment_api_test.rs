//! Integration tests for the payment endpoints
//!
//! Tests cover:
//! - Donation creation and validation
//! - Donor self-report
//! - Admin approve / reject and the first-decision-wins rule
//! - Listing with status filter
//! - Error body shape

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use donation_backend::api::{router, AppState};
use donation_backend::config::PaymentTargetMode;
use donation_backend::database::InMemoryPaymentStore;
use donation_backend::health::HealthChecker;
use donation_backend::payments::target::PayeeConfig;
use donation_backend::payments::types::{
    CreateOrderRequest, CreateOrderResponse, OrderStatusReport,
};
use donation_backend::payments::{GatewayResult, OrderIdGenerator, UpiGateway};
use donation_backend::services::payment_lifecycle::{LifecyclePolicy, PaymentLifecycleService};
use donation_backend::services::reconciliation::ReconciliationService;

const ADMIN_TOKEN: &str = "test-admin-token";

struct CheckoutGateway;

#[async_trait]
impl UpiGateway for CheckoutGateway {
    async fn create_order(
        &self,
        request: CreateOrderRequest,
    ) -> GatewayResult<CreateOrderResponse> {
        Ok(CreateOrderResponse {
            gateway_order_id: Some("g-42".to_string()),
            payment_url: format!("https://pay.example/{}", request.client_txn_id),
        })
    }

    async fn check_order_status(
        &self,
        _order_id: &str,
        _txn_date: NaiveDate,
    ) -> GatewayResult<OrderStatusReport> {
        Ok(OrderStatusReport::NotFound {
            message: "Record not found".to_string(),
        })
    }

    fn name(&self) -> &'static str {
        "checkout"
    }
}

fn create_test_app_with_mode(mode: PaymentTargetMode) -> Router {
    let store = Arc::new(InMemoryPaymentStore::new());
    let lifecycle = Arc::new(
        PaymentLifecycleService::new(
            store.clone(),
            OrderIdGenerator::default(),
            LifecyclePolicy::default(),
        )
        .expect("validator regexes compile"),
    );
    let gateway = match mode {
        PaymentTargetMode::Gateway => Some(Arc::new(CheckoutGateway) as Arc<dyn UpiGateway>),
        PaymentTargetMode::UpiLink => None,
    };
    let reconciliation = Arc::new(ReconciliationService::new(
        lifecycle.clone(),
        gateway.clone(),
        Some("whsec".to_string()),
        "Donation",
    ));

    router(AppState {
        lifecycle,
        reconciliation,
        payee: Arc::new(PayeeConfig {
            vpa: "trust@upi".to_string(),
            name: "IIMT Group of Colleges".to_string(),
            ..PayeeConfig::default()
        }),
        target_mode: mode,
        admin_token: Some(Arc::from(ADMIN_TOKEN)),
        store_retry_attempts: 3,
        health: HealthChecker::new(store, gateway.is_some()),
    })
}

fn create_test_app() -> Router {
    create_test_app_with_mode(PaymentTargetMode::UpiLink)
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if body.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&body).unwrap()
    };
    (status, json)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn admin_post(uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
        .header("x-admin-actor", "treasurer");
    match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn create_donation(app: &Router) -> String {
    let (status, json) = send(
        app,
        post_json(
            "/payments",
            json!({ "amount": 500, "donorName": "Asha Rao", "donorPhone": "98765 43210" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    json["orderId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_create_returns_upi_target_and_window() {
    let app = create_test_app();

    let (status, json) = send(
        &app,
        post_json(
            "/payments",
            json!({ "amount": "500", "donorName": "Asha Rao", "donorPhone": "9876543210" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    let order_id = json["orderId"].as_str().unwrap();
    assert!(order_id.starts_with("IIMT"));
    let target = json["paymentTargetUrl"].as_str().unwrap();
    assert!(target.starts_with("upi://pay?"));
    assert!(target.contains("pa=trust%40upi"));
    assert!(target.contains("am=500"));
    assert!(target.contains(&format!("tr={}", order_id)));
    assert_eq!(json["expiresInSeconds"], 900);

    let (status, record) = send(&app, get(&format!("/payments/{}", order_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(record["status"], "CREATED");
    assert_eq!(record["donorPhone"], "9876543210");
    assert_eq!(record["expired"], false);
}

#[tokio::test]
async fn test_create_always_reports_full_window() {
    let app = create_test_app();

    for _ in 0..20 {
        let (status, json) = send(
            &app,
            post_json(
                "/payments",
                json!({ "amount": 500, "donorName": "Asha Rao", "donorPhone": "9876543210" }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["expiresInSeconds"], 900);
    }
}

#[tokio::test]
async fn test_create_in_gateway_mode_returns_gateway_url() {
    let app = create_test_app_with_mode(PaymentTargetMode::Gateway);
    let (status, json) = send(
        &app,
        post_json(
            "/payments",
            json!({ "amount": 100, "donorName": "Asha", "donorPhone": "9876543210" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(
        json["paymentTargetUrl"],
        format!("https://pay.example/{}", json["orderId"].as_str().unwrap())
    );
}

#[tokio::test]
async fn test_create_rejects_small_amount() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        post_json(
            "/payments",
            json!({ "amount": 5, "donorName": "Asha", "donorPhone": "9876543210" }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["error"], "VALIDATION_ERROR");
    assert_eq!(json["details"]["field"], "amount");
    assert!(json["timestamp"].is_string());

    let (_, list) = send(
        &app,
        Request::builder()
            .uri("/payments")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(list, json!([]), "nothing is stored for invalid input");
}

#[tokio::test]
async fn test_create_rejects_bad_phone_and_malformed_json() {
    let app = create_test_app();
    let (status, json) = send(
        &app,
        post_json(
            "/payments",
            json!({ "amount": 50, "donorName": "Asha", "donorPhone": "12345" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"]["field"], "donorPhone");

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/payments")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_order_is_404() {
    let app = create_test_app();
    let (status, json) = send(&app, get("/payments/IIMT-NOPE")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["error"], "PAYMENT_NOT_FOUND");

    let (status, _) = send(&app, post_json("/payments/IIMT-NOPE/self-report", json!({}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_self_report_moves_to_awaiting_review() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let uri = format!("/payments/{}/self-report", order_id);
    let (status, json) = send(&app, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "AWAITING_REVIEW");
    assert!(json["userConfirmedAt"].is_string());

    // Repeating it is harmless.
    let (status, again) = send(&app, post_json(&uri, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["userConfirmedAt"], json["userConfirmedAt"]);
}

#[tokio::test]
async fn test_approve_then_reject_conflicts() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;
    send(
        &app,
        post_json(&format!("/payments/{}/self-report", order_id), json!({})),
    )
    .await;

    let (status, approved) = send(
        &app,
        admin_post(&format!("/payments/{}/approve", order_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(approved["status"], "APPROVED");
    assert_eq!(approved["approvedBy"], "treasurer");

    let (status, json) = send(
        &app,
        admin_post(
            &format!("/payments/{}/reject", order_id),
            Some(json!({ "reason": "duplicate" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "INVALID_TRANSITION");

    let (_, record) = send(&app, get(&format!("/payments/{}", order_id))).await;
    assert_eq!(record["status"], "APPROVED");
    assert!(record["rejectedAt"].is_null());

    // Approving twice is idempotent.
    let (status, again) = send(
        &app,
        admin_post(&format!("/payments/{}/approve", order_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(again["approvedAt"], approved["approvedAt"]);
}

#[tokio::test]
async fn test_approve_before_self_report_is_refused() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let (status, json) = send(
        &app,
        admin_post(&format!("/payments/{}/approve", order_id), None),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["error"], "INVALID_TRANSITION");

    let (_, record) = send(&app, get(&format!("/payments/{}", order_id))).await;
    assert_eq!(record["status"], "CREATED");
}

#[tokio::test]
async fn test_reject_records_reason() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let (status, json) = send(
        &app,
        admin_post(
            &format!("/payments/{}/reject", order_id),
            Some(json!({ "reason": "no credit seen" })),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "REJECTED");
    assert_eq!(json["rejectionReason"], "no credit seen");

    let (status, _) = send(
        &app,
        post_json(&format!("/payments/{}/self-report", order_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_admin_routes_require_token() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let (status, json) = send(
        &app,
        post_json(&format!("/payments/{}/approve", order_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["error"], "ADMIN_AUTH_REQUIRED");

    let (status, _) = send(
        &app,
        Request::builder()
            .uri("/payments")
            .header(header::AUTHORIZATION, "Bearer wrong")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_list_filters_by_status() {
    let app = create_test_app();
    let first = create_donation(&app).await;
    let _second = create_donation(&app).await;
    send(
        &app,
        post_json(&format!("/payments/{}/self-report", first), json!({})),
    )
    .await;
    let (status, _) = send(
        &app,
        admin_post(&format!("/payments/{}/approve", first), None),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/payments?status=approved")
                .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-total-count"], "1");
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).unwrap();
    assert_eq!(json[0]["orderId"], first.as_str());

    let (status, json) = send(
        &app,
        Request::builder()
            .uri("/payments?status=bogus")
            .header(header::AUTHORIZATION, format!("Bearer {}", ADMIN_TOKEN))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["details"]["field"], "status");
}

#[tokio::test]
async fn test_target_lists_app_links() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let (status, json) = send(&app, get(&format!("/payments/{}/target", order_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(json["upiLink"].as_str().unwrap().starts_with("upi://pay?"));
    assert_eq!(json["appLinks"].as_array().unwrap().len(), 7);
}

#[tokio::test]
async fn test_reconcile_without_gateway_is_503() {
    let app = create_test_app();
    let order_id = create_donation(&app).await;

    let (status, json) = send(
        &app,
        post_json(&format!("/payments/{}/reconcile", order_id), json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(json["error"], "GATEWAY_ERROR");
}

#[tokio::test]
async fn test_health_endpoints() {
    let app = create_test_app();
    let (status, json) = send(&app, get("/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "Degraded");

    let (status, _) = send(&app, get("/health/live")).await;
    assert_eq!(status, StatusCode::OK);

    let response = app.clone().oneshot(get("/health/ready")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
}
