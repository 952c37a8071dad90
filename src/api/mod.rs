pub mod payments;
pub mod webhooks;

use crate::config::PaymentTargetMode;
use crate::error::AppError;
use crate::health::HealthChecker;
use crate::middleware::error::get_request_id_from_headers;
use crate::middleware::logging::{request_logging_middleware, UuidRequestId};
use crate::payments::target::PayeeConfig;
use crate::payments::utils::secure_eq;
use crate::services::payment_lifecycle::{LifecycleError, PaymentLifecycleService};
use crate::services::reconciliation::ReconciliationService;
use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tracing::warn;

/// Header naming the admin performing an approve/reject.
pub const ADMIN_ACTOR_HEADER: &str = "x-admin-actor";
const DEFAULT_ADMIN_ACTOR: &str = "admin";
const MAX_ACTOR_LEN: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub lifecycle: Arc<PaymentLifecycleService>,
    pub reconciliation: Arc<ReconciliationService>,
    pub payee: Arc<PayeeConfig>,
    pub target_mode: PaymentTargetMode,
    pub admin_token: Option<Arc<str>>,
    pub store_retry_attempts: u32,
    pub health: HealthChecker,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .route("/health/live", get(liveness))
        .route(
            "/payments",
            post(payments::create_payment).get(payments::list_payments),
        )
        .route("/payments/{order_id}", get(payments::get_payment))
        .route(
            "/payments/{order_id}/self-report",
            post(payments::self_report),
        )
        .route("/payments/{order_id}/approve", post(payments::approve_payment))
        .route("/payments/{order_id}/reject", post(payments::reject_payment))
        .route("/payments/{order_id}/target", get(payments::payment_target))
        .route(
            "/payments/{order_id}/reconcile",
            post(payments::reconcile_payment),
        )
        .route("/webhooks/gateway", post(webhooks::gateway_webhook))
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(UuidRequestId))
                .layer(axum::middleware::from_fn(request_logging_middleware))
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    let code = if status.is_serving() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn readiness(State(state): State<AppState>) -> impl IntoResponse {
    let status = state.health.check_health().await;
    if status.is_serving() {
        (StatusCode::OK, Json(serde_json::json!({ "status": "ready" })))
    } else {
        (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(serde_json::json!({ "status": "not_ready" })),
        )
    }
}

async fn liveness() -> impl IntoResponse {
    (StatusCode::OK, Json(serde_json::json!({ "status": "alive" })))
}

/// Attach the request id so the error body can be correlated with logs.
pub(crate) fn request_error(headers: &HeaderMap, err: impl Into<AppError>) -> AppError {
    let err = err.into();
    match get_request_id_from_headers(headers) {
        Some(id) => err.with_request_id(id),
        None => err,
    }
}

/// Check the admin bearer token and return the acting admin's name.
pub(crate) fn require_admin(state: &AppState, headers: &HeaderMap) -> Result<String, AppError> {
    let Some(expected) = state.admin_token.as_deref() else {
        warn!("admin route called but ADMIN_API_TOKEN is not configured");
        return Err(request_error(headers, AppError::admin_required()));
    };

    let presented = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .unwrap_or("");
    if !secure_eq(presented.as_bytes(), expected.as_bytes()) {
        return Err(request_error(headers, AppError::admin_required()));
    }

    let actor = headers
        .get(ADMIN_ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(|v| v.chars().take(MAX_ACTOR_LEN).collect())
        .unwrap_or_else(|| DEFAULT_ADMIN_ACTOR.to_string());
    Ok(actor)
}

/// Retry `op` while the store reports itself unavailable, up to `attempts`
/// calls in total. Every other outcome is returned as is.
pub(crate) async fn with_store_retry<T, F, Fut>(
    attempts: u32,
    mut op: F,
) -> Result<T, LifecycleError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LifecycleError>>,
{
    let mut attempt = 1;
    loop {
        match op().await {
            Err(LifecycleError::StoreUnavailable { message }) if attempt < attempts => {
                warn!(attempt, error = %message, "store unavailable, retrying");
                tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn store_retry_is_bounded() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_store_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LifecycleError::StoreUnavailable {
                message: "down".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(LifecycleError::StoreUnavailable { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn store_retry_stops_on_success_and_other_errors() {
        let calls = AtomicU32::new(0);
        let result = with_store_retry(3, || async {
            if calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LifecycleError::StoreUnavailable {
                    message: "blip".to_string(),
                })
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_store_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LifecycleError::NotFound {
                order_id: "IIMT1".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(LifecycleError::NotFound { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn store_retry_does_not_repeat_rejected_writes() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = with_store_retry(3, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(LifecycleError::StoreRejected {
                message: "payments_single_outcome (23514)".to_string(),
            })
        })
        .await;
        assert!(matches!(result, Err(LifecycleError::StoreRejected { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
