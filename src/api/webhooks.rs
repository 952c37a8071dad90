//! Gateway callback endpoint.
//!
//! The raw body is kept as received: the signature covers exactly those bytes.

use super::{request_error, with_store_retry, AppState};
use crate::error::AppError;
use crate::services::reconciliation::{WebhookOutcome, SIGNATURE_HEADER};
use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::info;

/// POST /webhooks/gateway
pub async fn gateway_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, AppError> {
    let content_type = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok());
    let signature = headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok());

    let outcome = with_store_retry(state.store_retry_attempts, || {
        state
            .reconciliation
            .ingest_webhook(content_type, &body, signature)
    })
    .await
    .map_err(|e| request_error(&headers, e))?;

    match &outcome {
        WebhookOutcome::Applied { order_id, status } => {
            info!(order_id = %order_id, status = %status, "✅ gateway callback applied")
        }
        WebhookOutcome::Unchanged { order_id, status } => {
            info!(order_id = %order_id, status = %status, "gateway callback already applied")
        }
        WebhookOutcome::Ignored { .. } => {}
    }

    Ok((
        StatusCode::OK,
        Json(json!({ "status": "ok", "outcome": outcome })),
    )
        .into_response())
}
