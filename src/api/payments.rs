//! Donor and admin payment endpoints.

use super::{request_error, require_admin, with_store_retry, AppState};
use crate::config::PaymentTargetMode;
use crate::error::AppError;
use crate::payments::target::{payment_target as build_target, upi_link};
use crate::payments::types::{CreatedPayment, PaymentRecord, PaymentStatus};
use crate::services::payment_lifecycle::DonationRequest;
use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::str::FromStr;
use tracing::info;

pub const TOTAL_COUNT_HEADER: &str = "x-total-count";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentBody {
    /// Whole rupees, as a JSON number or a digit string.
    #[serde(default)]
    pub amount: Option<JsonValue>,
    #[serde(default)]
    pub donor_name: Option<String>,
    #[serde(default)]
    pub donor_phone: Option<String>,
    #[serde(default)]
    pub donor_email: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RejectBody {
    #[serde(default)]
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
}

/// A stored record plus the read-time expiry view.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentView {
    #[serde(flatten)]
    pub record: PaymentRecord,
    pub expired: bool,
    pub expires_in_seconds: i64,
}

impl From<PaymentRecord> for PaymentView {
    fn from(record: PaymentRecord) -> Self {
        let now = Utc::now();
        Self {
            expired: record.is_expired_at(now),
            expires_in_seconds: record.expires_in_seconds(now),
            record,
        }
    }
}

fn parse_amount(raw: Option<&JsonValue>) -> Result<Option<u64>, AppError> {
    let invalid = || AppError::validation("amount", "Amount must be a whole number of rupees");
    match raw {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => n.as_u64().map(Some).ok_or_else(invalid),
        Some(JsonValue::String(s)) => {
            let s = s.trim();
            if s.is_empty() {
                return Ok(None);
            }
            if !s.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            s.parse::<u64>().map(Some).map_err(|_| invalid())
        }
        Some(_) => Err(invalid()),
    }
}

impl CreatePaymentBody {
    fn into_request(self) -> Result<DonationRequest, AppError> {
        Ok(DonationRequest {
            amount: parse_amount(self.amount.as_ref())?,
            donor_name: self.donor_name,
            donor_phone: self.donor_phone,
            donor_email: self.donor_email,
        })
    }
}

/// POST /payments
pub async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<CreatePaymentBody>, JsonRejection>,
) -> Result<Response, AppError> {
    let Json(body) = payload
        .map_err(|e| request_error(&headers, AppError::malformed_body(e.body_text())))?;
    let request = body.into_request().map_err(|e| request_error(&headers, e))?;

    let record = with_store_retry(state.store_retry_attempts, || {
        state.lifecycle.create(request.clone())
    })
    .await
    .map_err(|e| request_error(&headers, e))?;

    let payment_target_url = match state.target_mode {
        PaymentTargetMode::UpiLink => upi_link(&state.payee, &record),
        PaymentTargetMode::Gateway => {
            state
                .reconciliation
                .register_order(&record)
                .await
                .map_err(|e| request_error(&headers, e))?
                .payment_url
        }
    };

    info!(
        order_id = %record.order_id,
        amount = record.amount,
        mode = ?state.target_mode,
        "💸 donation order created"
    );

    let created = CreatedPayment {
        expires_in_seconds: record.validity_seconds(),
        order_id: record.order_id,
        payment_target_url,
    };
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// GET /payments/{order_id}
pub async fn get_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentView>, AppError> {
    let record = with_store_retry(state.store_retry_attempts, || state.lifecycle.get(&order_id))
        .await
        .map_err(|e| request_error(&headers, e))?;
    Ok(Json(record.into()))
}

/// GET /payments/{order_id}/target
pub async fn payment_target(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Response, AppError> {
    let record = with_store_retry(state.store_retry_attempts, || state.lifecycle.get(&order_id))
        .await
        .map_err(|e| request_error(&headers, e))?;
    Ok(Json(build_target(&state.payee, &record)).into_response())
}

/// GET /payments?status=
pub async fn list_payments(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Response, AppError> {
    require_admin(&state, &headers)?;

    let status = match query.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => Some(PaymentStatus::from_str(raw).map_err(|e| {
            request_error(&headers, AppError::validation("status", e.to_string()))
        })?),
    };

    let records = with_store_retry(state.store_retry_attempts, || state.lifecycle.list(status))
        .await
        .map_err(|e| request_error(&headers, e))?;
    let views: Vec<PaymentView> = records.into_iter().map(PaymentView::from).collect();

    Ok((
        StatusCode::OK,
        [(
            HeaderName::from_static(TOTAL_COUNT_HEADER),
            HeaderValue::from(views.len()),
        )],
        Json(views),
    )
        .into_response())
}

/// POST /payments/{order_id}/self-report
pub async fn self_report(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Response, AppError> {
    let record = with_store_retry(state.store_retry_attempts, || {
        state.lifecycle.donor_self_report(&order_id)
    })
    .await
    .map_err(|e| request_error(&headers, e))?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "orderId": record.order_id,
            "status": record.status,
            "userConfirmedAt": record.user_confirmed_at,
        })),
    )
        .into_response())
}

/// POST /payments/{order_id}/approve
pub async fn approve_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Json<PaymentView>, AppError> {
    let actor = require_admin(&state, &headers)?;
    let record = with_store_retry(state.store_retry_attempts, || {
        state.lifecycle.admin_approve(&order_id, &actor)
    })
    .await
    .map_err(|e| request_error(&headers, e))?;
    Ok(Json(record.into()))
}

/// POST /payments/{order_id}/reject
///
/// The body is optional; when present it may carry `{"reason": "..."}`.
pub async fn reject_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
    body: Bytes,
) -> Result<Json<PaymentView>, AppError> {
    let actor = require_admin(&state, &headers)?;
    let body: RejectBody = if body.iter().all(u8::is_ascii_whitespace) {
        RejectBody::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| request_error(&headers, AppError::malformed_body(e.to_string())))?
    };

    let record = with_store_retry(state.store_retry_attempts, || {
        state
            .lifecycle
            .admin_reject(&order_id, &actor, body.reason.clone())
    })
    .await
    .map_err(|e| request_error(&headers, e))?;
    Ok(Json(record.into()))
}

/// POST /payments/{order_id}/reconcile
///
/// Asks the gateway for the order's status and applies the answer.
pub async fn reconcile_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(order_id): Path<String>,
) -> Result<Response, AppError> {
    let outcome = with_store_retry(state.store_retry_attempts, || {
        state.reconciliation.poll(&order_id)
    })
    .await
    .map_err(|e| request_error(&headers, e))?;
    Ok(Json(outcome).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn amount_accepts_numbers_and_digit_strings() {
        assert_eq!(parse_amount(Some(&json!(500))).unwrap(), Some(500));
        assert_eq!(parse_amount(Some(&json!(" 250 "))).unwrap(), Some(250));
        assert_eq!(parse_amount(None).unwrap(), None);
        assert_eq!(parse_amount(Some(&json!(""))).unwrap(), None);
    }

    #[test]
    fn amount_rejects_fractions_signs_and_text() {
        for raw in [json!(10.5), json!(-20), json!("12a"), json!("1e3"), json!(true)] {
            let err = parse_amount(Some(&raw)).unwrap_err();
            assert_eq!(err.field(), Some("amount"), "{raw}");
            assert_eq!(err.status_code(), 400);
        }
    }

    #[test]
    fn payment_view_flattens_record() {
        let record = PaymentRecord::new(
            "IIMT1".to_string(),
            crate::payments::types::NewDonation {
                amount: 100,
                donor_name: "Asha".to_string(),
                donor_phone: "9876543210".to_string(),
                donor_email: None,
            },
            chrono::Duration::minutes(15),
            Utc::now(),
        );
        let json = serde_json::to_value(PaymentView::from(record)).unwrap();
        assert_eq!(json["orderId"], "IIMT1");
        assert_eq!(json["status"], "CREATED");
        assert_eq!(json["expired"], false);
        assert!(json["expiresInSeconds"].as_i64().unwrap() > 890);
    }
}
