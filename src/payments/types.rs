use crate::payments::error::GatewayError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Stored lifecycle state of a donation order.
///
/// `EXPIRED` is never stored: it is derived at read time from `expires_at`
/// while the record is still `Created` (see [`PaymentRecord::is_expired_at`]).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    Created,
    AwaitingReview,
    Approved,
    Rejected,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Created => "created",
            PaymentStatus::AwaitingReview => "awaiting_review",
            PaymentStatus::Approved => "approved",
            PaymentStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Approved | PaymentStatus::Rejected)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown payment status: {0}")]
pub struct UnknownStatus(pub String);

impl FromStr for PaymentStatus {
    type Err = UnknownStatus;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "created" | "pending_payment" | "pending" => Ok(PaymentStatus::Created),
            "awaiting_review" | "pending_verification" | "pending_approval" => {
                Ok(PaymentStatus::AwaitingReview)
            }
            "approved" | "completed" | "success" => Ok(PaymentStatus::Approved),
            "rejected" | "failed" | "failure" => Ok(PaymentStatus::Rejected),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

/// Descriptive fields only the gateway can supply.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GatewayFields {
    pub gateway_payment_id: Option<String>,
    pub gateway_txn_id: Option<String>,
    pub customer_vpa: Option<String>,
    pub remark: Option<String>,
}

impl GatewayFields {
    pub fn is_empty(&self) -> bool {
        self.gateway_payment_id.is_none()
            && self.gateway_txn_id.is_none()
            && self.customer_vpa.is_none()
            && self.remark.is_none()
    }
}

/// Gateway-reported outcome after mapping the gateway's own vocabulary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayStatus {
    Success,
    Failure,
    /// Anything the gateway reports that is not a final outcome.
    Pending(String),
}

impl GatewayStatus {
    pub fn from_gateway(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "success" | "completed" => GatewayStatus::Success,
            "failed" | "failure" => GatewayStatus::Failure,
            other => GatewayStatus::Pending(other.to_string()),
        }
    }
}

/// The single persistent entity: one donation order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    pub order_id: String,
    pub amount: u64,
    pub donor_name: String,
    pub donor_phone: String,
    pub donor_email: Option<String>,
    pub status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(alias = "userMarkedPaidAt")]
    pub user_confirmed_at: Option<DateTime<Utc>>,
    pub approved_at: Option<DateTime<Utc>>,
    pub approved_by: Option<String>,
    pub rejected_at: Option<DateTime<Utc>>,
    pub rejected_by: Option<String>,
    pub rejection_reason: Option<String>,
    #[serde(flatten)]
    pub gateway: GatewayFields,
    pub gateway_reported_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    /// Build a fresh `Created` record. `expires_at` is derived here once and
    /// never recomputed.
    pub fn new(
        order_id: String,
        donation: NewDonation,
        validity: Duration,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            order_id,
            amount: donation.amount,
            donor_name: donation.donor_name,
            donor_phone: donation.donor_phone,
            donor_email: donation.donor_email,
            status: PaymentStatus::Created,
            created_at: now,
            expires_at: now + validity,
            user_confirmed_at: None,
            approved_at: None,
            approved_by: None,
            rejected_at: None,
            rejected_by: None,
            rejection_reason: None,
            gateway: GatewayFields::default(),
            gateway_reported_at: None,
            updated_at: now,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Advisory expiry: only a record still waiting for the donor can expire.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.status == PaymentStatus::Created && now > self.expires_at
    }

    pub fn expires_in_seconds(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_seconds().max(0)
    }

    /// Full payment window, as promised to the donor at creation.
    pub fn validity_seconds(&self) -> i64 {
        (self.expires_at - self.created_at).num_seconds()
    }
}

/// Validated donor input for `create`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewDonation {
    pub amount: u64,
    pub donor_name: String,
    pub donor_phone: String,
    pub donor_email: Option<String>,
}

/// What the donor gets back from `create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedPayment {
    pub order_id: String,
    pub payment_target_url: String,
    pub expires_in_seconds: i64,
}

/// Order registration sent to the UPI gateway.
#[derive(Debug, Clone, Serialize)]
pub struct CreateOrderRequest {
    pub client_txn_id: String,
    pub amount: String,
    pub p_info: String,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_mobile: String,
}

impl CreateOrderRequest {
    pub fn for_record(record: &PaymentRecord, purpose: &str) -> Self {
        Self {
            client_txn_id: record.order_id.clone(),
            amount: record.amount.to_string(),
            p_info: purpose.to_string(),
            customer_name: record.donor_name.clone(),
            customer_email: record.donor_email.clone().unwrap_or_default(),
            customer_mobile: record.donor_phone.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrderResponse {
    pub gateway_order_id: Option<String>,
    pub payment_url: String,
}

/// Result of a gateway status query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderStatusReport {
    Found {
        status: GatewayStatus,
        fields: GatewayFields,
    },
    /// The gateway does not know the order (yet).
    NotFound { message: String },
}

/// Parsed gateway webhook body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GatewayCallback {
    pub client_txn_id: Option<String>,
    pub status: Option<String>,
    pub id: Option<String>,
    pub upi_txn_id: Option<String>,
    pub customer_vpa: Option<String>,
    pub remark: Option<String>,
    pub amount: Option<String>,
    pub txn_at: Option<String>,
}

impl GatewayCallback {
    /// Decode a callback body. The gateway posts form data; JSON is accepted
    /// as well. Empty values are treated as absent.
    pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Self, GatewayError> {
        let is_json = content_type
            .map(|ct| ct.to_ascii_lowercase().contains("application/json"))
            .unwrap_or(false);

        let mut callback = if is_json {
            let raw: serde_json::Value =
                serde_json::from_slice(body).map_err(|e| GatewayError::InvalidResponse {
                    message: format!("invalid webhook JSON: {}", e),
                })?;
            Self::from_json(&raw)
        } else {
            let mut callback = Self::default();
            for (key, value) in url::form_urlencoded::parse(body) {
                let value = Some(value.into_owned());
                match key.as_ref() {
                    "client_txn_id" => callback.client_txn_id = value,
                    "status" => callback.status = value,
                    "id" => callback.id = value,
                    "upi_txn_id" | "gateway_txn_id" => callback.upi_txn_id = value,
                    "customer_vpa" => callback.customer_vpa = value,
                    "remark" => callback.remark = value,
                    "amount" => callback.amount = value,
                    "txnAt" => callback.txn_at = value,
                    _ => {}
                }
            }
            callback
        };

        callback.normalize();
        Ok(callback)
    }

    fn from_json(raw: &serde_json::Value) -> Self {
        // Numbers are legal for ids and amounts in JSON bodies.
        let field = |names: &[&str]| {
            names.iter().find_map(|name| match raw.get(*name) {
                Some(serde_json::Value::String(s)) => Some(s.clone()),
                Some(serde_json::Value::Number(n)) => Some(n.to_string()),
                _ => None,
            })
        };
        Self {
            client_txn_id: field(&["client_txn_id"]),
            status: field(&["status"]),
            id: field(&["id"]),
            upi_txn_id: field(&["upi_txn_id", "gateway_txn_id"]),
            customer_vpa: field(&["customer_vpa"]),
            remark: field(&["remark"]),
            amount: field(&["amount"]),
            txn_at: field(&["txnAt"]),
        }
    }

    fn normalize(&mut self) {
        for value in [
            &mut self.client_txn_id,
            &mut self.status,
            &mut self.id,
            &mut self.upi_txn_id,
            &mut self.customer_vpa,
            &mut self.remark,
            &mut self.amount,
            &mut self.txn_at,
        ] {
            if value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(false) {
                *value = None;
            }
        }
    }

    pub fn gateway_fields(&self) -> GatewayFields {
        GatewayFields {
            gateway_payment_id: self.id.clone(),
            gateway_txn_id: self.upi_txn_id.clone(),
            customer_vpa: self.customer_vpa.clone(),
            remark: self.remark.clone(),
        }
    }
}
