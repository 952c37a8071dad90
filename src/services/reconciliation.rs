//! Gateway reconciliation: webhook push and status pull both end in
//! [`PaymentLifecycleService::apply_gateway_status`].
//!
//! Gateway network calls are made before touching the store; the record is
//! only locked for the local update that follows a response.

use crate::database::UpdateOutcome;
use crate::payments::error::GatewayError;
use crate::payments::provider::UpiGateway;
use crate::payments::types::{
    CreateOrderRequest, CreateOrderResponse, GatewayCallback, OrderStatusReport, PaymentRecord,
    PaymentStatus,
};
use crate::payments::utils::verify_hmac_sha256_hex;
use crate::services::payment_lifecycle::{LifecycleError, PaymentLifecycleService};
use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// Header carrying the hex HMAC-SHA256 of the raw webhook body.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// The gateway keys status queries by its local (IST) calendar date.
const GATEWAY_UTC_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The report changed the record.
    Applied {
        #[serde(rename = "orderId")]
        order_id: String,
        status: PaymentStatus,
    },
    /// Duplicate or superseded report; nothing to write.
    Unchanged {
        #[serde(rename = "orderId")]
        order_id: String,
        status: PaymentStatus,
    },
    /// No such order here; acknowledged so the gateway stops retrying.
    Ignored {
        #[serde(rename = "orderId")]
        order_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum PollOutcome {
    Applied { record: PaymentRecord },
    Unchanged { record: PaymentRecord },
    /// The gateway does not know the order yet and the window is still open.
    Pending { record: PaymentRecord, message: String },
    /// The gateway never saw the order and the window has closed.
    Abandoned { record: PaymentRecord },
}

impl PollOutcome {
    pub fn record(&self) -> &PaymentRecord {
        match self {
            PollOutcome::Applied { record }
            | PollOutcome::Unchanged { record }
            | PollOutcome::Pending { record, .. }
            | PollOutcome::Abandoned { record } => record,
        }
    }
}

fn outcome_of(order_id: &str, update: UpdateOutcome) -> WebhookOutcome {
    if update.changed {
        WebhookOutcome::Applied {
            order_id: order_id.to_string(),
            status: update.record.status,
        }
    } else {
        WebhookOutcome::Unchanged {
            order_id: order_id.to_string(),
            status: update.record.status,
        }
    }
}

/// Creation date in the gateway's calendar.
pub fn gateway_txn_date(created_at: DateTime<Utc>) -> NaiveDate {
    match FixedOffset::east_opt(GATEWAY_UTC_OFFSET_SECS) {
        Some(offset) => created_at.with_timezone(&offset).date_naive(),
        None => created_at.date_naive(),
    }
}

pub struct ReconciliationService {
    lifecycle: Arc<PaymentLifecycleService>,
    gateway: Option<Arc<dyn UpiGateway>>,
    webhook_secret: Option<String>,
    purpose: String,
}

impl ReconciliationService {
    pub fn new(
        lifecycle: Arc<PaymentLifecycleService>,
        gateway: Option<Arc<dyn UpiGateway>>,
        webhook_secret: Option<String>,
        purpose: impl Into<String>,
    ) -> Self {
        Self {
            lifecycle,
            gateway,
            webhook_secret: webhook_secret.filter(|s| !s.is_empty()),
            purpose: purpose.into(),
        }
    }

    pub fn has_gateway(&self) -> bool {
        self.gateway.is_some()
    }

    fn gateway(&self) -> Result<&Arc<dyn UpiGateway>, LifecycleError> {
        self.gateway.as_ref().ok_or_else(|| {
            LifecycleError::Gateway(GatewayError::NotConfigured {
                message: "no UPI gateway API key configured".to_string(),
            })
        })
    }

    /// Unsigned callbacks are refused outright, and so is every callback
    /// when no secret is configured.
    pub fn verify_signature(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<(), LifecycleError> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| LifecycleError::Authentication {
                message: "webhook secret not configured".to_string(),
            })?;
        let signature = signature
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| LifecycleError::Authentication {
                message: format!("missing {} header", SIGNATURE_HEADER),
            })?;
        if !verify_hmac_sha256_hex(body, secret, signature) {
            return Err(LifecycleError::Authentication {
                message: "signature mismatch".to_string(),
            });
        }
        Ok(())
    }

    /// Verify, decode and apply one webhook delivery.
    pub async fn ingest_webhook(
        &self,
        content_type: Option<&str>,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookOutcome, LifecycleError> {
        if let Err(e) = self.verify_signature(body, signature) {
            warn!(error = %e, "rejected unauthenticated gateway callback");
            return Err(e);
        }

        let callback = GatewayCallback::decode(content_type, body).map_err(|e| {
            LifecycleError::validation(e.to_string(), "body")
        })?;
        let order_id = callback
            .client_txn_id
            .clone()
            .ok_or_else(|| {
                LifecycleError::validation("client_txn_id is required", "client_txn_id")
            })?;
        let raw_status = callback.status.clone().unwrap_or_default();

        info!(
            order_id = %order_id,
            gateway_status = %raw_status,
            gateway_payment_id = ?callback.id,
            amount = ?callback.amount,
            txn_at = ?callback.txn_at,
            "gateway callback received"
        );

        match self
            .lifecycle
            .apply_gateway_status(&order_id, &raw_status, callback.gateway_fields())
            .await
        {
            Ok(update) => Ok(outcome_of(&order_id, update)),
            Err(LifecycleError::NotFound { .. }) => {
                warn!(order_id = %order_id, "gateway callback for unknown order ignored");
                Ok(WebhookOutcome::Ignored { order_id })
            }
            Err(e) => Err(e),
        }
    }

    /// Ask the gateway for the order's status and apply the answer.
    pub async fn poll(&self, order_id: &str) -> Result<PollOutcome, LifecycleError> {
        let gateway = self.gateway()?;
        let record = self.lifecycle.get(order_id).await?;

        // No store lock is held across this call.
        let report = gateway
            .check_order_status(order_id, gateway_txn_date(record.created_at))
            .await?;

        match report {
            OrderStatusReport::NotFound { message } => {
                if record.is_expired_at(Utc::now()) {
                    info!(order_id, "gateway never saw order; payment window closed");
                    Ok(PollOutcome::Abandoned { record })
                } else {
                    Ok(PollOutcome::Pending { record, message })
                }
            }
            OrderStatusReport::Found { status, fields } => {
                let update = self
                    .lifecycle
                    .apply_gateway_report(order_id, status, fields)
                    .await?;
                if update.changed {
                    Ok(PollOutcome::Applied {
                        record: update.record,
                    })
                } else {
                    Ok(PollOutcome::Unchanged {
                        record: update.record,
                    })
                }
            }
        }
    }

    /// Register a freshly created record with the gateway. The record is
    /// already stored; on failure it simply stays `CREATED` and expires.
    pub async fn register_order(
        &self,
        record: &PaymentRecord,
    ) -> Result<CreateOrderResponse, LifecycleError> {
        let gateway = self.gateway()?;
        let request = CreateOrderRequest::for_record(record, &self.purpose);
        gateway.create_order(request).await.map_err(|e| {
            warn!(order_id = %record.order_id, error = %e, "gateway order registration failed");
            LifecycleError::Gateway(e)
        })
    }
}
