//! Payment lifecycle engine.
//!
//! Every state change goes through [`PaymentStore::update`] with a mutator
//! built from [`lifecycle::apply`], so the terminal check and the terminal
//! write happen under the store's per-key exclusivity. The engine never
//! retries; transient store failures surface as
//! [`LifecycleError::StoreUnavailable`] and the HTTP layer decides.

use crate::config::DonationConfig;
use crate::database::{PaymentStore, StoreError, UpdateOutcome};
use crate::logging::mask_phone;
use crate::payments::error::GatewayError;
use crate::payments::lifecycle::{self, LifecycleEvent, TransitionError, TransitionPolicy};
use crate::payments::order_id::OrderIdGenerator;
use crate::payments::types::{
    GatewayFields, GatewayStatus, NewDonation, PaymentRecord, PaymentStatus,
};
use chrono::{Duration, Utc};
use regex::Regex;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Error)]
pub enum LifecycleError {
    #[error("validation failed: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    #[error("payment {order_id} not found")]
    NotFound { order_id: String },

    #[error(transparent)]
    InvalidTransition(TransitionError),

    #[error("payment store unavailable: {message}")]
    StoreUnavailable { message: String },

    /// The store refused the write outright; retrying will not help.
    #[error("payment store rejected the write: {message}")]
    StoreRejected { message: String },

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("authentication failed: {message}")]
    Authentication { message: String },
}

impl LifecycleError {
    pub fn validation(message: impl Into<String>, field: &str) -> Self {
        LifecycleError::Validation {
            message: message.into(),
            field: Some(field.to_string()),
        }
    }
}

impl From<StoreError> for LifecycleError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { order_id } => LifecycleError::NotFound { order_id },
            StoreError::Transition(e) => LifecycleError::InvalidTransition(e),
            StoreError::Unavailable { message } => LifecycleError::StoreUnavailable { message },
            StoreError::Rejected { message } => LifecycleError::StoreRejected { message },
            StoreError::Duplicate { order_id } => LifecycleError::StoreUnavailable {
                message: format!("order id collision on {}", order_id),
            },
            StoreError::Corrupt { order_id, message } => LifecycleError::StoreUnavailable {
                message: format!("unreadable record {}: {}", order_id, message),
            },
        }
    }
}

/// Donor input as received, before validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DonationRequest {
    pub amount: Option<u64>,
    pub donor_name: Option<String>,
    pub donor_phone: Option<String>,
    pub donor_email: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LifecyclePolicy {
    pub min_amount: u64,
    pub validity: Duration,
    pub require_ten_digit_phone: bool,
    pub enforce_expiry: bool,
}

impl Default for LifecyclePolicy {
    fn default() -> Self {
        Self::from(&DonationConfig::default())
    }
}

impl From<&DonationConfig> for LifecyclePolicy {
    fn from(config: &DonationConfig) -> Self {
        Self {
            min_amount: config.min_amount,
            validity: Duration::minutes(config.validity_minutes),
            require_ten_digit_phone: config.require_ten_digit_phone,
            enforce_expiry: config.enforce_expiry,
        }
    }
}

impl LifecyclePolicy {
    fn transitions(&self) -> TransitionPolicy {
        TransitionPolicy {
            enforce_expiry: self.enforce_expiry,
        }
    }
}

struct DonationValidator {
    ten_digit_phone: Regex,
    loose_phone: Regex,
    email: Regex,
}

impl DonationValidator {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            ten_digit_phone: Regex::new(r"^[0-9]{10}$")?,
            loose_phone: Regex::new(r"^\+?[0-9]{7,15}$")?,
            email: Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$")?,
        })
    }

    fn validate(
        &self,
        request: DonationRequest,
        policy: &LifecyclePolicy,
    ) -> Result<NewDonation, LifecycleError> {
        let amount = request
            .amount
            .ok_or_else(|| LifecycleError::validation("amount is required", "amount"))?;
        if amount < policy.min_amount {
            return Err(LifecycleError::validation(
                format!("minimum donation amount is {}", policy.min_amount),
                "amount",
            ));
        }

        let donor_name = request
            .donor_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or_else(|| LifecycleError::validation("donor name is required", "donorName"))?;

        let donor_phone: String = request
            .donor_phone
            .unwrap_or_default()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '-')
            .collect();
        if donor_phone.is_empty() {
            return Err(LifecycleError::validation(
                "donor phone is required",
                "donorPhone",
            ));
        }
        let phone_ok = if policy.require_ten_digit_phone {
            self.ten_digit_phone.is_match(&donor_phone)
        } else {
            self.loose_phone.is_match(&donor_phone)
        };
        if !phone_ok {
            return Err(LifecycleError::validation(
                if policy.require_ten_digit_phone {
                    "phone number must be exactly 10 digits"
                } else {
                    "phone number is not valid"
                },
                "donorPhone",
            ));
        }

        let donor_email = request
            .donor_email
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if let Some(email) = &donor_email {
            if !self.email.is_match(email) {
                return Err(LifecycleError::validation(
                    "email address is not valid",
                    "donorEmail",
                ));
            }
        }

        Ok(NewDonation {
            amount,
            donor_name,
            donor_phone,
            donor_email,
        })
    }
}

pub struct PaymentLifecycleService {
    store: Arc<dyn PaymentStore>,
    ids: OrderIdGenerator,
    policy: LifecyclePolicy,
    validator: DonationValidator,
}

impl PaymentLifecycleService {
    pub fn new(
        store: Arc<dyn PaymentStore>,
        ids: OrderIdGenerator,
        policy: LifecyclePolicy,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            store,
            ids,
            policy,
            validator: DonationValidator::new()?,
        })
    }

    pub fn store(&self) -> &Arc<dyn PaymentStore> {
        &self.store
    }

    pub fn policy(&self) -> &LifecyclePolicy {
        &self.policy
    }

    pub fn validate(&self, request: DonationRequest) -> Result<NewDonation, LifecycleError> {
        self.validator.validate(request, &self.policy)
    }

    /// Validate and persist a new `CREATED` record under a fresh order id.
    pub async fn create(&self, request: DonationRequest) -> Result<PaymentRecord, LifecycleError> {
        let donation = self.validate(request)?;

        // A colliding id is regenerated once; a second collision means the
        // generator is broken and is reported rather than looped on.
        let mut attempt = 0;
        loop {
            let record = PaymentRecord::new(
                self.ids.next(),
                donation.clone(),
                self.policy.validity,
                Utc::now(),
            );
            match self.store.put(record.clone()).await {
                Ok(()) => {
                    info!(
                        order_id = %record.order_id,
                        amount = record.amount,
                        donor_phone = %mask_phone(&record.donor_phone),
                        expires_at = %record.expires_at,
                        "payment record created"
                    );
                    return Ok(record);
                }
                Err(StoreError::Duplicate { order_id }) if attempt == 0 => {
                    warn!(order_id = %order_id, "order id collision, regenerating");
                    attempt += 1;
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    pub async fn get(&self, order_id: &str) -> Result<PaymentRecord, LifecycleError> {
        Ok(self.store.get(order_id).await?)
    }

    /// Records newest first, optionally restricted to one status.
    pub async fn list(
        &self,
        status: Option<PaymentStatus>,
    ) -> Result<Vec<PaymentRecord>, LifecycleError> {
        let mut records = match status {
            Some(status) => self.store.list_by_status(status).await?,
            None => self.store.list().await?,
        };
        records.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.order_id.cmp(&a.order_id))
        });
        Ok(records)
    }

    pub async fn donor_self_report(&self, order_id: &str) -> Result<PaymentRecord, LifecycleError> {
        let outcome = self
            .transition(order_id, LifecycleEvent::DonorSelfReport)
            .await?;
        Ok(outcome.record)
    }

    pub async fn admin_approve(
        &self,
        order_id: &str,
        actor: &str,
    ) -> Result<PaymentRecord, LifecycleError> {
        let outcome = self
            .transition(
                order_id,
                LifecycleEvent::AdminApprove {
                    actor: actor.to_string(),
                },
            )
            .await?;
        Ok(outcome.record)
    }

    pub async fn admin_reject(
        &self,
        order_id: &str,
        actor: &str,
        reason: Option<String>,
    ) -> Result<PaymentRecord, LifecycleError> {
        let outcome = self
            .transition(
                order_id,
                LifecycleEvent::AdminReject {
                    actor: actor.to_string(),
                    reason: reason.filter(|r| !r.trim().is_empty()),
                },
            )
            .await?;
        Ok(outcome.record)
    }

    /// Map a gateway-reported status onto the record. Safe to call any number
    /// of times with the same or conflicting reports.
    pub async fn apply_gateway_status(
        &self,
        order_id: &str,
        raw_status: &str,
        fields: GatewayFields,
    ) -> Result<UpdateOutcome, LifecycleError> {
        self.apply_gateway_report(order_id, GatewayStatus::from_gateway(raw_status), fields)
            .await
    }

    pub async fn apply_gateway_report(
        &self,
        order_id: &str,
        status: GatewayStatus,
        fields: GatewayFields,
    ) -> Result<UpdateOutcome, LifecycleError> {
        if let GatewayStatus::Pending(ref s) = status {
            debug!(order_id, gateway_status = %s, "gateway reports non-final status");
        }
        self.transition(order_id, LifecycleEvent::GatewayReport { status, fields })
            .await
    }

    async fn transition(
        &self,
        order_id: &str,
        event: LifecycleEvent,
    ) -> Result<UpdateOutcome, LifecycleError> {
        let event_name = event.name();
        let policy = self.policy.transitions();
        let result = self
            .store
            .update(
                order_id,
                Box::new(move |current| lifecycle::apply(current, event, policy, Utc::now())),
            )
            .await;

        match result {
            Ok(outcome) => {
                if outcome.changed {
                    info!(
                        order_id,
                        event = event_name,
                        status = %outcome.record.status,
                        "payment transitioned"
                    );
                } else {
                    debug!(order_id, event = event_name, "transition was a no-op");
                }
                Ok(outcome)
            }
            Err(StoreError::Transition(e)) => {
                warn!(order_id, event = event_name, error = %e, "transition refused");
                Err(LifecycleError::InvalidTransition(e))
            }
            Err(e) => Err(e.into()),
        }
    }
}
