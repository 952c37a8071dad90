//! Payment record state machine.
//!
//! ```text
//! CREATED ──self-report──▶ AWAITING_REVIEW ──approve──▶ APPROVED
//!    │                            │
//!    └──────────reject────────────┴──────reject──────▶ REJECTED
//!
//! CREATED | AWAITING_REVIEW ──gateway success──▶ APPROVED
//! CREATED | AWAITING_REVIEW ──gateway failure──▶ REJECTED
//! ```
//!
//! [`apply`] is pure: it takes the current record and an event and returns
//! the next record, `None` when nothing must be written, or a
//! [`TransitionError`]. Stores run it inside their atomic `update`, so the
//! terminal check and the terminal write are one compare-and-set. The first
//! terminal transition wins; later writers can only backfill empty gateway
//! descriptive fields.

use crate::payments::types::{GatewayFields, GatewayStatus, PaymentRecord, PaymentStatus};
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Actor recorded when the gateway settles a record.
pub const GATEWAY_ACTOR: &str = "gateway";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    DonorSelfReport,
    AdminApprove {
        actor: String,
    },
    AdminReject {
        actor: String,
        reason: Option<String>,
    },
    GatewayReport {
        status: GatewayStatus,
        fields: GatewayFields,
    },
}

impl LifecycleEvent {
    pub fn name(&self) -> &'static str {
        match self {
            LifecycleEvent::DonorSelfReport => "donor_self_report",
            LifecycleEvent::AdminApprove { .. } => "admin_approve",
            LifecycleEvent::AdminReject { .. } => "admin_reject",
            LifecycleEvent::GatewayReport { .. } => "gateway_report",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The record already holds the opposite terminal outcome.
    #[error("payment {order_id} is already {current}; cannot move to {requested}")]
    Conflict {
        order_id: String,
        current: PaymentStatus,
        requested: PaymentStatus,
    },

    /// The event is not legal from the current state.
    #[error("{event} is not allowed while payment {order_id} is {current}")]
    NotAllowed {
        order_id: String,
        current: PaymentStatus,
        event: &'static str,
    },

    /// Strict settlement window: the donor reported after `expires_at`.
    #[error("payment {order_id} expired at {expires_at}")]
    Expired {
        order_id: String,
        expires_at: DateTime<Utc>,
    },
}

/// Knobs that change transition guards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransitionPolicy {
    /// Refuse donor self-report on an expired `CREATED` record.
    pub enforce_expiry: bool,
}

pub fn apply(
    current: &PaymentRecord,
    event: LifecycleEvent,
    policy: TransitionPolicy,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, TransitionError> {
    match event {
        LifecycleEvent::DonorSelfReport => donor_self_report(current, policy, now),
        LifecycleEvent::AdminApprove { actor } => admin_approve(current, actor, now),
        LifecycleEvent::AdminReject { actor, reason } => admin_reject(current, actor, reason, now),
        LifecycleEvent::GatewayReport { status, fields } => {
            gateway_report(current, status, fields, now)
        }
    }
}

fn donor_self_report(
    current: &PaymentRecord,
    policy: TransitionPolicy,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, TransitionError> {
    match current.status {
        PaymentStatus::Created => {
            if policy.enforce_expiry && current.is_expired_at(now) {
                return Err(TransitionError::Expired {
                    order_id: current.order_id.clone(),
                    expires_at: current.expires_at,
                });
            }
            let mut next = current.clone();
            next.status = PaymentStatus::AwaitingReview;
            next.user_confirmed_at = Some(now);
            next.updated_at = now;
            Ok(Some(next))
        }
        // Re-reporting keeps the first confirmation time.
        PaymentStatus::AwaitingReview => {
            let mut next = current.clone();
            next.updated_at = now;
            Ok(Some(next))
        }
        PaymentStatus::Approved | PaymentStatus::Rejected => Err(TransitionError::NotAllowed {
            order_id: current.order_id.clone(),
            current: current.status,
            event: "donor_self_report",
        }),
    }
}

fn admin_approve(
    current: &PaymentRecord,
    actor: String,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, TransitionError> {
    match current.status {
        PaymentStatus::AwaitingReview => Ok(Some(settle(
            current,
            PaymentStatus::Approved,
            actor,
            None,
            now,
        ))),
        PaymentStatus::Approved => Ok(None),
        PaymentStatus::Rejected => Err(TransitionError::Conflict {
            order_id: current.order_id.clone(),
            current: current.status,
            requested: PaymentStatus::Approved,
        }),
        PaymentStatus::Created => Err(TransitionError::NotAllowed {
            order_id: current.order_id.clone(),
            current: current.status,
            event: "admin_approve",
        }),
    }
}

fn admin_reject(
    current: &PaymentRecord,
    actor: String,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, TransitionError> {
    match current.status {
        PaymentStatus::Created | PaymentStatus::AwaitingReview => Ok(Some(settle(
            current,
            PaymentStatus::Rejected,
            actor,
            reason,
            now,
        ))),
        PaymentStatus::Rejected => Ok(None),
        PaymentStatus::Approved => Err(TransitionError::Conflict {
            order_id: current.order_id.clone(),
            current: current.status,
            requested: PaymentStatus::Rejected,
        }),
    }
}

fn gateway_report(
    current: &PaymentRecord,
    status: GatewayStatus,
    fields: GatewayFields,
    now: DateTime<Utc>,
) -> Result<Option<PaymentRecord>, TransitionError> {
    let target = match status {
        GatewayStatus::Success => Some(PaymentStatus::Approved),
        GatewayStatus::Failure => Some(PaymentStatus::Rejected),
        GatewayStatus::Pending(_) => None,
    };

    let mut next = current.clone();
    let backfilled = backfill(&mut next.gateway, &fields);

    match target {
        Some(target) if !current.is_terminal() => {
            let reason = match target {
                PaymentStatus::Rejected => fields.remark.clone(),
                _ => None,
            };
            let mut settled = settle(&next, target, GATEWAY_ACTOR.to_string(), reason, now);
            settled.gateway_reported_at = Some(now);
            Ok(Some(settled))
        }
        // Terminal records and non-final reports never change status; they
        // may only fill descriptive fields that are still empty.
        _ => {
            if !backfilled {
                return Ok(None);
            }
            next.gateway_reported_at = Some(now);
            next.updated_at = now;
            Ok(Some(next))
        }
    }
}

fn settle(
    current: &PaymentRecord,
    outcome: PaymentStatus,
    actor: String,
    reason: Option<String>,
    now: DateTime<Utc>,
) -> PaymentRecord {
    let mut next = current.clone();
    next.status = outcome;
    match outcome {
        PaymentStatus::Approved => {
            next.approved_at = Some(now);
            next.approved_by = Some(actor);
        }
        PaymentStatus::Rejected => {
            next.rejected_at = Some(now);
            next.rejected_by = Some(actor);
            next.rejection_reason = reason;
        }
        PaymentStatus::Created | PaymentStatus::AwaitingReview => {}
    }
    next.updated_at = now;
    next
}

/// Copy incoming values into empty slots only. Returns whether anything changed.
fn backfill(existing: &mut GatewayFields, incoming: &GatewayFields) -> bool {
    let mut changed = false;
    for (slot, value) in [
        (&mut existing.gateway_payment_id, &incoming.gateway_payment_id),
        (&mut existing.gateway_txn_id, &incoming.gateway_txn_id),
        (&mut existing.customer_vpa, &incoming.customer_vpa),
        (&mut existing.remark, &incoming.remark),
    ] {
        if slot.is_none() {
            if let Some(value) = value.as_ref().filter(|v| !v.trim().is_empty()) {
                *slot = Some(value.clone());
                changed = true;
            }
        }
    }
    changed
}
