//! Unified error handling for the donation backend
//!
//! Domain, store and gateway failures are folded into one [`AppError`] with an
//! HTTP status, a machine-readable code and a plain-language message.

use crate::payments::error::GatewayError;
use crate::payments::lifecycle::TransitionError;
use crate::payments::types::PaymentStatus;
use crate::services::payment_lifecycle::LifecycleError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error codes for programmatic handling by clients
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationError,
    PaymentNotFound,
    InvalidTransition,
    StoreUnavailable,
    GatewayError,
    AuthenticationFailed,
    AdminAuthRequired,
    InternalError,
}

/// Business rule failures on a payment record
#[derive(Debug, Clone)]
pub enum DomainError {
    PaymentNotFound {
        order_id: String,
    },
    /// The record already holds a different final outcome
    AlreadyDecided {
        order_id: String,
        current: PaymentStatus,
    },
    /// The action is not legal in the record's current state
    TransitionNotAllowed {
        order_id: String,
        current: PaymentStatus,
        action: String,
    },
    PaymentExpired {
        order_id: String,
    },
}

#[derive(Debug, Clone)]
pub enum InfrastructureError {
    Store { message: String, is_retryable: bool },
}

#[derive(Debug, Clone)]
pub enum ExternalError {
    Gateway(GatewayError),
}

#[derive(Debug, Clone)]
pub enum ValidationError {
    InvalidField { field: String, message: String },
    MalformedBody { message: String },
}

#[derive(Debug, Clone)]
pub enum AuthError {
    /// Webhook signature missing or wrong
    InvalidSignature { reason: String },
    /// Admin bearer token missing or wrong
    AdminRequired,
}

/// Unified application error type
#[derive(Debug, Clone)]
pub struct AppError {
    pub kind: AppErrorKind,
    pub request_id: Option<String>,
}

#[derive(Debug, Clone)]
pub enum AppErrorKind {
    Domain(DomainError),
    Infrastructure(InfrastructureError),
    External(ExternalError),
    Validation(ValidationError),
    Auth(AuthError),
}

impl AppError {
    pub fn new(kind: AppErrorKind) -> Self {
        Self {
            kind,
            request_id: None,
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::InvalidField {
            field: field.into(),
            message: message.into(),
        }))
    }

    pub fn malformed_body(message: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Validation(ValidationError::MalformedBody {
            message: message.into(),
        }))
    }

    pub fn admin_required() -> Self {
        Self::new(AppErrorKind::Auth(AuthError::AdminRequired))
    }

    pub fn invalid_signature(reason: impl Into<String>) -> Self {
        Self::new(AppErrorKind::Auth(AuthError::InvalidSignature {
            reason: reason.into(),
        }))
    }

    pub fn with_request_id(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    /// Map error to HTTP status code
    pub fn status_code(&self) -> u16 {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { .. } => 404,
                DomainError::AlreadyDecided { .. } => 409,
                DomainError::TransitionNotAllowed { .. } => 409,
                DomainError::PaymentExpired { .. } => 409,
            },
            AppErrorKind::Infrastructure(InfrastructureError::Store { is_retryable, .. }) => {
                if *is_retryable {
                    503
                } else {
                    500
                }
            }
            AppErrorKind::External(ExternalError::Gateway(err)) => match err {
                GatewayError::NotConfigured { .. } => 503,
                _ => 502,
            },
            AppErrorKind::Validation(_) => 400,
            AppErrorKind::Auth(_) => 401,
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> ErrorCode {
        match &self.kind {
            AppErrorKind::Domain(DomainError::PaymentNotFound { .. }) => ErrorCode::PaymentNotFound,
            AppErrorKind::Domain(_) => ErrorCode::InvalidTransition,
            AppErrorKind::Infrastructure(InfrastructureError::Store {
                is_retryable: true, ..
            }) => ErrorCode::StoreUnavailable,
            AppErrorKind::Infrastructure(_) => ErrorCode::InternalError,
            AppErrorKind::External(_) => ErrorCode::GatewayError,
            AppErrorKind::Validation(_) => ErrorCode::ValidationError,
            AppErrorKind::Auth(AuthError::InvalidSignature { .. }) => {
                ErrorCode::AuthenticationFailed
            }
            AppErrorKind::Auth(AuthError::AdminRequired) => ErrorCode::AdminAuthRequired,
        }
    }

    /// Get user-friendly error message
    pub fn user_message(&self) -> String {
        match &self.kind {
            AppErrorKind::Domain(err) => match err {
                DomainError::PaymentNotFound { order_id } => {
                    format!("Payment '{}' was not found", order_id)
                }
                DomainError::AlreadyDecided { current, .. } => {
                    format!("This payment has already been {}", current)
                }
                DomainError::TransitionNotAllowed {
                    current, action, ..
                } => match current {
                    PaymentStatus::Approved | PaymentStatus::Rejected => {
                        format!("This payment has already been {}", current)
                    }
                    PaymentStatus::Created => format!(
                        "Cannot {} a payment the donor has not confirmed yet",
                        action
                    ),
                    PaymentStatus::AwaitingReview => {
                        format!("Cannot {} a payment that is awaiting review", action)
                    }
                },
                DomainError::PaymentExpired { .. } => {
                    "The payment window has expired. Please start a new donation".to_string()
                }
            },
            AppErrorKind::Infrastructure(InfrastructureError::Store {
                is_retryable: true, ..
            }) => "Service temporarily unavailable. Please try again later".to_string(),
            AppErrorKind::Infrastructure(_) => {
                "The payment could not be saved. Please contact support".to_string()
            }
            AppErrorKind::External(ExternalError::Gateway(err)) => err.user_message(),
            AppErrorKind::Validation(err) => match err {
                ValidationError::InvalidField { message, .. } => message.clone(),
                ValidationError::MalformedBody { message } => {
                    format!("Request body could not be read: {}", message)
                }
            },
            AppErrorKind::Auth(err) => match err {
                AuthError::InvalidSignature { .. } => {
                    "Callback signature could not be verified".to_string()
                }
                AuthError::AdminRequired => "Administrator access is required".to_string(),
            },
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        match &self.kind {
            AppErrorKind::Infrastructure(InfrastructureError::Store { is_retryable, .. }) => {
                *is_retryable
            }
            AppErrorKind::External(ExternalError::Gateway(err)) => err.is_retryable(),
            _ => false,
        }
    }

    /// Field name for validation failures
    pub fn field(&self) -> Option<&str> {
        match &self.kind {
            AppErrorKind::Validation(ValidationError::InvalidField { field, .. }) => Some(field),
            _ => None,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.user_message())
    }
}

impl std::error::Error for AppError {}

impl From<TransitionError> for AppError {
    fn from(err: TransitionError) -> Self {
        let kind = match err {
            TransitionError::Conflict {
                order_id, current, ..
            } => DomainError::AlreadyDecided { order_id, current },
            TransitionError::NotAllowed {
                order_id,
                current,
                event,
            } => DomainError::TransitionNotAllowed {
                order_id,
                current,
                action: match event {
                    "admin_approve" => "approve",
                    "admin_reject" => "reject",
                    "donor_self_report" => "confirm",
                    other => other,
                }
                .to_string(),
            },
            TransitionError::Expired { order_id, .. } => DomainError::PaymentExpired { order_id },
        };
        AppError::new(AppErrorKind::Domain(kind))
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        AppError::new(AppErrorKind::External(ExternalError::Gateway(err)))
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Validation { message, field } => AppError::validation(
                field.unwrap_or_else(|| "request".to_string()),
                message,
            ),
            LifecycleError::NotFound { order_id } => {
                AppError::new(AppErrorKind::Domain(DomainError::PaymentNotFound { order_id }))
            }
            LifecycleError::InvalidTransition(e) => e.into(),
            LifecycleError::StoreUnavailable { message } => {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Store {
                    message,
                    is_retryable: true,
                }))
            }
            LifecycleError::StoreRejected { message } => {
                AppError::new(AppErrorKind::Infrastructure(InfrastructureError::Store {
                    message,
                    is_retryable: false,
                }))
            }
            LifecycleError::Gateway(e) => e.into(),
            LifecycleError::Authentication { message } => AppError::invalid_signature(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::StoreError;

    #[test]
    fn test_not_found_error() {
        let error: AppError = LifecycleError::NotFound {
            order_id: "IIMT404".to_string(),
        }
        .into();

        assert_eq!(error.status_code(), 404);
        assert_eq!(error.error_code(), ErrorCode::PaymentNotFound);
        assert!(error.user_message().contains("IIMT404"));
        assert!(!error.is_retryable());
    }

    #[test]
    fn test_conflict_reads_as_already_decided() {
        let error: AppError = TransitionError::Conflict {
            order_id: "IIMT1".to_string(),
            current: PaymentStatus::Approved,
            requested: PaymentStatus::Rejected,
        }
        .into();

        assert_eq!(error.status_code(), 409);
        assert_eq!(error.error_code(), ErrorCode::InvalidTransition);
        assert_eq!(error.user_message(), "This payment has already been approved");
    }

    #[test]
    fn test_approve_before_confirmation_is_409() {
        let error: AppError = TransitionError::NotAllowed {
            order_id: "IIMT1".to_string(),
            current: PaymentStatus::Created,
            event: "admin_approve",
        }
        .into();
        assert_eq!(error.status_code(), 409);
        assert!(error.user_message().contains("not confirmed"));
    }

    #[test]
    fn test_store_unavailable_is_retryable_503() {
        let error: AppError = LifecycleError::StoreUnavailable {
            message: "pool timed out".to_string(),
        }
        .into();
        assert_eq!(error.status_code(), 503);
        assert_eq!(error.error_code(), ErrorCode::StoreUnavailable);
        assert!(error.is_retryable());
        assert!(!error.user_message().contains("pool"));
    }

    #[test]
    fn test_store_rejected_write_is_final_500() {
        let error: AppError = LifecycleError::from(StoreError::Rejected {
            message: "payments_single_outcome (23514): violates check constraint".to_string(),
        })
        .into();
        assert_eq!(error.status_code(), 500);
        assert_eq!(error.error_code(), ErrorCode::InternalError);
        assert!(!error.is_retryable());
        assert!(!error.user_message().contains("23514"));
    }

    #[test]
    fn test_gateway_error_is_502_with_retry_message() {
        let error: AppError = GatewayError::NetworkError {
            message: "connection refused".to_string(),
        }
        .into();
        assert_eq!(error.status_code(), 502);
        assert_eq!(error.error_code(), ErrorCode::GatewayError);
        assert!(error.user_message().contains("try again"));
        assert!(error.is_retryable());
    }

    #[test]
    fn test_auth_errors() {
        let signature = AppError::invalid_signature("missing header");
        assert_eq!(signature.status_code(), 401);
        assert_eq!(signature.error_code(), ErrorCode::AuthenticationFailed);

        let admin = AppError::admin_required();
        assert_eq!(admin.status_code(), 401);
        assert_eq!(admin.error_code(), ErrorCode::AdminAuthRequired);
    }

    #[test]
    fn test_validation_error() {
        let error: AppError =
            LifecycleError::validation("minimum donation amount is 10", "amount").into();
        assert_eq!(error.status_code(), 400);
        assert_eq!(error.error_code(), ErrorCode::ValidationError);
        assert_eq!(error.field(), Some("amount"));
    }
}
