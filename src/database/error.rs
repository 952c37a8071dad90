use crate::payments::lifecycle::TransitionError;
use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("payment {order_id} not found")]
    NotFound { order_id: String },

    /// Insert hit an existing key; order ids are never reused.
    #[error("payment {order_id} already exists")]
    Duplicate { order_id: String },

    #[error("payment store unavailable: {message}")]
    Unavailable { message: String },

    /// Constraint or data error raised by the database itself.
    #[error("payment store rejected the write: {message}")]
    Rejected { message: String },

    /// A stored row could not be mapped back into a record.
    #[error("corrupt payment row {order_id}: {message}")]
    Corrupt { order_id: String, message: String },

    #[error(transparent)]
    Transition(#[from] TransitionError),
}

impl StoreError {
    pub fn unavailable(message: impl Into<String>) -> Self {
        StoreError::Unavailable {
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Unavailable { .. })
    }

    #[cfg(feature = "database")]
    pub fn from_sqlx(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) => {
                from_sql_state(db.code().as_deref(), db.constraint(), db.message())
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Rejected {
                message: err.to_string(),
            },
            _ => StoreError::Unavailable {
                message: err.to_string(),
            },
        }
    }
}

/// Classify a Postgres SQLSTATE. Integrity (23) and data (22) classes are the
/// caller's fault and final; anything else is treated as transient.
#[cfg_attr(not(feature = "database"), allow(dead_code))]
fn from_sql_state(code: Option<&str>, constraint: Option<&str>, message: &str) -> StoreError {
    match code {
        Some("23505") => StoreError::Duplicate {
            order_id: constraint.unwrap_or("payments_pkey").to_string(),
        },
        Some(code) if code.starts_with("23") || code.starts_with("22") => StoreError::Rejected {
            message: match constraint {
                Some(constraint) => format!("{} ({}): {}", constraint, code, message),
                None => format!("{}: {}", code, message),
            },
        },
        _ => StoreError::unavailable(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::PaymentStatus;

    #[test]
    fn only_unavailable_is_retryable() {
        assert!(StoreError::unavailable("pool timed out").is_retryable());
        assert!(!StoreError::NotFound {
            order_id: "IIMT1".to_string()
        }
        .is_retryable());
        let transition: StoreError = TransitionError::Conflict {
            order_id: "IIMT1".to_string(),
            current: PaymentStatus::Approved,
            requested: PaymentStatus::Rejected,
        }
        .into();
        assert!(!transition.is_retryable());
    }

    #[test]
    fn sql_state_classification() {
        assert!(matches!(
            from_sql_state(Some("23505"), Some("payments_pkey"), "duplicate key"),
            StoreError::Duplicate { .. }
        ));

        let check = from_sql_state(
            Some("23514"),
            Some("payments_single_outcome"),
            "violates check constraint",
        );
        assert!(matches!(check, StoreError::Rejected { .. }));
        assert!(!check.is_retryable());
        assert!(check.to_string().contains("payments_single_outcome"));

        let out_of_range = from_sql_state(Some("22003"), None, "numeric value out of range");
        assert!(!out_of_range.is_retryable());

        assert!(from_sql_state(Some("57P01"), None, "admin shutdown").is_retryable());
        assert!(from_sql_state(Some("40001"), None, "serialization failure").is_retryable());
        assert!(from_sql_state(None, None, "connection reset").is_retryable());
    }
}
