pub mod payment_lifecycle;
pub mod reconciliation;
