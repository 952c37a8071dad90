//! Keyed storage for payment records.
//!
//! `update` is the only write path after creation. Implementations run the
//! mutator while holding exclusive access to the key (a write lock in memory,
//! `SELECT ... FOR UPDATE` in Postgres), so a mutator that checks
//! "not yet terminal" and writes a terminal state cannot interleave with
//! another writer on the same order.

use crate::database::error::{StoreError, StoreResult};
use crate::payments::lifecycle::TransitionError;
use crate::payments::types::{PaymentRecord, PaymentStatus};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

/// Receives the current record and returns the next one, or `None` to leave
/// the stored record untouched.
pub type RecordMutator = Box<
    dyn FnOnce(&PaymentRecord) -> Result<Option<PaymentRecord>, TransitionError> + Send,
>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    /// Record as stored after the update.
    pub record: PaymentRecord,
    /// False when the mutator returned `None` and nothing was written.
    pub changed: bool,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn get(&self, order_id: &str) -> StoreResult<PaymentRecord>;

    /// Insert a new record. Fails with [`StoreError::Duplicate`] if the key exists.
    async fn put(&self, record: PaymentRecord) -> StoreResult<()>;

    async fn update(&self, order_id: &str, mutator: RecordMutator) -> StoreResult<UpdateOutcome>;

    /// All records, in no particular order.
    async fn list(&self) -> StoreResult<Vec<PaymentRecord>>;

    async fn list_by_status(&self, status: PaymentStatus) -> StoreResult<Vec<PaymentRecord>> {
        Ok(self
            .list()
            .await?
            .into_iter()
            .filter(|r| r.status == status)
            .collect())
    }

    async fn health_check(&self) -> StoreResult<()>;

    fn backend(&self) -> &'static str;
}

/// Process-local store. Contents are lost on restart.
#[derive(Default)]
pub struct InMemoryPaymentStore {
    records: RwLock<HashMap<String, PaymentRecord>>,
}

impl InMemoryPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StoreError {
    StoreError::unavailable("in-memory store lock poisoned")
}

#[async_trait]
impl PaymentStore for InMemoryPaymentStore {
    async fn get(&self, order_id: &str) -> StoreResult<PaymentRecord> {
        let records = self.records.read().map_err(poisoned)?;
        records
            .get(order_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound {
                order_id: order_id.to_string(),
            })
    }

    async fn put(&self, record: PaymentRecord) -> StoreResult<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        if records.contains_key(&record.order_id) {
            return Err(StoreError::Duplicate {
                order_id: record.order_id,
            });
        }
        records.insert(record.order_id.clone(), record);
        Ok(())
    }

    async fn update(&self, order_id: &str, mutator: RecordMutator) -> StoreResult<UpdateOutcome> {
        let mut records = self.records.write().map_err(poisoned)?;
        let current = records
            .get_mut(order_id)
            .ok_or_else(|| StoreError::NotFound {
                order_id: order_id.to_string(),
            })?;

        match mutator(current)? {
            Some(next) => {
                *current = next;
                Ok(UpdateOutcome {
                    record: current.clone(),
                    changed: true,
                })
            }
            None => Ok(UpdateOutcome {
                record: current.clone(),
                changed: false,
            }),
        }
    }

    async fn list(&self) -> StoreResult<Vec<PaymentRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.values().cloned().collect())
    }

    async fn health_check(&self) -> StoreResult<()> {
        self.records.read().map(|_| ()).map_err(poisoned)
    }

    fn backend(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::NewDonation;
    use chrono::{Duration, Utc};
    use std::sync::Arc;

    fn record(order_id: &str) -> PaymentRecord {
        PaymentRecord::new(
            order_id.to_string(),
            NewDonation {
                amount: 250,
                donor_name: "Ravi Kumar".to_string(),
                donor_phone: "9123456780".to_string(),
                donor_email: Some("ravi@example.com".to_string()),
            },
            Duration::minutes(15),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn put_then_get_returns_the_record() {
        let store = InMemoryPaymentStore::new();
        store.put(record("IIMT1")).await.unwrap();
        let fetched = store.get("IIMT1").await.unwrap();
        assert_eq!(fetched.amount, 250);
        assert_eq!(fetched.status, PaymentStatus::Created);
    }

    #[tokio::test]
    async fn put_refuses_to_reuse_an_order_id() {
        let store = InMemoryPaymentStore::new();
        store.put(record("IIMT1")).await.unwrap();
        let err = store.put(record("IIMT1")).await.unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { .. }));
    }

    #[tokio::test]
    async fn missing_keys_are_not_found() {
        let store = InMemoryPaymentStore::new();
        assert!(matches!(
            store.get("nope").await,
            Err(StoreError::NotFound { .. })
        ));
        let err = store
            .update("nope", Box::new(|r| Ok(Some(r.clone()))))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn update_none_leaves_record_untouched() {
        let store = InMemoryPaymentStore::new();
        store.put(record("IIMT1")).await.unwrap();
        let before = store.get("IIMT1").await.unwrap();

        let outcome = store.update("IIMT1", Box::new(|_| Ok(None))).await.unwrap();
        assert!(!outcome.changed);
        assert_eq!(outcome.record, before);
    }

    #[tokio::test]
    async fn update_error_is_propagated_without_writing() {
        let store = InMemoryPaymentStore::new();
        store.put(record("IIMT1")).await.unwrap();

        let err = store
            .update(
                "IIMT1",
                Box::new(|r| {
                    Err(TransitionError::NotAllowed {
                        order_id: r.order_id.clone(),
                        current: r.status,
                        event: "admin_approve",
                    })
                }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Transition(_)));
        assert_eq!(
            store.get("IIMT1").await.unwrap().status,
            PaymentStatus::Created
        );
    }

    #[tokio::test]
    async fn list_by_status_filters() {
        let store = InMemoryPaymentStore::new();
        store.put(record("IIMT1")).await.unwrap();
        store.put(record("IIMT2")).await.unwrap();
        store
            .update(
                "IIMT2",
                Box::new(|r| {
                    let mut next = r.clone();
                    next.status = PaymentStatus::AwaitingReview;
                    Ok(Some(next))
                }),
            )
            .await
            .unwrap();

        assert_eq!(store.list().await.unwrap().len(), 2);
        let queue = store
            .list_by_status(PaymentStatus::AwaitingReview)
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].order_id, "IIMT2");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_updates_are_serialized_per_key() {
        let store = Arc::new(InMemoryPaymentStore::new());
        store.put(record("IIMT1")).await.unwrap();

        // A lost update would leave the amount below 300.
        let handles: Vec<_> = (0..50)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .update(
                            "IIMT1",
                            Box::new(|r| {
                                let mut next = r.clone();
                                next.amount += 1;
                                Ok(Some(next))
                            }),
                        )
                        .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.get("IIMT1").await.unwrap().amount, 300);
    }
}
