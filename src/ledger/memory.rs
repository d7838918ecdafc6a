use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{Transaction, TransactionStatus};
use super::store::TransactionStore;
use crate::error::{AppError, AppResult, TransactionError};

/// Writes applied to an [`InMemoryTransactionStore`], in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionWrite {
    Status { id: Uuid, status: TransactionStatus },
    FailedAttempt { id: Uuid },
    Stuck { id: Uuid },
    BalanceSynced { id: Uuid },
    BalanceFailure { id: Uuid },
}

/// Process-local transaction store used for development mode and tests
pub struct InMemoryTransactionStore {
    transactions: tokio::sync::RwLock<HashMap<Uuid, Transaction>>,
    writes: Mutex<Vec<TransactionWrite>>,
}

impl InMemoryTransactionStore {
    pub fn new() -> Self {
        Self {
            transactions: tokio::sync::RwLock::new(HashMap::new()),
            writes: Mutex::new(Vec::new()),
        }
    }

    /// Seed a record. Not part of the store contract: submission lives elsewhere.
    pub async fn insert(&self, transaction: Transaction) -> Transaction {
        let mut transactions = self.transactions.write().await;
        transactions.insert(transaction.id, transaction.clone());
        transaction
    }

    pub fn writes(&self) -> Vec<TransactionWrite> {
        self.writes.lock().clone()
    }

    fn log(&self, write: TransactionWrite) {
        self.writes.lock().push(write);
    }

    async fn select_sorted<F>(&self, limit: i64, filter: F) -> Vec<Transaction>
    where
        F: Fn(&Transaction) -> bool,
    {
        let transactions = self.transactions.read().await;
        let mut selected: Vec<Transaction> = transactions
            .values()
            .filter(|t| filter(t))
            .cloned()
            .collect();
        selected.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        selected.truncate(limit.max(0) as usize);
        selected
    }
}

impl Default for InMemoryTransactionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransactionStore for InMemoryTransactionStore {
    async fn select_pollable(&self, limit: i64) -> AppResult<Vec<Transaction>> {
        let now = Utc::now();
        Ok(self.select_sorted(limit, |t| t.is_pollable(now)).await)
    }

    async fn get_transaction(&self, id: Uuid) -> AppResult<Transaction> {
        let transactions = self.transactions.read().await;
        transactions
            .get(&id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        hash: Option<&str>,
    ) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if !transaction.status.can_transition_to(status) {
            return Err(TransactionError::InvalidTransition { id, to: status }.into());
        }

        transaction.status = status;
        if let Some(hash) = hash {
            transaction.hash = Some(hash.to_string());
        }
        transaction.updated_at = Utc::now();

        self.log(TransactionWrite::Status { id, status });
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .filter(|t| t.status == TransactionStatus::Pending)
            .ok_or_else(|| AppError::NotFound(format!("Pending transaction {} not found", id)))?;

        let now = Utc::now();
        transaction.attempts += 1;
        transaction.last_error = Some(error.to_string());
        transaction.last_attempt_at = Some(now);
        transaction.next_attempt_at = Some(next_attempt_at);
        transaction.updated_at = now;

        self.log(TransactionWrite::FailedAttempt { id });
        Ok(transaction.attempts)
    }

    async fn mark_stuck(&self, id: Uuid, error: &str) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        if transaction.status != TransactionStatus::Pending {
            return Err(TransactionError::InvalidTransition {
                id,
                to: TransactionStatus::Stuck,
            }
            .into());
        }

        transaction.status = TransactionStatus::Stuck;
        transaction.last_error = Some(error.to_string());
        transaction.next_attempt_at = None;
        transaction.updated_at = Utc::now();

        self.log(TransactionWrite::Stuck { id });
        Ok(())
    }

    async fn select_unsynced_confirmed(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<Transaction>> {
        let now = Utc::now();
        let transactions = self.transactions.read().await;
        let mut selected: Vec<Transaction> = transactions
            .values()
            .filter(|t| t.needs_balance_sync(now, max_attempts))
            .cloned()
            .collect();
        // None sorts before Some: never-attempted rows first
        selected.sort_by(|a, b| {
            (a.next_balance_attempt_at, a.created_at, a.id).cmp(&(
                b.next_balance_attempt_at,
                b.created_at,
                b.id,
            ))
        });
        selected.truncate(limit.max(0) as usize);
        Ok(selected)
    }

    async fn record_balance_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .filter(|t| t.status == TransactionStatus::Confirmed && !t.balance_synced)
            .ok_or_else(|| {
                AppError::NotFound(format!("Unsynced confirmed transaction {} not found", id))
            })?;

        transaction.balance_attempts += 1;
        transaction.balance_error = Some(error.to_string());
        transaction.next_balance_attempt_at = Some(next_attempt_at);
        transaction.updated_at = Utc::now();

        self.log(TransactionWrite::BalanceFailure { id });
        Ok(transaction.balance_attempts)
    }

    async fn mark_balance_synced(&self, id: Uuid) -> AppResult<()> {
        let mut transactions = self.transactions.write().await;
        let transaction = transactions
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))?;

        transaction.balance_synced = true;
        transaction.balance_error = None;
        transaction.next_balance_attempt_at = None;
        transaction.updated_at = Utc::now();

        self.log(TransactionWrite::BalanceSynced { id });
        Ok(())
    }

    async fn list_by_status(
        &self,
        status: TransactionStatus,
        limit: i64,
    ) -> AppResult<Vec<Transaction>> {
        Ok(self.select_sorted(limit, |t| t.status == status).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pending(hash: Option<&str>) -> Transaction {
        Transaction::new(
            Uuid::new_v4(),
            hash.map(str::to_string),
            json!({"chain": "eth"}),
        )
    }

    #[tokio::test]
    async fn test_select_pollable_skips_unhashed_and_terminal() {
        let store = InMemoryTransactionStore::new();
        let eligible = store.insert(pending(Some("0x1"))).await;
        store.insert(pending(None)).await;
        let mut done = pending(Some("0x2"));
        done.status = TransactionStatus::Confirmed;
        store.insert(done).await;

        let selected = store.select_pollable(100).await.unwrap();
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, eligible.id);
    }

    #[tokio::test]
    async fn test_select_pollable_honours_limit() {
        let store = InMemoryTransactionStore::new();
        for i in 0..5 {
            store.insert(pending(Some(&format!("0x{}", i)))).await;
        }

        assert_eq!(store.select_pollable(3).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_terminal_status_rewrite_is_idempotent_but_never_regresses() {
        let store = InMemoryTransactionStore::new();
        let tx = store.insert(pending(Some("0xabc"))).await;

        store
            .update_status(tx.id, TransactionStatus::Confirmed, Some("0xabc"))
            .await
            .unwrap();
        store
            .update_status(tx.id, TransactionStatus::Confirmed, Some("0xabc"))
            .await
            .unwrap();

        let regress = store
            .update_status(tx.id, TransactionStatus::Failed, None)
            .await;
        assert!(matches!(
            regress,
            Err(AppError::Transaction(TransactionError::InvalidTransition { .. }))
        ));
        assert_eq!(
            store.get_transaction(tx.id).await.unwrap().status,
            TransactionStatus::Confirmed
        );
    }

    #[tokio::test]
    async fn test_failed_attempt_only_applies_to_pending() {
        let store = InMemoryTransactionStore::new();
        let tx = store.insert(pending(Some("0xabc"))).await;
        let later = Utc::now() + chrono::Duration::seconds(30);

        assert_eq!(store.record_failed_attempt(tx.id, "boom", later).await.unwrap(), 1);
        assert_eq!(store.record_failed_attempt(tx.id, "boom", later).await.unwrap(), 2);

        store.mark_stuck(tx.id, "boom").await.unwrap();
        assert!(store.record_failed_attempt(tx.id, "boom", later).await.is_err());
        assert!(store.mark_stuck(tx.id, "boom").await.is_err());
    }

    #[tokio::test]
    async fn test_unsynced_selection_backs_off_and_respects_ceiling() {
        let store = InMemoryTransactionStore::new();
        let mut failing = pending(Some("0xold"));
        failing.status = TransactionStatus::Confirmed;
        let failing = store.insert(failing).await;
        let mut fresh = pending(Some("0xnew"));
        fresh.status = TransactionStatus::Confirmed;
        let fresh = store.insert(fresh).await;

        let first = store.select_unsynced_confirmed(1, 3).await.unwrap();
        assert_eq!(first[0].id, failing.id);

        // A retry due now still queues behind rows never attempted.
        store
            .record_balance_failure(failing.id, "wallet missing", Utc::now())
            .await
            .unwrap();
        let second = store.select_unsynced_confirmed(1, 3).await.unwrap();
        assert_eq!(second[0].id, fresh.id);

        // Backing off: not selected at all.
        let later = Utc::now() + chrono::Duration::seconds(60);
        store
            .record_balance_failure(failing.id, "wallet missing", later)
            .await
            .unwrap();
        let due = store.select_unsynced_confirmed(10, 3).await.unwrap();
        assert_eq!(due.iter().map(|t| t.id).collect::<Vec<_>>(), vec![fresh.id]);

        // Ceiling reached: never selected again.
        store
            .record_balance_failure(failing.id, "wallet missing", Utc::now())
            .await
            .unwrap();
        let after = store.get_transaction(failing.id).await.unwrap();
        assert_eq!(after.balance_attempts, 3);
        assert!(!after.needs_balance_sync(Utc::now(), 3));
        assert!(store
            .select_unsynced_confirmed(10, 3)
            .await
            .unwrap()
            .iter()
            .all(|t| t.id != failing.id));
    }
}
