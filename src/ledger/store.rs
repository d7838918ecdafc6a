use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::models::{Transaction, TransactionStatus};
use crate::error::AppResult;

/// Persistent home of transaction records
///
/// Every write is a single atomic operation against one record. Implementations
/// must make a write visible to later reads issued by the same process.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Up to `limit` transactions with status PENDING, a hash, and no backoff in effect
    async fn select_pollable(&self, limit: i64) -> AppResult<Vec<Transaction>>;

    async fn get_transaction(&self, id: Uuid) -> AppResult<Transaction>;

    /// Move a transaction to `status`, optionally overwriting its hash.
    ///
    /// Rewriting the current terminal status succeeds; any other transition
    /// out of a terminal status is rejected.
    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        hash: Option<&str>,
    ) -> AppResult<()>;

    /// Bump the attempt counter of a PENDING transaction and return the new count
    async fn record_failed_attempt(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32>;

    async fn mark_stuck(&self, id: Uuid, error: &str) -> AppResult<()>;

    /// CONFIRMED transactions whose wallet balance has not been refreshed yet,
    /// with fewer than `max_attempts` failed refreshes and no backoff in effect.
    /// Never-attempted rows come first, then the longest-waiting retries.
    async fn select_unsynced_confirmed(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<Transaction>>;

    /// Bump the balance attempt counter of an unsynced CONFIRMED transaction
    /// and return the new count
    async fn record_balance_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32>;

    async fn mark_balance_synced(&self, id: Uuid) -> AppResult<()>;

    async fn list_by_status(
        &self,
        status: TransactionStatus,
        limit: i64,
    ) -> AppResult<Vec<Transaction>>;
}
