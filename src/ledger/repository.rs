use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

use super::models::{Transaction, TransactionStatus};
use super::store::TransactionStore;
use crate::error::{AppError, AppResult, TransactionError};

const TRANSACTION_COLUMNS: &str = r#"
    id, wallet_id, hash, status, metadata, attempts, last_error,
    last_attempt_at, next_attempt_at, balance_synced, balance_attempts,
    balance_error, next_balance_attempt_at, created_at, updated_at
"#;

/// Postgres-backed transaction store
pub struct PgTransactionStore {
    pub pool: PgPool,
}

impl PgTransactionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TransactionStore for PgTransactionStore {
    async fn select_pollable(&self, limit: i64) -> AppResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE status = $1
              AND hash IS NOT NULL
              AND (next_attempt_at IS NULL OR next_attempt_at <= NOW())
            ORDER BY created_at
            LIMIT $2
            "#
        ))
        .bind(TransactionStatus::Pending)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn get_transaction(&self, id: Uuid) -> AppResult<Transaction> {
        sqlx::query_as::<_, Transaction>(&format!(
            "SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Transaction {} not found", id)))
    }

    async fn update_status(
        &self,
        id: Uuid,
        status: TransactionStatus,
        hash: Option<&str>,
    ) -> AppResult<()> {
        // Pending rows move anywhere; terminal rows only accept the same status again.
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, hash = COALESCE($3, hash), updated_at = NOW()
            WHERE id = $1 AND (status = $4 OR status = $2)
            "#,
        )
        .bind(id)
        .bind(status)
        .bind(hash)
        .bind(TransactionStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            // Distinguish a missing row from a rejected transition.
            self.get_transaction(id).await?;
            return Err(TransactionError::InvalidTransition { id, to: status }.into());
        }

        debug!(transaction_id = %id, status = ?status, "status written");
        Ok(())
    }

    async fn record_failed_attempt(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE transactions
            SET attempts = attempts + 1,
                last_error = $2,
                last_attempt_at = NOW(),
                next_attempt_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = $4
            RETURNING attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .bind(TransactionStatus::Pending)
        .fetch_optional(&self.pool)
        .await?;

        attempts.ok_or_else(|| {
            AppError::NotFound(format!("Pending transaction {} not found", id))
        })
    }

    async fn mark_stuck(&self, id: Uuid, error: &str) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE transactions
            SET status = $2, last_error = $3, next_attempt_at = NULL, updated_at = NOW()
            WHERE id = $1 AND status = $4
            "#,
        )
        .bind(id)
        .bind(TransactionStatus::Stuck)
        .bind(error)
        .bind(TransactionStatus::Pending)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(TransactionError::InvalidTransition {
                id,
                to: TransactionStatus::Stuck,
            }
            .into());
        }

        Ok(())
    }

    async fn select_unsynced_confirmed(
        &self,
        limit: i64,
        max_attempts: i32,
    ) -> AppResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE status = $1
              AND balance_synced = FALSE
              AND balance_attempts < $3
              AND (next_balance_attempt_at IS NULL OR next_balance_attempt_at <= NOW())
            ORDER BY next_balance_attempt_at NULLS FIRST, created_at
            LIMIT $2
            "#
        ))
        .bind(TransactionStatus::Confirmed)
        .bind(limit)
        .bind(max_attempts)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }

    async fn record_balance_failure(
        &self,
        id: Uuid,
        error: &str,
        next_attempt_at: DateTime<Utc>,
    ) -> AppResult<i32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE transactions
            SET balance_attempts = balance_attempts + 1,
                balance_error = $2,
                next_balance_attempt_at = $3,
                updated_at = NOW()
            WHERE id = $1 AND status = $4 AND balance_synced = FALSE
            RETURNING balance_attempts
            "#,
        )
        .bind(id)
        .bind(error)
        .bind(next_attempt_at)
        .bind(TransactionStatus::Confirmed)
        .fetch_optional(&self.pool)
        .await?;

        attempts.ok_or_else(|| {
            AppError::NotFound(format!("Unsynced confirmed transaction {} not found", id))
        })
    }

    async fn mark_balance_synced(&self, id: Uuid) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE transactions
            SET balance_synced = TRUE, balance_error = NULL,
                next_balance_attempt_at = NULL, updated_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_by_status(
        &self,
        status: TransactionStatus,
        limit: i64,
    ) -> AppResult<Vec<Transaction>> {
        let transactions = sqlx::query_as::<_, Transaction>(&format!(
            r#"
            SELECT {TRANSACTION_COLUMNS}
            FROM transactions
            WHERE status = $1
            ORDER BY updated_at DESC
            LIMIT $2
            "#
        ))
        .bind(status)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(transactions)
    }
}
