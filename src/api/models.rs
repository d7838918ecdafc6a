use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ledger::models::{Transaction, TransactionStatus};

// ========== REQUEST MODELS ==========

#[derive(Debug, Deserialize)]
pub struct StuckQuery {
    /// Defaults to 50, capped at 500
    pub limit: Option<i64>,
}

// ========== RESPONSE MODELS ==========

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub passes_completed: u64,
}

/// Transaction as exposed to operators
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub id: Uuid,
    pub wallet_id: Uuid,
    pub hash: Option<String>,
    pub status: TransactionStatus,
    /// `metadata.chain` as submitted, even if it does not parse
    pub chain: Option<String>,
    pub attempts: i32,
    pub last_error: Option<String>,
    pub last_attempt_at: Option<DateTime<Utc>>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub balance_synced: bool,
    pub balance_attempts: i32,
    pub balance_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Transaction> for TransactionResponse {
    fn from(tx: Transaction) -> Self {
        Self {
            chain: tx
                .metadata
                .get("chain")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            id: tx.id,
            wallet_id: tx.wallet_id,
            hash: tx.hash,
            status: tx.status,
            attempts: tx.attempts,
            last_error: tx.last_error,
            last_attempt_at: tx.last_attempt_at,
            next_attempt_at: tx.next_attempt_at,
            balance_synced: tx.balance_synced,
            balance_attempts: tx.balance_attempts,
            balance_error: tx.balance_error,
            created_at: tx.created_at,
            updated_at: tx.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StuckTransactionsResponse {
    pub count: usize,
    pub transactions: Vec<TransactionResponse>,
}
