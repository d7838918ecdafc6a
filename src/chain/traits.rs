use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::ledger::models::{Chain, TransactionStatus};

/// On-chain outcome of a submitted transaction, as reported right now
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Pending,
    Confirmed,
    Failed,
}

impl ReceiptStatus {
    /// Status to persist, or `None` while the chain has not decided yet
    pub fn terminal_status(&self) -> Option<TransactionStatus> {
        match self {
            ReceiptStatus::Pending => None,
            ReceiptStatus::Confirmed => Some(TransactionStatus::Confirmed),
            ReceiptStatus::Failed => Some(TransactionStatus::Failed),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub chain: Chain,
    pub hash: String,
    pub status: ReceiptStatus,
    pub block_number: Option<u64>,
}

/// Resolves a transaction hash to its receipt
///
/// A transaction the chain has not settled yet is `Ok` with
/// [`ReceiptStatus::Pending`]; errors are reserved for failed lookups.
#[async_trait]
pub trait ReceiptResolver: Send + Sync {
    async fn get_receipt(&self, chain: Chain, hash: &str) -> AppResult<Receipt>;
}

/// Reads the native balance of an address
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
    async fn get_native_balance(&self, chain: Chain, address: &str) -> AppResult<Decimal>;
}
