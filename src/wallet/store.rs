use async_trait::async_trait;
use uuid::Uuid;

use super::models::{BalanceRecord, Wallet};
use crate::error::AppResult;

/// Persistent home of wallet records
#[async_trait]
pub trait WalletStore: Send + Sync {
    async fn get_wallet(&self, wallet_id: Uuid) -> AppResult<Wallet>;

    /// Replace the whole balance record. Callers merge before writing.
    async fn update_balance(&self, wallet_id: Uuid, balance: BalanceRecord) -> AppResult<()>;
}
