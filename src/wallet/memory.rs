use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashMap;
use uuid::Uuid;

use super::models::{BalanceRecord, Wallet};
use super::store::WalletStore;
use crate::error::{AppError, AppResult};

/// Process-local wallet store used for development mode and tests
pub struct InMemoryWalletStore {
    wallets: tokio::sync::RwLock<HashMap<Uuid, Wallet>>,
    reads: Mutex<Vec<Uuid>>,
    balance_writes: Mutex<Vec<(Uuid, BalanceRecord)>>,
}

impl InMemoryWalletStore {
    pub fn new() -> Self {
        Self {
            wallets: tokio::sync::RwLock::new(HashMap::new()),
            reads: Mutex::new(Vec::new()),
            balance_writes: Mutex::new(Vec::new()),
        }
    }

    pub async fn insert(&self, wallet: Wallet) -> Wallet {
        let mut wallets = self.wallets.write().await;
        wallets.insert(wallet.id, wallet.clone());
        wallet
    }

    /// Wallet ids fetched so far, in order
    pub fn reads(&self) -> Vec<Uuid> {
        self.reads.lock().clone()
    }

    pub fn balance_writes(&self) -> Vec<(Uuid, BalanceRecord)> {
        self.balance_writes.lock().clone()
    }
}

impl Default for InMemoryWalletStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WalletStore for InMemoryWalletStore {
    async fn get_wallet(&self, wallet_id: Uuid) -> AppResult<Wallet> {
        self.reads.lock().push(wallet_id);
        let wallets = self.wallets.read().await;
        wallets
            .get(&wallet_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", wallet_id)))
    }

    async fn update_balance(&self, wallet_id: Uuid, balance: BalanceRecord) -> AppResult<()> {
        let mut wallets = self.wallets.write().await;
        let wallet = wallets
            .get_mut(&wallet_id)
            .ok_or_else(|| AppError::NotFound(format!("Wallet {} not found", wallet_id)))?;

        wallet.balance = balance.clone();
        wallet.updated_at = Utc::now();

        self.balance_writes.lock().push((wallet_id, balance));
        Ok(())
    }
}
