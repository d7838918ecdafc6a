use rust_decimal::Decimal;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use crate::chain::BalanceFetcher;
use crate::error::AppResult;
use crate::ledger::TransactionStore;
use crate::wallet::WalletStore;

/// Refreshes the native balance of the wallet behind a confirmed transaction
pub struct BalanceReconciler {
    transactions: Arc<dyn TransactionStore>,
    wallets: Arc<dyn WalletStore>,
    fetcher: Arc<dyn BalanceFetcher>,
}

impl BalanceReconciler {
    pub fn new(
        transactions: Arc<dyn TransactionStore>,
        wallets: Arc<dyn WalletStore>,
        fetcher: Arc<dyn BalanceFetcher>,
    ) -> Self {
        Self {
            transactions,
            wallets,
            fetcher,
        }
    }

    /// Write the chain's current native balance into the owning wallet and
    /// flag the transaction as synced. Returns the amount written.
    ///
    /// The wallet id is read from a fresh copy of the transaction, never from
    /// the record the caller selected earlier.
    #[instrument(skip(self))]
    pub async fn sync_for_transaction(&self, transaction_id: Uuid) -> AppResult<Decimal> {
        let transaction = self.transactions.get_transaction(transaction_id).await?;
        let wallet = self.wallets.get_wallet(transaction.wallet_id).await?;

        let native = self
            .fetcher
            .get_native_balance(wallet.chain, &wallet.address)
            .await?;

        self.wallets
            .update_balance(wallet.id, wallet.balance.with_native(native))
            .await?;
        self.transactions.mark_balance_synced(transaction_id).await?;

        info!(
            wallet_id = %wallet.id,
            chain = %wallet.chain,
            native = %native,
            symbol = wallet.chain.native_symbol(),
            "💰 Wallet native balance refreshed"
        );

        Ok(native)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{AppError, ResolverError};
    use crate::ledger::models::{Chain, Transaction};
    use crate::ledger::InMemoryTransactionStore;
    use crate::wallet::models::{BalanceRecord, Wallet};
    use crate::wallet::InMemoryWalletStore;
    use async_trait::async_trait;
    use rust_decimal_macros::dec;
    use serde_json::json;

    struct FixedBalance(Option<Decimal>);

    #[async_trait]
    impl BalanceFetcher for FixedBalance {
        async fn get_native_balance(&self, chain: Chain, _address: &str) -> AppResult<Decimal> {
            self.0.ok_or_else(|| {
                ResolverError::Transport {
                    chain,
                    message: "connection refused".into(),
                }
                .into()
            })
        }
    }

    #[tokio::test]
    async fn test_sync_replaces_native_only_and_marks_synced() {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let wallets = Arc::new(InMemoryWalletStore::new());
        let wallet = wallets
            .insert(
                Wallet::new(Chain::Ethereum, "0xowner".into())
                    .with_balance(BalanceRecord::new(dec!(1)).with_asset("USDC", dec!(40))),
            )
            .await;
        let tx = transactions
            .insert(Transaction::new(wallet.id, Some("0xabc".into()), json!({"chain": "eth"})))
            .await;

        let reconciler = BalanceReconciler::new(
            transactions.clone(),
            wallets.clone(),
            Arc::new(FixedBalance(Some(dec!(0.75)))),
        );

        assert_eq!(reconciler.sync_for_transaction(tx.id).await.unwrap(), dec!(0.75));

        let stored = wallets.get_wallet(wallet.id).await.unwrap();
        assert_eq!(stored.balance.native(), dec!(0.75));
        assert_eq!(stored.balance.get("USDC"), Some(dec!(40)));
        assert!(transactions.get_transaction(tx.id).await.unwrap().balance_synced);
    }

    #[tokio::test]
    async fn test_fetch_failure_leaves_wallet_and_flag_untouched() {
        let transactions = Arc::new(InMemoryTransactionStore::new());
        let wallets = Arc::new(InMemoryWalletStore::new());
        let wallet = wallets
            .insert(Wallet::new(Chain::Near, "alice.near".into()))
            .await;
        let tx = transactions
            .insert(Transaction::new(wallet.id, Some("abc".into()), json!({"chain": "near"})))
            .await;

        let reconciler = BalanceReconciler::new(
            transactions.clone(),
            wallets.clone(),
            Arc::new(FixedBalance(None)),
        );

        let result = reconciler.sync_for_transaction(tx.id).await;
        assert!(matches!(result, Err(AppError::Resolver(_))));
        assert!(wallets.balance_writes().is_empty());
        assert!(!transactions.get_transaction(tx.id).await.unwrap().balance_synced);
    }
}
