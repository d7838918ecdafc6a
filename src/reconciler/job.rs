// Reconciliation pass over transactions whose on-chain outcome is still unknown
//
// Pass flow:
// 1. Take the job lease (skip the pass if another runner holds it)
// 2. Select up to `batch_limit` pending transactions that have a hash
// 3. Resolve each receipt independently; terminal receipts are written back
// 4. Confirmed transactions get their wallet's native balance refreshed
// 5. Renew the lease after every transaction; stop early if it was lost
// 6. Release the lease
//
// Balance refreshes that failed in step 4 are retried by `run_balance_sweep`,
// which runs on its own schedule so a pass with nothing selected writes nothing.

use chrono::Utc;
use futures::{stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::backoff::RetryPolicy;
use super::balance::BalanceReconciler;
use super::lease::JobLease;
use super::metrics::SharedReconcilerMetrics;
use crate::chain::{BalanceFetcher, ReceiptResolver};
use crate::error::{AppError, AppResult, TransactionError};
use crate::ledger::models::{Transaction, TransactionStatus};
use crate::ledger::TransactionStore;
use crate::wallet::WalletStore;

#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Lease key; every runner sharing a store must use the same name
    pub job_name: String,
    pub batch_limit: i64,
    /// Transactions resolved at once within a pass. 1 keeps selection order.
    pub concurrency: usize,
    /// Renewed after each transaction, so it only has to outlive one resolution
    pub lease_ttl: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            job_name: "transaction-reconciler".to_string(),
            batch_limit: 100,
            concurrency: 1,
            lease_ttl: Duration::from_secs(300),
        }
    }
}

/// Summary of one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassReport {
    /// Another runner held the lease
    pub skipped: bool,
    /// Lease or selection failed; nothing was touched
    pub aborted: bool,
    /// Another runner took the lease mid-pass; remaining work was left alone
    pub lease_lost: bool,
    pub selected: usize,
    pub still_pending: usize,
    pub confirmed: usize,
    pub failed: usize,
    /// Resolution failed; transaction stays pending and backs off
    pub errored: usize,
    /// Resolution failed for the last allowed time; transaction parked
    pub stuck: usize,
    pub balances_synced: usize,
}

impl PassReport {
    fn tally(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::StillPending => self.still_pending += 1,
            Outcome::Confirmed { balance_synced } => {
                self.confirmed += 1;
                if balance_synced {
                    self.balances_synced += 1;
                }
            }
            Outcome::Failed => self.failed += 1,
            Outcome::Errored => self.errored += 1,
            Outcome::Stuck => self.stuck += 1,
        }
    }
}

/// Summary of one balance sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub skipped: bool,
    pub aborted: bool,
    pub lease_lost: bool,
    pub selected: usize,
    pub synced: usize,
    /// Refresh failed again; retried after backoff
    pub failed: usize,
    /// Refresh failed for the last allowed time; no longer swept
    pub abandoned: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    StillPending,
    Confirmed { balance_synced: bool },
    Failed,
    Errored,
    Stuck,
}

enum LeaseClaim {
    Granted(Uuid),
    Held,
    Unavailable,
}

pub struct ReconciliationJob {
    config: JobConfig,
    transactions: Arc<dyn TransactionStore>,
    resolver: Arc<dyn ReceiptResolver>,
    balances: BalanceReconciler,
    lease: Arc<dyn JobLease>,
    retry: RetryPolicy,
    metrics: Arc<SharedReconcilerMetrics>,
}

impl ReconciliationJob {
    pub fn new(
        config: JobConfig,
        transactions: Arc<dyn TransactionStore>,
        wallets: Arc<dyn WalletStore>,
        resolver: Arc<dyn ReceiptResolver>,
        fetcher: Arc<dyn BalanceFetcher>,
        lease: Arc<dyn JobLease>,
    ) -> Self {
        Self {
            config,
            balances: BalanceReconciler::new(transactions.clone(), wallets, fetcher),
            transactions,
            resolver,
            lease,
            retry: RetryPolicy::default(),
            metrics: Arc::new(SharedReconcilerMetrics::new()),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SharedReconcilerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn metrics(&self) -> Arc<SharedReconcilerMetrics> {
        self.metrics.clone()
    }

    // ========== LEASE ==========

    async fn claim_lease(&self) -> LeaseClaim {
        let holder = Uuid::new_v4();
        let job_name = self.config.job_name.as_str();

        match self
            .lease
            .try_acquire(job_name, holder, self.config.lease_ttl)
            .await
        {
            Ok(true) => LeaseClaim::Granted(holder),
            Ok(false) => {
                debug!(job = %job_name, "Another runner holds the job lease, skipping");
                LeaseClaim::Held
            }
            Err(e) => {
                error!(job = %job_name, error = %e, "❌ Could not acquire job lease, aborting");
                LeaseClaim::Unavailable
            }
        }
    }

    /// Push the lease expiry out by another TTL. False once someone else owns it.
    async fn renew_lease(&self, holder: Uuid) -> bool {
        let job_name = self.config.job_name.as_str();

        match self
            .lease
            .try_acquire(job_name, holder, self.config.lease_ttl)
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                error!(job = %job_name, "❌ Job lease lost to another runner, stopping early");
                false
            }
            Err(e) => {
                // The current lease is still valid until it expires
                warn!(job = %job_name, error = %e, "⚠️ Could not renew job lease");
                true
            }
        }
    }

    async fn release_lease(&self, holder: Uuid) {
        let job_name = self.config.job_name.as_str();
        if let Err(e) = self.lease.release(job_name, holder).await {
            warn!(job = %job_name, error = %e, "⚠️ Failed to release job lease, it will expire");
        }
    }

    // ========== RECONCILIATION PASS ==========

    /// Run one pass. Never fails: every error is logged and contained here.
    pub async fn run_once(&self) -> PassReport {
        let report = match self.claim_lease().await {
            LeaseClaim::Granted(holder) => {
                let report = self.run_pass(holder).await;
                self.release_lease(holder).await;
                report
            }
            LeaseClaim::Held => PassReport {
                skipped: true,
                ..Default::default()
            },
            LeaseClaim::Unavailable => PassReport {
                aborted: true,
                ..Default::default()
            },
        };

        self.metrics.record_pass(&report);
        report
    }

    async fn run_pass(&self, holder: Uuid) -> PassReport {
        let mut report = PassReport::default();

        let candidates = match self
            .transactions
            .select_pollable(self.config.batch_limit)
            .await
        {
            Ok(candidates) => candidates,
            Err(e) => {
                error!(error = %e, "❌ Failed to select pending transactions, aborting pass");
                report.aborted = true;
                return report;
            }
        };

        report.selected = candidates.len();

        if candidates.is_empty() {
            debug!("No pending transactions to reconcile");
            return report;
        }

        info!("🔄 Reconciling {} pending transactions", candidates.len());

        let mut outcomes = stream::iter(candidates)
            .map(|transaction| self.process(transaction))
            .buffer_unordered(self.config.concurrency.max(1));

        while let Some(outcome) = outcomes.next().await {
            report.tally(outcome);

            if !self.renew_lease(holder).await {
                report.lease_lost = true;
                break;
            }
        }

        info!(
            selected = report.selected,
            confirmed = report.confirmed,
            failed = report.failed,
            still_pending = report.still_pending,
            errored = report.errored,
            stuck = report.stuck,
            balances_synced = report.balances_synced,
            lease_lost = report.lease_lost,
            "✓ Reconciliation pass completed"
        );

        report
    }

    /// Resolve one transaction; failures stay local to it
    async fn process(&self, transaction: Transaction) -> Outcome {
        match self.reconcile_transaction(&transaction).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "⚠️ Reconciliation failed, transaction stays pending"
                );
                self.record_failure(&transaction, &e).await
            }
        }
    }

    #[instrument(skip(self, transaction), fields(transaction_id = %transaction.id))]
    async fn reconcile_transaction(&self, transaction: &Transaction) -> AppResult<Outcome> {
        let hash = transaction
            .hash
            .as_deref()
            .ok_or(TransactionError::MissingHash(transaction.id))?;
        let chain = transaction.chain()?;

        let receipt = self.resolver.get_receipt(chain, hash).await?;

        let Some(status) = receipt.status.terminal_status() else {
            debug!(chain = %chain, hash = %hash, "⏳ Still pending on chain");
            return Ok(Outcome::StillPending);
        };

        self.transactions
            .update_status(transaction.id, status, Some(hash))
            .await?;

        info!(
            chain = %chain,
            hash = %hash,
            status = ?status,
            block_number = ?receipt.block_number,
            "✓ Transaction reached terminal status"
        );

        if status != TransactionStatus::Confirmed {
            return Ok(Outcome::Failed);
        }

        // The status is committed at this point; a balance failure is tracked
        // on its own counter, never against the transaction's retry budget.
        let balance_synced = match self.balances.sync_for_transaction(transaction.id).await {
            Ok(_) => true,
            Err(e) => {
                warn!(error = %e, "⚠️ Balance refresh failed, sweep will retry");
                self.record_balance_failure(transaction, &e).await;
                false
            }
        };

        Ok(Outcome::Confirmed { balance_synced })
    }

    async fn record_failure(&self, transaction: &Transaction, failure: &AppError) -> Outcome {
        let message = failure.to_string();
        let next_attempt_at = self
            .retry
            .next_attempt_at(Utc::now(), transaction.attempts.max(0) as u32 + 1);

        let attempts = match self
            .transactions
            .record_failed_attempt(transaction.id, &message, next_attempt_at)
            .await
        {
            Ok(attempts) => attempts.max(0) as u32,
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "⚠️ Could not record failed attempt, retrying next pass"
                );
                return Outcome::Errored;
            }
        };

        if !self.retry.is_exhausted(attempts) {
            debug!(
                transaction_id = %transaction.id,
                attempts,
                next_attempt_at = %next_attempt_at,
                "Backing off"
            );
            return Outcome::Errored;
        }

        match self.transactions.mark_stuck(transaction.id, &message).await {
            Ok(()) => {
                error!(
                    transaction_id = %transaction.id,
                    attempts,
                    last_error = %message,
                    "🛑 Retry ceiling reached, transaction parked for review"
                );
                Outcome::Stuck
            }
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "⚠️ Could not park transaction as stuck"
                );
                Outcome::Errored
            }
        }
    }

    // ========== BALANCE SWEEP ==========

    /// Retry balance refreshes for confirmed transactions left unsynced by an
    /// earlier failure or crash. Never fails, like `run_once`.
    pub async fn run_balance_sweep(&self) -> SweepReport {
        let report = match self.claim_lease().await {
            LeaseClaim::Granted(holder) => {
                let report = self.sweep(holder).await;
                self.release_lease(holder).await;
                report
            }
            LeaseClaim::Held => SweepReport {
                skipped: true,
                ..Default::default()
            },
            LeaseClaim::Unavailable => SweepReport {
                aborted: true,
                ..Default::default()
            },
        };

        self.metrics.record_sweep(&report);
        report
    }

    async fn sweep(&self, holder: Uuid) -> SweepReport {
        let mut report = SweepReport::default();
        let max_attempts = i32::try_from(self.retry.max_attempts).unwrap_or(i32::MAX);

        let unsynced = match self
            .transactions
            .select_unsynced_confirmed(self.config.batch_limit, max_attempts)
            .await
        {
            Ok(unsynced) => unsynced,
            Err(e) => {
                error!(error = %e, "❌ Failed to select unsynced confirmed transactions");
                report.aborted = true;
                return report;
            }
        };

        report.selected = unsynced.len();
        if unsynced.is_empty() {
            return report;
        }

        for transaction in unsynced {
            match self.balances.sync_for_transaction(transaction.id).await {
                Ok(_) => report.synced += 1,
                Err(e) => {
                    warn!(
                        transaction_id = %transaction.id,
                        error = %e,
                        "⚠️ Balance sweep failed"
                    );
                    report.failed += 1;
                    if self.record_balance_failure(&transaction, &e).await {
                        report.abandoned += 1;
                    }
                }
            }

            if !self.renew_lease(holder).await {
                report.lease_lost = true;
                break;
            }
        }

        info!(
            selected = report.selected,
            synced = report.synced,
            failed = report.failed,
            abandoned = report.abandoned,
            "💰 Balance sweep completed"
        );

        report
    }

    /// Back off the transaction's next balance refresh. True once the refresh
    /// ceiling is reached and the sweep stops picking it up.
    async fn record_balance_failure(
        &self,
        transaction: &Transaction,
        failure: &AppError,
    ) -> bool {
        let next_attempt_at = self
            .retry
            .next_attempt_at(Utc::now(), transaction.balance_attempts.max(0) as u32 + 1);

        match self
            .transactions
            .record_balance_failure(transaction.id, &failure.to_string(), next_attempt_at)
            .await
        {
            Ok(attempts) if self.retry.is_exhausted(attempts.max(0) as u32) => {
                error!(
                    transaction_id = %transaction.id,
                    attempts,
                    last_error = %failure,
                    "🛑 Balance refresh ceiling reached, wallet needs review"
                );
                true
            }
            Ok(attempts) => {
                debug!(
                    transaction_id = %transaction.id,
                    attempts,
                    next_attempt_at = %next_attempt_at,
                    "Balance refresh backing off"
                );
                false
            }
            Err(e) => {
                warn!(
                    transaction_id = %transaction.id,
                    error = %e,
                    "⚠️ Could not record balance refresh failure"
                );
                false
            }
        }
    }
}
