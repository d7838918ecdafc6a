use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

use super::job::{PassReport, SweepReport};

/// Counters updated by the reconciliation job and read by the status endpoint
#[derive(Default)]
pub struct SharedReconcilerMetrics {
    passes_completed: AtomicU64,
    passes_skipped: AtomicU64,
    passes_aborted: AtomicU64,
    transactions_confirmed: AtomicU64,
    transactions_failed: AtomicU64,
    transactions_stuck: AtomicU64,
    resolution_errors: AtomicU64,
    balances_synced: AtomicU64,
    sweeps_completed: AtomicU64,
    sweeps_aborted: AtomicU64,
    balance_sync_failures: AtomicU64,
    balances_abandoned: AtomicU64,
    /// ms since epoch, 0 until the first pass
    last_pass_ms: AtomicU64,
    last_pass_ok_ms: AtomicU64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub passes_completed: u64,
    pub passes_skipped: u64,
    pub passes_aborted: u64,
    pub transactions_confirmed: u64,
    pub transactions_failed: u64,
    pub transactions_stuck: u64,
    pub resolution_errors: u64,
    pub balances_synced: u64,
    pub sweeps_completed: u64,
    pub sweeps_aborted: u64,
    pub balance_sync_failures: u64,
    pub balances_abandoned: u64,
    pub last_pass_ms: u64,
    pub last_pass_ok_ms: u64,
}

impl SharedReconcilerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_pass(&self, report: &PassReport) {
        let now = now_ms();
        self.last_pass_ms.store(now, Ordering::Relaxed);

        if report.skipped {
            self.passes_skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }
        if report.aborted {
            self.passes_aborted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        self.last_pass_ok_ms.store(now, Ordering::Relaxed);
        self.transactions_confirmed
            .fetch_add(report.confirmed as u64, Ordering::Relaxed);
        self.transactions_failed
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.transactions_stuck
            .fetch_add(report.stuck as u64, Ordering::Relaxed);
        self.resolution_errors
            .fetch_add(report.errored as u64, Ordering::Relaxed);
        self.balances_synced
            .fetch_add(report.balances_synced as u64, Ordering::Relaxed);
    }

    /// Sweeps do not touch the pass timestamps
    pub fn record_sweep(&self, report: &SweepReport) {
        if report.skipped {
            return;
        }
        if report.aborted {
            self.sweeps_aborted.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.sweeps_completed.fetch_add(1, Ordering::Relaxed);
        self.balances_synced
            .fetch_add(report.synced as u64, Ordering::Relaxed);
        self.balance_sync_failures
            .fetch_add(report.failed as u64, Ordering::Relaxed);
        self.balances_abandoned
            .fetch_add(report.abandoned as u64, Ordering::Relaxed);
    }

    pub fn passes_completed(&self) -> u64 {
        self.passes_completed.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            passes_completed: self.passes_completed.load(Ordering::Relaxed),
            passes_skipped: self.passes_skipped.load(Ordering::Relaxed),
            passes_aborted: self.passes_aborted.load(Ordering::Relaxed),
            transactions_confirmed: self.transactions_confirmed.load(Ordering::Relaxed),
            transactions_failed: self.transactions_failed.load(Ordering::Relaxed),
            transactions_stuck: self.transactions_stuck.load(Ordering::Relaxed),
            resolution_errors: self.resolution_errors.load(Ordering::Relaxed),
            balances_synced: self.balances_synced.load(Ordering::Relaxed),
            sweeps_completed: self.sweeps_completed.load(Ordering::Relaxed),
            sweeps_aborted: self.sweeps_aborted.load(Ordering::Relaxed),
            balance_sync_failures: self.balance_sync_failures.load(Ordering::Relaxed),
            balances_abandoned: self.balances_abandoned.load(Ordering::Relaxed),
            last_pass_ms: self.last_pass_ms.load(Ordering::Relaxed),
            last_pass_ok_ms: self.last_pass_ok_ms.load(Ordering::Relaxed),
        }
    }
}

fn now_ms() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_pass_accumulates_counts() {
        let metrics = SharedReconcilerMetrics::new();
        let report = PassReport {
            selected: 3,
            confirmed: 1,
            failed: 1,
            errored: 1,
            balances_synced: 1,
            ..Default::default()
        };

        metrics.record_pass(&report);
        metrics.record_pass(&report);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.passes_completed, 2);
        assert_eq!(snapshot.transactions_confirmed, 2);
        assert_eq!(snapshot.transactions_failed, 2);
        assert_eq!(snapshot.resolution_errors, 2);
        assert!(snapshot.last_pass_ok_ms > 0);
    }

    #[test]
    fn test_skipped_and_aborted_passes_do_not_count_as_completed() {
        let metrics = SharedReconcilerMetrics::new();
        metrics.record_pass(&PassReport {
            skipped: true,
            ..Default::default()
        });
        metrics.record_pass(&PassReport {
            aborted: true,
            ..Default::default()
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.passes_completed, 0);
        assert_eq!(snapshot.passes_skipped, 1);
        assert_eq!(snapshot.passes_aborted, 1);
        assert_eq!(snapshot.last_pass_ok_ms, 0);
        assert!(snapshot.last_pass_ms > 0);
    }

    #[test]
    fn test_sweeps_are_counted_apart_from_passes() {
        let metrics = SharedReconcilerMetrics::new();
        metrics.record_pass(&PassReport {
            selected: 1,
            confirmed: 1,
            balances_synced: 1,
            ..Default::default()
        });
        metrics.record_sweep(&SweepReport {
            selected: 3,
            synced: 1,
            failed: 2,
            abandoned: 1,
            ..Default::default()
        });
        metrics.record_sweep(&SweepReport {
            skipped: true,
            ..Default::default()
        });

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.passes_completed, 1);
        assert_eq!(snapshot.sweeps_completed, 1);
        assert_eq!(snapshot.balances_synced, 2);
        assert_eq!(snapshot.balance_sync_failures, 2);
        assert_eq!(snapshot.balances_abandoned, 1);
    }
}
