// Transaction reconciliation: polling pass, retry policy, lease and scheduling
pub mod backoff;
pub mod balance;
pub mod job;
pub mod lease;
pub mod metrics;
pub mod scheduler;

pub use backoff::RetryPolicy;
pub use balance::BalanceReconciler;
pub use job::{JobConfig, PassReport, ReconciliationJob, SweepReport};
pub use lease::{InMemoryJobLease, JobLease, PgJobLease};
pub use metrics::{MetricsSnapshot, SharedReconcilerMetrics};
pub use scheduler::{
    ReconciliationScheduler, SchedulerHandle, DEFAULT_POLL_INTERVAL, DEFAULT_SWEEP_INTERVAL,
};
