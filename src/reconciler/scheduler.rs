// Reconciliation scheduler - runs the job on a fixed interval until stopped
//
// - First pass fires one full interval after start, not immediately
// - The balance sweep has its own, slower interval on the same loop
// - Passes and sweeps never overlap inside one process: the loop awaits each
// - A pass that overruns the interval delays the next tick instead of bursting
// - Stopping lets an in-flight pass finish, then exits the loop

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use super::job::ReconciliationJob;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(30_000);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_millis(60_000);

pub struct ReconciliationScheduler {
    job: Arc<ReconciliationJob>,
    sweep_every: Duration,
}

/// Handle to a running scheduler loop
pub struct SchedulerHandle {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl ReconciliationScheduler {
    pub fn new(job: Arc<ReconciliationJob>) -> Self {
        Self {
            job,
            sweep_every: DEFAULT_SWEEP_INTERVAL,
        }
    }

    pub fn with_sweep_interval(mut self, every: Duration) -> Self {
        self.sweep_every = every;
        self
    }

    /// Start the scheduler (runs in background)
    pub fn start(&self, every: Duration) -> SchedulerHandle {
        let every = at_least_one_ms(every, "Poll");
        let sweep_every = at_least_one_ms(self.sweep_every, "Sweep");

        let job = self.job.clone();
        let (shutdown, mut shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sweep_ticker = interval_at(Instant::now() + sweep_every, sweep_every);
            sweep_ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            info!(
                "⏰ Reconciliation scheduler started, polling every {:?}, sweeping balances every {:?}",
                every, sweep_every
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let report = job.run_once().await;
                        if report.aborted {
                            error!("❌ Reconciliation pass aborted, retrying next tick");
                        }
                    }
                    _ = sweep_ticker.tick() => {
                        let report = job.run_balance_sweep().await;
                        if report.aborted {
                            error!("❌ Balance sweep aborted, retrying next tick");
                        }
                    }
                    _ = shutdown_rx.changed() => break,
                }
            }

            info!("🛑 Reconciliation scheduler stopped");
        });

        SchedulerHandle { shutdown, task }
    }
}

fn at_least_one_ms(every: Duration, what: &str) -> Duration {
    if every.is_zero() {
        warn!("{} interval of zero requested, using 1ms", what);
        Duration::from_millis(1)
    } else {
        every
    }
}

impl SchedulerHandle {
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Signal the loop and wait for it to exit
    pub async fn stop(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            error!("❌ Scheduler task ended abnormally: {:?}", e);
        }
    }
}
