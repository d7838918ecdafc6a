use async_trait::async_trait;
use parking_lot::Mutex;
use sqlx::PgPool;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{AppError, AppResult};

/// Time-bounded exclusive claim on running a named job
///
/// A lease is granted when none exists, when the current one has expired, or
/// when the same holder asks again. Expiry lets a crashed holder's claim lapse
/// on its own.
#[async_trait]
pub trait JobLease: Send + Sync {
    async fn try_acquire(&self, job_name: &str, holder: Uuid, ttl: Duration) -> AppResult<bool>;

    async fn release(&self, job_name: &str, holder: Uuid) -> AppResult<()>;
}

/// Lease rows in `job_leases`, shared by every reconciler process on the database
pub struct PgJobLease {
    pool: PgPool,
}

impl PgJobLease {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobLease for PgJobLease {
    async fn try_acquire(&self, job_name: &str, holder: Uuid, ttl: Duration) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO job_leases (job_name, holder, expires_at)
            VALUES ($1, $2, NOW() + make_interval(secs => $3))
            ON CONFLICT (job_name) DO UPDATE
            SET holder = EXCLUDED.holder, expires_at = EXCLUDED.expires_at
            WHERE job_leases.expires_at < NOW() OR job_leases.holder = EXCLUDED.holder
            "#,
        )
        .bind(job_name)
        .bind(holder)
        .bind(ttl.as_secs_f64())
        .execute(&self.pool)
        .await
        .map_err(|e| lease_error("acquire", job_name, e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, job_name: &str, holder: Uuid) -> AppResult<()> {
        sqlx::query("DELETE FROM job_leases WHERE job_name = $1 AND holder = $2")
            .bind(job_name)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(|e| lease_error("release", job_name, e))?;

        Ok(())
    }
}

fn lease_error(action: &str, job_name: &str, error: sqlx::Error) -> AppError {
    AppError::Lease(format!("failed to {} lease {}: {}", action, job_name, error))
}

/// Single-process lease, for development mode and tests
#[derive(Default)]
pub struct InMemoryJobLease {
    leases: Mutex<HashMap<String, (Uuid, Instant)>>,
}

impl InMemoryJobLease {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn holder(&self, job_name: &str) -> Option<Uuid> {
        self.leases
            .lock()
            .get(job_name)
            .filter(|(_, expires_at)| *expires_at > Instant::now())
            .map(|(holder, _)| *holder)
    }
}

#[async_trait]
impl JobLease for InMemoryJobLease {
    async fn try_acquire(&self, job_name: &str, holder: Uuid, ttl: Duration) -> AppResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases.lock();

        match leases.get(job_name) {
            Some((current, expires_at)) if *current != holder && *expires_at > now => Ok(false),
            _ => {
                leases.insert(job_name.to_string(), (holder, now + ttl));
                Ok(true)
            }
        }
    }

    async fn release(&self, job_name: &str, holder: Uuid) -> AppResult<()> {
        let mut leases = self.leases.lock();
        if leases.get(job_name).is_some_and(|(current, _)| *current == holder) {
            leases.remove(job_name);
        }
        Ok(())
    }
}
