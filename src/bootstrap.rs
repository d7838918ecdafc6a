use std::{sync::Arc, time::Duration};
use sqlx::{postgres::PgPoolOptions, PgPool};
use tracing::{info, warn};

use crate::{
    api::handler::AppState,
    chain::HttpChainGateway,
    config::Config,
    error::AppResult,
    ledger::{InMemoryTransactionStore, PgTransactionStore, TransactionStore},
    reconciler::{
        InMemoryJobLease, JobLease, PgJobLease, ReconciliationJob, SharedReconcilerMetrics,
    },
    wallet::{InMemoryWalletStore, PgWalletStore, WalletStore},
};

/// Everything the binary needs: the job for the scheduler and the HTTP state
pub struct AppComponents {
    pub job: Arc<ReconciliationJob>,
    pub state: AppState,
}

pub async fn initialize_app(config: &Config) -> AppResult<AppComponents> {
    info!("Initializing reconciler components ...");

    let transactions: Arc<dyn TransactionStore>;
    let wallets: Arc<dyn WalletStore>;
    let lease: Arc<dyn JobLease>;

    match &config.database_url {
        Some(database_url) => {
            let pool = initialize_database(database_url).await?;
            transactions = Arc::new(PgTransactionStore::new(pool.clone()));
            wallets = Arc::new(PgWalletStore::new(pool.clone()));
            lease = Arc::new(PgJobLease::new(pool));
        }
        None => {
            warn!("⚠️  DATABASE_URL not set - using in-memory stores, nothing will persist");
            transactions = Arc::new(InMemoryTransactionStore::new());
            wallets = Arc::new(InMemoryWalletStore::new());
            lease = Arc::new(InMemoryJobLease::new());
        }
    }

    let gateway = Arc::new(HttpChainGateway::new(
        config.gateway_url.clone(),
        config.resolver_timeout(),
    )?);
    info!("✅ Chain gateway configured: {}", config.gateway_url);

    let metrics = Arc::new(SharedReconcilerMetrics::new());

    let job = Arc::new(
        ReconciliationJob::new(
            config.job_config(),
            transactions.clone(),
            wallets,
            gateway.clone(),
            gateway,
            lease,
        )
        .with_retry_policy(config.retry_policy())
        .with_metrics(metrics.clone()),
    );
    info!(
        "✅ Reconciliation job '{}' ready (batch {}, concurrency {})",
        config.job_name, config.batch_limit, config.concurrency
    );

    Ok(AppComponents {
        job,
        state: AppState {
            transactions,
            metrics,
        },
    })
}

async fn initialize_database(database_url: &str) -> AppResult<PgPool> {
    info!("📊 Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(database_url)
        .await?;

    info!("✓ Database pool configured: 20 max connections");

    info!("🔄 Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    info!("✓ Database initialized");
    Ok(pool)
}
