use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tx_reconciler::{bootstrap, config::Config, reconciler::ReconciliationScheduler, server};

// Initialize logging and tracing
fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,tower_http=debug,tx_reconciler=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("❌ Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("🛑 Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // .env first so RUST_LOG can come from it
    dotenv::dotenv().ok();
    init_tracing();

    info!("🚀 Starting transaction reconciler");

    let config = Config::from_env()?;
    let components = bootstrap::initialize_app(&config).await?;

    let scheduler = ReconciliationScheduler::new(components.job.clone())
        .with_sweep_interval(config.sweep_interval())
        .start(config.poll_interval());

    let app = server::create_app(components.state).await;
    server::run_server(app, &config.bind_address, shutdown_signal()).await?;

    scheduler.stop().await;
    info!("✓ Reconciler stopped");

    Ok(())
}
