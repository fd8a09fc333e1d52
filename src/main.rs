use chrono::Local;
use consult_booking::{
    db::{create_pool, run_migrations},
    reaper::start_reaper_service,
    state::{AppState, Config},
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,consult_booking=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    tracing::info!("Connecting to database...");
    let db = create_pool(&config.database_url, config.database_max_connections).await?;

    tracing::info!("Running migrations...");
    run_migrations(&db).await?;

    let state = AppState::new(db, config.clone());

    // Catch up on anything that went stale while the worker was down
    let report = state.reaper_service.sweep(Local::now().date_naive()).await?;
    tracing::info!(expired = report.expired, "Initial sweep finished");

    let mut scheduler = start_reaper_service(state.reaper_service.clone(), &config.reaper_schedule).await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");
    scheduler.shutdown().await?;

    Ok(())
}
