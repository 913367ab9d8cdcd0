mod api;
mod client;
mod config;
mod error;
mod executor;
mod models;
mod paths;
mod repository;
mod services;
#[cfg(test)]
mod test_utils;

use crate::client::KieClientFactory;
use crate::config::Config;
use crate::config::secrets::FileSecretStore;
use crate::executor::MigrationExecutor;
use crate::repository::{MigrationRepository, PlanRepository, establish_connection};
use crate::services::{JobScheduler, MigrationService, PlanService, ServerRegistry};
use api::create_router;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "process_migration=debug,tower_http=debug,axum=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting process_migration with config: {:?}", config);

    if let Some(path) = config.database_url.strip_prefix("sqlite:") {
        let path = std::path::Path::new(path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Establish database connection
    let db_pool = establish_connection(&config.database_url).await?;
    tracing::info!("Database connected: {}", config.database_url);

    let secrets = match &config.secrets_path {
        Some(path) => FileSecretStore::load(path)?,
        None => FileSecretStore::default(),
    };

    // Connect to the configured kie servers
    let registry = Arc::new(
        ServerRegistry::load(
            &config.kieservers,
            &secrets,
            Arc::new(KieClientFactory::new()),
            config.retry_interval(),
        )
        .await,
    );

    // Initialize repositories
    let migration_repo = MigrationRepository::new(db_pool.clone());
    let plan_repo = PlanRepository::new(db_pool);

    // Initialize services
    let executor = Arc::new(MigrationExecutor::new(
        migration_repo.clone(),
        plan_repo.clone(),
        registry.clone(),
        config.callback_timeout(),
    )?);
    let scheduler = JobScheduler::new(executor.clone());
    let migration_service = MigrationService::new(
        migration_repo,
        plan_repo.clone(),
        registry.clone(),
        executor,
        scheduler.clone(),
    );
    let plan_service = PlanService::new(plan_repo);

    migration_service.resume_pending().await?;

    // Create router
    let app = create_router(
        migration_service,
        plan_service,
        registry.clone(),
        scheduler.clone(),
    );
    let app = app.layer(TraceLayer::new_for_http());

    // Start server
    let addr = format!("{}:{}", config.host, config.port);
    let addr = addr.parse::<SocketAddr>()?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down");
    scheduler.shutdown().await;
    registry.shutdown(config.shutdown_timeout()).await;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
}
