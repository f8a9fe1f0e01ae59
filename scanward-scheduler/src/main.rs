use anyhow::Context;
use scanward_client::HttpDelegateClient;
use scanward_scheduler::Scheduler;
use scanward_scheduler::config::Config;
use scanward_scheduler::db;
use scanward_scheduler::repository::{
    InMemoryJobStore, InMemorySchedulerConfigStore, JobStore, PgJobStore, PgSchedulerConfigStore,
    SchedulerConfigStore,
};
use scanward_scheduler::service::{
    DelegateRegistry, ProfileResolver, StaticProfileResolver, SysinfoMonitor,
};
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "scanward_scheduler=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Scanward Scheduler...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    tracing::info!("Scheduler instance: {}", config.instance_id);

    let (store, settings): (Arc<dyn JobStore>, Arc<dyn SchedulerConfigStore>) =
        match &config.database_url {
            Some(database_url) => {
                tracing::info!("Connecting to database...");
                let pool = db::create_pool(database_url)
                    .await
                    .context("Failed to create database pool")?;
                db::run_migrations(&pool)
                    .await
                    .context("Failed to run database migrations")?;
                tracing::info!("Database ready");

                (
                    Arc::new(PgJobStore::new(pool.clone())),
                    Arc::new(PgSchedulerConfigStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("DATABASE_URL not set, using in-memory store (single instance only)");
                (
                    Arc::new(InMemoryJobStore::new()),
                    Arc::new(InMemorySchedulerConfigStore::default()),
                )
            }
        };

    let profiles: Arc<dyn ProfileResolver> = match &config.profiles_file {
        Some(path) => Arc::new(
            StaticProfileResolver::load(path)
                .with_context(|| format!("Failed to load profiles from {}", path.display()))?,
        ),
        None => {
            tracing::warn!("No profiles file configured, jobs will fail without executors");
            Arc::new(StaticProfileResolver::empty())
        }
    };

    let delegate_client = HttpDelegateClient::new(
        config.delegate_connect_timeout,
        config.delegate_request_timeout,
    )
    .context("Failed to create delegate client")?;
    let delegates = DelegateRegistry::with_delegate_protocol(Arc::new(delegate_client));

    let bind_addr = config.bind_addr.clone();
    let scheduler = Arc::new(Scheduler::build(
        config,
        store,
        settings,
        profiles,
        delegates,
        Arc::new(SysinfoMonitor::new()),
    ));
    let background = scheduler.spawn_background_tasks();

    tracing::info!("Listening on {}", bind_addr);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;

    let served = scheduler.serve(listener, shutdown_signal()).await;

    // Give job tasks time to observe the shutdown
    tokio::time::sleep(scheduler.shutdown_grace()).await;
    served.context("Server error")?;

    for handle in background {
        if let Err(e) = handle.await {
            tracing::warn!("Background task ended abnormally: {}", e);
        }
    }

    tracing::info!("Scheduler shutdown complete");
    Ok(())
}

/// Waits for Ctrl+C or SIGTERM
///
/// A handler that cannot be installed never fires, the other one still does.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, initiating graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, initiating graceful shutdown"),
    }
}
