//! Ticketline server binary

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use ticketline_api::{
    config::{Config, LogFormat, StoreBackend},
    queue::{EngineSettings, QueueEngine},
    routes::create_router,
    websocket::WebSocketState,
    AppState,
};
use ticketline_shared::{create_pool, run_migrations, MemoryQueueStore, PgQueueStore, QueueStore};
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// How long shutdown waits for pending store writes
const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    let config = Config::from_env().context("Failed to load configuration")?;
    init_logging(config.log_format);

    tracing::info!("Starting Ticketline v{}", env!("CARGO_PKG_VERSION"));

    let store = open_store(&config).await?;

    let ws_state = WebSocketState::new();
    let (queue, engine_task) = QueueEngine::start(
        Arc::clone(&store),
        ws_state.clone(),
        EngineSettings::from(&config),
    )
    .await
    .context("Failed to load queue state")?;

    let bind_address = config.bind_address.clone();
    let state = AppState::new(config, queue.clone(), ws_state, store);
    let app = create_router(state);

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("Failed to bind {bind_address}"))?;
    tracing::info!(address = %bind_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Shutting down, flushing pending store writes");
    match tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, queue.flush()).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::warn!(error = %e, "Flush on shutdown failed"),
        Err(_) => tracing::warn!("Timed out flushing store writes"),
    }
    engine_task.abort();

    Ok(())
}

/// Initialize tracing/logging
fn init_logging(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("ticketline_api=info,ticketline_shared=info,tower_http=info")
    });

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json().with_target(true)).init(),
        LogFormat::Pretty => registry.with(fmt::layer().with_target(true)).init(),
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn QueueStore>> {
    match config.store_backend {
        StoreBackend::Postgres => {
            let database_url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;

            tracing::info!("Connecting to database...");
            let pool = create_pool(database_url, config.database_max_connections)
                .await
                .context("Database connection failed")?;

            tracing::info!("Running database migrations...");
            run_migrations(&pool).await.context("Migration failed")?;
            tracing::info!("Database migrations complete");

            Ok(Arc::new(PgQueueStore::new(pool)))
        }
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store; queue state is lost on restart");
            Ok(Arc::new(MemoryQueueStore::new()))
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
