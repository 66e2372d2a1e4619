//! # forum-server
//!
//! Assembles settings, storage, services and the HTTP router, then serves
//! until SIGINT or SIGTERM.

use std::sync::Arc;

use anyhow::Context;
use api_adapters::http::{router, AppState};
use configs::{LogSettings, Settings, StorageBackend};
use storage_adapters::MemoryStore;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::load().context("failed to load settings")?;
    init_tracing(&settings.log);

    let state = match settings.storage.backend {
        StorageBackend::Memory => {
            info!("using in-memory storage");
            AppState::from_store(Arc::new(MemoryStore::new()))
        }
        StorageBackend::Postgres => postgres_state(&settings).await?,
    };

    let addr = settings.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "forum server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("forum server stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

#[cfg(feature = "db-postgres")]
async fn postgres_state(settings: &Settings) -> anyhow::Result<AppState> {
    use secrecy::ExposeSecret;
    use storage_adapters::PgStore;

    let store = PgStore::connect(settings.storage.url.expose_secret(), settings.storage.max_connections)
        .await
        .context("failed to connect to postgres")?;
    store.migrate().await.context("failed to run migrations")?;
    Ok(AppState::from_store(Arc::new(store)))
}

#[cfg(not(feature = "db-postgres"))]
async fn postgres_state(_settings: &Settings) -> anyhow::Result<AppState> {
    anyhow::bail!("built without the db-postgres feature; set storage.backend = \"memory\"")
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to listen for SIGTERM");
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
    info!("shutdown signal received");
}
