use std::net::SocketAddr;

use clap::Parser;
use tokio::sync::watch;
use tracing_subscriber::EnvFilter;

use orgbase_api::config::{self, StorageProvider};
use orgbase_api::database::DatabaseManager;
use orgbase_api::mail::MailMessageJob;
use orgbase_api::services::cache_listener;
use orgbase_api::state::AppState;

#[derive(Parser)]
#[command(name = "orgbase-api")]
#[command(about = "Organizations, users, API tokens, notifications and audit logs over HTTP")]
#[command(version)]
struct Args {
    #[arg(long, env = "API_HOST", help = "Address to bind")]
    host: Option<String>,

    #[arg(long, env = "ORGBASE_API_PORT", help = "Port to listen on")]
    port: Option<u16>,

    #[arg(long, env = "STORAGE_PROVIDER", help = "Document store: memory or postgres")]
    storage: Option<StorageProvider>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present so cargo run picks up DATABASE_URL, SMTP_HOST, etc.
    let _ = dotenvy::dotenv();

    let default_filter = if orgbase_api::is_development!() {
        "info,orgbase_api=debug,tower_http=debug"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .init();

    let args = Args::parse();
    let mut config = config::config().clone();
    if let Some(host) = args.host {
        config.api.host = host;
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(storage) = args.storage {
        config.storage.provider = storage;
    }
    tracing::info!("Starting orgbase-api in {:?} mode", config.environment);
    if orgbase_api::is_production!() && !config.settings.smtp.enabled {
        tracing::warn!("SMTP is not configured; outbound mail is kept in memory only");
    }

    let bind_addr = format!("{}:{}", config.api.host, config.api.port);
    let state = AppState::connect(config).await?;

    let cache_listener = cache_listener::spawn(&state.bus, state.cache.clone());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mail_job = tokio::spawn(MailMessageJob::new(state.mail_queue.clone(), state.mail_sender.clone()).run(shutdown_rx));

    let app = orgbase_api::app::router(state);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    tracing::info!("orgbase-api listening on http://{}", bind_addr);

    // Peer addresses feed the throttle and the local https exemption
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down background jobs");
    let _ = shutdown_tx.send(true);
    if let Err(e) = mail_job.await {
        tracing::warn!("Mail job ended abnormally: {}", e);
    }
    cache_listener.abort();
    DatabaseManager::close_all().await;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Unable to listen for ctrl-c: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => tracing::error!("Unable to listen for SIGTERM: {}", e),
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
