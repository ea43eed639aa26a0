//! walletLedger - wallet backend API
//!
//! Serves login, balance listing and balance transfers over HTTP. Transfers
//! run the lock/settle/release protocol against PostgreSQL.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wallet_ledger::api::{self, AppState, HttpMetrics};
use wallet_ledger::auth::{AuthService, PgCredentialsStore};
use wallet_ledger::config::LogFormat;
use wallet_ledger::jobs::{LockMonitor, LockMonitorConfig};
use wallet_ledger::ledger::PgLedgerRepository;
use wallet_ledger::{db, Config};

/// Initialize tracing/logging. `RUST_LOG` wins over the per-environment default.
fn init_tracing(format: LogFormat, production: bool) {
    let default_filter = if production {
        "wallet_ledger=info,tower_http=info"
    } else {
        "wallet_ledger=debug,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format, config.is_production());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!(environment = %config.environment, "Starting walletLedger server");
    tracing::info!("Connecting to database...");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await?;

    db::verify_connection(&pool).await?;
    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    tracing::info!("Database connected successfully");

    let ledger = Arc::new(PgLedgerRepository::new(pool.clone()));
    let auth = AuthService::new(
        Arc::new(PgCredentialsStore::new(pool.clone())),
        &config.jwt_sign,
        config.jwt_ttl_minutes,
    );
    let metrics = HttpMetrics::new()?;
    let state = Arc::new(AppState::new(ledger.clone(), auth, metrics));

    let monitor = (config.lock_monitor_interval_secs > 0).then(|| {
        LockMonitor::with_config(
            ledger,
            LockMonitorConfig {
                interval: Duration::from_secs(config.lock_monitor_interval_secs),
            },
        )
        .start()
    });

    let app = api::create_router(state);

    tracing::info!("Listening on http://{}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Cleanup
    tracing::info!("Server shutting down...");
    if let Some(handle) = monitor {
        handle.abort();
    }
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

/// Shutdown signal handler for graceful shutdown
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }
}
