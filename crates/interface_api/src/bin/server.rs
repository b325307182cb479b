//! Payment Distribution API Server
//!
//! Starts the HTTP API for previewing and committing unit payments.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin payments-api
//!
//! # Run with environment variables
//! API_PORT=8080 API_DATABASE_URL=postgres://... cargo run --bin payments-api
//! ```
//!
//! # Environment Variables
//!
//! * `API_HOST` - Server host (default: 0.0.0.0)
//! * `API_PORT` - Server port (default: 8080)
//! * `API_JWT_SECRET` - JWT signing secret, at least 16 characters
//! * `API_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `API_DATABASE_URL` - PostgreSQL connection string
//! * `API_DB_MAX_CONNECTIONS`, `API_DB_MIN_CONNECTIONS` - Pool size (default: 10 / 1)
//! * `API_DB_ACQUIRE_TIMEOUT_MS`, `API_DB_LOCK_TIMEOUT_MS` - Pool and row-lock waits (default: 5000)
//! * `API_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `API_CURRENCY` - Currency of request amounts (default: MXN)
//! * `API_TIMEZONE` - Client timezone for default as-of dates (default: UTC)
//! * `API_FETCH_TIMEOUT_MS` - Per-module bill fetch timeout (default: 5000)
//! * `API_COMMIT_TOLERANCE` - Allowed allocation drift in minor units (default: 1)
//! * `API_PENALTY_GRACE_DAYS`, `API_DUES_PENALTY_PERCENT`, `API_UTILITY_PENALTY_PERCENT`

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::{BillSources, CommitGuard, DistributionEngine, ModuleType};
use infra_db::{
    create_pool, run_migrations, ModulePenalties, PostgresBillSource,
    PostgresPaymentLedger, PostgresUnitAccountAdapter,
};
use interface_api::{config::ApiConfig, create_router, AppState};

/// Initializes logging, loads configuration, connects to the database and
/// serves the API until a shutdown signal arrives.
///
/// # Errors
///
/// Returns an error if:
/// - Configuration is invalid
/// - Database connection or migrations fail
/// - Server fails to bind to the configured address
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env()?;

    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        currency = %config.currency,
        "Starting payment distribution API server"
    );

    let pool = create_pool(config.database_config()).await?;
    run_migrations(&pool).await?;

    let penalties = ModulePenalties::new(config.dues_penalty(), config.utility_penalty());
    let dues = Arc::new(PostgresBillSource::new(
        pool.clone(),
        ModuleType::Dues,
        penalties.dues(),
    ));
    let utility = Arc::new(PostgresBillSource::new(
        pool.clone(),
        ModuleType::Utility,
        penalties.utility(),
    ));
    let accounts = Arc::new(PostgresUnitAccountAdapter::new(pool.clone()));
    let ledger = Arc::new(PostgresPaymentLedger::new(pool, penalties));

    let engine = Arc::new(DistributionEngine::new(
        BillSources::new(dues.clone(), utility.clone()),
        accounts.clone(),
        config.engine_config(),
    ));
    let guard = Arc::new(CommitGuard::new(engine.clone(), ledger.clone()));

    let state = AppState::new(engine, guard, config.clone())
        .with_health_check(dues)
        .with_health_check(utility)
        .with_health_check(accounts)
        .with_health_check(ledger);
    let app = create_router(state);

    let addr: SocketAddr = config.server_addr().parse()?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Initializes the tracing subscriber for structured logging.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for Ctrl+C or SIGTERM so in-flight requests can finish.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
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
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
