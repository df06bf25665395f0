use identity_service::{
    build_router,
    config::IdentityConfig,
    db,
    store::{AuthStore, PgStore},
    AppState,
};
use platform_core::observability::logging::init_tracing;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), platform_core::error::AppError> {
    // Load configuration - fail fast if invalid
    let config = IdentityConfig::from_env()?;

    init_tracing(&config.service_name, &config.log_level);

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    // Initialize database connection and schema
    let pool = db::create_pool(&config.database)
        .await
        .map_err(|e| platform_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;
    db::run_migrations(&pool)
        .await
        .map_err(|e| platform_core::error::AppError::DatabaseError(anyhow::Error::new(e)))?;

    let store: Arc<dyn AuthStore> = Arc::new(PgStore::new(pool));
    if config.admin_gate.read_only_default {
        store
            .set_read_only_mode(true)
            .await
            .map_err(platform_core::error::AppError::InternalError)?;
        tracing::warn!("Process starting in read-only mode");
    }

    let state = AppState::new(config.clone(), store);
    let app = build_router(state).await?;

    let addr = SocketAddr::new(
        config
            .common
            .bind_address
            .parse()
            .map_err(|e| platform_core::error::AppError::ConfigError(anyhow::anyhow!("{}", e)))?,
        config.common.port,
    );

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
