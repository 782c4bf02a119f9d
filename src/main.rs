use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use cinebook_backend::api::{self, AppState};
use cinebook_backend::config::AppConfig;
use cinebook_backend::database::catalog_repository::PgCatalogRepository;
use cinebook_backend::database::memory::{InMemoryCatalog, InMemoryReservationStore};
use cinebook_backend::database::repository::{CatalogRepository, ReservationStore};
use cinebook_backend::database::reservation_repository::PgReservationStore;
use cinebook_backend::database::{init_pool, run_migrations, PoolConfig};
use cinebook_backend::health::HealthChecker;
use cinebook_backend::logging::init_tracing;
use cinebook_backend::payments::provider::PaymentGateway;
use cinebook_backend::payments::providers::zalopay::ZaloPayProvider;
use cinebook_backend::services::callback_verifier::CallbackVerifier;
use cinebook_backend::services::reservation::ReservationService;
use cinebook_backend::workers::reconciliation_poller::ReconciliationPoller;
use dotenv::dotenv;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown");
}

async fn shutdown_signal_with_notify(shutdown_tx: watch::Sender<bool>) {
    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();

    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate()?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        host = %config.server.host,
        port = config.server.port,
        skip_externals = config.skip_externals,
        "🚀 Starting cinebook reservation service"
    );

    let (store, catalog): (Arc<dyn ReservationStore>, Arc<dyn CatalogRepository>) =
        match &config.database {
            Some(database) => {
                info!("📊 Initializing database connection pool...");
                let pool = init_pool(&database.url, Some(PoolConfig::from(database)))
                    .await
                    .map_err(|e| {
                        error!("Failed to initialize database pool: {}", e);
                        e
                    })?;
                run_migrations(&pool).await?;
                info!(
                    max_connections = pool.options().get_max_connections(),
                    "✅ Database connection pool initialized"
                );
                (
                    Arc::new(PgReservationStore::new(pool.clone())),
                    Arc::new(PgCatalogRepository::new(pool)),
                )
            }
            None => {
                info!("⏭️  Using in-memory storage (SKIP_EXTERNALS=true)");
                let catalog = InMemoryCatalog::new();
                let show_id = catalog.seed_demo().await;
                info!(show_id = %show_id, "🎬 Seeded demo show");
                (Arc::new(InMemoryReservationStore::new()), Arc::new(catalog))
            }
        };

    let gateway: Arc<dyn PaymentGateway> = Arc::new(ZaloPayProvider::new(config.gateway.clone())?);
    info!(gateway = gateway.name(), "💳 Payment gateway configured");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller = ReconciliationPoller::new(
        store.clone(),
        gateway.clone(),
        config.reconciliation.clone(),
        shutdown_rx,
    );

    if config.reconciliation.enabled {
        match poller.resume_pending().await {
            Ok(count) => info!(count, "🔁 Reconciliation resumed for pending bookings"),
            Err(e) => warn!(error = %e, "Could not resume pending bookings"),
        }
    } else {
        warn!("Reconciliation poller disabled; bookings settle only through callbacks");
    }

    let state = AppState {
        reservations: Arc::new(ReservationService::new(
            store.clone(),
            catalog,
            gateway.clone(),
            poller,
        )),
        callbacks: Arc::new(CallbackVerifier::new(store.clone(), gateway)),
        health: HealthChecker::new(store, config.reconciliation.enabled),
    };
    let app = api::router(state);

    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(address = %addr, "🚀 Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(shutdown_tx.clone()))
        .await?;

    let _ = shutdown_tx.send(true);
    // Give poll jobs a moment to observe the shutdown flag.
    tokio::time::sleep(Duration::from_millis(100)).await;

    info!("👋 Server shutdown complete");

    Ok(())
}
