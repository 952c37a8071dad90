use donation_backend::api::{self, AppState};
use donation_backend::config::{AppConfig, PaymentTargetMode, StoreBackend, StoreConfig};
use donation_backend::database::{InMemoryPaymentStore, PaymentStore};
use donation_backend::health::HealthChecker;
use donation_backend::logging::init_tracing;
use donation_backend::payments::providers::UpiGatewayClient;
use donation_backend::payments::{OrderIdGenerator, UpiGateway};
use donation_backend::services::payment_lifecycle::{LifecyclePolicy, PaymentLifecycleService};
use donation_backend::services::reconciliation::ReconciliationService;
use donation_backend::workers::{ReconciliationWorker, ReconciliationWorkerConfig};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
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
            Ok(mut stream) => {
                stream.recv().await;
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

#[cfg(feature = "database")]
async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    use donation_backend::database::{init_pool_from_config, run_migrations, PostgresPaymentStore};

    match config.backend {
        StoreBackend::Postgres => {
            info!("📊 Initializing database connection pool...");
            let pool = init_pool_from_config(config).await.map_err(|e| {
                error!("Failed to initialize database pool: {}", e);
                e
            })?;
            run_migrations(&pool).await?;
            info!(
                max_connections = pool.options().get_max_connections(),
                "✅ Postgres payment store ready"
            );
            Ok(Arc::new(PostgresPaymentStore::new(pool)))
        }
        StoreBackend::Memory => {
            warn!("⚠️  Using in-memory payment store; records are lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

#[cfg(not(feature = "database"))]
async fn build_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn PaymentStore>> {
    match config.backend {
        StoreBackend::Postgres => Err(anyhow::anyhow!(
            "STORE_BACKEND=postgres requires the `database` feature"
        )),
        StoreBackend::Memory => {
            warn!("⚠️  Using in-memory payment store; records are lost on restart");
            Ok(Arc::new(InMemoryPaymentStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;
    init_tracing(&config.logging);
    config.validate().map_err(|e| {
        error!(error = %e, "❌ Invalid configuration");
        e
    })?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        mode = ?config.gateway.mode,
        store = ?config.store.backend,
        "🚀 Starting donation backend service"
    );

    let store = build_store(&config.store).await?;

    let gateway: Option<Arc<dyn UpiGateway>> = match config.gateway.client_config() {
        Some(client_config) => {
            let client = UpiGatewayClient::new(client_config)?;
            info!(provider = client.name(), "✅ UPI gateway client initialized");
            let client: Arc<dyn UpiGateway> = Arc::new(client);
            Some(client)
        }
        None => {
            info!("⏭️  No UPI gateway API key; webhook-only reconciliation");
            None
        }
    };
    if config.gateway.webhook_secret.is_none() {
        warn!("UPI_GATEWAY_WEBHOOK_SECRET not set; gateway callbacks will be refused");
    }
    if config.admin.api_token.is_none() {
        warn!("ADMIN_API_TOKEN not set; admin endpoints are disabled");
    }

    let lifecycle = Arc::new(PaymentLifecycleService::new(
        store.clone(),
        OrderIdGenerator::new(config.donation.order_id_prefix.clone()),
        LifecyclePolicy::from(&config.donation),
    )?);
    let reconciliation = Arc::new(ReconciliationService::new(
        lifecycle.clone(),
        gateway.clone(),
        config.gateway.webhook_secret.clone(),
        config.donation.purpose.clone(),
    ));

    let (worker_shutdown_tx, worker_shutdown_rx) = watch::channel(false);
    let mut worker_handle = None;
    if config.reconciliation.enabled && gateway.is_some() {
        let worker = ReconciliationWorker::new(
            lifecycle.clone(),
            reconciliation.clone(),
            ReconciliationWorkerConfig::from(&config.reconciliation),
        );
        worker_handle = Some(tokio::spawn(worker.run(worker_shutdown_rx)));
    } else {
        info!("Gateway reconciliation worker disabled");
    }

    let state = AppState {
        lifecycle,
        reconciliation,
        payee: Arc::new(config.donation.payee.clone()),
        target_mode: config.gateway.mode,
        admin_token: config.admin.api_token.as_deref().map(Arc::from),
        store_retry_attempts: config.server.store_retry_attempts.max(1),
        health: HealthChecker::new(store, gateway.is_some()),
    };
    let app = api::router(state);
    info!("✅ Routes configured");

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await.map_err(|e| {
        error!("❌ Failed to bind to address {}: {}", addr, e);
        e
    })?;

    info!(
        address = %addr,
        upi_link_mode = config.gateway.mode == PaymentTargetMode::UpiLink,
        "🚀 Server listening on http://{}",
        addr
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_with_notify(worker_shutdown_tx.clone()))
        .await?;

    let _ = worker_shutdown_tx.send(true);
    if let Some(handle) = worker_handle {
        if tokio::time::timeout(Duration::from_secs(5), handle).await.is_err() {
            error!("Timed out waiting for reconciliation worker shutdown");
        }
    }

    info!("👋 Server shutdown complete");

    Ok(())
}
