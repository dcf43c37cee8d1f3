use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use checkout_gateway::config::{Config, LogFormat};
use checkout_gateway::database::{
    self, order_repository::PgOrderRepository, transaction_repository::PgTransactionRepository,
    PoolConfig,
};
use checkout_gateway::payments::providers::{GarantiProvider, PaytrProvider};
use checkout_gateway::payments::service::PaymentService;
use checkout_gateway::{create_app, AppState};

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Periodically fail pending transactions older than `ttl`
fn spawn_pending_sweep(payments: Arc<PaymentService>, ttl: Duration) {
    let period = (ttl / 4).clamp(Duration::from_secs(30), Duration::from_secs(300));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        loop {
            interval.tick().await;
            if let Err(e) = payments.expire_stale(ttl).await {
                tracing::error!("Pending transaction sweep failed: {}", e);
            }
        }
    });
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;

    init_tracing(config.logging.format);

    tracing::info!("Starting checkout gateway");
    tracing::info!("Environment: {}", config.server.environment);
    tracing::info!("Garanti mode: {}", config.garanti.mode);
    tracing::info!("PayTR mode: {}", config.paytr.mode);

    let pool = database::init_pool(
        &config.database.url,
        Some(PoolConfig {
            max_connections: config.database.max_connections,
            min_connections: config.database.max_connections.min(2),
            ..PoolConfig::default()
        }),
    )
    .await
    .context("database pool")?;

    if config.database.run_migrations {
        database::run_migrations(&pool)
            .await
            .context("database migrations")?;
    }

    let payments = Arc::new(PaymentService::new(
        Arc::new(PgTransactionRepository::new(pool.clone())),
        Arc::new(PgOrderRepository::new(pool.clone())),
    ));

    if let Some(ttl) = config.pending_ttl {
        tracing::info!("Expiring pending transactions after {:?}", ttl);
        spawn_pending_sweep(payments.clone(), ttl);
    }

    let state = AppState {
        payments,
        garanti: Arc::new(GarantiProvider::new(config.garanti.clone())),
        paytr: Arc::new(PaytrProvider::new(config.paytr.clone())),
        redirects: config.redirects.clone(),
        environment: config.server.environment.clone(),
        db: Some(pool),
    };

    let app = create_app(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .context("HOST/PORT do not form a socket address")?;
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
