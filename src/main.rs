//! anchor-gateway server entry point.
//!
//! Loads configuration, connects the ledger adapters and stores, and
//! serves the REST and WebSocket endpoints until Ctrl-C or SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use tracing_subscriber::EnvFilter;

use anchor_gateway::api;
use anchor_gateway::app_state::AppState;
use anchor_gateway::config::{AnchorConfig, GatewayConfig, LedgerBackend, LogFormat};
use anchor_gateway::domain::{Amount, EventBus};
use anchor_gateway::ledger::{HttpLedger, LedgerClient, MemoryLedger};
use anchor_gateway::persistence::{ListingStore, MemoryStore, PgStore, SwapLog};
use anchor_gateway::service::{AnchorContext, NetworkRegistry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = GatewayConfig::from_env().context("invalid configuration")?;
    init_tracing(config.log_format);
    tracing::info!(addr = %config.listen_addr, backend = ?config.ledger_backend, "starting anchor-gateway");

    let event_bus = EventBus::new(config.event_bus_capacity);
    let (listings, swaps) = open_stores(&config).await?;

    let mut networks = NetworkRegistry::new();
    for anchor in config.anchors {
        let context = anchor_context(
            anchor,
            config.ledger_backend,
            config.ledger_request_timeout,
            (config.memory_pool_balance_a, config.memory_pool_balance_b),
        )
        .await?;
        tracing::info!(
            network = %context.network,
            anchor = %context.address(),
            asset_a = %context.pool.asset_a,
            asset_b = %context.pool.asset_b,
            "network enabled"
        );
        networks.insert(context);
    }

    let app_state = AppState::new(
        networks,
        listings,
        swaps,
        event_bus,
        config.settlement,
        config.admin_token,
    );
    let app = api::build_app(app_state);

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Json => tracing_subscriber::fmt().json().with_env_filter(filter).init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

async fn open_stores(
    config: &GatewayConfig,
) -> anyhow::Result<(Arc<dyn ListingStore>, Arc<dyn SwapLog>)> {
    if !config.persistence_enabled {
        tracing::warn!("persistence disabled; listings and swap history live in memory");
        let store = Arc::new(MemoryStore::new());
        let listings: Arc<dyn ListingStore> = Arc::<MemoryStore>::clone(&store);
        return Ok((listings, store));
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .min_connections(config.database_min_connections)
        .acquire_timeout(Duration::from_secs(config.database_connect_timeout_secs))
        .connect(&config.database_url)
        .await
        .context("connecting to PostgreSQL")?;
    let store = Arc::new(PgStore::new(pool));
    store.migrate().await.context("running migrations")?;
    tracing::info!("database migrations applied");

    let listings: Arc<dyn ListingStore> = Arc::<PgStore>::clone(&store);
    Ok((listings, store))
}

async fn anchor_context(
    anchor: AnchorConfig,
    backend: LedgerBackend,
    timeout: Duration,
    (seed_a, seed_b): (u128, u128),
) -> anyhow::Result<AnchorContext> {
    let ledger: Arc<dyn LedgerClient> = match (backend, &anchor.ledger_url) {
        (LedgerBackend::Http, Some(url)) => Arc::new(
            HttpLedger::new(url, anchor.network, timeout)
                .with_context(|| format!("ledger client for {}", anchor.network))?,
        ),
        (LedgerBackend::Http, None) => {
            anyhow::bail!("no ledger url configured for {}", anchor.network)
        }
        (LedgerBackend::Memory, _) => {
            let ledger = MemoryLedger::new(anchor.network);
            let address = anchor.signer.address();
            ledger.set_balance(address, &anchor.pool.asset_a, Amount::new(seed_a)).await;
            ledger.set_balance(address, &anchor.pool.asset_b, Amount::new(seed_b)).await;
            tracing::warn!(network = %anchor.network, "using in-memory ledger");
            Arc::new(ledger)
        }
    };
    Ok(AnchorContext::new(
        anchor.network,
        ledger,
        anchor.signer,
        anchor.pool,
    )?)
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
