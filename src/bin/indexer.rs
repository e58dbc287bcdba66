use anyhow::{Context, Result};
use chain_mirror::api::{AppState, router};
use chain_mirror::chain::ChainSource;
use chain_mirror::config::Config;
use chain_mirror::explorer::Explorer;
use chain_mirror::query::QueryService;
use chain_mirror::resolver::AddressResolver;
use chain_mirror::rpc::RpcClient;
use chain_mirror::scheduler::spawn_sync_schedule;
use chain_mirror::store::open_store;
use chain_mirror::sync::SyncEngine;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str())),
        )
        .init();

    info!("Starting chain mirror");
    info!(
        "RPC URLs: {} endpoint(s) configured",
        config.json_rpc_urls.len()
    );

    let store = open_store(&config.database_url);

    let client = RpcClient::new(&config.json_rpc_urls)?
        .with_max_retries(config.rpc_max_retries)
        .with_request_timeout(config.rpc_timeout);
    let chain: Arc<dyn ChainSource> = Arc::new(client);
    info!("RPC client ready");

    let engine = Arc::new(SyncEngine::new(
        Arc::clone(&chain),
        Arc::clone(&store),
        config.sync_config(),
    ));
    let schedule = spawn_sync_schedule(Arc::clone(&engine), config.sync_interval);

    let state = AppState {
        query: Arc::new(QueryService::new(
            Arc::clone(&store),
            Arc::clone(&chain),
            config.fallback_config(),
        )),
        resolver: Arc::new(
            AddressResolver::new(Arc::clone(&chain), config.resolver_config())
                .with_cache(Arc::clone(&store)),
        ),
        explorer: Arc::new(Explorer::new(
            Arc::clone(&chain),
            Arc::clone(&store),
            config.explorer_config(),
        )),
        sync: engine,
    };

    let listener = tokio::net::TcpListener::bind(config.http_bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.http_bind))?;
    info!("HTTP API listening on {}", config.http_bind);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await
        .context("HTTP server failed")?;

    schedule.abort();
    info!("Chain mirror stopped");
    Ok(())
}
