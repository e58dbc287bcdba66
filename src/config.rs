use crate::explorer::ExplorerConfig;
use crate::query::FallbackConfig;
use crate::resolver::ResolverConfig;
use crate::sync::SyncConfig;
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub json_rpc_urls: Vec<String>,
    pub database_url: String,
    pub http_bind: SocketAddr,
    pub sync_interval: Duration,
    pub genesis_block: u64,
    pub fetch_concurrency: usize,
    pub max_blocks_per_run: Option<u64>,
    pub fetch_receipts: bool,
    pub fallback_batch_size: u64,
    pub activity_window: u64,
    pub recent_tx_window: u64,
    pub rpc_timeout: Duration,
    pub rpc_max_retries: usize,
    pub log_level: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup; `from_env` passes the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let urls = lookup("JSON_RPC_URLS")
            .or_else(|| lookup("JSON_RPC_URL"))
            .context("JSON_RPC_URLS (or JSON_RPC_URL) must be set in .env")?;
        let json_rpc_urls: Vec<String> = urls
            .split(',')
            .map(|url| url.trim().to_string())
            .filter(|url| !url.is_empty())
            .collect();
        if json_rpc_urls.is_empty() {
            anyhow::bail!("JSON_RPC_URLS contains no endpoints");
        }

        let database_url =
            lookup("DATABASE_URL").unwrap_or_else(|| "sqlite:./mirror.db".to_string());

        let http_bind = parse_or(&lookup, "HTTP_BIND", SocketAddr::from(([0, 0, 0, 0], 3000)))?;

        let sync_interval = Duration::from_secs(parse_or(&lookup, "SYNC_INTERVAL_SECS", 60)?);
        if sync_interval.is_zero() {
            anyhow::bail!("SYNC_INTERVAL_SECS must be greater than zero");
        }

        let max_blocks_per_run = match lookup("SYNC_MAX_BLOCKS_PER_RUN") {
            Some(raw) => Some(
                raw.trim()
                    .parse()
                    .with_context(|| format!("Invalid SYNC_MAX_BLOCKS_PER_RUN: {raw}"))?,
            ),
            None => None,
        };

        Ok(Config {
            json_rpc_urls,
            database_url,
            http_bind,
            sync_interval,
            genesis_block: parse_or(&lookup, "SYNC_GENESIS_BLOCK", 0)?,
            fetch_concurrency: parse_or(&lookup, "SYNC_FETCH_CONCURRENCY", 4)?,
            max_blocks_per_run,
            fetch_receipts: parse_or(&lookup, "SYNC_FETCH_RECEIPTS", false)?,
            fallback_batch_size: parse_or(&lookup, "FALLBACK_BATCH_SIZE", 5)?,
            activity_window: parse_or(&lookup, "ACTIVITY_WINDOW", 100)?,
            recent_tx_window: parse_or(&lookup, "RECENT_TX_WINDOW", 20)?,
            rpc_timeout: Duration::from_secs(parse_or(&lookup, "RPC_TIMEOUT_SECS", 30)?),
            rpc_max_retries: parse_or(&lookup, "RPC_MAX_RETRIES", 5)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            genesis_block: self.genesis_block,
            fetch_concurrency: self.fetch_concurrency,
            max_blocks_per_run: self.max_blocks_per_run,
            fetch_receipts: self.fetch_receipts,
        }
    }

    pub fn fallback_config(&self) -> FallbackConfig {
        FallbackConfig {
            batch_size: self.fallback_batch_size,
            fetch_concurrency: self.fetch_concurrency,
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            activity_window: self.activity_window,
            recent_tx_window: self.recent_tx_window,
            fetch_concurrency: self.fetch_concurrency,
        }
    }

    pub fn explorer_config(&self) -> ExplorerConfig {
        ExplorerConfig {
            fetch_concurrency: self.fetch_concurrency,
            ..ExplorerConfig::default()
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw}")),
        None => Ok(default),
    }
}
