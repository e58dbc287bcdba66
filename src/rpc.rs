use crate::chain::{
    BlockLookup, ChainBlock, ChainReceipt, ChainSource, ChainTransaction, TransactionRef,
};
use crate::error::SourceError;
use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::providers::fillers::FillProvider;
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{
    Block, BlockNumberOrTag, BlockTransactions, Transaction, TransactionReceipt,
};
use alloy_primitives::{Address, B256, Bytes, U256};
use anyhow::Result;
use async_trait::async_trait;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::timeout;
use tokio_retry::Retry;
use tokio_retry::strategy::{ExponentialBackoff, jitter};
use tracing::{debug, warn};

type AlloyFullProvider = FillProvider<
    alloy::providers::fillers::JoinFill<
        alloy::providers::Identity,
        alloy::providers::fillers::JoinFill<
            alloy::providers::fillers::GasFiller,
            alloy::providers::fillers::JoinFill<
                alloy::providers::fillers::BlobGasFiller,
                alloy::providers::fillers::JoinFill<
                    alloy::providers::fillers::NonceFiller,
                    alloy::providers::fillers::ChainIdFiller,
                >,
            >,
        >,
    >,
    alloy::providers::RootProvider,
>;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_MAX_RETRIES: usize = 5;

/// JSON-RPC chain source over one or more HTTP endpoints. Failed or timed-out
/// calls rotate to the next endpoint and are retried with jittered backoff.
#[derive(Clone)]
pub struct RpcClient {
    providers: Vec<AlloyFullProvider>,
    urls: Vec<String>,
    current_provider: Arc<AtomicUsize>,
    max_retries: usize,
    request_timeout: Duration,
}

impl RpcClient {
    pub fn new(rpc_urls: &[String]) -> Result<Self> {
        if rpc_urls.is_empty() {
            return Err(anyhow::anyhow!("At least one RPC URL must be provided"));
        }

        let mut providers = Vec::new();
        for url in rpc_urls {
            let parsed_url = url
                .parse()
                .map_err(|_| anyhow::anyhow!("Invalid RPC URL: {}", url))?;
            let provider: AlloyFullProvider = ProviderBuilder::new().connect_http(parsed_url);
            providers.push(provider);
        }

        Ok(RpcClient {
            providers,
            urls: rpc_urls.to_vec(),
            current_provider: Arc::new(AtomicUsize::new(0)),
            max_retries: DEFAULT_MAX_RETRIES,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        })
    }

    pub fn with_max_retries(mut self, max_retries: usize) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }

    fn get_provider(&self) -> &AlloyFullProvider {
        let index = self.current_provider.load(Ordering::Relaxed) % self.providers.len();
        &self.providers[index]
    }

    pub fn get_current_url(&self) -> &str {
        let index = self.current_provider.load(Ordering::Relaxed) % self.urls.len();
        &self.urls[index]
    }

    pub fn rotate_provider(&self) {
        let current = self.current_provider.load(Ordering::Relaxed);
        let next = (current + 1) % self.providers.len();
        self.current_provider.store(next, Ordering::Relaxed);

        if self.providers.len() > 1 {
            debug!("Rotating to RPC provider #{}", next);
        }
    }

    fn get_retry_strategy(&self) -> impl Iterator<Item = Duration> + use<> {
        ExponentialBackoff::from_millis(100)
            .factor(2)
            .max_delay(Duration::from_secs(10))
            .map(jitter)
            .take(self.max_retries)
    }

    fn handle_error(&self, method: &'static str, error_str: &str) -> SourceError {
        warn!(
            "RPC error in {} on {}: {}, rotating provider",
            method,
            self.get_current_url(),
            error_str
        );
        self.rotate_provider();
        SourceError::Rpc {
            method,
            message: error_str.to_string(),
        }
    }

    fn handle_timeout(&self, method: &'static str) -> SourceError {
        warn!(
            "Request {} timed out after {} seconds on {}, rotating provider",
            method,
            self.request_timeout.as_secs(),
            self.get_current_url()
        );
        self.rotate_provider();
        SourceError::Timeout {
            method,
            timeout: self.request_timeout,
        }
    }

    /// Runs one provider call under the per-request timeout, retrying with
    /// backoff and rotating endpoints on every failure.
    async fn request<T, E, F, Fut>(&self, method: &'static str, call: F) -> Result<T, SourceError>
    where
        E: Display,
        F: Fn(AlloyFullProvider) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        Retry::start(self.get_retry_strategy(), || {
            let pending = call(self.get_provider().clone());
            async move {
                match timeout(self.request_timeout, pending).await {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => Err(self.handle_error(method, &e.to_string())),
                    Err(_) => Err(self.handle_timeout(method)),
                }
            }
        })
        .await
    }
}

#[async_trait]
impl ChainSource for RpcClient {
    async fn latest_block_number(&self) -> Result<u64, SourceError> {
        self.request("eth_blockNumber", |provider| async move {
            provider.get_block_number().await
        })
        .await
    }

    async fn block(
        &self,
        lookup: BlockLookup,
        include_transactions: bool,
    ) -> Result<Option<ChainBlock>, SourceError> {
        let block = self
            .request("eth_getBlock", |provider| async move {
                let request = match lookup {
                    BlockLookup::Number(number) => {
                        provider.get_block_by_number(BlockNumberOrTag::Number(number))
                    }
                    BlockLookup::Hash(hash) => provider.get_block_by_hash(hash),
                };
                if include_transactions {
                    request.full().await
                } else {
                    request.hashes().await
                }
            })
            .await?;

        block.as_ref().map(convert_block).transpose()
    }

    async fn transaction(&self, hash: B256) -> Result<Option<ChainTransaction>, SourceError> {
        let tx = self
            .request("eth_getTransactionByHash", |provider| async move {
                provider.get_transaction_by_hash(hash).await
            })
            .await?;
        Ok(tx.as_ref().map(convert_transaction))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ChainReceipt>, SourceError> {
        let receipt = self
            .request("eth_getTransactionReceipt", |provider| async move {
                provider.get_transaction_receipt(hash).await
            })
            .await?;
        Ok(receipt.as_ref().map(convert_receipt))
    }

    async fn balance(&self, address: Address) -> Result<U256, SourceError> {
        self.request("eth_getBalance", |provider| async move {
            provider.get_balance(address).await
        })
        .await
    }

    async fn code(&self, address: Address) -> Result<Bytes, SourceError> {
        self.request("eth_getCode", |provider| async move {
            provider.get_code_at(address).await
        })
        .await
    }

    async fn transaction_count(&self, address: Address) -> Result<u64, SourceError> {
        self.request("eth_getTransactionCount", |provider| async move {
            provider.get_transaction_count(address).await
        })
        .await
    }
}

fn convert_block(block: &Block) -> Result<ChainBlock, SourceError> {
    let header = &block.header.inner;
    let transactions = match &block.transactions {
        BlockTransactions::Full(txs) => txs
            .iter()
            .map(|tx| TransactionRef::Full(convert_transaction(tx)))
            .collect(),
        BlockTransactions::Hashes(hashes) => {
            hashes.iter().copied().map(TransactionRef::Hash).collect()
        }
        BlockTransactions::Uncle => Vec::new(),
    };

    let size = block
        .header
        .size
        .map(|size| {
            u64::try_from(size).map_err(|_| SourceError::Malformed {
                method: "eth_getBlock",
                message: format!("block size {size} does not fit in u64"),
            })
        })
        .transpose()?;

    Ok(ChainBlock {
        number: header.number,
        hash: block.header.hash,
        parent_hash: header.parent_hash,
        timestamp: header.timestamp,
        gas_used: header.gas_used,
        gas_limit: header.gas_limit,
        miner: header.beneficiary,
        difficulty: header.difficulty,
        total_difficulty: block.header.total_difficulty,
        size,
        nonce: Some(format!("{:?}", header.nonce)),
        extra_data: header.extra_data.clone(),
        base_fee_per_gas: header.base_fee_per_gas,
        transactions,
    })
}

fn convert_transaction(tx: &Transaction) -> ChainTransaction {
    ChainTransaction {
        hash: TransactionResponse::tx_hash(tx),
        block_number: tx.block_number,
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        value: ConsensusTransaction::value(tx),
        gas_price: ConsensusTransaction::gas_price(tx),
        gas: ConsensusTransaction::gas_limit(tx),
        nonce: ConsensusTransaction::nonce(tx),
        transaction_index: tx.transaction_index,
        input: ConsensusTransaction::input(tx).clone(),
    }
}

fn convert_receipt(receipt: &TransactionReceipt) -> ChainReceipt {
    ChainReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        status: receipt.status(),
        gas_used: receipt.gas_used,
        effective_gas_price: receipt.effective_gas_price,
        contract_address: receipt.contract_address,
    }
}
