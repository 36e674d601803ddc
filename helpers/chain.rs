//! Chain client: the JSON-RPC surface the sequencer needs from a node

use crate::error::{Error, Result};
use alloy_network::ReceiptResponse;
use alloy_primitives::{Address, Bytes, B256};
use alloy_provider::{DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types::{TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

/// The parts of a transaction receipt the pipeline looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub transaction_hash: B256,
    pub block_number: Option<u64>,
    pub contract_address: Option<Address>,
    pub gas_used: u64,
    pub status: bool,
}

impl From<TransactionReceipt> for Receipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            transaction_hash: receipt.transaction_hash,
            block_number: receipt.block_number,
            contract_address: receipt.contract_address,
            gas_used: receipt.gas_used,
            status: ReceiptResponse::status(&receipt),
        }
    }
}

#[async_trait]
#[cfg_attr(test, mockall::automock)]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    /// Transaction count of `address` at the latest block.
    async fn transaction_count(&self, address: Address) -> Result<u64>;

    async fn gas_price(&self) -> Result<u128>;

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64>;

    /// Submits an already signed, EIP-2718 encoded transaction.
    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256>;

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>>;

    /// `eth_call` against the latest block.
    async fn call(&self, request: TransactionRequest) -> Result<Bytes>;
}

/// HTTP JSON-RPC client backed by an alloy provider.
#[derive(Clone)]
pub struct RpcChainClient {
    inner: DynProvider,
    rpc_url: String,
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.rpc_url)
            .finish()
    }
}

impl RpcChainClient {
    /// Connects to `rpc_url` and checks the node answers `eth_chainId`.
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let url: url::Url = rpc_url
            .parse()
            .map_err(|e| Error::RpcError(format!("Invalid RPC URL: {}", e)))?;

        // No fillers: nonce, gas and chain id are set explicitly by the sequencer.
        let provider = ProviderBuilder::new()
            .disable_recommended_fillers()
            .connect_http(url)
            .erased();

        let chain_id = provider
            .get_chain_id()
            .await
            .map_err(|e| Error::RpcError(format!("Failed to connect to {}: {}", rpc_url, e)))?;
        info!(rpc_url = rpc_url, chain_id = chain_id, "Connected to node");

        Ok(Self {
            inner: provider,
            rpc_url: rpc_url.to_string(),
        })
    }

    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn chain_id(&self) -> Result<u64> {
        self.inner
            .get_chain_id()
            .await
            .map_err(|e| Error::RpcError(format!("Failed to get chain id: {}", e)))
    }

    async fn transaction_count(&self, address: Address) -> Result<u64> {
        self.inner
            .get_transaction_count(address)
            .await
            .map_err(|e| Error::RpcError(format!("Failed to get nonce: {}", e)))
    }

    async fn gas_price(&self) -> Result<u128> {
        self.inner
            .get_gas_price()
            .await
            .map_err(|e| Error::RpcError(format!("Failed to get gas price: {}", e)))
    }

    async fn estimate_gas(&self, request: TransactionRequest) -> Result<u64> {
        self.inner
            .estimate_gas(request)
            .await
            .map_err(|e| Error::RpcError(format!("Failed to estimate gas: {}", e)))
    }

    async fn send_raw_transaction(&self, raw: Bytes) -> Result<B256> {
        let pending = self
            .inner
            .send_raw_transaction(&raw)
            .await
            .map_err(|e| Error::RpcError(format!("Failed to send transaction: {}", e)))?;
        Ok(*pending.tx_hash())
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<Receipt>> {
        self.inner
            .get_transaction_receipt(hash)
            .await
            .map(|receipt| receipt.map(Receipt::from))
            .map_err(|e| Error::RpcError(format!("Failed to get receipt: {}", e)))
    }

    async fn call(&self, request: TransactionRequest) -> Result<Bytes> {
        self.inner
            .call(request)
            .await
            .map_err(|e| Error::RpcError(format!("Contract call failed: {}", e)))
    }
}

/// Polls for the receipt of `hash` until the node returns one.
///
/// Without a timeout this blocks for as long as the transaction stays pending.
pub async fn wait_for_receipt(
    client: &dyn ChainClient,
    hash: B256,
    poll_interval: Duration,
    timeout: Option<Duration>,
) -> Result<Receipt> {
    let started = Instant::now();
    let mut attempts: u32 = 0;

    loop {
        if let Some(receipt) = client.transaction_receipt(hash).await? {
            debug!(tx_hash = %hash, attempts = attempts, "Receipt available");
            return Ok(receipt);
        }

        attempts += 1;
        if timeout.is_some_and(|limit| started.elapsed() >= limit) {
            return Err(Error::ReceiptTimeout(hash));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
