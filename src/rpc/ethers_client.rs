use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider, StreamExt, Ws};
use ethers::types::{Block, Filter, Log, Transaction, TxHash};

use super::{BlockHeaderStream, EvmRequestClient, EvmStreamClient, LogStream};

/// Request/response client backed by an HTTP JSON-RPC endpoint. Required
/// for every chain (spec.md §4.1).
#[derive(Clone)]
pub struct EthersRequestClient {
	provider: Arc<Provider<Http>>,
	chain_name: &'static str,
}

impl EthersRequestClient {
	pub fn new(http_endpoint: &str, chain_name: &'static str) -> Result<Self> {
		let provider = Provider::<Http>::try_from(http_endpoint)
			.with_context(|| format!("failed to build HTTP provider for {chain_name}"))?;
		Ok(Self { provider: Arc::new(provider), chain_name })
	}
}

#[async_trait]
impl EvmRequestClient for EthersRequestClient {
	async fn block_number(&self) -> Result<u64> {
		Ok(self.provider.get_block_number().await?.as_u64())
	}

	async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>> {
		Ok(self.provider.get_logs(filter).await?)
	}

	async fn block_with_txs(&self, number: u64) -> Result<Option<Block<Transaction>>> {
		self.provider
			.get_block_with_txs(number)
			.await
			.with_context(|| format!("fetching block {number} with txs on {}", self.chain_name))
	}
}

/// Streaming client backed by a websocket connection. Optional per chain —
/// only constructed when a `wsUrl` is configured and the initial connect
/// succeeds (spec.md §4.1). A failed connect here is never fatal to the
/// chain as a whole; the caller falls back to request/response only.
#[derive(Clone)]
pub struct EthersStreamClient {
	provider: Arc<Provider<Ws>>,
	chain_name: &'static str,
}

impl EthersStreamClient {
	pub async fn connect(ws_endpoint: &str, chain_name: &'static str) -> Result<Self> {
		let provider = Provider::<Ws>::connect(ws_endpoint)
			.await
			.with_context(|| format!("failed to connect to {chain_name} ws endpoint"))?;
		Ok(Self { provider: Arc::new(provider), chain_name })
	}
}

#[async_trait]
impl EvmStreamClient for EthersStreamClient {
	async fn subscribe_blocks(&self) -> Result<BlockHeaderStream> {
		let stream = self
			.provider
			.subscribe_blocks()
			.await
			.with_context(|| format!("subscribing to new heads on {}", self.chain_name))?;
		Ok(Box::pin(stream.map(|header| Block::<TxHash> {
			number: header.number,
			hash: header.hash,
			..Default::default()
		})))
	}

	async fn subscribe_logs(&self, filter: Filter) -> Result<LogStream> {
		let stream = self
			.provider
			.subscribe_logs(&filter)
			.await
			.map_err(|e| anyhow!("subscribing to logs on {}: {e}", self.chain_name))?;
		Ok(Box::pin(stream))
	}
}
