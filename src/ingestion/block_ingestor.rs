use std::sync::Arc;

use ethers::types::Transaction;
use futures::StreamExt;

use crate::models::Asset;
use crate::pipeline::Pipeline;
use crate::registry::Monitor;
use crate::rpc::{EvmRequestClient, EvmStreamClient};
use crate::util::scale_amount;

/// Per-chain native-transfer scanner (C3, spec.md §4.3). Subscribes to new
/// block headers and, for each block, fetches the full transaction bodies
/// and hands matching native transfers to the pipeline. ERC-20 monitors on
/// this chain are not re-scanned here — logs arrive asynchronously via the
/// event ingestor, which the engine spawns once at startup since the
/// monitor list is immutable for the process lifetime (spec.md §3).
pub struct BlockIngestor {
	chain: String,
	request_client: Arc<dyn EvmRequestClient>,
	stream_client: Arc<dyn EvmStreamClient>,
	native_monitors: Vec<Monitor>,
	pipeline: Arc<Pipeline>,
}

impl BlockIngestor {
	pub fn new(
		chain: String,
		request_client: Arc<dyn EvmRequestClient>,
		stream_client: Arc<dyn EvmStreamClient>,
		monitors: &[Monitor],
		pipeline: Arc<Pipeline>,
	) -> Self {
		let native_monitors =
			monitors.iter().filter(|m| m.token_address.is_none()).cloned().collect();
		Self { chain, request_client, stream_client, native_monitors, pipeline }
	}

	/// Runs until the underlying subscription ends (disconnect or decode
	/// failure). Per spec.md §4.3, a subscription error is logged and the
	/// ingestor does not reconnect itself — confirmation polling remains
	/// the liveness backstop.
	pub async fn run(self) {
		if self.native_monitors.is_empty() {
			tracing::debug!(chain = %self.chain, "no native monitors configured, block ingestor idling");
		}

		let mut headers = match self.stream_client.subscribe_blocks().await {
			Ok(stream) => stream,
			Err(e) => {
				tracing::error!(chain = %self.chain, error = %e, "block header subscription failed, relying on confirmation polling for liveness");
				return;
			},
		};

		while let Some(header) = headers.next().await {
			let Some(height) = header.number else { continue };
			if let Err(e) = self.handle_block(height.as_u64()).await {
				tracing::error!(chain = %self.chain, block = height.as_u64(), error = %e, "failed to process block");
			}
		}

		tracing::warn!(chain = %self.chain, "block header subscription ended");
	}

	/// Fetches one block's transactions and records any native transfers to
	/// a monitored address. Exposed directly so callers (and tests) can
	/// drive specific heights without a live subscription.
	pub async fn handle_block(&self, height: u64) -> anyhow::Result<()> {
		if self.native_monitors.is_empty() {
			return Ok(());
		}

		let block = match self.request_client.block_with_txs(height).await? {
			Some(block) => block,
			None => {
				tracing::warn!(chain = %self.chain, block = height, "block not found, skipping");
				return Ok(());
			},
		};

		for tx in &block.transactions {
			self.handle_transaction(height, tx).await;
		}

		Ok(())
	}

	async fn handle_transaction(&self, height: u64, tx: &Transaction) {
		let Some(to) = tx.to else { return };

		if tx.value.is_zero() {
			return;
		}

		for monitor in &self.native_monitors {
			if !crate::util::addresses_eq(&monitor.wallet_address, &to) {
				continue;
			}

			let amount = scale_amount(tx.value, 18);
			let tx_hash = format!("{:#x}", tx.hash);

			if let Err(e) = self
				.pipeline
				.record(
					tx_hash,
					self.chain.clone(),
					format!("{:#x}", monitor.wallet_address),
					None,
					Asset::Native,
					amount,
					18,
					height as i64,
				)
				.await
			{
				tracing::error!(chain = %self.chain, tx_hash = %format!("{:#x}", tx.hash), error = %e, "failed to record native deposit");
			}
		}
	}
}
