use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use ethers::types::{Filter, Log, H160, H256, U256};
use futures::StreamExt;

use crate::models::Asset;
use crate::pipeline::Pipeline;
use crate::registry::Monitor;
use crate::rpc::{EvmRequestClient, EvmStreamClient};
use crate::util::scale_amount;

/// `keccak256("Transfer(address,address,uint256)")` — the standardized
/// ERC-20 transfer event signature (spec.md §4.4, GLOSSARY).
pub const TRANSFER_EVENT_SIGNATURE: &str =
	"0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

const FALLBACK_MAX_ATTEMPTS: u32 = 5;
const FALLBACK_BASE_DELAY: Duration = Duration::from_secs(1);

fn transfer_signature() -> H256 {
	H256::from_str(TRANSFER_EVENT_SIGNATURE).expect("valid literal hash")
}

/// Per `(chain, token_address)` ERC-20 transfer watcher (C4, spec.md §4.4).
pub struct EventIngestor {
	chain: String,
	token_address: H160,
	token_decimals: u32,
	request_client: Arc<dyn EvmRequestClient>,
	monitors: Vec<Monitor>,
	pipeline: Arc<Pipeline>,
}

impl EventIngestor {
	pub fn new(
		chain: String,
		token_address: H160,
		token_decimals: u32,
		request_client: Arc<dyn EvmRequestClient>,
		monitors: &[Monitor],
		pipeline: Arc<Pipeline>,
	) -> Self {
		let monitors = monitors
			.iter()
			.filter(|m| m.token_address == Some(token_address))
			.cloned()
			.collect();
		Self { chain, token_address, token_decimals, request_client, monitors, pipeline }
	}

	fn filter(&self) -> Filter {
		Filter::new().address(self.token_address).topic0(transfer_signature())
	}

	/// Installs an open-ended log subscription (from current head forward)
	/// on the streaming client. Ends the loop on disconnect/decode error
	/// without reconnecting itself, per spec.md §4.4.
	pub async fn run_streaming(self, stream_client: Arc<dyn EvmStreamClient>) {
		let mut logs = match stream_client.subscribe_logs(self.filter()).await {
			Ok(stream) => stream,
			Err(e) => {
				tracing::error!(chain = %self.chain, token = ?self.token_address, error = %e, "log subscription failed");
				return;
			},
		};

		while let Some(log) = logs.next().await {
			self.handle_log(&log).await;
		}

		tracing::warn!(chain = %self.chain, token = ?self.token_address, "log subscription ended");
	}

	/// HTTP fallback used only when the chain has no streaming client
	/// (spec.md §4.4): a single bounded query `fromBlock = toBlock = height`,
	/// retried with linear backoff on rate-limit responses.
	pub async fn poll_block(&self, height: u64) {
		let filter = self.filter().from_block(height).to_block(height);

		let mut attempt = 0u32;
		loop {
			attempt += 1;
			match self.request_client.get_logs(&filter).await {
				Ok(logs) => {
					for log in &logs {
						self.handle_log(log).await;
					}
					return;
				},
				Err(e) if is_rate_limited(&e) && attempt < FALLBACK_MAX_ATTEMPTS => {
					let delay = FALLBACK_BASE_DELAY * attempt;
					tracing::warn!(chain = %self.chain, attempt, delay_secs = delay.as_secs(), "rate limited querying logs, backing off");
					tokio::time::sleep(delay).await;
				},
				Err(e) => {
					tracing::error!(chain = %self.chain, block = height, error = %e, "log query failed, dropping this tick");
					return;
				},
			}
		}
	}

	async fn handle_log(&self, log: &Log) {
		if log.topics.len() < 3 {
			tracing::warn!(chain = %self.chain, tx_hash = ?log.transaction_hash, "malformed transfer log topics, skipping");
			return;
		}

		let to = H160::from(log.topics[2]);

		if !self.monitors.iter().any(|m| crate::util::addresses_eq(&m.wallet_address, &to)) {
			return;
		}

		if log.data.len() < 32 {
			tracing::warn!(chain = %self.chain, tx_hash = ?log.transaction_hash, "malformed transfer log data, skipping");
			return;
		}

		let value = U256::from_big_endian(&log.data[log.data.len() - 32..]);
		let amount = scale_amount(value, self.token_decimals);

		let Some(tx_hash) = log.transaction_hash else {
			tracing::warn!(chain = %self.chain, "log missing transaction hash, skipping");
			return;
		};

		// The spec fixes this as always taken from the log (never defaulted
		// to 0) — a mined log always carries a block number.
		let Some(block_number) = log.block_number else {
			tracing::warn!(chain = %self.chain, tx_hash = %format!("{tx_hash:#x}"), "log missing block number, skipping");
			return;
		};

		if let Err(e) = self
			.pipeline
			.record(
				format!("{tx_hash:#x}"),
				self.chain.clone(),
				format!("{to:#x}"),
				Some(format!("{:#x}", self.token_address)),
				Asset::Erc20,
				amount,
				self.token_decimals as i32,
				block_number.as_u64() as i64,
			)
			.await
		{
			tracing::error!(chain = %self.chain, tx_hash = %format!("{tx_hash:#x}"), error = %e, "failed to record erc20 deposit");
		}
	}
}

fn is_rate_limited(e: &anyhow::Error) -> bool {
	let msg = e.to_string().to_ascii_lowercase();
	msg.contains("429") || msg.contains("rate limit") || msg.contains("too many requests")
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::notifier::LoggingNotifier;
	use crate::store::memory::InMemoryDepositStore;
	use ethers::types::{Block, Transaction, H256, U64};

	struct FlakyThenOkRequest {
		remaining_failures: std::sync::atomic::AtomicU32,
		log: Log,
	}

	#[async_trait::async_trait]
	impl EvmRequestClient for FlakyThenOkRequest {
		async fn block_number(&self) -> anyhow::Result<u64> {
			Ok(0)
		}
		async fn get_logs(&self, _filter: &Filter) -> anyhow::Result<Vec<Log>> {
			if self.remaining_failures.load(std::sync::atomic::Ordering::SeqCst) > 0 {
				self.remaining_failures.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
				anyhow::bail!("429 Too Many Requests");
			}
			Ok(vec![self.log.clone()])
		}
		async fn block_with_txs(&self, _number: u64) -> anyhow::Result<Option<Block<Transaction>>> {
			Ok(None)
		}
	}

	fn transfer_log(token: H160, to: H160, value: U256, block_number: u64) -> Log {
		let mut data = [0u8; 32];
		value.to_big_endian(&mut data);
		Log {
			address: token,
			topics: vec![transfer_signature(), H256::zero(), H256::from(to)],
			data: data.to_vec().into(),
			block_number: Some(U64::from(block_number)),
			transaction_hash: Some(H256::random()),
			..Default::default()
		}
	}

	#[tokio::test]
	async fn erc20_transfer_to_monitor_is_recorded() {
		let token = H160::repeat_byte(0x11);
		let wallet = H160::repeat_byte(0xbb);
		let store = Arc::new(InMemoryDepositStore::new());
		let pipeline = Arc::new(Pipeline::new(store.clone(), Arc::new(LoggingNotifier)));

		let log = transfer_log(token, wallet, U256::from(5_000_000u128), 500);
		let request = Arc::new(FlakyThenOkRequest {
			remaining_failures: std::sync::atomic::AtomicU32::new(0),
			log,
		});

		let ingestor = EventIngestor::new(
			"ETH".to_string(),
			token,
			6,
			request,
			&[Monitor { wallet_address: wallet, token_address: Some(token), token_decimals: 6 }],
			pipeline,
		);

		ingestor.poll_block(500).await;
		assert_eq!(store.len(), 1);
		let recorded = store.all().remove(0);
		assert_eq!(recorded.asset, Asset::Erc20);
		assert_eq!(recorded.block_number, 500);
	}

	#[tokio::test]
	async fn rate_limit_backoff_eventually_succeeds() {
		let token = H160::repeat_byte(0x11);
		let wallet = H160::repeat_byte(0xbb);
		let store = Arc::new(InMemoryDepositStore::new());
		let pipeline = Arc::new(Pipeline::new(store.clone(), Arc::new(LoggingNotifier)));

		let log = transfer_log(token, wallet, U256::from(1_000_000u128), 500);
		let request = Arc::new(FlakyThenOkRequest {
			remaining_failures: std::sync::atomic::AtomicU32::new(2),
			log,
		});

		let ingestor = EventIngestor::new(
			"ETH".to_string(),
			token,
			6,
			request,
			&[Monitor { wallet_address: wallet, token_address: Some(token), token_decimals: 6 }],
			pipeline,
		);

		ingestor.poll_block(500).await;
		assert_eq!(store.len(), 1);
	}

	#[tokio::test]
	async fn non_monitored_token_to_address_is_ignored() {
		let token = H160::repeat_byte(0x11);
		let wallet = H160::repeat_byte(0xbb);
		let other = H160::repeat_byte(0xcc);
		let store = Arc::new(InMemoryDepositStore::new());
		let pipeline = Arc::new(Pipeline::new(store.clone(), Arc::new(LoggingNotifier)));

		let log = transfer_log(token, other, U256::from(1_000_000u128), 500);
		let request = Arc::new(FlakyThenOkRequest {
			remaining_failures: std::sync::atomic::AtomicU32::new(0),
			log,
		});

		let ingestor = EventIngestor::new(
			"ETH".to_string(),
			token,
			6,
			request,
			&[Monitor { wallet_address: wallet, token_address: Some(token), token_decimals: 6 }],
			pipeline,
		);

		ingestor.poll_block(500).await;
		assert!(store.is_empty());
	}
}
