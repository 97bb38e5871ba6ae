use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_stream::StreamExt as _;

use crate::confirmation::ConfirmationTracker;
use crate::config::Settings;
use crate::ingestion::block_ingestor::BlockIngestor;
use crate::ingestion::event_ingestor::EventIngestor;
use crate::notifier::Notifier;
use crate::pipeline::Pipeline;
use crate::registry::ChainClientRegistry;
use crate::store::DepositStore;

const HTTP_FALLBACK_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

/// Top-level wiring (spec.md §3): one [`BlockIngestor`] and, per monitored
/// token, one [`EventIngestor`] per chain, plus one [`ConfirmationTracker`]
/// per chain sharing a single worker pool. Owns every spawned task's
/// [`JoinHandle`] so shutdown can be orderly.
pub struct Engine {
	registry: Arc<ChainClientRegistry>,
	tasks: Vec<JoinHandle<()>>,
}

impl Engine {
	pub async fn start(
		settings: &Settings,
		store: Arc<dyn DepositStore>,
		notifier: Arc<dyn Notifier>,
	) -> anyhow::Result<Self> {
		let registry = Arc::new(ChainClientRegistry::from_config(settings).await?);
		let pipeline = Arc::new(Pipeline::new(store.clone(), notifier.clone()));

		let chains: Vec<String> = registry.supported_chains().map(str::to_owned).collect();
		let pool = ConfirmationTracker::worker_pool(chains.len());

		let mut tasks = Vec::new();

		for chain in &chains {
			let Some(request_client) = registry.request_client(chain) else { continue };
			let monitors = registry.monitors(chain).to_vec();

			if let Some(stream_client) = registry.stream_client(chain) {
				let ingestor = BlockIngestor::new(
					chain.clone(),
					request_client.clone(),
					stream_client.clone(),
					&monitors,
					pipeline.clone(),
				);
				tasks.push(tokio::spawn(ingestor.run()));

				for monitor in monitors.iter().filter(|m| m.token_address.is_some()) {
					let token_address = monitor.token_address.unwrap();
					let ingestor = EventIngestor::new(
						chain.clone(),
						token_address,
						monitor.token_decimals,
						request_client.clone(),
						&monitors,
						pipeline.clone(),
					);
					let stream_client = stream_client.clone();
					tasks.push(tokio::spawn(ingestor.run_streaming(stream_client)));
				}
			} else {
				tracing::info!(chain = %chain, "no streaming client available, falling back to HTTP polling");
				tasks.push(tokio::spawn(run_http_fallback(
					chain.clone(),
					request_client.clone(),
					monitors.clone(),
					pipeline.clone(),
				)));
			}

			let tracker = ConfirmationTracker::new(
				chain.clone(),
				request_client,
				store.clone(),
				notifier.clone(),
				registry.required_confirmations(chain),
				pool.clone(),
			);
			tasks.push(tokio::spawn(tracker.run()));
		}

		Ok(Self { registry, tasks })
	}

	/// Aborts every spawned task, then shuts down the chain client registry.
	/// Best-effort: an already-finished task is simply skipped.
	pub async fn shutdown(self) {
		for task in &self.tasks {
			task.abort();
		}
		for task in self.tasks {
			let _ = task.await;
		}
		self.registry.shutdown().await;
	}
}

/// Polls every block at a fixed interval for chains with no streaming
/// client, driving both native and ERC-20 ingestion paths off the same
/// discovered height (spec.md §4.3/§4.4's request/response fallback).
async fn run_http_fallback(
	chain: String,
	request_client: Arc<dyn crate::rpc::EvmRequestClient>,
	monitors: Vec<crate::registry::Monitor>,
	pipeline: Arc<Pipeline>,
) {
	let event_ingestors: Vec<EventIngestor> = monitors
		.iter()
		.filter_map(|m| m.token_address)
		.collect::<std::collections::HashSet<_>>()
		.into_iter()
		.map(|token_address| {
			let decimals =
				monitors.iter().find(|m| m.token_address == Some(token_address)).unwrap().token_decimals;
			EventIngestor::new(
				chain.clone(),
				token_address,
				decimals,
				request_client.clone(),
				&monitors,
				pipeline.clone(),
			)
		})
		.collect();

	let native_monitors: Vec<_> = monitors.iter().filter(|m| m.token_address.is_none()).cloned().collect();

	let mut last_seen: Option<u64> = None;
	let mut ticker = tokio::time::interval(HTTP_FALLBACK_POLL_INTERVAL);

	loop {
		ticker.tick().await;

		let head = match request_client.block_number().await {
			Ok(height) => height,
			Err(e) => {
				tracing::error!(chain = %chain, error = %e, "http fallback failed to read chain height");
				continue;
			},
		};

		let from = last_seen.map(|h| h + 1).unwrap_or(head);

		// `then` (rather than a `buffer_unordered`-style combinator) keeps
		// heights strictly sequential, matching spec.md §5's in-chain-order
		// requirement for native-transfer handling.
		tokio_stream::iter(from..=head)
			.then(|height| async {
				if !native_monitors.is_empty() {
					match request_client.block_with_txs(height).await {
						Ok(Some(block)) => {
							for tx in &block.transactions {
								handle_native_tx(&chain, &native_monitors, &pipeline, height, tx).await;
							}
						},
						Ok(None) => {},
						Err(e) => {
							tracing::error!(chain = %chain, block = height, error = %e, "http fallback block fetch failed");
						},
					}
				}

				for ingestor in &event_ingestors {
					ingestor.poll_block(height).await;
				}
			})
			.collect::<Vec<()>>()
			.await;

		last_seen = Some(head);
	}
}

async fn handle_native_tx(
	chain: &str,
	native_monitors: &[crate::registry::Monitor],
	pipeline: &Pipeline,
	height: u64,
	tx: &ethers::types::Transaction,
) {
	let Some(to) = tx.to else { return };
	if tx.value.is_zero() {
		return;
	}

	for monitor in native_monitors {
		if !crate::util::addresses_eq(&monitor.wallet_address, &to) {
			continue;
		}

		let amount = crate::util::scale_amount(tx.value, 18);
		if let Err(e) = pipeline
			.record(
				format!("{:#x}", tx.hash),
				chain.to_string(),
				format!("{:#x}", monitor.wallet_address),
				None,
				crate::models::Asset::Native,
				amount,
				18,
				height as i64,
			)
			.await
		{
			tracing::error!(chain = %chain, tx_hash = %format!("{:#x}", tx.hash), error = %e, "failed to record native deposit via http fallback");
		}
	}
}
