use std::sync::Arc;
use std::time::Duration;

use crate::models::{Deposit, DepositStatus};
use crate::notifier::Notifier;
use crate::rpc::EvmRequestClient;
use crate::store::DepositStore;

const TICK_INTERVAL: Duration = Duration::from_secs(5);
const MIN_WORKER_POOL_SIZE: usize = 5;

/// Advances every non-`CONFIRMED` deposit on one chain on a fixed cadence
/// (C5, spec.md §4.5): pulls the chain's current height, recomputes each
/// pending deposit's confirmation count, and persists the transition.
pub struct ConfirmationTracker {
	chain: String,
	request_client: Arc<dyn EvmRequestClient>,
	store: Arc<dyn DepositStore>,
	notifier: Arc<dyn Notifier>,
	required_confirmations: u64,
	pool: Arc<tokio::sync::Semaphore>,
}

impl ConfirmationTracker {
	pub fn new(
		chain: String,
		request_client: Arc<dyn EvmRequestClient>,
		store: Arc<dyn DepositStore>,
		notifier: Arc<dyn Notifier>,
		required_confirmations: u64,
		pool: Arc<tokio::sync::Semaphore>,
	) -> Self {
		Self { chain, request_client, store, notifier, required_confirmations, pool }
	}

	/// Sizes the shared worker pool used by every chain's tracker: at least
	/// [`MIN_WORKER_POOL_SIZE`], or one per chain if there are more chains
	/// than that floor (spec.md §9's fixed "open question" on concurrency).
	pub fn worker_pool(num_chains: usize) -> Arc<tokio::sync::Semaphore> {
		Arc::new(tokio::sync::Semaphore::new(num_chains.max(MIN_WORKER_POOL_SIZE)))
	}

	/// Runs forever on a 5-second cadence until the task is aborted. A tick
	/// that fails to reach the chain (RPC error) is logged and abandoned —
	/// the next tick tries again. A single deposit that fails mid-tick is
	/// logged and skipped, isolated from the rest of the tick's batch.
	pub async fn run(self) {
		let mut ticker = tokio::time::interval(TICK_INTERVAL);
		loop {
			ticker.tick().await;

			let _permit = match self.pool.clone().acquire_owned().await {
				Ok(permit) => permit,
				Err(_) => return,
			};

			if let Err(e) = self.tick().await {
				tracing::error!(chain = %self.chain, error = %e, "confirmation tick aborted");
			}
		}
	}

	/// Runs a single tick: fetches the chain's height once and advances
	/// every pending deposit against it. Exposed directly (rather than only
	/// through [`Self::run`]'s timer loop) so tests can drive specific
	/// head-height sequences without waiting on real time.
	pub async fn tick(&self) -> anyhow::Result<()> {
		let head = self.request_client.block_number().await?;

		let pending = self
			.store
			.find_by_status_in(&[DepositStatus::Unconfirmed, DepositStatus::Confirming])
			.await?;

		for deposit in pending.into_iter().filter(|d| d.chain.eq_ignore_ascii_case(&self.chain)) {
			if let Err(e) = self.advance(deposit, head).await {
				tracing::error!(chain = %self.chain, error = %e, "failed to advance deposit confirmation state");
			}
		}

		Ok(())
	}

	async fn advance(&self, mut deposit: Deposit, head: u64) -> anyhow::Result<()> {
		if head < deposit.block_number as u64 {
			// Chain reported a height behind the deposit's own block — a
			// reorg or a stale RPC node. Leave the deposit untouched.
			return Ok(());
		}

		let confirm_count = (head - deposit.block_number as u64) as i64;
		let next_status = if confirm_count as u64 >= self.required_confirmations {
			DepositStatus::Confirmed
		} else {
			DepositStatus::Confirming
		};

		if !deposit.status.may_advance_to(next_status) {
			return Ok(());
		}

		let became_confirmed =
			next_status == DepositStatus::Confirmed && deposit.status != DepositStatus::Confirmed;

		deposit.confirmations = confirm_count;
		deposit.status = next_status;
		deposit.updated_at = chrono::Utc::now();

		self.store.save(&mut deposit).await?;

		if became_confirmed {
			self.notifier.on_deposit_confirmed(&deposit).await;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::Asset;
	use crate::notifier::LoggingNotifier;
	use crate::store::memory::InMemoryDepositStore;
	use ethers::types::{Block, Filter, Log, Transaction};
	use rust_decimal::Decimal;

	struct FakeHeight(u64);

	#[async_trait::async_trait]
	impl EvmRequestClient for FakeHeight {
		async fn block_number(&self) -> anyhow::Result<u64> {
			Ok(self.0)
		}
		async fn get_logs(&self, _filter: &Filter) -> anyhow::Result<Vec<Log>> {
			Ok(vec![])
		}
		async fn block_with_txs(&self, _number: u64) -> anyhow::Result<Option<Block<Transaction>>> {
			Ok(None)
		}
	}

	async fn seed(store: &InMemoryDepositStore, block_number: i64) {
		let mut deposit = Deposit::new_unconfirmed(
			format!("0xTX{block_number}"),
			"ETH".to_string(),
			"0xAAA".to_string(),
			None,
			Asset::Native,
			Decimal::ONE,
			18,
			block_number,
		);
		store.save(&mut deposit).await.unwrap();
	}

	fn tracker(
		request_client: Arc<dyn EvmRequestClient>,
		store: Arc<dyn DepositStore>,
		required_confirmations: u64,
	) -> ConfirmationTracker {
		ConfirmationTracker::new(
			"ETH".to_string(),
			request_client,
			store,
			Arc::new(LoggingNotifier),
			required_confirmations,
			ConfirmationTracker::worker_pool(1),
		)
	}

	#[tokio::test]
	async fn moves_to_confirming_below_threshold() {
		let store = Arc::new(InMemoryDepositStore::new());
		seed(&store, 100).await;

		let tracker = tracker(Arc::new(FakeHeight(105)), store.clone(), 12);
		tracker.tick().await.unwrap();

		let deposit = store.all().remove(0);
		assert_eq!(deposit.status, DepositStatus::Confirming);
		assert_eq!(deposit.confirmations, 5);
	}

	#[tokio::test]
	async fn moves_to_confirmed_at_threshold() {
		let store = Arc::new(InMemoryDepositStore::new());
		seed(&store, 100).await;

		let tracker = tracker(Arc::new(FakeHeight(112)), store.clone(), 12);
		tracker.tick().await.unwrap();

		let deposit = store.all().remove(0);
		assert_eq!(deposit.status, DepositStatus::Confirmed);
		assert_eq!(deposit.confirmations, 12);
	}

	#[tokio::test]
	async fn two_ticks_reach_confirmed_for_erc20_like_threshold() {
		let store = Arc::new(InMemoryDepositStore::new());
		seed(&store, 100).await;

		let tracker = tracker(Arc::new(FakeHeight(106)), store.clone(), 12);
		tracker.tick().await.unwrap();
		assert_eq!(store.all().remove(0).status, DepositStatus::Confirming);

		let tracker = tracker(Arc::new(FakeHeight(112)), store.clone(), 12);
		tracker.tick().await.unwrap();
		assert_eq!(store.all().remove(0).status, DepositStatus::Confirmed);
	}

	#[tokio::test]
	async fn never_regresses_status() {
		let store = Arc::new(InMemoryDepositStore::new());
		seed(&store, 100).await;

		let tracker = tracker(Arc::new(FakeHeight(112)), store.clone(), 12);
		tracker.tick().await.unwrap();
		assert_eq!(store.all().remove(0).status, DepositStatus::Confirmed);

		// A stale/reorged head behind the deposit's block must not move it
		// backwards; advance() already guards confirm_count going negative.
		let tracker = tracker(Arc::new(FakeHeight(104)), store.clone(), 12);
		tracker.tick().await.unwrap();
		assert_eq!(store.all().remove(0).status, DepositStatus::Confirmed);
	}

	#[tokio::test]
	async fn rpc_failure_aborts_tick_without_touching_store() {
		use crate::rpc::mocks::MockEvmRequestClient;

		let store = Arc::new(InMemoryDepositStore::new());
		seed(&store, 100).await;

		let mut mock_client = MockEvmRequestClient::new();
		mock_client.expect_block_number().returning(|| Err(anyhow::anyhow!("rpc unavailable")));

		let tracker = tracker(Arc::new(mock_client), store.clone(), 12);
		assert!(tracker.tick().await.is_err());

		// The head query failed before any deposit was even read, so the
		// seeded row must be untouched.
		let deposit = store.all().remove(0);
		assert_eq!(deposit.status, DepositStatus::Unconfirmed);
		assert_eq!(deposit.confirmations, 0);
	}

	#[tokio::test]
	async fn deposit_on_other_chain_is_ignored() {
		let store = Arc::new(InMemoryDepositStore::new());
		let mut deposit = Deposit::new_unconfirmed(
			"0xOTHER".to_string(),
			"BSC".to_string(),
			"0xAAA".to_string(),
			None,
			Asset::Native,
			Decimal::ONE,
			18,
			100,
		);
		store.save(&mut deposit).await.unwrap();

		let tracker = tracker(Arc::new(FakeHeight(200)), store.clone(), 12);
		tracker.tick().await.unwrap();

		assert_eq!(store.all().remove(0).status, DepositStatus::Unconfirmed);
	}
}
