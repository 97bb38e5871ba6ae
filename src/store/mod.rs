pub mod memory;
pub mod postgres;

use async_trait::async_trait;

use crate::models::{Deposit, DepositStatus};

/// The deposit ledger's access contract (spec.md §4.2). Any engine that
/// satisfies these three operations — with a uniqueness constraint on
/// `tx_hash` enforced at the storage layer — is a valid backing store.
#[async_trait]
pub trait DepositStore: Send + Sync {
	async fn find_by_tx_hash(&self, tx_hash: &str) -> anyhow::Result<Option<Deposit>>;

	/// Inserts when `deposit.id` is `None`, updates otherwise. Implementers
	/// must surface a duplicate-`tx_hash` insert as a distinguishable error
	/// (see `EngineError::is_duplicate_tx_hash`) rather than silently
	/// overwriting — the pipeline relies on that to implement dedup.
	async fn save(&self, deposit: &mut Deposit) -> anyhow::Result<()>;

	/// All deposits not yet `CONFIRMED`, across every chain; the caller
	/// (the confirmation tracker) filters by chain itself.
	async fn find_by_status_in(
		&self,
		statuses: &[DepositStatus],
	) -> anyhow::Result<Vec<Deposit>>;
}
