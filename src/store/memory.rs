use std::sync::Mutex;

use async_trait::async_trait;

use crate::models::{Deposit, DepositStatus};

use super::DepositStore;

/// In-process fake satisfying the same uniqueness-on-`tx_hash` contract as
/// the Postgres store, used to exercise the pipeline and confirmation
/// tracker's state-machine logic without a database.
#[derive(Default)]
pub struct InMemoryDepositStore {
	deposits: Mutex<Vec<Deposit>>,
}

impl InMemoryDepositStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn len(&self) -> usize {
		self.deposits.lock().unwrap().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn all(&self) -> Vec<Deposit> {
		self.deposits.lock().unwrap().clone()
	}
}

#[async_trait]
impl DepositStore for InMemoryDepositStore {
	async fn find_by_tx_hash(&self, tx_hash: &str) -> anyhow::Result<Option<Deposit>> {
		Ok(self.deposits.lock().unwrap().iter().find(|d| d.tx_hash == tx_hash).cloned())
	}

	async fn save(&self, deposit: &mut Deposit) -> anyhow::Result<()> {
		let mut deposits = self.deposits.lock().unwrap();
		match deposit.id {
			None => {
				if deposits.iter().any(|d| d.tx_hash == deposit.tx_hash) {
					anyhow::bail!("duplicate tx_hash {}", deposit.tx_hash);
				}
				deposit.id = Some(deposits.len() as i64 + 1);
				deposits.push(deposit.clone());
			},
			Some(id) => {
				if let Some(existing) = deposits.iter_mut().find(|d| d.id == Some(id)) {
					existing.status = deposit.status;
					existing.confirmations = deposit.confirmations;
					existing.updated_at = deposit.updated_at;
				} else {
					anyhow::bail!("no deposit with id {id}");
				}
			},
		}
		Ok(())
	}

	async fn find_by_status_in(
		&self,
		statuses: &[DepositStatus],
	) -> anyhow::Result<Vec<Deposit>> {
		Ok(self
			.deposits
			.lock()
			.unwrap()
			.iter()
			.filter(|d| statuses.contains(&d.status))
			.cloned()
			.collect())
	}
}
