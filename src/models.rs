use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Native-coin vs. ERC-20 tag, derived from `token_address`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Asset {
	Native,
	Erc20,
}

/// Confirmation state machine. Ordering matters: `CONFIRMING > UNCONFIRMED`
/// and `CONFIRMED > CONFIRMING`, enforced by [`DepositStatus::may_advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DepositStatus {
	Unconfirmed,
	Confirming,
	Confirmed,
}

impl DepositStatus {
	/// `true` unless `next` would move the status backwards in the
	/// `UNCONFIRMED < CONFIRMING < CONFIRMED` ordering.
	pub fn may_advance_to(self, next: DepositStatus) -> bool {
		next >= self
	}
}

/// The single core entity tracked by the engine, matching the storage
/// schema in the spec verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Deposit {
	pub id: Option<i64>,
	pub tx_hash: String,
	pub monitored_address: String,
	pub user_address: Option<String>,
	pub chain: String,
	pub token_address: Option<String>,
	pub asset: Asset,
	pub amount: Decimal,
	pub decimals: i32,
	pub block_number: i64,
	pub status: DepositStatus,
	pub confirmations: i64,
	pub created_at: DateTime<Utc>,
	pub updated_at: DateTime<Utc>,
}

impl Deposit {
	/// Builds a freshly-observed deposit in its initial `UNCONFIRMED` state.
	/// Invariant 4 (`amount > 0`) and invariant 3 (`asset == NATIVE` iff
	/// `token_address` is absent) are the caller's responsibility — enforced
	/// by [`crate::pipeline::Pipeline::record`] before this is ever built.
	#[allow(clippy::too_many_arguments)]
	pub fn new_unconfirmed(
		tx_hash: String,
		chain: String,
		monitored_address: String,
		token_address: Option<String>,
		asset: Asset,
		amount: Decimal,
		decimals: i32,
		block_number: i64,
	) -> Self {
		let now = Utc::now();
		Self {
			id: None,
			tx_hash,
			monitored_address,
			user_address: None,
			chain,
			token_address,
			asset,
			amount,
			decimals,
			block_number,
			status: DepositStatus::Unconfirmed,
			confirmations: 0,
			created_at: now,
			updated_at: now,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn status_ordering_forbids_going_backwards() {
		assert!(DepositStatus::Unconfirmed.may_advance_to(DepositStatus::Confirming));
		assert!(DepositStatus::Unconfirmed.may_advance_to(DepositStatus::Confirmed));
		assert!(DepositStatus::Confirming.may_advance_to(DepositStatus::Confirmed));
		assert!(DepositStatus::Confirming.may_advance_to(DepositStatus::Confirming));
		assert!(!DepositStatus::Confirming.may_advance_to(DepositStatus::Unconfirmed));
		assert!(!DepositStatus::Confirmed.may_advance_to(DepositStatus::Confirming));
	}
}
