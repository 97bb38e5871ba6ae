use async_trait::async_trait;

use crate::models::Deposit;

/// Forwards state-change events to downstream consumers. Per spec.md §6
/// this must be non-blocking or fast, and failures inside it must never
/// propagate back into the engine — both call sites log and discard the
/// result rather than `?`-propagating it.
#[async_trait]
pub trait Notifier: Send + Sync {
	async fn on_new_deposit(&self, deposit: &Deposit);

	async fn on_deposit_confirmed(&self, deposit: &Deposit);
}

/// Default notifier: logs via `tracing` and never fails. Suitable as a
/// drop-in when no downstream notification channel is wired up.
pub struct LoggingNotifier;

#[async_trait]
impl Notifier for LoggingNotifier {
	async fn on_new_deposit(&self, deposit: &Deposit) {
		tracing::info!(
			chain = %deposit.chain,
			tx_hash = %deposit.tx_hash,
			amount = %deposit.amount,
			"new deposit observed"
		);
	}

	async fn on_deposit_confirmed(&self, deposit: &Deposit) {
		tracing::info!(
			chain = %deposit.chain,
			tx_hash = %deposit.tx_hash,
			confirmations = deposit.confirmations,
			"deposit confirmed"
		);
	}
}
