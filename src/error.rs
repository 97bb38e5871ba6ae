pub type EngineResult<T> = Result<T, EngineError>;

/// Crate-local error taxonomy. Cross-task boundaries mostly use `anyhow::Result`
/// instead, following the teacher's convention of `anyhow` at witnesser entry
/// points and narrower `thiserror` enums for library-internal failure modes.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
	#[error("configuration error for chain {chain}: {reason}")]
	Config { chain: String, reason: String },

	#[error("no chains configured")]
	NoChainsConfigured,

	#[error("storage error: {0}")]
	Storage(#[source] sqlx::Error),

	#[error("rpc error: {0}")]
	Rpc(#[source] anyhow::Error),
}

impl EngineError {
	/// `true` when the underlying storage failure is a unique-key violation
	/// on `tx_hash` — the dedup serialization point described by the spec's
	/// "at-least-once to effectively-once" design note.
	pub fn is_duplicate_tx_hash(&self) -> bool {
		matches!(self, EngineError::Storage(e) if e
			.as_database_error()
			.map(|db| db.is_unique_violation())
			.unwrap_or(false))
	}
}

impl From<sqlx::Error> for EngineError {
	fn from(e: sqlx::Error) -> Self {
		EngineError::Storage(e)
	}
}
