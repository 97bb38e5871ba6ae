use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, Row};

use crate::error::EngineError;
use crate::models::{Asset, Deposit, DepositStatus};

use super::DepositStore;

/// Relational backing store over the schema in spec.md §6:
/// `deposits(id, tx_hash UNIQUE, ..., status, confirmations, ...)`.
pub struct PostgresDepositStore {
	pool: PgPool,
}

impl PostgresDepositStore {
	pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
		let pool = PgPool::connect(database_url).await?;
		Ok(Self { pool })
	}

	pub fn from_pool(pool: PgPool) -> Self {
		Self { pool }
	}

	/// Creates the `deposits` table and its `tx_hash` uniqueness constraint
	/// if it doesn't already exist. Intended for local/dev bootstrapping;
	/// production deployments are expected to run an external migration.
	pub async fn migrate(&self) -> anyhow::Result<()> {
		sqlx::query(
			r#"
			CREATE TABLE IF NOT EXISTS deposits (
				id BIGSERIAL PRIMARY KEY,
				tx_hash TEXT NOT NULL UNIQUE,
				user_address TEXT,
				monitored_address TEXT NOT NULL,
				chain TEXT NOT NULL,
				token_address TEXT,
				asset TEXT NOT NULL,
				amount NUMERIC(38, 18) NOT NULL,
				decimals INTEGER NOT NULL DEFAULT 18,
				tx_block BIGINT NOT NULL,
				status TEXT NOT NULL,
				confirmations BIGINT NOT NULL DEFAULT 0,
				created_at TIMESTAMPTZ NOT NULL,
				updated_at TIMESTAMPTZ NOT NULL
			)
			"#,
		)
		.execute(&self.pool)
		.await?;
		Ok(())
	}
}

struct DepositRow {
	id: i64,
	tx_hash: String,
	user_address: Option<String>,
	monitored_address: String,
	chain: String,
	token_address: Option<String>,
	asset: String,
	amount: Decimal,
	decimals: i32,
	tx_block: i64,
	status: String,
	confirmations: i64,
	created_at: chrono::DateTime<Utc>,
	updated_at: chrono::DateTime<Utc>,
}

impl FromRow<'_, sqlx::postgres::PgRow> for DepositRow {
	fn from_row(row: &sqlx::postgres::PgRow) -> sqlx::Result<Self> {
		Ok(Self {
			id: row.try_get("id")?,
			tx_hash: row.try_get("tx_hash")?,
			user_address: row.try_get("user_address")?,
			monitored_address: row.try_get("monitored_address")?,
			chain: row.try_get("chain")?,
			token_address: row.try_get("token_address")?,
			asset: row.try_get("asset")?,
			amount: row.try_get("amount")?,
			decimals: row.try_get("decimals")?,
			tx_block: row.try_get("tx_block")?,
			status: row.try_get("status")?,
			confirmations: row.try_get("confirmations")?,
			created_at: row.try_get("created_at")?,
			updated_at: row.try_get("updated_at")?,
		})
	}
}

impl DepositRow {
	fn into_deposit(self) -> anyhow::Result<Deposit> {
		Ok(Deposit {
			id: Some(self.id),
			tx_hash: self.tx_hash,
			monitored_address: self.monitored_address,
			user_address: self.user_address,
			chain: self.chain,
			token_address: self.token_address,
			asset: match self.asset.as_str() {
				"NATIVE" => Asset::Native,
				"ERC20" => Asset::Erc20,
				other => anyhow::bail!("unknown asset tag in storage: {other}"),
			},
			amount: self.amount,
			decimals: self.decimals,
			block_number: self.tx_block,
			status: match self.status.as_str() {
				"UNCONFIRMED" => DepositStatus::Unconfirmed,
				"CONFIRMING" => DepositStatus::Confirming,
				"CONFIRMED" => DepositStatus::Confirmed,
				other => anyhow::bail!("unknown status tag in storage: {other}"),
			},
			confirmations: self.confirmations,
			created_at: self.created_at,
			updated_at: self.updated_at,
		})
	}
}

fn asset_tag(asset: Asset) -> &'static str {
	match asset {
		Asset::Native => "NATIVE",
		Asset::Erc20 => "ERC20",
	}
}

fn status_tag(status: DepositStatus) -> &'static str {
	match status {
		DepositStatus::Unconfirmed => "UNCONFIRMED",
		DepositStatus::Confirming => "CONFIRMING",
		DepositStatus::Confirmed => "CONFIRMED",
	}
}

const SELECT_COLUMNS: &str = "id, tx_hash, user_address, monitored_address, chain, \
	token_address, asset, amount, decimals, tx_block, status, confirmations, \
	created_at, updated_at";

#[async_trait]
impl DepositStore for PostgresDepositStore {
	async fn find_by_tx_hash(&self, tx_hash: &str) -> anyhow::Result<Option<Deposit>> {
		let row: Option<DepositRow> = sqlx::query_as(&format!(
			"SELECT {SELECT_COLUMNS} FROM deposits WHERE tx_hash = $1"
		))
		.bind(tx_hash)
		.fetch_optional(&self.pool)
		.await?;
		row.map(DepositRow::into_deposit).transpose()
	}

	async fn save(&self, deposit: &mut Deposit) -> anyhow::Result<()> {
		deposit.updated_at = Utc::now();
		match deposit.id {
			None => {
				let id: i64 = sqlx::query_scalar(
					"INSERT INTO deposits (
						tx_hash, user_address, monitored_address, chain, token_address,
						asset, amount, decimals, tx_block, status, confirmations,
						created_at, updated_at
					)
					VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
					RETURNING id",
				)
				.bind(&deposit.tx_hash)
				.bind(&deposit.user_address)
				.bind(&deposit.monitored_address)
				.bind(&deposit.chain)
				.bind(&deposit.token_address)
				.bind(asset_tag(deposit.asset))
				.bind(deposit.amount)
				.bind(deposit.decimals)
				.bind(deposit.block_number)
				.bind(status_tag(deposit.status))
				.bind(deposit.confirmations)
				.bind(deposit.created_at)
				.bind(deposit.updated_at)
				.fetch_one(&self.pool)
				.await
				.map_err(EngineError::from)?;
				deposit.id = Some(id);
			},
			Some(id) => {
				sqlx::query(
					"UPDATE deposits SET status = $2, confirmations = $3, updated_at = $4 \
					WHERE id = $1",
				)
				.bind(id)
				.bind(status_tag(deposit.status))
				.bind(deposit.confirmations)
				.bind(deposit.updated_at)
				.execute(&self.pool)
				.await?;
			},
		}
		Ok(())
	}

	async fn find_by_status_in(
		&self,
		statuses: &[DepositStatus],
	) -> anyhow::Result<Vec<Deposit>> {
		let tags: Vec<&'static str> = statuses.iter().copied().map(status_tag).collect();
		let rows: Vec<DepositRow> = sqlx::query_as(&format!(
			"SELECT {SELECT_COLUMNS} FROM deposits WHERE status = ANY($1)"
		))
		.bind(&tags)
		.fetch_all(&self.pool)
		.await?;
		rows.into_iter().map(DepositRow::into_deposit).collect()
	}
}
