use clap::Parser;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

fn default_required_confirmations() -> u64 {
	12
}

/// Field names match the `camelCase` keys of spec.md §6's configuration
/// schema (`walletAddress`, `tokenAddress`, `tokenDecimals`) rather than
/// this crate's usual Rust `snake_case` convention.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitorConfig {
	pub wallet_address: String,
	pub token_address: Option<String>,
	#[serde(default)]
	pub token_decimals: Option<u32>,
}

/// Field names match spec.md §6's `camelCase` schema (`httpUrl`, `wsUrl`,
/// `requiredConfirmations`) — see [`MonitorConfig`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainConfig {
	pub name: String,
	pub http_url: String,
	pub ws_url: Option<String>,
	#[serde(default = "default_required_confirmations")]
	pub required_confirmations: u64,
	#[serde(default)]
	pub monitor: Vec<MonitorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
	pub chains: Vec<ChainConfig>,
	#[serde(default)]
	pub database_url: String,
	#[serde(default)]
	pub http_listen_addr: Option<String>,
}

/// Command-line overrides, following the teacher's pattern of layering
/// `clap`-derived options over the `config`-crate file/env sources with
/// highest precedence.
#[derive(Parser, Debug, Clone, Default)]
#[clap(version, about = "EVM deposit detection and confirmation engine")]
pub struct Options {
	#[clap(long, env = "DEPOSIT_WATCHER_CONFIG")]
	pub config_file: Option<String>,

	#[clap(long, env = "DATABASE_URL")]
	pub database_url: Option<String>,

	#[clap(long, env = "DEPOSIT_WATCHER_HTTP_LISTEN_ADDR")]
	pub http_listen_addr: Option<String>,
}

impl Settings {
	/// Loads settings from, in increasing precedence: built-in defaults, an
	/// optional config file, environment variables prefixed
	/// `DEPOSIT_WATCHER__`, and finally CLI flags.
	pub fn load(opts: Options) -> Result<Self, ConfigError> {
		let mut builder = Config::builder().set_default("database_url", "")?;

		if let Some(path) = &opts.config_file {
			builder = builder.add_source(File::from(std::path::PathBuf::from(path)));
		}

		builder = builder.add_source(Environment::with_prefix("DEPOSIT_WATCHER").separator("__"));

		let mut settings: Settings = builder.build()?.try_deserialize()?;

		if let Some(database_url) = opts.database_url {
			settings.database_url = database_url;
		}
		if opts.http_listen_addr.is_some() {
			settings.http_listen_addr = opts.http_listen_addr;
		}

		settings.validate().map_err(|reason| ConfigError::Message(reason))?;

		Ok(settings)
	}

	/// Basic structural validation. Per-chain errors are the registry's
	/// concern (a malformed chain entry is skipped, not fatal); this only
	/// catches configuration that can't produce any working chain at all.
	fn validate(&self) -> Result<(), String> {
		if self.chains.is_empty() {
			return Err("no chains configured".to_string());
		}
		Ok(())
	}
}
