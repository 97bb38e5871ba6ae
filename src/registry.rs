use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::H160;

use crate::config::Settings;
use crate::error::EngineError;
use crate::rpc::ethers_client::{EthersRequestClient, EthersStreamClient};
use crate::rpc::{EvmRequestClient, EvmStreamClient};

const DEFAULT_REQUIRED_CONFIRMATIONS: u64 = 12;

/// `(wallet, optional-token, decimals)` — one thing to watch on a chain.
#[derive(Debug, Clone)]
pub struct Monitor {
	pub wallet_address: H160,
	pub token_address: Option<H160>,
	pub token_decimals: u32,
}

struct ChainEntry {
	request_client: Arc<dyn EvmRequestClient>,
	stream_client: Option<Arc<dyn EvmStreamClient>>,
	required_confirmations: u64,
	monitors: Vec<Monitor>,
}

/// Owns, per chain, one required request/response client, one optional
/// streaming client, the confirmation depth, and the monitor list
/// (spec.md §4.1). Built once at startup and read concurrently thereafter
/// without locks — the only mutation point is construction.
pub struct ChainClientRegistry {
	chains: HashMap<String, ChainEntry>,
}

impl ChainClientRegistry {
	/// Builds the registry from configuration. A malformed chain entry
	/// (bad address, missing token decimals) is logged and skipped; the
	/// remaining chains still start. A failed streaming connection leaves
	/// that chain's `stream_client` as `None` and is not fatal.
	pub async fn from_config(settings: &Settings) -> anyhow::Result<Self> {
		let mut chains = HashMap::new();

		for chain_cfg in &settings.chains {
			let name: &'static str = Box::leak(chain_cfg.name.clone().into_boxed_str());

			let request_client = match EthersRequestClient::new(&chain_cfg.http_url, name) {
				Ok(client) => client,
				Err(e) => {
					let error = EngineError::Config {
						chain: chain_cfg.name.clone(),
						reason: format!("failed to build request client: {e}"),
					};
					tracing::warn!(chain = %chain_cfg.name, error = %error, "skipping chain");
					continue;
				},
			};

			let stream_client: Option<Arc<dyn EvmStreamClient>> = match &chain_cfg.ws_url {
				Some(ws_url) => match EthersStreamClient::connect(ws_url, name).await {
					Ok(client) => Some(Arc::new(client)),
					Err(e) => {
						tracing::error!(chain = %chain_cfg.name, error = %e, "streaming connect failed, continuing with request/response only");
						None
					},
				},
				None => None,
			};

			let mut monitors = Vec::new();
			for monitor_cfg in &chain_cfg.monitor {
				let wallet_address = match H160::from_str(
					monitor_cfg.wallet_address.trim_start_matches("0x"),
				) {
					Ok(addr) => addr,
					Err(e) => {
						let error = EngineError::Config {
							chain: chain_cfg.name.clone(),
							reason: format!("bad wallet address {}: {e}", monitor_cfg.wallet_address),
						};
						tracing::warn!(chain = %chain_cfg.name, error = %error, "skipping monitor");
						continue;
					},
				};

				let token_address = match &monitor_cfg.token_address {
					Some(addr) => match H160::from_str(addr.trim_start_matches("0x")) {
						Ok(addr) => Some(addr),
						Err(e) => {
							let error = EngineError::Config {
								chain: chain_cfg.name.clone(),
								reason: format!("bad token address {addr}: {e}"),
							};
							tracing::warn!(chain = %chain_cfg.name, error = %error, "skipping monitor");
							continue;
						},
					},
					None => None,
				};

				let token_decimals = if token_address.is_some() {
					match monitor_cfg.token_decimals {
						Some(decimals) => decimals,
						None => {
							let error = EngineError::Config {
								chain: chain_cfg.name.clone(),
								reason: "tokenAddress set without tokenDecimals".to_string(),
							};
							tracing::warn!(chain = %chain_cfg.name, error = %error, "skipping monitor");
							continue;
						},
					}
				} else {
					18
				};

				monitors.push(Monitor { wallet_address, token_address, token_decimals });
			}

			chains.insert(
				chain_cfg.name.clone(),
				ChainEntry {
					request_client: Arc::new(request_client),
					stream_client,
					required_confirmations: if chain_cfg.required_confirmations == 0 {
						DEFAULT_REQUIRED_CONFIRMATIONS
					} else {
						chain_cfg.required_confirmations
					},
					monitors,
				},
			);
		}

		if chains.is_empty() {
			return Err(EngineError::NoChainsConfigured.into());
		}

		Ok(Self { chains })
	}

	pub fn supported_chains(&self) -> impl Iterator<Item = &str> {
		self.chains.keys().map(String::as_str)
	}

	pub fn request_client(&self, chain: &str) -> Option<Arc<dyn EvmRequestClient>> {
		self.chains.get(chain).map(|c| c.request_client.clone())
	}

	pub fn stream_client(&self, chain: &str) -> Option<Arc<dyn EvmStreamClient>> {
		self.chains.get(chain).and_then(|c| c.stream_client.clone())
	}

	pub fn required_confirmations(&self, chain: &str) -> u64 {
		self.chains
			.get(chain)
			.map(|c| c.required_confirmations)
			.unwrap_or(DEFAULT_REQUIRED_CONFIRMATIONS)
	}

	pub fn monitors(&self, chain: &str) -> &[Monitor] {
		self.chains.get(chain).map(|c| c.monitors.as_slice()).unwrap_or(&[])
	}

	/// Closes streaming sessions first, then drops every client. Best-effort:
	/// a client that fails to close cleanly is logged and otherwise ignored.
	pub async fn shutdown(&self) {
		for (name, entry) in &self.chains {
			if entry.stream_client.is_some() {
				tracing::info!(chain = %name, "closing streaming session");
			}
		}
		tracing::info!("chain client registry shut down");
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::{ChainConfig, MonitorConfig};

	#[tokio::test]
	async fn bad_chain_entry_is_skipped_others_survive() {
		let settings = Settings {
			chains: vec![
				ChainConfig {
					name: "BAD".to_string(),
					http_url: "not a url".to_string(),
					ws_url: None,
					required_confirmations: 12,
					monitor: vec![],
				},
				ChainConfig {
					name: "GOOD".to_string(),
					http_url: "http://127.0.0.1:8545".to_string(),
					ws_url: None,
					required_confirmations: 6,
					monitor: vec![MonitorConfig {
						wallet_address: "0x000000000000000000000000000000000000aa".to_string(),
						token_address: None,
						token_decimals: None,
					}],
				},
			],
			database_url: String::new(),
			http_listen_addr: None,
		};

		let registry = ChainClientRegistry::from_config(&settings).await.unwrap();
		let supported: Vec<&str> = registry.supported_chains().collect();
		assert!(supported.contains(&"GOOD"));
		assert_eq!(registry.required_confirmations("GOOD"), 6);
		assert_eq!(registry.monitors("GOOD").len(), 1);
	}

	#[tokio::test]
	async fn default_confirmations_applied_when_zero() {
		let settings = Settings {
			chains: vec![ChainConfig {
				name: "ETH".to_string(),
				http_url: "http://127.0.0.1:8545".to_string(),
				ws_url: None,
				required_confirmations: 0,
				monitor: vec![],
			}],
			database_url: String::new(),
			http_listen_addr: None,
		};
		let registry = ChainClientRegistry::from_config(&settings).await.unwrap();
		assert_eq!(registry.required_confirmations("ETH"), DEFAULT_REQUIRED_CONFIRMATIONS);
	}
}
