use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use deposit_watcher::config::{Options, Settings};
use deposit_watcher::engine::Engine;
use deposit_watcher::notifier::{LoggingNotifier, Notifier};
use deposit_watcher::store::postgres::PostgresDepositStore;
use deposit_watcher::store::DepositStore;
use deposit_watcher::{http, logging};

#[tokio::main]
async fn main() {
	let opts = Options::parse();

	let settings = match Settings::load(opts) {
		Ok(settings) => settings,
		Err(e) => {
			eprintln!("failed to load configuration: {e}");
			std::process::exit(1);
		},
	};

	logging::init();

	if let Err(e) = run(settings).await {
		tracing::error!(error = %e, "fatal error, shutting down");
		std::process::exit(1);
	}
}

async fn run(settings: Settings) -> anyhow::Result<()> {
	let store: Arc<dyn DepositStore> = {
		let pg = PostgresDepositStore::connect(&settings.database_url).await?;
		pg.migrate().await?;
		Arc::new(pg)
	};
	let notifier: Arc<dyn Notifier> = Arc::new(LoggingNotifier);

	let engine = Engine::start(&settings, store.clone(), notifier).await?;

	let http_handle = settings.http_listen_addr.as_deref().map(|addr| {
		let addr: SocketAddr = addr.parse().expect("invalid http_listen_addr");
		let store = store.clone();
		tokio::spawn(async move { http::serve(store, addr).await })
	});

	tracing::info!("deposit watcher running, press ctrl-c to stop");
	tokio::signal::ctrl_c().await?;
	tracing::info!("shutdown signal received");

	if let Some(handle) = http_handle {
		handle.abort();
	}
	engine.shutdown().await;

	Ok(())
}
