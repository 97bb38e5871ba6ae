/// Installs the global `tracing` subscriber, reading filter directives from
/// `RUST_LOG` (defaulting to `info` when unset).
pub fn init() {
	tracing_subscriber::FmtSubscriber::builder()
		.with_env_filter(
			tracing_subscriber::EnvFilter::try_from_default_env()
				.unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
		)
		.try_init()
		.ok();
}
