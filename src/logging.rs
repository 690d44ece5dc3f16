//! Logging setup for the CLI

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Initialize stderr logging. `RUST_LOG` takes precedence over `level`.
pub fn init_logging(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,reviewrag={}", level)));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_line_number(false)
        .compact()
        .with_writer(std::io::stderr);

    // try_init: a second call (tests, embedding hosts) is a no-op
    let _ = Registry::default()
        .with(env_filter)
        .with(console_layer)
        .try_init();

    tracing::debug!(level, "logging initialized");
}
