//! Structured logging.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Install the global subscriber. `RUST_LOG` takes precedence over the
/// configured level.
pub fn init_logging(config: &ObservabilityConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},tower_http=info", config.log_level)));

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_format {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    if let Err(e) = result {
        eprintln!("logging already initialized: {}", e);
    }
}
