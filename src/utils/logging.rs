//! Tracing bootstrap for the aggregator binary

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable holding the tracing filter directive
pub const LOG_ENV: &str = "AGGREGATOR_LOG";

/// Initialize tracing with the `AGGREGATOR_LOG` environment variable.
///
/// Defaults to "info" level if `AGGREGATOR_LOG` is not set or invalid.
/// Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
