//! Tracing setup for the command-line tools.
//!
//! The library itself only emits events; installing a subscriber is up to
//! whoever embeds it. Filtering comes from `RUST_LOG` and defaults to `warn`.

use std::sync::Once;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

static INIT: Once = Once::new();

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Installs a human-readable subscriber writing to stderr. Later calls do
/// nothing.
pub fn init_tracing() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true);
        // A subscriber installed by someone else wins.
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init();
    });
}

/// Same as `init_tracing`, but one JSON object per event.
pub fn init_tracing_json() {
    INIT.call_once(|| {
        let fmt_layer = fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_current_span(true);
        let _ = tracing_subscriber::registry()
            .with(env_filter())
            .with(fmt_layer)
            .try_init();
    });
}
