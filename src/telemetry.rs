//! Telemetry initialization.
//!
//! Structured logging through `tracing`, configured by environment:
//! `RUST_LOG` filters as usual, and `DOGMA_LOG_FORMAT=json` switches the
//! stderr output to JSON lines for log shippers. Initialization is
//! idempotent — a second call (tests, embedding) is a no-op.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Initialize the global tracing subscriber. Safe to call more than once.
pub fn init() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let json = std::env::var("DOGMA_LOG_FORMAT").is_ok_and(|v| v == "json");
        if json {
            let _ = tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        } else {
            let _ = tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init();
        }
    });
}
