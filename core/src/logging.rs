//! Tracing bootstrap for binaries embedding the diary.
//!
//! The library itself only emits events. Call [`init`] once at startup to print
//! them; `RUST_LOG` overrides the default filter.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "glycolog_core=info";

static INIT: Once = Once::new();

fn filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Install a stderr fmt subscriber. Later calls are no-ops, as is calling this
/// after another global subscriber has been set.
pub fn init() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .try_init();
    });
}
