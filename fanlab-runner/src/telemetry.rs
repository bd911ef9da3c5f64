//! Tracing subscriber setup.
//!
//! `RUST_LOG` overrides the default filter. Directives match by target
//! prefix, so `fanlab` covers every crate in the workspace.

use tracing_subscriber::{fmt, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn,fanlab=info";

/// Install the global fmt subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init() {
    init_with(DEFAULT_FILTER);
}

pub fn init_with(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .try_init();
}
