//! Tracing bootstrap for the binary.

use std::env;

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info,roomhost=debug,tower_http=info";

/// Install the global subscriber.
///
/// Filter precedence: `RUST_LOG`, then `ROOMHOST_LOG`, then a built-in
/// default. `ROOMHOST_LOG_FORMAT=json` switches to JSON lines.
pub fn init() {
    let filter = filter_from_env();
    let json = env::var("ROOMHOST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    let _ = if json {
        registry.with(fmt::layer().json().with_target(true)).try_init()
    } else {
        registry.with(fmt::layer().with_target(true)).try_init()
    };
}

fn filter_from_env() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    env::var("ROOMHOST_LOG")
        .ok()
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_FILTER))
}
