// logger.rs -- tracing subscriber setup for binaries.
//
// The library only emits `tracing` events. Installing a subscriber is left
// to the executable, so embedding applications keep control of output.

use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt::{self, format::FmtSpan}};

/// Install a global subscriber filtered by `RUST_LOG` (default `info`).
///
/// Span close events (with timing) are printed when debug logging is on,
/// which is how per-stage blend and fit timings become visible.
pub fn init() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let is_debug = env_filter.to_string().contains("debug")
        || env_filter.to_string().contains("trace");

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_span_events(if is_debug {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        });

    // A second call (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init();
}
