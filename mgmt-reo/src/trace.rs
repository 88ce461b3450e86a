//! Tracing infrastructure for the reorder engine.
//!
//! Logging is always compiled in and filtered at runtime through `RUST_LOG`
//! (default `mgmt_reo=info`). Per-frame lines are emitted at `trace`, list
//! mutations at `debug`, recovered anomalies at `warn`.

/// Initialize the tracing subscriber with timestamps.
///
/// Call this at the start of tests or the simulator binary to enable output.
/// Calling it twice is harmless: the second install attempt is ignored.
pub fn init_tracing() {
    init_tracing_with_default("mgmt_reo=info");
}

/// Same as [`init_tracing`], with a caller-chosen default filter used when
/// `RUST_LOG` is unset.
pub fn init_tracing_with_default(default_filter: &str) {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .try_init();
}

pub(crate) use tracing::{debug, error, info, trace, warn};
