//! Log output for the `ragchat` binary.
//!
//! Library code only emits `tracing` events. The binary installs a single
//! stderr subscriber so diagnostics never interleave with the answer text
//! printed on stdout. Verbosity follows `RUST_LOG` and falls back to `info`.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Calling it a second time is a no-op.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with an explicit fallback filter for when `RUST_LOG` is
/// unset (e.g. `"debug"` for `--verbose`).
pub fn init_with_default(default_filter: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr);

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .try_init();
}
