//! Subscriber setup
//!
//! `RUST_LOG` wins when set; otherwise the core config's `debug` flag picks
//! between `debug` and `info`.

use tracing_subscriber::EnvFilter;

/// Install the fmt subscriber once; later calls are no-ops
pub fn init_logging(debug: bool) {
    let fallback = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_ids(true)
        .try_init()
        .is_ok()
    {
        tracing::debug!("Logging initialized (fallback level: {})", fallback);
    }
}
