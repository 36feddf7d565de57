//! Tracing setup for binaries and tests embedding the research core.
//!
//! The library only emits `tracing` events. Installing a subscriber is the
//! host's job; [`init_tracing`] is the stock way to do it.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Filter used when `RUST_LOG` is unset.
pub fn default_filter(verbose: bool) -> &'static str {
    if verbose { "sift_core=debug,info" } else { "info" }
}

/// Install a human-readable stderr subscriber.
///
/// `RUST_LOG` wins over the verbosity flag. Returns `false` if a global
/// subscriber was already installed.
pub fn init_tracing(verbose: bool) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .try_init()
        .is_ok()
}
