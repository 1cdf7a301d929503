//! Log setup.
//!
//! Logs go to **stderr**. Stdout carries the handshake line and nothing else.
//! `RUST_LOG` filters as usual and defaults to `info`:
//!
//! ```bash
//! RUST_LOG=hemmer_provider_atlas=debug ./hemmer-provider-atlas
//! ```

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const DEFAULT_FILTER: &str = "info";

fn filter(default: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default))
}

fn stderr_layer<S>() -> impl tracing_subscriber::Layer<S>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
}

/// Install the stderr subscriber.
///
/// Returns false if a global subscriber was already installed.
pub fn init_logging() -> bool {
    init_logging_with_default(DEFAULT_FILTER)
}

/// Like [`init_logging`], with `default` used when `RUST_LOG` is unset.
pub fn init_logging_with_default(default: &str) -> bool {
    tracing_subscriber::registry()
        .with(filter(default))
        .with(stderr_layer())
        .try_init()
        .is_ok()
}
