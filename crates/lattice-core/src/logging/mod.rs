//! Structured logging with `tracing`.
//!
//! Library code only emits events; the embedding application decides where
//! they go. [`init_subscriber`] installs a compact stderr subscriber for
//! binaries and integration harnesses that have nothing better.
//!
//! Field conventions used across the workspace:
//!
//! | field       | meaning                                  |
//! |-------------|------------------------------------------|
//! | `event_id`  | the event being processed                |
//! | `origin_id` | the event a relation points at           |
//! | `thread_id` | the thread root                          |
//! | `rule_id`   | the push rule being evaluated            |

/// Log capture for tests. Always compiled so the unit tests of downstream
/// crates can assert on log output without enabling a feature.
pub mod test_utils;

pub use test_utils::{CapturedEvent, CapturedLogs, capture_logs};

/// Initialize the global tracing subscriber with stderr output.
///
/// `RUST_LOG` wins over `level` when set. Subsequent calls are no-ops.
pub fn init_subscriber(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .compact();

    let _ = subscriber.try_init();
}
