//! Structured logging for relay.
//!
//! Log levels:
//! - ERROR: a plan failed or an event could not be handled
//! - WARN: recoverable surprises (failed tasks, ignored messages, fallbacks)
//! - INFO: plan lifecycle (created, phases dispatched, completed)
//! - DEBUG: per-assignment and per-selection traces
//!
//! Debug mode can be enabled with the `--debug` flag or `RELAY_DEBUG=1`.
//! `RUST_LOG` overrides both. Output goes to stderr so command output on
//! stdout stays machine-readable.

use tracing_subscriber::EnvFilter;

/// Environment variable enabling debug logging.
pub const DEBUG_ENV: &str = "RELAY_DEBUG";

/// Whether debug logging was asked for by flag or environment.
pub fn debug_requested(flag: bool) -> bool {
    flag || std::env::var(DEBUG_ENV).is_ok_and(|v| is_truthy(&v))
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim(), "1" | "true" | "TRUE" | "yes")
}

/// Filter directives used when `RUST_LOG` is not set.
pub fn default_directives(debug: bool) -> &'static str {
    if debug {
        "relay=debug,warn"
    } else {
        "relay=info,warn"
    }
}

/// Install the global subscriber. Safe to call more than once; only the
/// first call takes effect.
pub fn init(debug: bool) {
    let debug = debug_requested(debug);
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(debug)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(debug)
        .with_writer(std::io::stderr)
        .try_init();
}
