//! Logging setup on `tracing` + `tracing-subscriber`.
//!
//! Log levels:
//! - ERROR: Failures that stop a command
//! - WARN: Recoverable surprises (rejected schedule, target in the past)
//! - INFO: Schedule loaded, auto-start armed, timers finished
//! - DEBUG: Transitions, poll passes, rejected transitions
//! - TRACE: Ticker and poller wake-ups
//!
//! Level precedence: `--debug` flag, then the `MISE_LOG` filter
//! (e.g. `mise=debug`), then `MISE_DEBUG=1`, then `info`.
//!
//! Logs go to stderr so stdout stays clean for plans and event output.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "MISE_LOG";
pub const DEBUG_ENV: &str = "MISE_DEBUG";

pub fn init() {
    init_with_debug(false);
}

/// Install the global subscriber. Later calls are ignored.
pub fn init_with_debug(debug: bool) {
    let filter = resolve_filter(
        debug,
        std::env::var(LOG_ENV).ok().as_deref(),
        std::env::var(DEBUG_ENV).ok().as_deref(),
    );

    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Filter directives for the given inputs.
fn resolve_filter(debug: bool, log_env: Option<&str>, debug_env: Option<&str>) -> String {
    if debug {
        return "debug".to_string();
    }
    if let Some(directives) = log_env.map(str::trim).filter(|s| !s.is_empty()) {
        if EnvFilter::try_new(directives).is_ok() {
            return directives.to_string();
        }
    }
    if debug_env.map(is_truthy).unwrap_or(false) {
        return "debug".to_string();
    }
    "info".to_string()
}

fn is_truthy(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}
