//! Logging infrastructure for fourby.
//!
//! The terminal display owns stdout, so every log line goes to stderr. Only
//! this workspace's crates log at the chosen level; dependencies stay at
//! `warn`.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events follow the chosen level
const OWN_TARGETS: &[&str] = &["interval_core", "fourby"];

/// Filter directives for `level` on this workspace's crates
pub fn directives(level: &str) -> String {
    let mut directives = String::from("warn");
    for target in OWN_TARGETS {
        directives.push_str(&format!(",{}={}", target, level));
    }
    directives
}

/// Level for a `-v` count: info, then debug, then trace
pub fn level_for_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging at INFO. RUST_LOG overrides.
pub fn init() {
    init_with_level("info")
}

/// Initialize logging with a specific default level
///
/// # Arguments
/// * `default_level` - Level for fourby's own events (debug, info, warn, error)
///
/// RUST_LOG, when set, replaces the whole filter.
pub fn init_with_level(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(directives(default_level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();
}

/// Initialize logging for testing (captures logs for test output)
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new(directives("debug")))
        .try_init();
}
