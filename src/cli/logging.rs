//! cli::logging
//!
//! Tracing subscriber setup for the binary.
//!
//! `RUST_LOG` wins when set. Otherwise the level is `info`, or `debug`
//! with `--debug`. `COMMITFS_LOG_FORMAT=json` switches to one JSON object
//! per event. Logs go to stderr so `cat` output stays clean.

use std::sync::Once;

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init(debug: bool) {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let default_level = if debug { "debug" } else { "info" };
        let env_filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
        let format = std::env::var("COMMITFS_LOG_FORMAT").unwrap_or_else(|_| "compact".into());

        if format.eq_ignore_ascii_case("json") {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .json()
                .flatten_event(true)
                .init();
        } else {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_target(true)
                .with_writer(std::io::stderr)
                .compact()
                .init();
        }
    });
}
