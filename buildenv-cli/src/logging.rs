//! tracing subscriber setup
//!
//! `BUILDENV_LOG` takes an EnvFilter directive and wins over `-v` flags.
//! Logs go to stderr; stdout carries reports.

use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "BUILDENV_LOG";

fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    // ignore the error when a subscriber is already installed (tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time()
        .try_init();
}
