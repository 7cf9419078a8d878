//! Logging bootstrap.
//!
//! The server logs through `tracing`'s process-wide dispatcher; this module
//! installs a formatting subscriber once and leaves any subscriber the host
//! application already installed untouched.

use std::{fs::OpenOptions, sync::Arc};

use tracing::{event, Level};
use tracing_subscriber::EnvFilter;

/// Log file used when external logging is enabled.
const LOG_FILE: &str = "server.log";

/// Install the global logging subscriber.
///
/// With `external` set, log lines are appended to [`LOG_FILE`]; if the file
/// cannot be opened the subscriber reverts to console logging. Repeated
/// calls, or a subscriber installed by the host, leave the existing
/// dispatcher in place.
pub fn init(external: bool) {
    if external {
        match OpenOptions::new().create(true).append(true).open(LOG_FILE) {
            Ok(file) => {
                let _ = tracing_subscriber::fmt()
                    .with_env_filter(default_filter())
                    .with_writer(Arc::new(file))
                    .with_ansi(false)
                    .try_init();
                return;
            }
            Err(error) => {
                init_stdout();
                event!(Level::ERROR, %error, "failed to open log file, reverting to console logging");
                return;
            }
        }
    }

    init_stdout();
}

fn init_stdout() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(default_filter())
        .try_init();
}

fn default_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}
