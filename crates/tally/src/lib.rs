pub mod config;
pub mod coordinator;
pub mod db;
pub mod error;
pub mod hooks;
pub mod instance;
pub mod recurrence;
pub mod storage;
pub mod strategy;
pub mod sweep;

pub use error::{Error, Result};
pub use tally_models as models;

use tracing_subscriber::EnvFilter;

/// Log to stderr, filtered by `RUST_LOG` (default `info`). Stdout stays free
/// for command output.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .try_init();
}
