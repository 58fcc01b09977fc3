//! # Tracing Setup
//!
//! `RUST_LOG` wins when set; otherwise engine and repository logs at debug,
//! sqlx statement logs at warn, everything else at info.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info,shiftline_engine=debug,shiftline_db=debug,sqlx=warn";

/// Installs the global fmt subscriber. Safe to call more than once; later
/// calls are ignored.
pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
