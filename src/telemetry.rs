//! telemetry.rs
//! Log output for embedding applications and tests.

use tracing_subscriber::EnvFilter;

/// Environment variable holding `EnvFilter` directives, e.g. `seaice_core=debug`.
pub const LOG_ENV: &str = "SEAICE_LOG";

/// Installs a formatted subscriber filtered by `SEAICE_LOG`, falling back to
/// `default_directives`. Returns false if a global subscriber already exists.
pub fn init(default_directives: &str) -> bool {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default_directives));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).try_init().is_ok()
}
