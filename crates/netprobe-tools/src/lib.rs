pub mod cli;
pub mod extract;
pub mod inspect;

use tracing_subscriber::EnvFilter;

/// Logs go to stderr so the inspector's report owns stdout. A filter that does
/// not parse falls back to `info` and says so.
pub fn init_tracing(filter: &str) {
    let (env_filter, rejected) = match EnvFilter::try_new(filter) {
        Ok(env_filter) => (env_filter, None),
        Err(err) => (EnvFilter::new("info"), Some(err)),
    };
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    if let Some(err) = rejected {
        tracing::warn!(filter, error = %err, "invalid log filter, using info");
    }
}
