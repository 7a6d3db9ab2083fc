use anyhow::{anyhow, Result};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "warn";

/// Builds the log filter: the `--log-level` value first, then `RUST_LOG`,
/// then warnings only.
pub fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    match log_level.map(str::trim).filter(|value| !value.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .map_err(|error| anyhow!("invalid --log-level '{directives}': {error}")),
        None => Ok(EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))),
    }
}

/// Installs the global subscriber. Logs go to stderr so JSON written to
/// stdout stays parseable.
pub fn init(log_level: Option<&str>) -> Result<()> {
    let filter = build_filter(log_level)?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init()
        .map_err(|error| anyhow!("failed to install logger: {error}"))
}
