use anyhow::{anyhow, bail, Result};
use tracing::Level;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

pub fn parse_level(s: &str) -> Result<Level> {
    match s.trim().to_ascii_uppercase().as_str() {
        "DEBUG" => Ok(Level::DEBUG),
        "INFO" => Ok(Level::INFO),
        "WARN" => Ok(Level::WARN),
        "ERROR" => Ok(Level::ERROR),
        other => bail!("unsupported log level {:?}", other),
    }
}

/// Install the global JSON subscriber writing to stdout. `RUST_LOG` directives,
/// when set, refine the configured level.
pub fn init(level: &str) -> Result<()> {
    let level = parse_level(level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_current_span(false)
        .try_init()
        .map_err(|e| anyhow!("failed to install log subscriber: {}", e))
}
