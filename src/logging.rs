use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Filter from `RUST_LOG`, falling back to `config.level`.
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the global subscriber. JSON lines go to `config.file` when
/// `config.json` is set, plain text to stderr otherwise.
pub fn init(config: &LoggingConfig) -> Result<()> {
    if config.json {
        if let Some(parent) = config.file.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let log_file = std::fs::File::create(&config.file)
            .with_context(|| format!("failed to create {}", config.file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .with_writer(log_file)
            .with_ansi(false)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter(config))
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
