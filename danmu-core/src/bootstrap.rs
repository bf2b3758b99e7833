//! Configuration loading for binaries

use std::path::Path;

use anyhow::Result;

use crate::config::Config;

/// Load configuration from a config file or environment variables
///
/// Config file search order:
/// 1. `DANMU_CONFIG_PATH` environment variable (explicit path)
/// 2. `./danmu.yaml`
/// 3. Environment variables only
///
/// Runs before logging is initialised, so progress goes to stderr.
pub fn load_config() -> Result<Config> {
    let config_path = std::env::var("DANMU_CONFIG_PATH")
        .ok()
        .filter(|p| Path::new(p).exists())
        .or_else(|| Path::new("danmu.yaml").exists().then(|| "danmu.yaml".to_string()));

    let config = match config_path {
        Some(path) => {
            eprintln!("Loading config from {path}");
            Config::from_file(&path)?
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

/// Fail fast on misconfiguration
pub fn validate_config(config: &Config) -> Result<()> {
    if let Err(errors) = config.validate() {
        return Err(anyhow::anyhow!(
            "Configuration validation failed with {} error(s): {}",
            errors.len(),
            errors.join("; ")
        ));
    }
    Ok(())
}
