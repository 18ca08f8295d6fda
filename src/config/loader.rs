use anyhow::{Context, Result};

use super::model::AppConfig;

/// Loads `AppConfig` from a TOML file layered over compiled-in defaults, with
/// `RATIOBOT__`-prefixed environment variable overrides, after pulling local
/// secrets from `.env` if present.
pub fn load(config_path: &str) -> Result<AppConfig> {
    let _ = dotenvy::dotenv();

    let defaults = config::Config::try_from(&AppConfig::default())
        .context("serializing built-in defaults")?;

    let settings = config::Config::builder()
        .add_source(defaults)
        .add_source(config::File::with_name(config_path).required(false))
        .add_source(config::Environment::with_prefix("RATIOBOT").separator("__"))
        .build()
        .context("building configuration")?;

    settings
        .try_deserialize()
        .context("deserializing configuration")
}
