//! Configuration management for lineage services.
//!
//! Configuration is loaded from (in priority order):
//! 1. Environment variables (`LINEAGE_<SECTION>__<KEY>`)
//! 2. Config file (`lineage.toml`, or the prefix passed on the command line)
//! 3. Defaults

use serde::de::DeserializeOwned;

use crate::error::Result;

/// Default config file prefix.
pub const DEFAULT_CONFIG_PREFIX: &str = "lineage";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "LINEAGE";

/// Build the layered configuration source for `file_prefix`.
pub fn layered(file_prefix: &str) -> Result<config::Config> {
    let cfg = config::Config::builder()
        .add_source(config::File::with_name(file_prefix).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;
    Ok(cfg)
}

/// Load one section of the layered configuration.
///
/// A missing section yields `T::default()`. A present but malformed
/// section is an error, so typos do not silently fall back to defaults.
pub fn load_section<T>(file_prefix: &str, section: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    let cfg = layered(file_prefix)?;
    match cfg.get::<T>(section) {
        Ok(value) => Ok(value),
        Err(config::ConfigError::NotFound(_)) => {
            tracing::debug!(section, "Config section absent, using defaults");
            Ok(T::default())
        }
        Err(e) => Err(e.into()),
    }
}
