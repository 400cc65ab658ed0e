use anyhow::{Context, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

pub const MAX_SHARDS: usize = 64;

pub const ENV_THREADING: &str = "IRSTORE_THREADING";
pub const ENV_SHARD_COUNT: &str = "IRSTORE_SHARD_COUNT";

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct UniquerConfig {
    /// Allow concurrent `get` calls; enables sharding and the read-locked
    /// lookup path.
    #[serde(default = "UniquerConfig::default_threading")]
    pub threading: bool,

    /// Shards per parametric storage class. Ignored when threading is off.
    #[serde(default = "UniquerConfig::default_shard_count")]
    pub shard_count: usize,

    /// Initial lookup table capacity per shard.
    #[serde(default = "UniquerConfig::default_initial_capacity")]
    pub initial_capacity: usize,

    /// Initial arena chunk size per shard, in bytes.
    #[serde(default = "UniquerConfig::default_arena_chunk_bytes")]
    pub arena_chunk_bytes: usize,

    #[serde(default = "UniquerConfig::default_track_stats")]
    pub track_stats: bool,
}

impl UniquerConfig {
    fn default_threading() -> bool {
        true
    }

    fn default_shard_count() -> usize {
        num_cpus::get().next_power_of_two().min(MAX_SHARDS)
    }

    fn default_initial_capacity() -> usize {
        64
    }

    fn default_arena_chunk_bytes() -> usize {
        4096
    }

    fn default_track_stats() -> bool {
        true
    }

    pub fn single_threaded() -> Self {
        Self {
            threading: false,
            shard_count: 1,
            ..Self::default()
        }
    }

    pub fn effective_shard_count(&self) -> usize {
        if self.threading {
            self.shard_count.max(1)
        } else {
            1
        }
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.shard_count > 0, "Shard count must be greater than 0");

        anyhow::ensure!(
            self.shard_count <= MAX_SHARDS,
            "Shard count must not exceed {}",
            MAX_SHARDS
        );

        anyhow::ensure!(
            self.arena_chunk_bytes >= 64,
            "Arena chunk size must be at least 64 bytes"
        );

        Ok(())
    }

    /// Apply `IRSTORE_*` environment variables on top of this config.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup; invalid values are
    /// logged and ignored.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(threading) = parse_override::<bool, _>(&lookup, ENV_THREADING) {
            self.threading = threading;
        }
        if let Some(shards) = parse_override::<usize, _>(&lookup, ENV_SHARD_COUNT) {
            self.shard_count = shards;
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: Self = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("Failed to serialize configuration to JSON")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).context("Failed to parse JSON configuration")?;

        config.validate()?;
        Ok(config)
    }

    pub fn json_schema() -> Result<String> {
        serde_json::to_string_pretty(&schemars::schema_for!(Self))
            .context("Failed to serialize configuration schema")
    }
}

impl Default for UniquerConfig {
    fn default() -> Self {
        Self {
            threading: Self::default_threading(),
            shard_count: Self::default_shard_count(),
            initial_capacity: Self::default_initial_capacity(),
            arena_chunk_bytes: Self::default_arena_chunk_bytes(),
            track_stats: Self::default_track_stats(),
        }
    }
}

pub(crate) fn parse_override<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => {
            debug!("Applying environment override: {} = {}", key, raw);
            Some(value)
        }
        Err(_) => {
            warn!("Ignoring invalid value for {}: {:?}", key, raw);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = UniquerConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.shard_count.is_power_of_two());
        assert!(config.shard_count <= MAX_SHARDS);
    }

    #[test]
    fn test_single_threaded_uses_one_shard() {
        let mut config = UniquerConfig::single_threaded();
        assert_eq!(config.effective_shard_count(), 1);
        config.shard_count = 8;
        assert_eq!(config.effective_shard_count(), 1);
        config.threading = true;
        assert_eq!(config.effective_shard_count(), 8);
    }

    #[test]
    fn test_validation() {
        let mut config = UniquerConfig::default();
        config.shard_count = 0;
        assert!(config.validate().is_err());

        config.shard_count = MAX_SHARDS + 1;
        assert!(config.validate().is_err());

        config.shard_count = 4;
        config.arena_chunk_bytes = 8;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> =
            [(ENV_THREADING, "false"), (ENV_SHARD_COUNT, "not-a-number")].into();
        let mut config = UniquerConfig::default();
        let shards = config.shard_count;
        config.apply_overrides_from(|k| vars.get(k).map(|v| v.to_string()));
        assert!(!config.threading);
        assert_eq!(config.shard_count, shards);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: UniquerConfig = toml::from_str("shard_count = 2").unwrap();
        assert_eq!(config.shard_count, 2);
        assert!(config.threading);
        assert_eq!(config.initial_capacity, 64);
    }

    #[test]
    fn test_json_is_validated_like_toml() {
        assert!(UniquerConfig::from_json(r#"{ "shard_count": 4 }"#).is_ok());

        let err = UniquerConfig::from_json(r#"{ "shard_count": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("Shard count"));
        assert!(UniquerConfig::from_json(r#"{ "arena_chunk_bytes": 8 }"#).is_err());
    }

    #[test]
    fn test_json_schema_mentions_fields() {
        let schema = UniquerConfig::json_schema().unwrap();
        assert!(schema.contains("shard_count"));
        assert!(schema.contains("arena_chunk_bytes"));
    }
}
