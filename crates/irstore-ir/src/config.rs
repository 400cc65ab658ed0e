use anyhow::{Context as _, Result};
use irstore_core::UniquerConfig;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::dialect::is_valid_namespace;

pub const ENV_PRELOAD_DIALECTS: &str = "IRSTORE_PRELOAD_DIALECTS";

/// Settings for a [`Context`](crate::Context).
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct ContextConfig {
    /// Settings shared by the attribute and type uniquers.
    #[serde(default)]
    pub uniquer: UniquerConfig,

    /// Dialects loaded when the context is created, besides `builtin`.
    #[serde(default)]
    pub preload_dialects: Vec<String>,
}

impl ContextConfig {
    pub fn validate(&self) -> Result<()> {
        self.uniquer
            .validate()
            .context("Invalid uniquer configuration")?;

        for namespace in &self.preload_dialects {
            anyhow::ensure!(
                is_valid_namespace(namespace),
                "Invalid dialect namespace in preload list: {:?}",
                namespace
            );
        }

        Ok(())
    }

    /// Load the default configuration with `IRSTORE_*` environment variables
    /// applied.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env_overrides();
        config
    }

    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| env::var(key).ok());
    }

    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        self.uniquer.apply_overrides_from(&lookup);

        if let Some(list) = lookup(ENV_PRELOAD_DIALECTS) {
            debug!("Applying environment override: {} = {}", ENV_PRELOAD_DIALECTS, list);
            self.preload_dialects = list
                .split(',')
                .map(str::trim)
                .filter(|ns| !ns.is_empty())
                .map(String::from)
                .collect();
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
