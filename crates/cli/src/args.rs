use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use serde::{Deserialize, Serialize};

use crate::options::{AuthOptions, CacheOptions};

/// qcache options, from the command line and an optional TOML file.
#[derive(Parser, Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
#[command(name = "qcache", version, about = "Query result cache")]
pub struct QcacheArgs {
    /// TOML file with the same options. Command line flags take precedence over it.
    #[arg(long, value_name = "PATH")]
    #[serde(skip)]
    pub config: Option<PathBuf>,

    /// Write the effective options to this file, as TOML
    #[arg(long = "dump_config", value_name = "PATH")]
    #[serde(skip)]
    pub dump_config: Option<PathBuf>,

    #[command(flatten)]
    pub cache: CacheOptions,

    #[command(flatten)]
    pub auth: AuthOptions,
}

impl QcacheArgs {
    /// Fills every option left at its default from the `--config` file, if one was given.
    pub fn with_config_file(mut self) -> anyhow::Result<Self> {
        let Some(path) = self.config.clone() else {
            return Ok(self);
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: QcacheArgs = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        self.cache.merge(Some(&config.cache));
        self.auth.merge(Some(&config.auth));
        Ok(self)
    }

    /// The options as a TOML document accepted by `--config`.
    pub fn to_toml(&self) -> anyhow::Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize options")
    }
}
