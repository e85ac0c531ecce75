// Copyright (C) 2022 Electronic Arts, Inc. All rights reserved.

//! Read the service config file and merge it with command line values.
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::charts::access::AllowList;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// The optional YAML config file.
///
/// ```yaml
/// repositories:
///   - charts/app
///   - charts/db
/// region: eu-west-1
/// timeout_secs: 60
/// ```
#[derive(Deserialize, Debug, Default)]
#[serde(deny_unknown_fields)]
pub struct FileConfig {
    #[serde(default)]
    pub repositories: Vec<String>,
    pub region: Option<String>,
    pub timeout_secs: Option<u64>,
}

impl FileConfig {
    /// Load the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let file: String = std::fs::read_to_string(path)
            .with_context(|| format!("Reading file {}", path.display()))?;
        let config: FileConfig = serde_yml::from_str(&file)
            .with_context(|| format!("Parsing file {}", path.display()))?;

        Ok(config)
    }
}

/// Values given on the command line or through the environment.
#[derive(Debug, Default)]
pub struct Overrides {
    pub repositories: Vec<String>,
    pub region: Option<String>,
    pub timeout_secs: Option<u64>,
}

/// Fully resolved settings.
#[derive(Debug)]
pub struct Config {
    pub allow_list: AllowList,
    pub region: Option<String>,
    pub timeout: Duration,
}

impl Config {
    /// Command line values win over the file; the file wins over defaults.
    pub fn resolve(file: FileConfig, overrides: Overrides) -> Self {
        let repositories = if overrides.repositories.is_empty() {
            file.repositories
        } else {
            overrides.repositories
        };

        let allow_list = AllowList::new(
            repositories
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty()),
        );

        let timeout_secs = overrides
            .timeout_secs
            .or(file.timeout_secs)
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Config {
            allow_list,
            region: overrides.region.or(file.region),
            timeout: Duration::from_secs(timeout_secs),
        }
    }
}
