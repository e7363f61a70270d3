//! Layered configuration: defaults, then `hrflow.toml`, then `HRFLOW__*`
//! environment variables (`__` separates nested keys).

use std::path::Path;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use hrflow_observability::LogConfig;
use serde::{Deserialize, Serialize};

const DEFAULT_FILE: &str = "hrflow.toml";
const ENV_PREFIX: &str = "HRFLOW__";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Configuration {
    pub database: DatabaseConfig,
    pub jobs: JobsConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::from("postgres://localhost/hrflow"),
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Background job settings. Intervals of zero or less disable the scheduler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    pub queue_capacity: usize,
    pub accrual_interval_secs: i64,
    pub retention_interval_secs: i64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 128,
            accrual_interval_secs: 6 * 60 * 60,
            retention_interval_secs: 24 * 60 * 60,
        }
    }
}

impl JobsConfig {
    pub fn accrual_interval(&self) -> Option<Duration> {
        positive_secs(self.accrual_interval_secs)
    }

    pub fn retention_interval(&self) -> Option<Duration> {
        positive_secs(self.retention_interval_secs)
    }
}

fn positive_secs(secs: i64) -> Option<Duration> {
    u64::try_from(secs)
        .ok()
        .filter(|s| *s > 0)
        .map(Duration::from_secs)
}

impl Configuration {
    /// Load from `hrflow.toml` in the working directory (if present) and the environment.
    pub fn load() -> Result<Self, Box<figment::Error>> {
        Self::load_from(DEFAULT_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        let config = Figment::from(Serialized::defaults(Configuration::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(Box::new)?;

        Ok(config)
    }
}
