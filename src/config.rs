use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct HttpConfig {
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("opendata-harvester/{}", env!("CARGO_PKG_VERSION"))
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScheduleConfig {
    /// How often the scheduler wakes up to look for due sources.
    #[serde(default = "default_tick_secs")]
    pub tick_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            tick_secs: default_tick_secs(),
        }
    }
}

fn default_tick_secs() -> u64 {
    300
}

impl Config {
    /// Minimal in-memory config for tests and config-less commands.
    pub fn minimal() -> Self {
        Self {
            db: DbConfig {
                path: PathBuf::from("./data/odh.sqlite"),
            },
            http: HttpConfig::default(),
            schedule: ScheduleConfig::default(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.http.timeout_secs == 0 {
        anyhow::bail!("http.timeout_secs must be > 0");
    }

    if config.schedule.tick_secs == 0 {
        anyhow::bail!("schedule.tick_secs must be > 0");
    }

    Ok(config)
}
