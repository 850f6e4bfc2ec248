use serde::Deserialize;
use std::fs;
use std::time::Duration;

#[derive(Deserialize, Clone, Debug)]
pub struct Config {
    pub node: NodeConfig,
    pub db: DBConfig,
    pub indexer: IndexerConfig,
}

#[derive(Deserialize, Clone, Debug)]
pub struct NodeConfig {
    /// Base URL of the fast node (latest, possibly revisable chain data).
    pub fast_address: String,
    /// Base URL of the confirmed node (finalized chain data only).
    pub confirmed_address: String,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Clone, Debug)]
pub struct DBConfig {
    pub dsn: String,
    pub automigrate: bool,
}

#[derive(Deserialize, Clone, Debug)]
pub struct IndexerConfig {
    pub start_height: i64,
    pub batch_size: i64,
    pub poll_interval_secs: u64,
    pub workers: usize,
    pub retry_backoff_secs: u64,
    pub maintenance_interval_secs: u64,
    pub shutdown_deadline_secs: u64,
}

impl IndexerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn shutdown_deadline(&self) -> Duration {
        Duration::from_secs(self.shutdown_deadline_secs)
    }
}

pub fn read_config(path: &str) -> anyhow::Result<Config> {
    let contents = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

#[cfg(test)]
impl IndexerConfig {
    pub fn for_tests() -> Self {
        Self {
            start_height: 0,
            batch_size: 100,
            poll_interval_secs: 1,
            workers: 4,
            retry_backoff_secs: 1,
            maintenance_interval_secs: 60,
            shutdown_deadline_secs: 5,
        }
    }
}
