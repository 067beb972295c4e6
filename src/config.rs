use std::path::PathBuf;

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregator::worker::AggregatorSettings;

const CONFIG_DIR: &str = ".config/topic-recorder";
const CONFIG_FILE: &str = "config.toml";

#[derive(Deserialize, Serialize, Clone, Debug, Default)]
pub struct Config {
    pub broker: BrokerConfig,
    pub aggregator: AggregatorSettings,
    pub sink: SinkConfig,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct BrokerConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Generated from the epoch time when not set.
    pub client_id: Option<String>,
    /// Subscription filter, MQTT wildcards allowed.
    pub topic: String,
    pub keep_alive_secs: u64,
    pub reconnect_period_ms: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: None,
            topic: "#".to_string(),
            keep_alive_secs: 5,
            reconnect_period_ms: 1000,
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct SinkConfig {
    pub kind: SinkKind,
    /// Only read by the file sink.
    pub path: PathBuf,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            kind: SinkKind::File,
            path: PathBuf::from("data.json"),
        }
    }
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SinkKind {
    File,
    Console,
}

/// Writes a default config file on first run so there is something to
/// edit.
pub async fn ensure_default_config() -> Result<()> {
    let mut dir = get_home_dir();
    dir.push(CONFIG_DIR);

    if !tokio::fs::try_exists(&dir)
        .await
        .map_err(|e| eyre!("Failed to check if config directory exists: {}", e))?
    {
        info!("Creating default configuration in {}", dir.display());
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| eyre!("Failed to create config directory: {}", e))?;
    }

    let path = config_path();
    if !tokio::fs::try_exists(&path)
        .await
        .map_err(|e| eyre!("Failed to check if config file exists: {}", e))?
    {
        let content = toml::to_string_pretty(&Config::default())
            .map_err(|e| eyre!("Failed to serialize default config: {}", e))?;
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| eyre!("Failed to write default config file: {}", e))?;
        info!("Wrote default config to {}", path.display());
    }

    Ok(())
}

pub async fn load_config() -> Result<Config> {
    let path = config_path();
    let content = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| eyre!("Failed to read config file {}: {}", path.display(), e))?;
    let config =
        toml::from_str(&content).map_err(|e| eyre!("Failed to parse config file: {}", e))?;
    Ok(config)
}

fn config_path() -> PathBuf {
    let mut path = get_home_dir();
    path.push(CONFIG_DIR);
    path.push(CONFIG_FILE);
    path
}

fn get_home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| {
        warn!("Could not determine home directory, using current directory");
        PathBuf::from(".")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_round_trips_through_toml() {
        let content = toml::to_string_pretty(&Config::default()).unwrap();
        let parsed: Config = toml::from_str(&content).unwrap();
        assert_eq!(parsed.broker, BrokerConfig::default());
        assert_eq!(parsed.aggregator, AggregatorSettings::default());
        assert_eq!(parsed.sink, SinkConfig::default());
    }

    #[test]
    fn sink_kind_uses_lowercase_names() {
        let config: SinkConfig = toml::from_str("kind = \"console\"\npath = \"out.json\"").unwrap();
        assert_eq!(config.kind, SinkKind::Console);
    }
}
