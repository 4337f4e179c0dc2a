use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "config/config.toml";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_PUBLISH_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 120;
pub const DEFAULT_HEARTBEAT_SECS: u64 = 5;
pub const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_FEED_TOPIC: &str = "/topic/TD_WESS_SIG_AREA";
pub const DEFAULT_STATS_PATH: &str = "data.json";
pub const DEFAULT_AREA_ID: &str = "BP";
pub const DEFAULT_WATCH_BERTHS: [&str; 4] = ["5253", "5261", "5264", "5268"];
pub const DEFAULT_MQTT_CLIENT_ID: &str = "crossing-eta";
pub const DEFAULT_STATE_TOPIC: &str = "traintrack/woolcrossing";
pub const DEFAULT_ETA_TOPIC: &str = "traintrack/timeToOpen";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub app: AppSection,
    pub logging: LoggingSection,
    pub feed: FeedSection,
    pub mqtt: MqttSection,
    #[serde(default)]
    pub crossing: Option<CrossingSection>,
    #[serde(default)]
    pub stats: Option<StatsSection>,
    #[serde(default)]
    pub publisher: Option<PublisherSection>,
    #[serde(default)]
    pub server: Option<ServerSection>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSection {
    pub name: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSection {
    pub level: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeedSection {
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    pub topic: Option<String>,
    /// Fixed delay between reconnect attempts (default: 120)
    pub reconnect_delay_secs: Option<u64>,
    /// Give up after this many failed attempts (default: never)
    pub max_reconnect_attempts: Option<u32>,
    pub heartbeat_secs: Option<u64>,
    pub read_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MqttSection {
    pub broker: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub state_topic: Option<String>,
    pub eta_topic: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CrossingSection {
    pub area_id: Option<String>,
    /// Berths whose occupation puts a train on the crossing's watch list
    pub watch_berths: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StatsSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PublisherSection {
    /// ETA publish interval in seconds (default: 10)
    pub interval_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerSection {
    /// Port to listen on (default: 8080)
    pub port: Option<u16>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
}

pub fn load_default() -> Result<Config, ConfigError> {
    load_from_path(DEFAULT_CONFIG_PATH)
}

pub fn load_from_path(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let contents = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&contents)?;
    Ok(config)
}

impl Config {
    /// Returns the configured log level, falling back to INFO for unknown values.
    pub fn log_level(&self) -> tracing::Level {
        self.logging
            .level
            .parse()
            .unwrap_or(tracing::Level::INFO)
    }

    pub fn feed_topic(&self) -> &str {
        self.feed.topic.as_deref().unwrap_or(DEFAULT_FEED_TOPIC)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(
            self.feed
                .reconnect_delay_secs
                .unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
        )
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.feed.heartbeat_secs.unwrap_or(DEFAULT_HEARTBEAT_SECS))
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(
            self.feed
                .read_timeout_secs
                .unwrap_or(DEFAULT_READ_TIMEOUT_SECS),
        )
    }

    pub fn mqtt_client_id(&self) -> &str {
        self.mqtt
            .client_id
            .as_deref()
            .unwrap_or(DEFAULT_MQTT_CLIENT_ID)
    }

    pub fn state_topic(&self) -> &str {
        self.mqtt.state_topic.as_deref().unwrap_or(DEFAULT_STATE_TOPIC)
    }

    pub fn eta_topic(&self) -> &str {
        self.mqtt.eta_topic.as_deref().unwrap_or(DEFAULT_ETA_TOPIC)
    }

    pub fn area_id(&self) -> &str {
        self.crossing
            .as_ref()
            .and_then(|c| c.area_id.as_deref())
            .unwrap_or(DEFAULT_AREA_ID)
    }

    /// Returns the watch berths, or the default crossing topology if not configured.
    pub fn watch_berths(&self) -> Vec<String> {
        match self.crossing.as_ref().and_then(|c| c.watch_berths.as_ref()) {
            Some(berths) if !berths.is_empty() => berths.clone(),
            _ => DEFAULT_WATCH_BERTHS.iter().map(|b| b.to_string()).collect(),
        }
    }

    pub fn stats_path(&self) -> &Path {
        match self.stats.as_ref().and_then(|s| s.path.as_deref()) {
            Some(path) if !path.as_os_str().is_empty() => path,
            _ => Path::new(DEFAULT_STATS_PATH),
        }
    }

    /// Returns the ETA publish interval as Duration (default: 10 seconds)
    pub fn publish_interval(&self) -> Duration {
        let secs = self
            .publisher
            .as_ref()
            .and_then(|p| p.interval_secs)
            .unwrap_or(DEFAULT_PUBLISH_INTERVAL_SECS);
        Duration::from_secs(secs)
    }

    /// Returns the server port (default: 8080)
    pub fn server_port(&self) -> u16 {
        self.server
            .as_ref()
            .and_then(|s| s.port)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{SystemTime, UNIX_EPOCH};

    const MINIMAL: &str = r#"
[app]
name = "crossing-eta"

[logging]
level = "debug"

[feed]
host = "feed.example"
port = 61618
username = "user"
password = "secret"

[mqtt]
broker = "broker.example"
port = 1883
"#;

    fn write_temp(label: &str, contents: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let unique = SystemTime::now().duration_since(UNIX_EPOCH)?.as_nanos();
        let path = std::env::temp_dir().join(format!("crossing-config-{label}-{unique}.toml"));
        fs::write(&path, contents)?;
        Ok(path)
    }

    #[test]
    fn default_config_matches_reference_deployment() -> Result<(), Box<dyn std::error::Error>> {
        let config = load_default()?;
        assert_eq!(config.area_id(), "BP");
        assert_eq!(config.state_topic(), "traintrack/woolcrossing");
        assert_eq!(config.eta_topic(), "traintrack/timeToOpen");
        assert_eq!(config.publish_interval(), Duration::from_secs(10));
        Ok(())
    }

    #[test]
    fn optional_sections_fall_back_to_defaults() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp("minimal", MINIMAL)?;
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.log_level(), tracing::Level::DEBUG);
        assert_eq!(config.feed_topic(), DEFAULT_FEED_TOPIC);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(120));
        assert_eq!(config.watch_berths(), vec!["5253", "5261", "5264", "5268"]);
        assert_eq!(config.stats_path(), Path::new("data.json"));
        assert_eq!(config.server_port(), DEFAULT_SERVER_PORT);
        assert_eq!(config.mqtt_client_id(), DEFAULT_MQTT_CLIENT_ID);
        assert!(config.feed.max_reconnect_attempts.is_none());
        Ok(())
    }

    #[test]
    fn empty_watch_berths_use_default_topology() -> Result<(), Box<dyn std::error::Error>> {
        let contents = format!("{MINIMAL}\n[crossing]\nwatch_berths = []\n");
        let path = write_temp("berths", &contents)?;
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.watch_berths().len(), 4);
        Ok(())
    }

    #[test]
    fn unknown_log_level_defaults_to_info() -> Result<(), Box<dyn std::error::Error>> {
        let contents = MINIMAL.replace("\"debug\"", "\"chatty\"");
        let path = write_temp("level", &contents)?;
        let config = load_from_path(&path)?;
        let _ = fs::remove_file(&path);

        assert_eq!(config.log_level(), tracing::Level::INFO);
        Ok(())
    }

    #[test]
    fn missing_config_file_returns_read_error() {
        let unique = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system time before unix epoch")
            .as_nanos();
        let path = std::env::temp_dir().join(format!("crossing-config-missing-{unique}.toml"));

        let result = load_from_path(&path);

        assert!(matches!(result, Err(ConfigError::Read(_))));
    }

    #[test]
    fn missing_feed_section_returns_parse_error() -> Result<(), Box<dyn std::error::Error>> {
        let path = write_temp(
            "no-feed",
            "[app]\nname = \"x\"\n[logging]\nlevel = \"info\"\n[mqtt]\nbroker = \"b\"\nport = 1\n",
        )?;

        let result = load_from_path(&path);
        let _ = fs::remove_file(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        Ok(())
    }
}
