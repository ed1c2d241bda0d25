//! Feed configuration: YAML and `host:port` loaders plus validation.

use std::collections::HashSet;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

/// Configuration errors. All fatal at construction.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration declares no feeds")]
    NoFeeds,
    #[error("feed {0}: host is empty")]
    EmptyHost(String),
    #[error("feed {0}: port is zero")]
    InvalidPort(String),
    #[error("duplicate origin id {0}")]
    DuplicateOriginId(u32),
    #[error("feed {0}: heartbeat interval is zero")]
    ZeroHeartbeat(String),
    #[error("feed {0}: timeout multiplier is zero")]
    ZeroTimeoutMultiplier(String),
    #[error("{name}: buffer capacity {capacity} is not a nonzero power of two")]
    InvalidCapacity { name: String, capacity: u64 },
    #[error("invalid feed spec {0:?} (expected host:port)")]
    InvalidFeedSpec(String),
    #[error("failed to read configuration file")]
    Io(#[from] std::io::Error),
    #[error("failed to parse configuration")]
    Yaml(#[from] serde_yaml::Error),
}

/// One upstream feed.
#[derive(Clone, Debug)]
pub struct FeedConfig {
    /// Feed identifier (used in logs and the health summary).
    pub name: String,
    pub host: String,
    pub port: u16,
    /// Unique feed identifier for sequence attribution.
    pub origin_id: u32,
    /// Primary vs backup feed.
    pub is_primary: bool,
    /// Expected heartbeat interval.
    pub heartbeat_ms: u64,
    /// Dead threshold = `heartbeat_ms * timeout_multiplier`.
    pub timeout_multiplier: u32,
    /// Local ring capacity (power of two).
    pub buffer_capacity: u64,
}

impl FeedConfig {
    /// A primary feed on `host:port` with default timings.
    pub fn new(name: &str, host: &str, port: u16, origin_id: u32) -> Self {
        Self {
            name: name.to_string(),
            host: host.to_string(),
            port,
            origin_id,
            is_primary: true,
            heartbeat_ms: 1000,
            timeout_multiplier: 3,
            buffer_capacity: 65_536,
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.host.is_empty() {
            return Err(ConfigError::EmptyHost(self.name.clone()));
        }
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.name.clone()));
        }
        if self.heartbeat_ms == 0 {
            return Err(ConfigError::ZeroHeartbeat(self.name.clone()));
        }
        if self.timeout_multiplier == 0 {
            return Err(ConfigError::ZeroTimeoutMultiplier(self.name.clone()));
        }
        validate_power_of_two(&self.name, self.buffer_capacity)
    }
}

/// Multi-feed run configuration.
#[derive(Clone, Debug)]
pub struct MultiFeedConfig {
    pub feeds: Vec<FeedConfig>,
    /// Fan-in MPSC ring capacity (power of two).
    pub global_buffer_capacity: u64,
    /// Health state machine cadence.
    pub health_check_interval_ms: u64,
    pub max_seconds: Option<u64>,
    pub max_messages: Option<u64>,
}

impl Default for MultiFeedConfig {
    fn default() -> Self {
        Self {
            feeds: Vec::new(),
            global_buffer_capacity: 262_144,
            health_check_interval_ms: 100,
            max_seconds: None,
            max_messages: None,
        }
    }
}

// YAML shapes. Every field is optional; unknown fields are ignored.

#[derive(Deserialize)]
struct RawConfig {
    #[serde(default)]
    global: RawGlobal,
    #[serde(default)]
    feeds: Vec<RawFeed>,
}

#[derive(Default, Deserialize)]
struct RawGlobal {
    buffer_capacity: Option<u64>,
    health_check_interval_ms: Option<u64>,
    max_seconds: Option<u64>,
    max_messages: Option<u64>,
}

#[derive(Deserialize)]
struct RawFeed {
    name: Option<String>,
    host: Option<String>,
    port: Option<u16>,
    origin_id: Option<u32>,
    is_primary: Option<bool>,
    heartbeat_ms: Option<u64>,
    timeout_multiplier: Option<u32>,
    buffer_capacity: Option<u64>,
}

impl MultiFeedConfig {
    /// Load and validate a YAML configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        Self::from_yaml_str(&std::fs::read_to_string(path)?)
    }

    /// Parse and validate a YAML document.
    ///
    /// Missing feed names default to `feed_<index>`, missing origin ids to
    /// the feed's index; a `max_*` of 0 means unlimited.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(yaml)?;
        let defaults = MultiFeedConfig::default();

        let feeds = raw
            .feeds
            .into_iter()
            .enumerate()
            .map(|(index, feed)| {
                let origin_id = feed.origin_id.unwrap_or(index as u32);
                let mut cfg = FeedConfig::new(
                    &feed.name.unwrap_or_else(|| format!("feed_{}", origin_id)),
                    feed.host.as_deref().unwrap_or("127.0.0.1"),
                    feed.port.unwrap_or(9001),
                    origin_id,
                );
                if let Some(is_primary) = feed.is_primary {
                    cfg.is_primary = is_primary;
                }
                if let Some(heartbeat_ms) = feed.heartbeat_ms {
                    cfg.heartbeat_ms = heartbeat_ms;
                }
                if let Some(timeout_multiplier) = feed.timeout_multiplier {
                    cfg.timeout_multiplier = timeout_multiplier;
                }
                if let Some(buffer_capacity) = feed.buffer_capacity {
                    cfg.buffer_capacity = buffer_capacity;
                }
                cfg
            })
            .collect();

        let config = Self {
            feeds,
            global_buffer_capacity: raw
                .global
                .buffer_capacity
                .unwrap_or(defaults.global_buffer_capacity),
            health_check_interval_ms: raw
                .global
                .health_check_interval_ms
                .unwrap_or(defaults.health_check_interval_ms),
            max_seconds: raw.global.max_seconds.filter(|&s| s > 0),
            max_messages: raw.global.max_messages.filter(|&m| m > 0),
        };

        config.validate()?;
        Ok(config)
    }

    /// Build a configuration from `host:port` feed specs; the first feed is
    /// primary, the rest are backups.
    pub fn from_feed_specs(specs: &[String]) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        for (index, spec) in specs.iter().enumerate() {
            let (host, port) = spec
                .rsplit_once(':')
                .ok_or_else(|| ConfigError::InvalidFeedSpec(spec.clone()))?;
            let port: u16 = port
                .parse()
                .map_err(|_| ConfigError::InvalidFeedSpec(spec.clone()))?;

            let mut feed =
                FeedConfig::new(&format!("feed_{}", index), host, port, index as u32);
            feed.is_primary = index == 0;
            config.feeds.push(feed);
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate the whole configuration; fatal at construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.feeds.is_empty() {
            return Err(ConfigError::NoFeeds);
        }

        let mut origin_ids = HashSet::new();
        for feed in &self.feeds {
            feed.validate()?;
            if !origin_ids.insert(feed.origin_id) {
                return Err(ConfigError::DuplicateOriginId(feed.origin_id));
            }
        }

        validate_power_of_two("global", self.global_buffer_capacity)?;
        if self.health_check_interval_ms == 0 {
            return Err(ConfigError::ZeroHeartbeat("global".to_string()));
        }
        Ok(())
    }
}

fn validate_power_of_two(name: &str, capacity: u64) -> Result<(), ConfigError> {
    if capacity == 0 || !capacity.is_power_of_two() {
        return Err(ConfigError::InvalidCapacity {
            name: name.to_string(),
            capacity,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const YAML: &str = r#"
global:
  buffer_capacity: 1024
  health_check_interval_ms: 50
  max_seconds: 30
  max_messages: 0
feeds:
  - name: nyse_primary
    host: 10.0.0.1
    port: 9001
    heartbeat_ms: 500
  - name: nyse_backup
    host: 10.0.0.2
    port: 9002
    is_primary: false
    buffer_capacity: 4096
    extra_field_to_ignore: true
"#;

    #[test]
    fn test_yaml_round_trip() {
        let config = MultiFeedConfig::from_yaml_str(YAML).unwrap();

        assert_eq!(config.global_buffer_capacity, 1024);
        assert_eq!(config.health_check_interval_ms, 50);
        assert_eq!(config.max_seconds, Some(30));
        assert_eq!(config.max_messages, None);

        assert_eq!(config.feeds.len(), 2);
        let primary = &config.feeds[0];
        assert_eq!(primary.name, "nyse_primary");
        assert_eq!(primary.host, "10.0.0.1");
        assert_eq!(primary.heartbeat_ms, 500);
        assert!(primary.is_primary);
        assert_eq!(primary.origin_id, 0);

        let backup = &config.feeds[1];
        assert!(!backup.is_primary);
        assert_eq!(backup.buffer_capacity, 4096);
        assert_eq!(backup.origin_id, 1);
    }

    #[test]
    fn test_yaml_defaults() {
        let config = MultiFeedConfig::from_yaml_str("feeds:\n  - port: 9100\n").unwrap();
        let feed = &config.feeds[0];
        assert_eq!(feed.name, "feed_0");
        assert_eq!(feed.host, "127.0.0.1");
        assert_eq!(feed.heartbeat_ms, 1000);
        assert_eq!(feed.timeout_multiplier, 3);
        assert_eq!(config.global_buffer_capacity, 262_144);
    }

    #[test]
    fn test_empty_feed_list_rejected() {
        assert!(matches!(
            MultiFeedConfig::from_yaml_str("feeds: []"),
            Err(ConfigError::NoFeeds)
        ));
    }

    #[test]
    fn test_duplicate_origin_ids_rejected() {
        let yaml = "feeds:\n  - origin_id: 7\n  - origin_id: 7\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(yaml),
            Err(ConfigError::DuplicateOriginId(7))
        ));
    }

    #[test]
    fn test_invalid_fields_rejected() {
        let zero_port = "feeds:\n  - port: 0\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(zero_port),
            Err(ConfigError::InvalidPort(_))
        ));

        let zero_heartbeat = "feeds:\n  - heartbeat_ms: 0\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(zero_heartbeat),
            Err(ConfigError::ZeroHeartbeat(_))
        ));

        let zero_multiplier = "feeds:\n  - timeout_multiplier: 0\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(zero_multiplier),
            Err(ConfigError::ZeroTimeoutMultiplier(_))
        ));

        let bad_capacity = "feeds:\n  - buffer_capacity: 1000\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(bad_capacity),
            Err(ConfigError::InvalidCapacity { .. })
        ));

        let empty_host = "feeds:\n  - host: \"\"\n";
        assert!(matches!(
            MultiFeedConfig::from_yaml_str(empty_host),
            Err(ConfigError::EmptyHost(_))
        ));
    }

    #[test]
    fn test_feed_specs() {
        let specs = vec!["10.1.1.1:9001".to_string(), "10.1.1.2:9002".to_string()];
        let config = MultiFeedConfig::from_feed_specs(&specs).unwrap();

        assert_eq!(config.feeds.len(), 2);
        assert!(config.feeds[0].is_primary);
        assert!(!config.feeds[1].is_primary);
        assert_eq!(config.feeds[1].origin_id, 1);
        assert_eq!(config.feeds[1].port, 9002);
    }

    #[test]
    fn test_bad_feed_spec() {
        let specs = vec!["no-port-here".to_string()];
        assert!(matches!(
            MultiFeedConfig::from_feed_specs(&specs),
            Err(ConfigError::InvalidFeedSpec(_))
        ));
    }
}
