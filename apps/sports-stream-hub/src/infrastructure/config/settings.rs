//! Hub Configuration Settings
//!
//! Configuration types for the hub, loaded from environment variables.

use std::time::Duration;

/// Which producer feeds events into the hub.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventSourceKind {
    /// Fixed-interval synthetic generator.
    #[default]
    Synthetic,
    /// Live upstream WebSocket feed.
    Upstream,
    /// No producer; the hub only serves client commands.
    None,
}

impl EventSourceKind {
    /// Parse a source name.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unrecognized names.
    pub fn parse(s: &str) -> Result<Self, ConfigError> {
        match s.trim().to_lowercase().as_str() {
            "synthetic" => Ok(Self::Synthetic),
            "upstream" => Ok(Self::Upstream),
            "none" | "off" => Ok(Self::None),
            _ => Err(ConfigError::InvalidValue {
                key: "SPORTS_HUB_EVENT_SOURCE".to_string(),
                value: s.to_string(),
            }),
        }
    }

    /// Get the source name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Upstream => "upstream",
            Self::None => "none",
        }
    }
}

/// Server port and queue settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Client WebSocket port.
    pub ws_port: u16,
    /// Health check HTTP port.
    pub health_port: u16,
    /// Frames buffered per connection before new ones are dropped.
    pub outbound_queue_capacity: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            ws_port: 8080,
            health_port: 8082,
            outbound_queue_capacity: 256,
        }
    }
}

/// Greeting sent to each client after registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WelcomeSettings {
    /// Greeting text.
    pub message: String,
    /// Advertised feature names.
    pub features: Vec<String>,
}

impl Default for WelcomeSettings {
    fn default() -> Self {
        Self {
            message: "Connected to live sports updates".to_string(),
            features: [
                "live_scores",
                "game_subscriptions",
                "player_subscriptions",
                "injury_updates",
                "betting_alerts",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Synthetic generator settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticSettings {
    /// Time between ticks.
    pub interval: Duration,
    /// Game identifiers to generate updates for.
    pub games: Vec<String>,
}

impl Default for SyntheticSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            games: ["G1", "G2", "G3", "G4"].into_iter().map(String::from).collect(),
        }
    }
}

/// Upstream feed connection settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// Upstream WebSocket URL.
    pub upstream_url: Option<String>,
    /// Heartbeat ping interval.
    pub heartbeat_interval: Duration,
    /// Heartbeat timeout before considering connection dead.
    pub heartbeat_timeout: Duration,
    /// Initial reconnection delay.
    pub reconnect_delay_initial: Duration,
    /// Maximum reconnection delay.
    pub reconnect_delay_max: Duration,
    /// Reconnection delay multiplier for exponential backoff.
    pub reconnect_delay_multiplier: f64,
    /// Maximum reconnection attempts before giving up (0 = unlimited).
    pub max_reconnect_attempts: u32,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            upstream_url: None,
            heartbeat_interval: Duration::from_secs(30),
            heartbeat_timeout: Duration::from_secs(60),
            reconnect_delay_initial: Duration::from_millis(500),
            reconnect_delay_max: Duration::from_secs(30),
            reconnect_delay_multiplier: 2.0,
            max_reconnect_attempts: 0, // Unlimited
        }
    }
}

/// Complete hub configuration.
#[derive(Debug, Clone, Default)]
pub struct HubConfig {
    /// Server port settings.
    pub server: ServerSettings,
    /// Welcome message settings.
    pub welcome: WelcomeSettings,
    /// Selected event producer.
    pub event_source: EventSourceKind,
    /// Synthetic generator settings.
    pub synthetic: SyntheticSettings,
    /// Upstream feed settings.
    pub feed: FeedSettings,
}

impl HubConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the event source is unknown, or if the upstream
    /// source is selected without a URL.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary variable lookup.
    ///
    /// # Errors
    ///
    /// Same as [`HubConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };
        let defaults = Self::default();

        let event_source = env
            .get("SPORTS_HUB_EVENT_SOURCE")
            .map(|s| EventSourceKind::parse(&s))
            .transpose()?
            .unwrap_or_default();

        let server = ServerSettings {
            ws_port: env.parse("SPORTS_HUB_WS_PORT", defaults.server.ws_port),
            health_port: env.parse("SPORTS_HUB_HEALTH_PORT", defaults.server.health_port),
            outbound_queue_capacity: env
                .parse(
                    "SPORTS_HUB_OUTBOUND_QUEUE_CAPACITY",
                    defaults.server.outbound_queue_capacity,
                )
                .max(1),
        };

        let welcome = WelcomeSettings {
            message: env
                .get("SPORTS_HUB_WELCOME_MESSAGE")
                .unwrap_or(defaults.welcome.message),
            features: env
                .list("SPORTS_HUB_FEATURES")
                .unwrap_or(defaults.welcome.features),
        };

        let synthetic = SyntheticSettings {
            interval: env.duration_secs(
                "SPORTS_HUB_SYNTHETIC_INTERVAL_SECS",
                defaults.synthetic.interval,
            ),
            games: env
                .list("SPORTS_HUB_SYNTHETIC_GAMES")
                .unwrap_or(defaults.synthetic.games),
        };

        let upstream_url = env.get("SPORTS_HUB_UPSTREAM_URL");
        if event_source == EventSourceKind::Upstream {
            match upstream_url.as_deref() {
                None => {
                    return Err(ConfigError::MissingEnvVar(
                        "SPORTS_HUB_UPSTREAM_URL".to_string(),
                    ));
                }
                Some(url) if url.trim().is_empty() => {
                    return Err(ConfigError::EmptyValue(
                        "SPORTS_HUB_UPSTREAM_URL".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }

        let feed = FeedSettings {
            upstream_url,
            heartbeat_interval: env.duration_secs(
                "SPORTS_HUB_HEARTBEAT_INTERVAL_SECS",
                defaults.feed.heartbeat_interval,
            ),
            heartbeat_timeout: env.duration_secs(
                "SPORTS_HUB_HEARTBEAT_TIMEOUT_SECS",
                defaults.feed.heartbeat_timeout,
            ),
            reconnect_delay_initial: env.duration_millis(
                "SPORTS_HUB_RECONNECT_DELAY_INITIAL_MS",
                defaults.feed.reconnect_delay_initial,
            ),
            reconnect_delay_max: env.duration_secs(
                "SPORTS_HUB_RECONNECT_DELAY_MAX_SECS",
                defaults.feed.reconnect_delay_max,
            ),
            reconnect_delay_multiplier: env.parse(
                "SPORTS_HUB_RECONNECT_DELAY_MULTIPLIER",
                defaults.feed.reconnect_delay_multiplier,
            ),
            max_reconnect_attempts: env.parse(
                "SPORTS_HUB_MAX_RECONNECT_ATTEMPTS",
                defaults.feed.max_reconnect_attempts,
            ),
        };

        Ok(Self {
            server,
            welcome,
            event_source,
            synthetic,
            feed,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Required environment variable is missing.
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has an unrecognized value.
    #[error("invalid value for {key}: {value}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Rejected value.
        value: String,
    },
}

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Zero is not a usable period and falls back to the default.
    fn positive(&self, key: &str) -> Option<u64> {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
    }

    fn duration_secs(&self, key: &str, default: Duration) -> Duration {
        self.positive(key).map_or(default, Duration::from_secs)
    }

    fn duration_millis(&self, key: &str, default: Duration) -> Duration {
        self.positive(key).map_or(default, Duration::from_millis)
    }

    /// Comma separated list; `None` when unset or empty.
    fn list(&self, key: &str) -> Option<Vec<String>> {
        let items: Vec<String> = self
            .get(key)?
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect();
        (!items.is_empty()).then_some(items)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(vars: &[(&str, &str)]) -> Result<HubConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        HubConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn event_source_parsing() {
        assert_eq!(
            EventSourceKind::parse("synthetic").unwrap(),
            EventSourceKind::Synthetic
        );
        assert_eq!(
            EventSourceKind::parse("UPSTREAM").unwrap(),
            EventSourceKind::Upstream
        );
        assert_eq!(EventSourceKind::parse("none").unwrap(), EventSourceKind::None);
        assert!(EventSourceKind::parse("kafka").is_err());
    }

    #[test]
    fn defaults_when_environment_is_empty() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.server.ws_port, 8080);
        assert_eq!(config.server.health_port, 8082);
        assert_eq!(config.server.outbound_queue_capacity, 256);
        assert_eq!(config.event_source, EventSourceKind::Synthetic);
        assert_eq!(config.synthetic.interval, Duration::from_secs(30));
        assert!(!config.synthetic.games.is_empty());
        assert!(config.feed.upstream_url.is_none());
    }

    #[test]
    fn feed_settings_defaults() {
        let settings = FeedSettings::default();
        assert_eq!(settings.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(settings.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(settings.reconnect_delay_initial, Duration::from_millis(500));
        assert_eq!(settings.reconnect_delay_max, Duration::from_secs(30));
        assert!((settings.reconnect_delay_multiplier - 2.0).abs() < f64::EPSILON);
        assert_eq!(settings.max_reconnect_attempts, 0);
    }

    #[test]
    fn overrides_are_applied() {
        let config = config_from(&[
            ("SPORTS_HUB_WS_PORT", "9000"),
            ("SPORTS_HUB_FEATURES", "live_scores, betting_alerts,"),
            ("SPORTS_HUB_SYNTHETIC_GAMES", "NFL-1,NFL-2"),
            ("SPORTS_HUB_SYNTHETIC_INTERVAL_SECS", "5"),
            ("SPORTS_HUB_RECONNECT_DELAY_INITIAL_MS", "250"),
        ])
        .unwrap();

        assert_eq!(config.server.ws_port, 9000);
        assert_eq!(config.welcome.features, vec!["live_scores", "betting_alerts"]);
        assert_eq!(config.synthetic.games, vec!["NFL-1", "NFL-2"]);
        assert_eq!(config.synthetic.interval, Duration::from_secs(5));
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_millis(250));
    }

    #[test]
    fn invalid_numbers_fall_back_to_defaults() {
        let config = config_from(&[
            ("SPORTS_HUB_WS_PORT", "not-a-port"),
            ("SPORTS_HUB_OUTBOUND_QUEUE_CAPACITY", "0"),
        ])
        .unwrap();

        assert_eq!(config.server.ws_port, 8080);
        assert_eq!(config.server.outbound_queue_capacity, 1);
    }

    #[test]
    fn zero_durations_fall_back_to_defaults() {
        let config = config_from(&[
            ("SPORTS_HUB_SYNTHETIC_INTERVAL_SECS", "0"),
            ("SPORTS_HUB_HEARTBEAT_INTERVAL_SECS", "0"),
            ("SPORTS_HUB_HEARTBEAT_TIMEOUT_SECS", " 0 "),
            ("SPORTS_HUB_RECONNECT_DELAY_INITIAL_MS", "0"),
        ])
        .unwrap();

        assert_eq!(config.synthetic.interval, Duration::from_secs(30));
        assert_eq!(config.feed.heartbeat_interval, Duration::from_secs(30));
        assert_eq!(config.feed.heartbeat_timeout, Duration::from_secs(60));
        assert_eq!(config.feed.reconnect_delay_initial, Duration::from_millis(500));
    }

    #[test]
    fn upstream_requires_url() {
        let err = config_from(&[("SPORTS_HUB_EVENT_SOURCE", "upstream")]).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == "SPORTS_HUB_UPSTREAM_URL"));

        let err = config_from(&[
            ("SPORTS_HUB_EVENT_SOURCE", "upstream"),
            ("SPORTS_HUB_UPSTREAM_URL", " "),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::EmptyValue(_)));

        let config = config_from(&[
            ("SPORTS_HUB_EVENT_SOURCE", "upstream"),
            ("SPORTS_HUB_UPSTREAM_URL", "ws://feed.local/events"),
        ])
        .unwrap();
        assert_eq!(config.event_source, EventSourceKind::Upstream);
        assert_eq!(
            config.feed.upstream_url.as_deref(),
            Some("ws://feed.local/events")
        );
    }
}
