//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use crate::game::RoomSettings;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Emit logs as JSON lines
    pub log_json: bool,
    /// Deadline for plain HTTP requests
    pub request_timeout: Duration,

    /// Keepalive interval, zero disables it
    pub ping_interval: Duration,
    /// Inbound messages per second per connection
    pub input_rate_limit: u32,
    /// Largest accepted inbound frame
    pub max_message_bytes: usize,
    /// Outbound frames buffered per connection
    pub session_queue_capacity: usize,

    /// Server-driven fall interval, zero leaves falling to clients
    pub gravity: Duration,
    /// Blocked down attempts before a figure is fixed in place, zero (default) disables
    pub blocked_fix_threshold: u32,
    /// Commands buffered per room
    pub room_queue_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            log_level: "info".to_string(),
            log_json: false,
            request_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(15),
            input_rate_limit: 30,
            max_message_bytes: 64 * 1024,
            session_queue_capacity: 256,
            gravity: Duration::ZERO,
            blocked_fix_threshold: 0,
            room_queue_capacity: 256,
        }
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from any key lookup; unset keys keep defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        // Hosting platforms provide PORT, fall back to SERVER_ADDR or default
        let server_addr = match (lookup("PORT"), lookup("SERVER_ADDR")) {
            (Some(port), _) => format!("0.0.0.0:{}", port)
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            (None, Some(addr)) => addr.parse().map_err(|_| ConfigError::InvalidAddress)?,
            (None, None) => defaults.server_addr,
        };

        Ok(Self {
            server_addr,
            log_level: lookup("LOG_LEVEL").unwrap_or(defaults.log_level),
            log_json: lookup("LOG_FORMAT")
                .map(|format| format.trim().eq_ignore_ascii_case("json"))
                .unwrap_or(defaults.log_json),
            request_timeout: positive(&lookup, "REQUEST_TIMEOUT_SECS")?
                .map(|secs| Duration::from_secs(secs as u64))
                .unwrap_or(defaults.request_timeout),
            ping_interval: parse(&lookup, "PING_INTERVAL_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.ping_interval),
            input_rate_limit: parse(&lookup, "INPUT_RATE_LIMIT")?
                .unwrap_or(defaults.input_rate_limit),
            max_message_bytes: parse(&lookup, "MAX_MESSAGE_BYTES")?
                .unwrap_or(defaults.max_message_bytes),
            session_queue_capacity: positive(&lookup, "SESSION_QUEUE_CAPACITY")?
                .unwrap_or(defaults.session_queue_capacity),
            gravity: parse(&lookup, "GRAVITY_MS")?
                .map(Duration::from_millis)
                .unwrap_or(defaults.gravity),
            blocked_fix_threshold: parse(&lookup, "BLOCKED_FIX_THRESHOLD")?
                .unwrap_or(defaults.blocked_fix_threshold),
            room_queue_capacity: positive(&lookup, "ROOM_QUEUE_CAPACITY")?
                .unwrap_or(defaults.room_queue_capacity),
        })
    }

    /// Settings handed to every new room
    pub fn room_settings(&self) -> RoomSettings {
        RoomSettings {
            gravity: (!self.gravity.is_zero()).then_some(self.gravity),
            blocked_fix_threshold: self.blocked_fix_threshold,
            queue_capacity: self.room_queue_capacity,
        }
    }
}

fn parse<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(None),
    }
}

fn positive<F>(lookup: &F, key: &'static str) -> Result<Option<usize>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse::<F, usize>(lookup, key)? {
        Some(0) => Err(ConfigError::Invalid {
            key,
            value: "0".to_string(),
        }),
        other => Ok(other),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = load(&[]).expect("defaults");
        assert_eq!(config.server_addr.port(), 8080);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.ping_interval, Duration::from_secs(15));
        assert_eq!(config.blocked_fix_threshold, 0);
        assert!(config.room_settings().gravity.is_none());
        assert!(!config.log_json);
    }

    #[test]
    fn json_log_format() {
        assert!(load(&[("LOG_FORMAT", "JSON")]).expect("config").log_json);
        assert!(!load(&[("LOG_FORMAT", "pretty")]).expect("config").log_json);
    }

    #[test]
    fn port_wins_over_server_addr() {
        let config = load(&[("PORT", "9000"), ("SERVER_ADDR", "127.0.0.1:1234")]).expect("config");
        assert_eq!(config.server_addr.port(), 9000);

        let config = load(&[("SERVER_ADDR", "127.0.0.1:1234")]).expect("config");
        assert_eq!(config.server_addr.to_string(), "127.0.0.1:1234");
    }

    #[test]
    fn gravity_enables_room_ticks() {
        let config = load(&[("GRAVITY_MS", "500"), ("BLOCKED_FIX_THRESHOLD", "12")]).expect("config");
        let settings = config.room_settings();
        assert_eq!(settings.gravity, Some(Duration::from_millis(500)));
        assert_eq!(settings.blocked_fix_threshold, 12);
    }

    #[test]
    fn bad_values_are_reported() {
        assert!(matches!(
            load(&[("PORT", "http")]),
            Err(ConfigError::InvalidAddress)
        ));
        assert!(matches!(
            load(&[("INPUT_RATE_LIMIT", "fast")]),
            Err(ConfigError::Invalid {
                key: "INPUT_RATE_LIMIT",
                ..
            })
        ));
        assert!(matches!(
            load(&[("ROOM_QUEUE_CAPACITY", "0")]),
            Err(ConfigError::Invalid { .. })
        ));
    }
}
