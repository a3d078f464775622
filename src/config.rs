//! Server configuration module
//! Handles the tunable parameters of the room server

use crate::constants::{
    DEFAULT_HISTORY_MAX_SIZE, DEFAULT_HOST, DEFAULT_INBOUND_QUEUE_DEPTH, DEFAULT_LEADERBOARD_FILE,
    DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_PING_INTERVAL, DEFAULT_PONG_WAIT, DEFAULT_PORT,
    DEFAULT_QUEUE_DEPTH, DEFAULT_RATE_LIMIT_MAX_MESSAGES, DEFAULT_RATE_LIMIT_WINDOW, DEFAULT_ROOM,
    DEFAULT_SHUTDOWN_TIMEOUT, DEFAULT_WORKER_COUNT, DEFAULT_WRITE_WAIT, SYSTEM_ROOM_PREFIX,
};
use crate::error::{ChatroomError, Result};
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Server configuration parameters
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Largest inbound frame accepted on a connection, in bytes
    pub max_message_size: usize,
    pub ping_interval: Duration,
    /// A connection that delivers no frame for this long is considered dead
    pub pong_wait: Duration,
    /// Deadline for a single outbound write
    pub write_wait: Duration,
    pub shutdown_timeout: Duration,
    /// Number of workers in the task pool
    pub worker_count: usize,
    /// Capacity of the task pool's job queue
    pub queue_depth: usize,
    /// Capacity of the inbound event queue feeding the ingestion loop
    pub inbound_queue_depth: usize,
    pub rate_limit_enabled: bool,
    pub rate_limit_max_messages: u32,
    pub rate_limit_window: Duration,
    /// Per-room history cap
    pub history_max_size: usize,
    pub leaderboard_file: String,
    /// Public room that is always listed and receives system announcements
    pub default_room: String,
    /// Directory served as static files at `/`, if any
    pub static_dir: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            ping_interval: DEFAULT_PING_INTERVAL,
            pong_wait: DEFAULT_PONG_WAIT,
            write_wait: DEFAULT_WRITE_WAIT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
            worker_count: DEFAULT_WORKER_COUNT,
            queue_depth: DEFAULT_QUEUE_DEPTH,
            inbound_queue_depth: DEFAULT_INBOUND_QUEUE_DEPTH,
            rate_limit_enabled: true,
            rate_limit_max_messages: DEFAULT_RATE_LIMIT_MAX_MESSAGES,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            history_max_size: DEFAULT_HISTORY_MAX_SIZE,
            leaderboard_file: DEFAULT_LEADERBOARD_FILE.to_string(),
            default_room: DEFAULT_ROOM.to_string(),
            static_dir: None,
        }
    }
}

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_secs(key: &str, default: Duration) -> Duration {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(default)
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let config = Self {
            host: env::var("RUSTY_ROOMS_HOST").unwrap_or(defaults.host),
            port: env_parse("RUSTY_ROOMS_PORT", defaults.port),
            max_message_size: env_parse("RUSTY_ROOMS_MAX_MESSAGE_SIZE", defaults.max_message_size),
            ping_interval: env_secs("RUSTY_ROOMS_PING_INTERVAL_SECS", defaults.ping_interval),
            pong_wait: env_secs("RUSTY_ROOMS_PONG_WAIT_SECS", defaults.pong_wait),
            write_wait: env_secs("RUSTY_ROOMS_WRITE_WAIT_SECS", defaults.write_wait),
            shutdown_timeout: env_secs("RUSTY_ROOMS_SHUTDOWN_TIMEOUT_SECS", defaults.shutdown_timeout),
            worker_count: env_parse("RUSTY_ROOMS_WORKER_COUNT", defaults.worker_count),
            queue_depth: env_parse("RUSTY_ROOMS_QUEUE_DEPTH", defaults.queue_depth),
            inbound_queue_depth: env_parse(
                "RUSTY_ROOMS_INBOUND_QUEUE_DEPTH",
                defaults.inbound_queue_depth,
            ),
            rate_limit_enabled: env_bool("RUSTY_ROOMS_RATE_LIMIT_ENABLED", defaults.rate_limit_enabled),
            rate_limit_max_messages: env_parse(
                "RUSTY_ROOMS_RATE_LIMIT_MAX_MESSAGES",
                defaults.rate_limit_max_messages,
            ),
            rate_limit_window: env_secs("RUSTY_ROOMS_RATE_LIMIT_WINDOW_SECS", defaults.rate_limit_window),
            history_max_size: env_parse("RUSTY_ROOMS_HISTORY_MAX_SIZE", defaults.history_max_size),
            leaderboard_file: env::var("RUSTY_ROOMS_LEADERBOARD_FILE")
                .unwrap_or(defaults.leaderboard_file),
            default_room: env::var("RUSTY_ROOMS_DEFAULT_ROOM").unwrap_or(defaults.default_room),
            static_dir: env::var("RUSTY_ROOMS_STATIC_DIR").ok(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject settings the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("worker count", self.worker_count),
            ("queue depth", self.queue_depth),
            ("inbound queue depth", self.inbound_queue_depth),
            ("history size", self.history_max_size),
            ("rate limit max messages", self.rate_limit_max_messages as usize),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ChatroomError::ConfigError(format!("{} must be greater than zero", name)));
            }
        }

        if self.rate_limit_window.is_zero() {
            return Err(ChatroomError::ConfigError(
                "rate limit window must be greater than zero".to_string(),
            ));
        }

        let durations = [
            ("ping interval", self.ping_interval),
            ("pong wait", self.pong_wait),
            ("write wait", self.write_wait),
        ];
        for (name, value) in durations {
            if value.is_zero() {
                return Err(ChatroomError::ConfigError(format!("{} must be greater than zero", name)));
            }
        }

        if self.default_room.trim().is_empty() {
            return Err(ChatroomError::ConfigError("default room must not be empty".to_string()));
        }
        if self.default_room.starts_with(SYSTEM_ROOM_PREFIX) {
            return Err(ChatroomError::ConfigError(format!(
                "default room '{}' must not use the system prefix '{}'",
                self.default_room, SYSTEM_ROOM_PREFIX
            )));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = ServerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.port, 8080);
        assert_eq!(config.worker_count, 10);
        assert_eq!(config.history_max_size, 100);
    }

    #[test]
    fn test_zero_workers_rejected() {
        let config = ServerConfig { worker_count: 0, ..ServerConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("worker count"));
    }

    #[test]
    fn test_system_default_room_rejected() {
        let config = ServerConfig { default_room: "_lobby".to_string(), ..ServerConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_ping_interval_rejected() {
        let config = ServerConfig { ping_interval: Duration::ZERO, ..ServerConfig::default() };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("ping interval"));
    }

    #[test]
    fn test_from_env_overrides() {
        env::set_var("RUSTY_ROOMS_HISTORY_MAX_SIZE", "7");
        env::set_var("RUSTY_ROOMS_RATE_LIMIT_ENABLED", "false");
        let config = ServerConfig::from_env().unwrap();
        assert_eq!(config.history_max_size, 7);
        assert!(!config.rate_limit_enabled);
        env::remove_var("RUSTY_ROOMS_HISTORY_MAX_SIZE");
        env::remove_var("RUSTY_ROOMS_RATE_LIMIT_ENABLED");
    }
}
