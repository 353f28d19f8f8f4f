//! Configuration for the gong daemon
//!
//! CLI arguments and environment variables via clap, socket and reconnect
//! tuning from an optional TOML file.

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::channel::{BackoffConfig, ClientConfig, Payload};
use crate::error::ConfigError;

/// Gong - listens for contract notifications on a Phoenix channel
#[derive(Parser, Debug, Clone)]
#[command(name = "gong")]
#[command(about = "Listens for contract notifications on a Phoenix channel")]
pub struct Args {
    /// TOML file with socket and reconnect settings
    #[arg(long, short, env = "GONG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Token sent in the socket URL and in every join
    #[arg(long, env = "GUARDIAN_TOKEN", hide_env_values = true)]
    pub guardian_token: String,

    /// Socket URL override
    #[arg(long, env = "GONG_ENDPOINT")]
    pub endpoint: Option<String>,

    /// Topics to join, comma separated
    #[arg(long, env = "GONG_TOPICS", value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

impl Args {
    pub fn validate(&self) -> Result<(), String> {
        if self.guardian_token.trim().is_empty() {
            return Err("GUARDIAN_TOKEN must not be empty".to_string());
        }
        if self.topics.iter().any(|t| t.trim().is_empty()) {
            return Err("topics must not be empty".to_string());
        }
        Ok(())
    }

    /// File config (or defaults) with command line overrides applied.
    pub fn load_config(&self) -> Result<Config, ConfigError> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        if !self.topics.is_empty() {
            config.topics = self.topics.clone();
        }
        Ok(config)
    }
}

/// Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Phoenix socket URL, without the query string
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Topics to join, in order
    #[serde(default = "default_topics")]
    pub topics: Vec<String>,

    /// Phoenix serializer version, sent as the `vsn` query parameter
    #[serde(default = "default_protocol_version")]
    pub protocol_version: String,

    /// Seconds between client heartbeats
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,

    /// Seconds without a heartbeat acknowledgment before reconnecting
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_secs: u64,

    /// First reconnect delay in milliseconds
    #[serde(default = "default_backoff_min")]
    pub backoff_min_ms: u64,

    /// Longest reconnect delay in milliseconds
    #[serde(default = "default_backoff_max")]
    pub backoff_max_ms: u64,

    /// Growth factor between reconnect attempts
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,

    /// Randomize reconnect delays
    #[serde(default = "default_true")]
    pub backoff_jitter: bool,

    /// Events buffered while the consumer is busy
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// WebSocket handshake timeout in seconds
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
}

fn default_endpoint() -> String {
    "wss://opendoor-pusher.herokuapp.com/events/websocket".to_string()
}

fn default_topics() -> Vec<String> {
    vec!["private:contracts".to_string()]
}

fn default_protocol_version() -> String {
    "1.0.0".to_string()
}

fn default_heartbeat_interval() -> u64 {
    30
}

fn default_heartbeat_timeout() -> u64 {
    60
}

fn default_backoff_min() -> u64 {
    100
}

fn default_backoff_max() -> u64 {
    10_000
}

fn default_backoff_factor() -> f64 {
    2.0
}

fn default_true() -> bool {
    true
}

fn default_event_buffer() -> usize {
    1
}

fn default_handshake_timeout() -> u64 {
    10
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            topics: default_topics(),
            protocol_version: default_protocol_version(),
            heartbeat_interval_secs: default_heartbeat_interval(),
            heartbeat_timeout_secs: default_heartbeat_timeout(),
            backoff_min_ms: default_backoff_min(),
            backoff_max_ms: default_backoff_max(),
            backoff_factor: default_backoff_factor(),
            backoff_jitter: default_true(),
            event_buffer: default_event_buffer(),
            handshake_timeout_secs: default_handshake_timeout(),
        }
    }
}

/// Join payload expected by the contracts channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardianPayload {
    pub guardian_token: String,
}

impl Config {
    /// Load config from file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Socket URL with the protocol version and guardian token appended.
    pub fn endpoint_url(&self, guardian_token: &str) -> Result<Url, ConfigError> {
        let mut url = Url::parse(&self.endpoint)?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(ConfigError::Invalid(format!(
                "endpoint must be ws:// or wss://, got {}://",
                url.scheme()
            )));
        }
        url.query_pairs_mut()
            .append_pair("vsn", &self.protocol_version)
            .append_pair("guardian_token", guardian_token);
        Ok(url)
    }

    /// Build the channel client configuration.
    pub fn client_config(&self, guardian_token: &str) -> Result<ClientConfig, ConfigError> {
        if guardian_token.is_empty() {
            return Err(ConfigError::Invalid("guardian token is required".into()));
        }
        if self.topics.is_empty() {
            return Err(ConfigError::Invalid("at least one topic is required".into()));
        }

        let join_payload = Payload::encode(&GuardianPayload {
            guardian_token: guardian_token.to_string(),
        })?;

        let config = ClientConfig::new(self.endpoint_url(guardian_token)?, self.topics.clone())
            .with_join_payload(join_payload)
            .with_heartbeat(
                Duration::from_secs(self.heartbeat_interval_secs),
                Duration::from_secs(self.heartbeat_timeout_secs),
            )
            .with_backoff(BackoffConfig {
                min: Duration::from_millis(self.backoff_min_ms),
                max: Duration::from_millis(self.backoff_max_ms),
                factor: self.backoff_factor,
                jitter: self.backoff_jitter,
            })
            .with_event_buffer(self.event_buffer)
            .with_handshake_timeout(Duration::from_secs(self.handshake_timeout_secs));

        config
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(config)
    }
}
