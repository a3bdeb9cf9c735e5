//! Client configuration.
//!
//! Values resolve in order: command-line flag, environment variable, default.
//! Defaults mirror a local development server.

use std::{path::PathBuf, time::Duration};

use notifi_app::{AppConfig, BatchSize};
use notifi_core::{
    ConnectionConfig, ReconnectPolicy,
    connection::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_RECONNECT_DELAY},
};
use notifi_proto::{Endpoints, ProtocolError};
use thiserror::Error;

/// API origin used when nothing else is configured.
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Environment variable overriding the API origin.
pub const API_URL_VAR: &str = "NOTIFI_API_URL";

/// Environment variable overriding the live-channel origin.
pub const WS_URL_VAR: &str = "NOTIFI_WS_URL";

/// Environment variable overriding the batch size.
pub const BATCH_SIZE_VAR: &str = "NOTIFI_BATCH_SIZE";

/// Environment variable overriding the token file.
pub const TOKEN_FILE_VAR: &str = "NOTIFI_TOKEN_FILE";

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// API or live-channel URL unusable.
    #[error(transparent)]
    Endpoint(#[from] ProtocolError),

    /// Batch size not one of the selectable values.
    #[error("invalid batch size {0:?}: expected 10, 20 or 50")]
    BatchSize(String),
}

/// Values given on the command line. `None` falls through to the environment.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// API origin
    pub api_url: Option<String>,
    /// Live-channel origin
    pub ws_url: Option<String>,
    /// Messages per history fetch
    pub batch_size: Option<u32>,
    /// Where the auth token is kept between runs
    pub token_file: Option<PathBuf>,
}

/// Resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// REST and live-channel endpoints
    pub endpoints: Endpoints,
    /// Messages per history fetch
    pub batch_size: BatchSize,
    /// Delay before reconnecting after an abnormal close
    pub reconnect_delay: Duration,
    /// Time allowed for the live channel to open
    pub connect_timeout: Duration,
    /// Time allowed for a history fetch
    pub fetch_timeout: Duration,
    /// Token file. `None` disables persistence.
    pub token_file: Option<PathBuf>,
}

impl ClientConfig {
    /// Resolve configuration from `overrides` and the process environment.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Endpoint` if a URL is unusable
    /// - `ConfigError::BatchSize` if the batch size is not 10, 20 or 50
    pub fn from_env(overrides: ConfigOverrides) -> Result<Self, ConfigError> {
        Self::resolve(overrides, |key| std::env::var(key).ok())
    }

    /// Resolve configuration from `overrides` and a variable lookup.
    ///
    /// # Errors
    ///
    /// - `ConfigError::Endpoint` if a URL is unusable
    /// - `ConfigError::BatchSize` if the batch size is not 10, 20 or 50
    pub fn resolve(
        overrides: ConfigOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let api_url = overrides
            .api_url
            .or_else(|| lookup(API_URL_VAR))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let ws_url = overrides.ws_url.or_else(|| lookup(WS_URL_VAR));
        let endpoints = Endpoints::parse(&api_url, ws_url.as_deref())?;

        let raw_batch = overrides.batch_size.map(|size| size.to_string()).or_else(|| lookup(BATCH_SIZE_VAR));
        let batch_size = match raw_batch {
            Some(raw) => parse_batch_size(&raw)?,
            None => BatchSize::default(),
        };

        let token_file = overrides
            .token_file
            .or_else(|| lookup(TOKEN_FILE_VAR).map(PathBuf::from))
            .or_else(|| lookup("HOME").map(|home| PathBuf::from(home).join(".notifi").join("token")));

        let app = AppConfig::default();
        Ok(Self {
            endpoints,
            batch_size,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            fetch_timeout: app.fetch_timeout,
            token_file,
        })
    }

    /// App state machine configuration.
    pub fn app_config(&self) -> AppConfig {
        AppConfig { fetch_timeout: self.fetch_timeout, batch_size: self.batch_size, ..AppConfig::default() }
    }

    /// Connection state machine configuration.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            reconnect: ReconnectPolicy::Fixed(self.reconnect_delay),
            connect_timeout: self.connect_timeout,
        }
    }
}

fn parse_batch_size(raw: &str) -> Result<BatchSize, ConfigError> {
    raw.trim()
        .parse::<u32>()
        .ok()
        .and_then(|size| BatchSize::try_from(size).ok())
        .ok_or_else(|| ConfigError::BatchSize(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> =
            vars.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults() {
        let config = ClientConfig::resolve(ConfigOverrides::default(), lookup(&[])).unwrap();

        assert_eq!(config.endpoints.api().as_str(), "http://localhost:8000/");
        assert_eq!(config.endpoints.live().as_str(), "ws://localhost:8000/");
        assert_eq!(config.batch_size, BatchSize::Twenty);
        assert_eq!(config.reconnect_delay, Duration::from_secs(3));
        assert_eq!(config.fetch_timeout, Duration::from_secs(15));
        assert_eq!(config.token_file, None);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = ClientConfig::resolve(
            ConfigOverrides::default(),
            lookup(&[
                (API_URL_VAR, "https://chat.example.com"),
                (BATCH_SIZE_VAR, "50"),
                ("HOME", "/home/ada"),
            ]),
        )
        .unwrap();

        assert_eq!(config.endpoints.live().scheme(), "wss");
        assert_eq!(config.batch_size, BatchSize::Fifty);
        assert_eq!(config.token_file, Some(PathBuf::from("/home/ada/.notifi/token")));
    }

    #[test]
    fn flags_override_environment() {
        let overrides = ConfigOverrides {
            api_url: Some("http://127.0.0.1:9000".to_string()),
            ws_url: Some("ws://127.0.0.1:9001".to_string()),
            batch_size: Some(10),
            token_file: Some(PathBuf::from("/tmp/token")),
        };
        let config = ClientConfig::resolve(
            overrides,
            lookup(&[(API_URL_VAR, "https://chat.example.com"), (BATCH_SIZE_VAR, "50")]),
        )
        .unwrap();

        assert_eq!(config.endpoints.api().as_str(), "http://127.0.0.1:9000/");
        assert_eq!(config.endpoints.live().as_str(), "ws://127.0.0.1:9001/");
        assert_eq!(config.batch_size, BatchSize::Ten);
        assert_eq!(config.token_file, Some(PathBuf::from("/tmp/token")));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            ClientConfig::resolve(ConfigOverrides::default(), lookup(&[(BATCH_SIZE_VAR, "25")])),
            Err(ConfigError::BatchSize(_))
        ));
        assert!(matches!(
            ClientConfig::resolve(ConfigOverrides::default(), lookup(&[(API_URL_VAR, "ftp://x")])),
            Err(ConfigError::Endpoint(_))
        ));
    }

    #[test]
    fn derived_state_machine_configs() {
        let config = ClientConfig::resolve(ConfigOverrides::default(), lookup(&[])).unwrap();

        assert_eq!(config.connection_config(), ConnectionConfig::default());
        assert_eq!(config.app_config(), AppConfig::default());
    }
}
