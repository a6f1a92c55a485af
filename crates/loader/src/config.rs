//! Fetch configuration: timeouts, body limit and user agent.

use std::time::Duration;

use photowall_cache::ConfigError;
use serde::Deserialize;

/// Environment variable overriding the connect timeout in milliseconds.
pub const CONNECT_TIMEOUT_ENV: &str = "PHOTOWALL_CONNECT_TIMEOUT_MS";

/// Environment variable overriding the read timeout in milliseconds.
pub const READ_TIMEOUT_ENV: &str = "PHOTOWALL_READ_TIMEOUT_MS";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_MAX_BODY_BYTES: u64 = 32 * 1024 * 1024;

/// Settings for the HTTP transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchConfig {
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Responses larger than this are failed instead of buffered
    pub max_body_bytes: u64,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_TIMEOUT,
            read_timeout: DEFAULT_TIMEOUT,
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            user_agent: concat!("photowall/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// On-disk representation (`[fetch]` table)
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FetchConfigFile {
    pub connect_timeout_ms: Option<u64>,
    pub read_timeout_ms: Option<u64>,
    pub max_body_mb: Option<u64>,
    pub user_agent: Option<String>,
}

impl FetchConfig {
    pub fn with_timeouts(mut self, connect: Duration, read: Duration) -> Self {
        self.connect_timeout = connect;
        self.read_timeout = read;
        self
    }

    pub fn with_max_body_bytes(mut self, bytes: u64) -> Self {
        self.max_body_bytes = bytes;
        self
    }

    /// Applies values present in a parsed file section.
    pub fn apply_file(mut self, file: &FetchConfigFile) -> Self {
        if let Some(ms) = file.connect_timeout_ms {
            self.connect_timeout = Duration::from_millis(ms);
        }
        if let Some(ms) = file.read_timeout_ms {
            self.read_timeout = Duration::from_millis(ms);
        }
        if let Some(mb) = file.max_body_mb {
            self.max_body_bytes = mb.saturating_mul(1024 * 1024);
        }
        if let Some(agent) = &file.user_agent {
            self.user_agent = agent.clone();
        }
        self
    }

    /// Parses a standalone TOML document. Missing keys keep defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: FetchConfigFile = toml::from_str(toml_str)?;
        Ok(Self::default().apply_file(&file))
    }

    /// Default configuration with environment overrides applied.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies environment overrides on top of `self`.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Some(ms) = env_millis(CONNECT_TIMEOUT_ENV)? {
            self.connect_timeout = ms;
        }
        if let Some(ms) = env_millis(READ_TIMEOUT_ENV)? {
            self.read_timeout = ms;
        }
        Ok(self)
    }
}

fn env_millis(name: &str) -> Result<Option<Duration>, ConfigError> {
    match std::env::var(name) {
        Ok(val) => val
            .trim()
            .parse::<u64>()
            .map(|ms| Some(Duration::from_millis(ms)))
            .map_err(|_| ConfigError::InvalidValue(name.to_string())),
        Err(_) => Ok(None),
    }
}
