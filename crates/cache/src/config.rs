//! Cache configuration.
//!
//! The capacity defaults to an eighth of physical memory and can be
//! overridden programmatically, from the environment, or from a TOML file.

use std::fs;
use std::io;
use std::path::Path;

use serde::Deserialize;

use crate::memory;

const MB: usize = 1024 * 1024;

/// Environment variable overriding the cache capacity in megabytes.
pub const CACHE_MB_ENV: &str = "PHOTOWALL_CACHE_MB";

/// Configuration for the image cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    /// Capacity in bytes
    pub capacity_bytes: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity_bytes: memory::default_capacity(),
        }
    }
}

/// On-disk representation (`[cache]` table or a standalone file).
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheConfigFile {
    pub capacity_mb: Option<usize>,
}

impl CacheConfig {
    /// Creates a configuration with an explicit capacity in megabytes.
    pub fn new(capacity_mb: usize) -> Self {
        Self {
            capacity_bytes: capacity_mb.saturating_mul(MB),
        }
    }

    /// Sets the capacity in megabytes.
    pub fn with_capacity_mb(mut self, mb: usize) -> Self {
        self.capacity_bytes = mb.saturating_mul(MB);
        self
    }

    /// Sets the capacity in bytes.
    pub fn with_capacity_bytes(mut self, bytes: usize) -> Self {
        self.capacity_bytes = bytes;
        self
    }

    /// Returns the capacity in whole megabytes.
    pub fn capacity_mb(&self) -> usize {
        self.capacity_bytes / MB
    }

    /// Default configuration with environment overrides applied.
    ///
    /// # Errors
    /// Returns an error if `PHOTOWALL_CACHE_MB` is set but not a number.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().apply_env()
    }

    /// Applies environment overrides on top of `self`.
    pub fn apply_env(mut self) -> Result<Self, ConfigError> {
        if let Ok(val) = std::env::var(CACHE_MB_ENV) {
            let mb = val
                .trim()
                .parse::<usize>()
                .map_err(|_| ConfigError::InvalidValue(CACHE_MB_ENV.to_string()))?;
            self.capacity_bytes = mb.saturating_mul(MB);
        }
        Ok(self)
    }

    /// Applies values present in a parsed file section.
    pub fn apply_file(mut self, file: &CacheConfigFile) -> Self {
        if let Some(mb) = file.capacity_mb {
            self.capacity_bytes = mb.saturating_mul(MB);
        }
        self
    }

    /// Loads configuration from a TOML file.
    ///
    /// Expected file format:
    /// ```toml
    /// capacity_mb = 128
    /// ```
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        Self::from_toml(&contents)
    }

    /// Parses configuration from a TOML string. Missing keys keep defaults.
    pub fn from_toml(toml_str: &str) -> Result<Self, ConfigError> {
        let file: CacheConfigFile = toml::from_str(toml_str)?;
        Ok(Self::default().apply_file(&file))
    }
}

/// Errors that can occur while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    fn test_default_config_is_nonzero() {
        let config = CacheConfig::default();
        assert!(config.capacity_bytes > 0);
    }

    #[test]
    fn test_new_config() {
        let config = CacheConfig::new(128);
        assert_eq!(config.capacity_bytes, 128 * MB);
        assert_eq!(config.capacity_mb(), 128);
    }

    #[test]
    fn test_builder_methods() {
        let config = CacheConfig::default().with_capacity_mb(32);
        assert_eq!(config.capacity_bytes, 32 * MB);

        let config = config.with_capacity_bytes(1000);
        assert_eq!(config.capacity_bytes, 1000);
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&[CACHE_MB_ENV]);

        env::set_var(CACHE_MB_ENV, "48");
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.capacity_bytes, 48 * MB);
    }

    #[test]
    #[serial]
    fn test_from_env_unset_keeps_default() {
        let _guard = EnvGuard::new(&[CACHE_MB_ENV]);

        env::remove_var(CACHE_MB_ENV);
        let config = CacheConfig::new(7).apply_env().unwrap();
        assert_eq!(config.capacity_mb(), 7);
    }

    #[test]
    #[serial]
    fn test_huge_env_value_saturates() {
        let _guard = EnvGuard::new(&[CACHE_MB_ENV]);

        env::set_var(CACHE_MB_ENV, usize::MAX.to_string());
        let config = CacheConfig::from_env().unwrap();
        assert_eq!(config.capacity_bytes, usize::MAX);
    }

    #[test]
    fn test_huge_capacity_saturates() {
        assert_eq!(CacheConfig::new(usize::MAX).capacity_bytes, usize::MAX);
        let config = CacheConfig::default().with_capacity_mb(usize::MAX / 2);
        assert_eq!(config.capacity_bytes, usize::MAX);
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&[CACHE_MB_ENV]);

        env::set_var(CACHE_MB_ENV, "lots");
        let result = CacheConfig::from_env();
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_from_toml() {
        let config = CacheConfig::from_toml("capacity_mb = 16\n").unwrap();
        assert_eq!(config.capacity_bytes, 16 * MB);
    }

    #[test]
    fn test_from_toml_empty_keeps_default() {
        let config = CacheConfig::from_toml("").unwrap();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_from_toml_rejects_unknown_keys() {
        let result = CacheConfig::from_toml("ram_cache_mb = 16\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.toml");
        fs::write(&path, "# photowall cache\ncapacity_mb = 24\n").unwrap();

        let config = CacheConfig::from_file(&path).unwrap();
        assert_eq!(config.capacity_mb(), 24);
    }

    #[test]
    fn test_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = CacheConfig::from_file(dir.path().join("nope.toml"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }
}
