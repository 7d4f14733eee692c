//! Output-cache configuration.
//!
//! Configuration is plain JSON deserialized with `serde`. Every field has a
//! default, so `{}` is a valid configuration:
//!
//! ```
//! use outcache::config::CacheConfig;
//!
//! let config = CacheConfig::from_json_str(r#"{ "default_ttl_secs": 300, "vary_by_headers": ["Accept-Language"] }"#).unwrap();
//! assert_eq!(config.default_ttl_secs, 300);
//! assert!(config.enabled);
//! assert_eq!(config.cacheable_methods, ["GET"]);
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading configuration or constructing filters from it.
///
/// All of these surface at startup, before any request is handled.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid value for `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("`{name}` is not a registered cache policy provider")]
    UnknownPolicyProvider { name: String },
}

/// Longest accepted `default_ttl_secs` and `sweep_interval_secs`: one year.
pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 60 * 60;

/// Settings for the output cache and its default policy resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CacheConfig {
    /// Master switch. When `false` the default resolver never produces a key.
    pub enabled: bool,
    /// Lifetime of entries written under the default policy.
    pub default_ttl_secs: u64,
    /// Use a sliding window instead of an absolute lifetime.
    pub sliding_expiration: bool,
    /// Request methods whose responses may be cached.
    pub cacheable_methods: Vec<String>,
    /// Request headers whose values become part of the cache key.
    pub vary_by_headers: Vec<String>,
    /// Name of a registered policy provider to use instead of the default resolver.
    pub policy_provider: Option<String>,
    /// Interval of the background purge of expired entries; off when unset.
    pub sweep_interval_secs: Option<u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            default_ttl_secs: 60,
            sliding_expiration: false,
            cacheable_methods: vec!["GET".to_owned()],
            vary_by_headers: Vec::new(),
            policy_provider: None,
            sweep_interval_secs: None,
        }
    }
}

impl CacheConfig {
    /// Parses and validates a JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.default_ttl_secs == 0 {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs",
                reason: "must be greater than zero".to_owned(),
            });
        }
        if self.default_ttl_secs > MAX_INTERVAL_SECS {
            return Err(ConfigError::Invalid {
                field: "default_ttl_secs",
                reason: format!("must be at most {MAX_INTERVAL_SECS}"),
            });
        }
        if self.cacheable_methods.is_empty() {
            return Err(ConfigError::Invalid {
                field: "cacheable_methods",
                reason: "must list at least one method".to_owned(),
            });
        }
        if self.sweep_interval_secs == Some(0) {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs",
                reason: "must be greater than zero when set".to_owned(),
            });
        }
        if self
            .sweep_interval_secs
            .is_some_and(|secs| secs > MAX_INTERVAL_SECS)
        {
            return Err(ConfigError::Invalid {
                field: "sweep_interval_secs",
                reason: format!("must be at most {MAX_INTERVAL_SECS}"),
            });
        }
        if self
            .policy_provider
            .as_deref()
            .is_some_and(|name| name.trim().is_empty())
        {
            return Err(ConfigError::Invalid {
                field: "policy_provider",
                reason: "must not be blank".to_owned(),
            });
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_secs(self.default_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Option<Duration> {
        self.sweep_interval_secs.map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CacheConfig::from_json_str("{}").unwrap();
        assert_eq!(config, CacheConfig::default());
        assert_eq!(config.default_ttl(), Duration::from_secs(60));
        assert_eq!(config.sweep_interval(), None);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = CacheConfig::from_json_str(r#"{ "ttl": 5 }"#).unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn zero_ttl_is_invalid() {
        let err = CacheConfig::from_json_str(r#"{ "default_ttl_secs": 0 }"#).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "default_ttl_secs", .. }
        ));
    }

    #[test]
    fn overlong_intervals_are_invalid() {
        let err = CacheConfig::from_json_str(r#"{ "default_ttl_secs": 18446744073709551615 }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "default_ttl_secs", .. }
        ));

        let err = CacheConfig::from_json_str(r#"{ "sweep_interval_secs": 18446744073709551615 }"#)
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "sweep_interval_secs", .. }
        ));

        let longest = format!(r#"{{ "default_ttl_secs": {MAX_INTERVAL_SECS} }}"#);
        assert!(CacheConfig::from_json_str(&longest).is_ok());
    }

    #[test]
    fn empty_method_list_is_invalid() {
        let err = CacheConfig::from_json_str(r#"{ "cacheable_methods": [] }"#).unwrap_err();
        assert!(err.to_string().contains("cacheable_methods"));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = CacheConfig::from_file("/nonexistent/outcache.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
