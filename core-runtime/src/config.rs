//! # Bridge Configuration
//!
//! Settings shared by the RPC bridge, channel registry and upload coordinator.
//!
//! ## Overview
//!
//! [`BridgeConfig`] is plain data: it deserializes from JSON with every field
//! optional, and [`BridgeConfig::builder`] offers a fluent way to override the
//! defaults. Both paths end in [`BridgeConfig::validate`], so an invalid
//! configuration fails at startup rather than mid-transfer.
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::BridgeConfig;
//! use std::time::Duration;
//!
//! let config = BridgeConfig::builder()
//!     .readiness_timeout(Duration::from_secs(30))
//!     .channel_prefix("__app")
//!     .build()
//!     .expect("valid configuration");
//!
//! assert_eq!(config.hash_threshold_bytes, 25 * 1024 * 1024);
//! ```

use crate::error::{Error, Result};
use bridge_traits::DigestAlgorithm;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Files larger than this get a content hash channel.
pub const DEFAULT_HASH_THRESHOLD_BYTES: u64 = 25 * 1024 * 1024;

/// Prefix of every channel identifier.
pub const DEFAULT_CHANNEL_PREFIX: &str = "__zcn";

/// Bridge-wide configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Upper bound on how long a call waits for the module to become ready.
    ///
    /// `None` waits indefinitely.
    ///
    /// Default: `None`.
    #[serde(default)]
    pub readiness_timeout: Option<Duration>,

    /// A call still waiting for readiness after this long logs a warning once.
    ///
    /// Default: 10 seconds.
    #[serde(default = "default_init_warning_after")]
    pub init_warning_after: Duration,

    /// Prefix for channel identifiers handed to the module.
    ///
    /// Default: `"__zcn"`.
    #[serde(default = "default_channel_prefix")]
    pub channel_prefix: String,

    /// Uploads strictly larger than this many bytes get a hash channel.
    ///
    /// Default: 25 MiB.
    #[serde(default = "default_hash_threshold_bytes")]
    pub hash_threshold_bytes: u64,

    /// Algorithm used by the hashing worker.
    ///
    /// Default: MD5.
    #[serde(default)]
    pub digest_algorithm: DigestAlgorithm,

    /// Capacity of the event bus.
    ///
    /// Default: 100.
    #[serde(default = "default_event_buffer_size")]
    pub event_buffer_size: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            readiness_timeout: None,
            init_warning_after: default_init_warning_after(),
            channel_prefix: default_channel_prefix(),
            hash_threshold_bytes: default_hash_threshold_bytes(),
            digest_algorithm: DigestAlgorithm::default(),
            event_buffer_size: default_event_buffer_size(),
        }
    }
}

impl BridgeConfig {
    pub fn builder() -> BridgeConfigBuilder {
        BridgeConfigBuilder::default()
    }

    /// Parses a JSON document, applying defaults for missing fields.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.channel_prefix.is_empty() {
            return Err(Error::Config("Channel prefix cannot be empty".to_string()));
        }

        if !self
            .channel_prefix
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        {
            return Err(Error::Config(format!(
                "Channel prefix '{}' must be a valid identifier (alphanumeric, '_' or '$')",
                self.channel_prefix
            )));
        }

        if matches!(self.readiness_timeout, Some(timeout) if timeout.is_zero()) {
            return Err(Error::Config(
                "Readiness timeout must be greater than zero; use None to wait indefinitely"
                    .to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

fn default_init_warning_after() -> Duration {
    Duration::from_secs(10)
}

fn default_channel_prefix() -> String {
    DEFAULT_CHANNEL_PREFIX.to_string()
}

fn default_hash_threshold_bytes() -> u64 {
    DEFAULT_HASH_THRESHOLD_BYTES
}

fn default_event_buffer_size() -> usize {
    crate::events::DEFAULT_EVENT_BUFFER_SIZE
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`BridgeConfig`].
#[derive(Debug, Default)]
pub struct BridgeConfigBuilder {
    readiness_timeout: Option<Duration>,
    init_warning_after: Option<Duration>,
    channel_prefix: Option<String>,
    hash_threshold_bytes: Option<u64>,
    digest_algorithm: Option<DigestAlgorithm>,
    event_buffer_size: Option<usize>,
}

impl BridgeConfigBuilder {
    /// Fails calls that wait longer than `timeout` for module readiness.
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = Some(timeout);
        self
    }

    pub fn init_warning_after(mut self, after: Duration) -> Self {
        self.init_warning_after = Some(after);
        self
    }

    pub fn channel_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.channel_prefix = Some(prefix.into());
        self
    }

    pub fn hash_threshold_bytes(mut self, bytes: u64) -> Self {
        self.hash_threshold_bytes = Some(bytes);
        self
    }

    pub fn digest_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = Some(algorithm);
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Builds and validates the configuration.
    pub fn build(self) -> Result<BridgeConfig> {
        let defaults = BridgeConfig::default();
        let config = BridgeConfig {
            readiness_timeout: self.readiness_timeout,
            init_warning_after: self
                .init_warning_after
                .unwrap_or(defaults.init_warning_after),
            channel_prefix: self.channel_prefix.unwrap_or(defaults.channel_prefix),
            hash_threshold_bytes: self
                .hash_threshold_bytes
                .unwrap_or(defaults.hash_threshold_bytes),
            digest_algorithm: self.digest_algorithm.unwrap_or(defaults.digest_algorithm),
            event_buffer_size: self.event_buffer_size.unwrap_or(defaults.event_buffer_size),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.readiness_timeout, None);
        assert_eq!(config.init_warning_after, Duration::from_secs(10));
        assert_eq!(config.channel_prefix, "__zcn");
        assert_eq!(config.hash_threshold_bytes, 26_214_400);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Md5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = BridgeConfig::builder()
            .readiness_timeout(Duration::from_secs(5))
            .hash_threshold_bytes(1024)
            .digest_algorithm(DigestAlgorithm::Sha256)
            .build()
            .unwrap();

        assert_eq!(config.readiness_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.hash_threshold_bytes, 1024);
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.channel_prefix, DEFAULT_CHANNEL_PREFIX);
    }

    #[test]
    fn test_validation_rejects_bad_prefix() {
        let result = BridgeConfig::builder().channel_prefix("").build();
        assert!(matches!(result, Err(Error::Config(_))));

        let result = BridgeConfig::builder().channel_prefix("zcn-upload").build();
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn test_validation_rejects_zero_timeout() {
        let result = BridgeConfig::builder()
            .readiness_timeout(Duration::ZERO)
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let config =
            BridgeConfig::from_json(r#"{"digest_algorithm": "sha256", "channel_prefix": "__t"}"#)
                .unwrap();
        assert_eq!(config.digest_algorithm, DigestAlgorithm::Sha256);
        assert_eq!(config.channel_prefix, "__t");
        assert_eq!(config.hash_threshold_bytes, DEFAULT_HASH_THRESHOLD_BYTES);

        assert!(BridgeConfig::from_json("not json").is_err());
    }
}
