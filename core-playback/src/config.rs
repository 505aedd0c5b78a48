//! # Player Configuration
//!
//! Retry budget and presentation settings for streaming sessions.

use crate::error::{PlaybackError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Mime/codec string live segments are transmuxed into.
pub const DEFAULT_LIVE_MIME_CODECS: &str = "video/mp4; codecs=\"mp4a.40.2,avc1.64001f\"";

// ============================================================================
// Retry policy
// ============================================================================

/// Retry with exponential backoff for segment fetches.
///
/// The default retries forever at the capped backoff; use
/// [`RetryPolicy::bounded`] to give up after a fixed number of failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Consecutive failures tolerated before the session fails.
    ///
    /// `None` retries forever.
    ///
    /// Default: `None`.
    #[serde(default = "default_max_retries")]
    pub max_retries: Option<u32>,

    /// Delay before the first retry.
    ///
    /// Default: 100 ms.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff: Duration,

    /// Upper bound for the doubling backoff.
    ///
    /// Default: 2 s.
    #[serde(default = "default_max_backoff")]
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff: default_initial_backoff(),
            max_backoff: default_max_backoff(),
        }
    }
}

impl RetryPolicy {
    /// Retries forever. Same as the default.
    pub fn unbounded() -> Self {
        Self {
            max_retries: None,
            ..Default::default()
        }
    }

    /// Fails the session after `max_retries` consecutive failures.
    pub fn bounded(max_retries: u32) -> Self {
        Self {
            max_retries: Some(max_retries),
            ..Default::default()
        }
    }

    /// Whether the `attempt`-th consecutive failure may still be retried.
    pub fn allows(&self, attempt: u32) -> bool {
        self.max_retries.map_or(true, |max| attempt <= max)
    }

    /// Delay before retrying after the `attempt`-th consecutive failure.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

// ============================================================================
// Player configuration
// ============================================================================

/// Streaming player configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerConfig {
    #[serde(default)]
    pub retry: RetryPolicy,

    /// Codec string live segments are buffered as.
    #[serde(default = "default_live_mime_codecs")]
    pub live_mime_codecs: String,

    /// Block count requested when falling back to a full download.
    ///
    /// Default: 10.
    #[serde(default = "default_download_num_blocks")]
    pub download_num_blocks: u32,

    /// Wait after an empty live segment before polling again.
    ///
    /// Default: 500 ms.
    #[serde(default = "default_live_poll_interval")]
    pub live_poll_interval: Duration,

    /// Cross-origin mode set on the presentation element.
    #[serde(default = "default_cross_origin")]
    pub cross_origin: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            live_mime_codecs: default_live_mime_codecs(),
            download_num_blocks: default_download_num_blocks(),
            live_poll_interval: default_live_poll_interval(),
            cross_origin: default_cross_origin(),
        }
    }
}

impl PlayerConfig {
    /// Short backoff and fast live polling.
    ///
    /// - 4 retries, 50 ms doubling up to 500 ms
    /// - 200 ms live poll interval
    pub fn low_latency() -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: Some(4),
                initial_backoff: Duration::from_millis(50),
                max_backoff: Duration::from_millis(500),
            },
            live_poll_interval: Duration::from_millis(200),
            ..Default::default()
        }
    }

    /// Patient retries for unreliable networks.
    ///
    /// - 20 retries, 250 ms doubling up to 5 s
    /// - 1 s live poll interval
    pub fn resilient() -> Self {
        Self {
            retry: RetryPolicy {
                max_retries: Some(20),
                initial_backoff: Duration::from_millis(250),
                max_backoff: Duration::from_secs(5),
            },
            live_poll_interval: Duration::from_secs(1),
            ..Default::default()
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<()> {
        if self.retry.initial_backoff > self.retry.max_backoff {
            return Err(PlaybackError::Config(
                "initial_backoff cannot exceed max_backoff".to_string(),
            ));
        }
        if self.live_poll_interval.is_zero() {
            return Err(PlaybackError::Config(
                "live_poll_interval must be > 0".to_string(),
            ));
        }
        if self.download_num_blocks == 0 {
            return Err(PlaybackError::Config(
                "download_num_blocks must be > 0".to_string(),
            ));
        }
        if !self.live_mime_codecs.contains('/') {
            return Err(PlaybackError::Config(format!(
                "live_mime_codecs is not a mime type: {}",
                self.live_mime_codecs
            )));
        }
        Ok(())
    }
}

fn default_max_retries() -> Option<u32> {
    None
}

fn default_initial_backoff() -> Duration {
    Duration::from_millis(100)
}

fn default_max_backoff() -> Duration {
    Duration::from_secs(2)
}

fn default_live_mime_codecs() -> String {
    DEFAULT_LIVE_MIME_CODECS.to_string()
}

fn default_download_num_blocks() -> u32 {
    10
}

fn default_live_poll_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_cross_origin() -> String {
    "anonymous".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PlayerConfig::default();
        assert_eq!(config.retry.max_retries, None);
        assert_eq!(config.download_num_blocks, 10);
        assert_eq!(config.cross_origin, "anonymous");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(PlayerConfig::low_latency().validate().is_ok());
        assert!(PlayerConfig::resilient().validate().is_ok());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
        assert_eq!(policy.backoff_for(4), Duration::from_millis(800));
        assert_eq!(policy.backoff_for(6), Duration::from_secs(2));
        assert_eq!(policy.backoff_for(100), Duration::from_secs(2));
    }

    #[test]
    fn test_retry_budget() {
        assert!(RetryPolicy::default().allows(u32::MAX));
        assert_eq!(RetryPolicy::default(), RetryPolicy::unbounded());

        let policy = RetryPolicy::bounded(8);
        assert!(policy.allows(8));
        assert!(!policy.allows(9));
        assert_eq!(policy.max_backoff, Duration::from_secs(2));
    }

    #[test]
    fn test_missing_retry_fields_deserialize_unbounded() {
        let policy: RetryPolicy = serde_json::from_str("{}").unwrap();
        assert_eq!(policy.max_retries, None);
        assert_eq!(policy.initial_backoff, Duration::from_millis(100));
    }

    #[test]
    fn test_validation_errors() {
        let mut config = PlayerConfig::default();
        config.live_poll_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = PlayerConfig::default();
        config.retry.initial_backoff = Duration::from_secs(10);
        assert!(config.validate().is_err());
    }
}
