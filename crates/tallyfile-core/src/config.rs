//! Enumeration and verification configuration types.

use std::path::PathBuf;
use std::time::Duration;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Retry budget and backoff for remote calls.
#[derive(Debug, Clone, PartialEq, Eq, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per call, including the first.
    #[builder(default = "5")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt `n` waits `base * 2^n`.
    #[builder(default = "1000")]
    pub base_delay_ms: u64,

    /// Upper bound on a single computed backoff (None = unbounded).
    #[builder(default)]
    pub max_delay_ms: Option<u64>,
}

impl RetryConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if self.max_attempts == Some(0) {
            return Err("max_attempts must be at least 1".to_string());
        }
        Ok(())
    }
}

impl RetryConfig {
    /// Create a new retry config builder.
    pub fn builder() -> RetryConfigBuilder {
        RetryConfigBuilder::default()
    }

    /// Exponential backoff for a zero-based attempt number.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
        let mut millis = self.base_delay_ms.saturating_mul(factor);
        if let Some(max) = self.max_delay_ms {
            millis = millis.min(max);
        }
        Duration::from_millis(millis)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay_ms: 1000,
            max_delay_ms: None,
        }
    }
}

/// Configuration for an enumeration run.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct EnumerateConfig {
    /// Directory holding the checkpoint and inventory artifacts.
    #[builder(default = "PathBuf::from(DEFAULT_OUTPUT_DIR)")]
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Directory of a previous tool version whose checkpoint may be migrated.
    #[builder(default)]
    #[serde(default)]
    pub legacy_dir: Option<PathBuf>,

    /// Page size requested from the recursive root listing.
    #[builder(default = "2000")]
    #[serde(default = "default_page_limit")]
    pub page_limit: u32,

    /// Save after this many seconds since the previous save.
    #[builder(default = "60")]
    #[serde(default = "default_save_interval")]
    pub save_interval_secs: u64,

    /// Save after this many new entries since the previous save (0 = never).
    #[builder(default = "1000")]
    #[serde(default = "default_save_every")]
    pub save_every_entries: u64,

    /// Retry behaviour for listing calls.
    #[builder(default)]
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Default output directory.
pub const DEFAULT_OUTPUT_DIR: &str = "inventory_output";

fn default_output_dir() -> PathBuf {
    PathBuf::from(DEFAULT_OUTPUT_DIR)
}

fn default_page_limit() -> u32 {
    2000
}

fn default_save_interval() -> u64 {
    60
}

fn default_save_every() -> u64 {
    1000
}

impl EnumerateConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(ref dir) = self.output_dir {
            if dir.as_os_str().is_empty() {
                return Err("Output directory cannot be empty".to_string());
            }
        }
        if let Some(limit) = self.page_limit {
            if !(1..=2000).contains(&limit) {
                return Err(format!("Page limit must be between 1 and 2000, got {limit}"));
            }
        }
        if let (Some(Some(legacy)), Some(output)) = (&self.legacy_dir, &self.output_dir) {
            if legacy == output {
                return Err("Legacy directory must differ from the output directory".to_string());
            }
        }
        Ok(())
    }
}

impl EnumerateConfig {
    /// Create a new enumerate config builder.
    pub fn builder() -> EnumerateConfigBuilder {
        EnumerateConfigBuilder::default()
    }

    /// Create a simple config writing to a directory.
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            ..Self::default()
        }
    }

    /// Time-based save threshold.
    pub fn save_interval(&self) -> Duration {
        Duration::from_secs(self.save_interval_secs)
    }
}

impl Default for EnumerateConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            legacy_dir: None,
            page_limit: default_page_limit(),
            save_interval_secs: default_save_interval(),
            save_every_entries: default_save_every(),
            retry: RetryConfig::default(),
        }
    }
}

/// Configuration for reconciliation checks.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
#[serde(default)]
pub struct VerifyConfig {
    /// Accepted relative difference between account usage and inventory size.
    #[builder(default = "0.05")]
    pub usage_tolerance: f64,

    /// Number of folders to spot check.
    #[builder(default = "3")]
    pub spot_check_count: usize,

    /// Depth of the folders picked for spot checks.
    #[builder(default = "2")]
    pub spot_check_depth: u32,

    /// Compare paths case-insensitively.
    #[builder(default = "true")]
    pub case_insensitive: bool,

    /// Retry behaviour for verification calls.
    #[builder(default)]
    pub retry: RetryConfig,
}

impl VerifyConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        if let Some(tolerance) = self.usage_tolerance {
            if !(0.0..=1.0).contains(&tolerance) {
                return Err(format!("Usage tolerance must be within 0..=1, got {tolerance}"));
            }
        }
        Ok(())
    }
}

impl VerifyConfig {
    /// Create a new verify config builder.
    pub fn builder() -> VerifyConfigBuilder {
        VerifyConfigBuilder::default()
    }
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            usage_tolerance: 0.05,
            spot_check_count: 3,
            spot_check_depth: 2,
            case_insensitive: true,
            retry: RetryConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = EnumerateConfig::builder()
            .output_dir("/tmp/inv")
            .page_limit(500u32)
            .save_interval_secs(5u64)
            .build()
            .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("/tmp/inv"));
        assert_eq!(config.page_limit, 500);
        assert_eq!(config.save_interval(), Duration::from_secs(5));
        assert_eq!(config.save_every_entries, 1000);
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn test_config_builder_rejects_bad_page_limit() {
        assert!(EnumerateConfig::builder().page_limit(0u32).build().is_err());
        assert!(EnumerateConfig::builder().page_limit(5000u32).build().is_err());
    }

    #[test]
    fn test_config_builder_rejects_same_legacy_dir() {
        let result = EnumerateConfig::builder()
            .output_dir("out")
            .legacy_dir(Some(PathBuf::from("out")))
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn test_backoff_doubles() {
        let retry = RetryConfig::default();
        assert_eq!(retry.backoff(0), Duration::from_secs(1));
        assert_eq!(retry.backoff(3), Duration::from_secs(8));

        let capped = RetryConfig::builder().max_delay_ms(Some(5000u64)).build().unwrap();
        assert_eq!(capped.backoff(4), Duration::from_secs(5));
    }

    #[test]
    fn test_verify_config_defaults() {
        let config = VerifyConfig::default();
        assert_eq!(config.usage_tolerance, 0.05);
        assert_eq!(config.spot_check_count, 3);
        assert!(config.case_insensitive);
        assert!(VerifyConfig::builder().usage_tolerance(1.5).build().is_err());
    }
}
