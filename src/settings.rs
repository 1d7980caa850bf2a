//! Optional TOML settings file.
//!
//! ```toml
//! log_file = true
//!
//! [run]
//! output_dir = "inventory_output"
//! page_limit = 2000
//! save_interval_secs = 60
//!
//! [run.retry]
//! max_attempts = 5
//! base_delay_ms = 1000
//!
//! [verify]
//! usage_tolerance = 0.05
//! spot_check_count = 3
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use color_eyre::eyre::{Context, Result};
use serde::Deserialize;

use tallyfile_core::{EnumerateConfig, VerifyConfig};

/// Values read from the settings file. Command-line flags win over these.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    /// Keep a plain-text log next to the inventory.
    pub log_file: bool,
    /// Enumeration defaults.
    pub run: EnumerateConfig,
    /// Verification defaults.
    pub verify: VerifyConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_file: true,
            run: EnumerateConfig::default(),
            verify: VerifyConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from an explicit file, or from the default location when
    /// it exists. An explicit file that is missing is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match default_path().filter(|p| p.is_file()) {
                Some(path) => Self::from_file(&path),
                None => Ok(Self::default()),
            },
        }
    }

    /// Parse a settings file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .wrap_err_with(|| format!("Failed to read settings from {}", path.display()))?;
        Self::parse(&text).wrap_err_with(|| format!("Invalid settings in {}", path.display()))
    }

    fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// `<config dir>/tallyfile/config.toml`.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("tallyfile").join("config.toml"))
}
