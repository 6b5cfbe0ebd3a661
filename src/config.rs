//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.querystat.toml` files.

use crate::models::{ErrorPolicy, Schema, Variant};
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Name of the configuration file looked up in the working directory
/// and in the results root.
pub const CONFIG_FILE_NAME: &str = ".querystat.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Statistics settings.
    #[serde(default)]
    pub statistics: StatisticsConfig,

    /// Identifier columns per category.
    #[serde(default)]
    pub schema: Schema,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Subdirectories of the results root to aggregate, in order.
    #[serde(default = "default_subdirs")]
    pub subdirs: Vec<String>,

    /// Preset for unit divisor, median output and error policy.
    #[serde(default)]
    pub variant: Variant,

    /// Overrides the variant's policy for unreadable subdirectories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub on_error: Option<ErrorPolicy>,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            subdirs: default_subdirs(),
            variant: Variant::default(),
            on_error: None,
        }
    }
}

fn default_subdirs() -> Vec<String> {
    vec![
        "objectLookup-queries-sel-10-e0.1.txt",
        "objectLookup-queries-sel-100-e0.6.txt",
        "predicateLookup-queries-sel-500-e0.6.txt",
        "predicateLookup-queries-sel-1500-e0.6.txt",
        "subjectLookup-queries-sel-10-e0.2.txt",
        "subjectLookup-queries-sel-100-e0.1.txt",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Statistics settings. Unset fields fall back to the variant preset.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StatisticsConfig {
    /// Divide every aggregated value by this (1 or 1000).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_divisor: Option<u32>,

    /// Emit the `_median_*` tables.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub median: Option<bool>,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(CONFIG_FILE_NAME);

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Try to load configuration stored alongside the results.
    pub fn load_from_root(root: &Path) -> Result<Option<Self>> {
        let config_path = root.join(CONFIG_FILE_NAME);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// Only explicitly provided values override the config.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(variant) = args.variant {
            self.general.variant = variant;
        }

        if let Some(policy) = args.on_error {
            self.general.on_error = Some(policy);
        }

        if let Some(ref subdirs) = args.subdirs {
            self.general.subdirs = subdirs.clone();
        }

        if let Some(divisor) = args.unit_divisor {
            self.statistics.unit_divisor = Some(divisor);
        }

        if args.median {
            self.statistics.median = Some(true);
        } else if args.no_median {
            self.statistics.median = Some(false);
        }
    }

    /// Check settings that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.general.subdirs.is_empty() {
            bail!("At least one subdirectory must be configured");
        }

        if let Some(name) = self.general.subdirs.iter().find(|s| s.trim().is_empty()) {
            bail!("Invalid subdirectory name: {:?}", name);
        }

        let divisor = self.unit_divisor();
        if divisor != 1 && divisor != 1000 {
            bail!("Unit divisor must be 1 or 1000, got {}", divisor);
        }

        Ok(())
    }

    /// Effective unit divisor.
    pub fn unit_divisor(&self) -> u32 {
        self.statistics
            .unit_divisor
            .unwrap_or_else(|| self.general.variant.unit_divisor())
    }

    /// Whether median tables are produced.
    pub fn median(&self) -> bool {
        self.statistics
            .median
            .unwrap_or_else(|| self.general.variant.median())
    }

    /// Effective policy for subdirectories that fail.
    pub fn on_error(&self) -> ErrorPolicy {
        self.general
            .on_error
            .unwrap_or_else(|| self.general.variant.on_error())
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
