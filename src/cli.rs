//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use crate::models::{ErrorPolicy, Variant};
use clap::Parser;
use std::path::PathBuf;

/// querystat - aggregate benchmark query timings
///
/// Reads one CSV file per benchmark run from each results subdirectory,
/// groups them by query category (versionmat-, deltamat-, version-) and
/// writes average, median, min and max tables next to the inputs.
///
/// Examples:
///   querystat ./results/
///   querystat ./results/ --variant basic
///   querystat ./results/ --subdirs objectLookup-queries-sel-10-e0.1.txt --dry-run
///   querystat ./results/ --summary summary.json --strict
///   querystat --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Root directory containing the results subdirectories
    #[arg(value_name = "ROOT", required_unless_present = "init_config")]
    pub root: Option<PathBuf>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .querystat.toml in ROOT, then in the
    /// current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Aggregation preset
    ///
    /// basic: raw units, no median, abort on unreadable subdirectories.
    /// extended: divide by 1000, median tables, skip unreadable subdirectories.
    #[arg(long, value_name = "VARIANT", env = "QUERYSTAT_VARIANT")]
    pub variant: Option<Variant>,

    /// Divide aggregated values by this (1 or 1000)
    #[arg(long, value_name = "N")]
    pub unit_divisor: Option<u32>,

    /// Write _median_* tables regardless of the variant
    #[arg(long, conflicts_with = "no_median")]
    pub median: bool,

    /// Do not write _median_* tables
    #[arg(long, conflicts_with = "median")]
    pub no_median: bool,

    /// What to do when a subdirectory cannot be read or aggregated
    #[arg(long, value_name = "POLICY")]
    pub on_error: Option<ErrorPolicy>,

    /// Subdirectories to process instead of the configured list (comma-separated)
    #[arg(long, value_name = "DIRS", value_delimiter = ',')]
    pub subdirs: Option<Vec<String>>,

    /// List and classify input files without reading or writing anything
    #[arg(long)]
    pub dry_run: bool,

    /// Write a JSON summary of the run to this file
    #[arg(long, value_name = "FILE")]
    pub summary: Option<PathBuf>,

    /// Exit with code 2 if any subdirectory was skipped
    #[arg(long)]
    pub strict: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .querystat.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        match self.root {
            None => return Err("A results root directory is required".to_string()),
            Some(ref root) => {
                if !root.exists() {
                    return Err(format!(
                        "Root directory does not exist: {}",
                        root.display()
                    ));
                }
                if !root.is_dir() {
                    return Err(format!("Root path is not a directory: {}", root.display()));
                }
            }
        }

        if let Some(divisor) = self.unit_divisor {
            if divisor != 1 && divisor != 1000 {
                return Err("Unit divisor must be 1 or 1000".to_string());
            }
        }

        if let Some(ref subdirs) = self.subdirs {
            if subdirs.iter().any(|s| s.trim().is_empty()) {
                return Err("Subdirectory names must not be empty".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}
