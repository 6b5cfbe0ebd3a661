//! Data models for the benchmark aggregator.
//!
//! This module contains the core data structures used throughout
//! the application for classifying result files, describing column
//! roles, and summarizing a run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Query category of a result file, derived from its file name prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Version-materialized queries (`versionmat-*`)
    #[serde(rename = "vm")]
    VersionMatrix,
    /// Delta-materialized queries (`deltamat-*`)
    #[serde(rename = "dm")]
    DeltaMatrix,
    /// Version queries (`version-*`)
    #[serde(rename = "vq")]
    VersionQuery,
}

impl Category {
    /// All categories, in output order.
    pub const ALL: [Category; 3] = [
        Category::VersionMatrix,
        Category::DeltaMatrix,
        Category::VersionQuery,
    ];

    /// Short tag used in output file names.
    pub fn tag(&self) -> &'static str {
        match self {
            Category::VersionMatrix => "vm",
            Category::DeltaMatrix => "dm",
            Category::VersionQuery => "vq",
        }
    }

    /// File name prefix that selects this category.
    pub fn prefix(&self) -> &'static str {
        match self {
            Category::VersionMatrix => "versionmat-",
            Category::DeltaMatrix => "deltamat-",
            Category::VersionQuery => "version-",
        }
    }

    /// Classify a file name by prefix.
    ///
    /// `versionmat-` is checked before `version-`, since the latter is a
    /// prefix of the former. Unrecognized names yield `None`.
    pub fn classify(file_name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|category| file_name.starts_with(category.prefix()))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag())
    }
}

/// A summary statistic emitted as its own output table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statistic {
    Average,
    Median,
    Min,
    Max,
}

impl Statistic {
    /// Statistics to emit, in output order.
    pub fn enabled(median: bool) -> Vec<Statistic> {
        let mut stats = vec![Statistic::Average];
        if median {
            stats.push(Statistic::Median);
        }
        stats.push(Statistic::Min);
        stats.push(Statistic::Max);
        stats
    }

    pub fn name(&self) -> &'static str {
        match self {
            Statistic::Average => "average",
            Statistic::Median => "median",
            Statistic::Min => "min",
            Statistic::Max => "max",
        }
    }

    /// Output file name for this statistic and category, e.g. `_average_vm.csv`.
    pub fn file_name(&self, category: Category) -> String {
        format!("_{}_{}.csv", self.name(), category.tag())
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Preset of unit conversion, median output and listing-error policy.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Raw units, no median, abort on unreadable subdirectories
    Basic,
    /// Microseconds to milliseconds, median table, skip unreadable subdirectories
    #[default]
    Extended,
}

impl Variant {
    pub fn unit_divisor(&self) -> u32 {
        match self {
            Variant::Basic => 1,
            Variant::Extended => 1000,
        }
    }

    pub fn median(&self) -> bool {
        matches!(self, Variant::Extended)
    }

    pub fn on_error(&self) -> ErrorPolicy {
        match self {
            Variant::Basic => ErrorPolicy::Abort,
            Variant::Extended => ErrorPolicy::Skip,
        }
    }
}

/// What to do when a subdirectory cannot be listed or aggregated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Log a warning and continue with the next subdirectory
    Skip,
    /// Stop the whole run
    Abort,
}

/// Role of a column within a category's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    /// Positional or identifying field, copied verbatim
    Identifier,
    /// Timing value, parsed as an integer and aggregated
    Measurement,
}

/// Declared identifier columns per category. Every other column is a
/// measurement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    #[serde(default = "default_vm_identifiers")]
    pub vm: Vec<String>,

    #[serde(default = "default_dm_identifiers")]
    pub dm: Vec<String>,

    #[serde(default = "default_vq_identifiers")]
    pub vq: Vec<String>,
}

impl Default for Schema {
    fn default() -> Self {
        Self {
            vm: default_vm_identifiers(),
            dm: default_dm_identifiers(),
            vq: default_vq_identifiers(),
        }
    }
}

fn default_vm_identifiers() -> Vec<String> {
    vec!["patch".to_string(), "offset".to_string()]
}

fn default_dm_identifiers() -> Vec<String> {
    vec![
        "patch_start".to_string(),
        "patch_end".to_string(),
        "offset".to_string(),
    ]
}

fn default_vq_identifiers() -> Vec<String> {
    vec!["offset".to_string()]
}

impl Schema {
    /// Identifier columns declared for a category.
    pub fn identifiers(&self, category: Category) -> &[String] {
        match category {
            Category::VersionMatrix => &self.vm,
            Category::DeltaMatrix => &self.dm,
            Category::VersionQuery => &self.vq,
        }
    }

    pub fn role(&self, category: Category, column: &str) -> ColumnRole {
        if self.identifiers(category).iter().any(|c| c == column) {
            ColumnRole::Identifier
        } else {
            ColumnRole::Measurement
        }
    }
}

/// Per-category counts for one aggregated subdirectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategorySummary {
    pub category: Category,
    pub files: usize,
    pub rows: usize,
}

/// How processing of a subdirectory ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SubdirStatus {
    Aggregated,
    Skipped { reason: String },
}

impl fmt::Display for SubdirStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubdirStatus::Aggregated => write!(f, "aggregated"),
            SubdirStatus::Skipped { reason } => write!(f, "skipped ({})", reason),
        }
    }
}

/// Result of processing one subdirectory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubdirOutcome {
    pub name: String,
    #[serde(flatten)]
    pub status: SubdirStatus,
    pub categories: Vec<CategorySummary>,
    /// Output file names written into the subdirectory.
    pub outputs: Vec<String>,
}

impl SubdirOutcome {
    pub fn skipped(name: &str, reason: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status: SubdirStatus::Skipped {
                reason: reason.into(),
            },
            categories: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, SubdirStatus::Skipped { .. })
    }

    /// Total number of input files ingested.
    pub fn files(&self) -> usize {
        self.categories.iter().map(|c| c.files).sum()
    }
}

/// Metadata about a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunMetadata {
    pub root: String,
    pub run_date: DateTime<Utc>,
    pub unit_divisor: u32,
    pub median: bool,
    pub duration_seconds: f64,
}

/// Summary of a complete run over all configured subdirectories.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub metadata: RunMetadata,
    pub subdirs: Vec<SubdirOutcome>,
}

impl RunSummary {
    pub fn aggregated(&self) -> usize {
        self.subdirs.iter().filter(|s| !s.is_skipped()).count()
    }

    pub fn skipped(&self) -> usize {
        self.subdirs.iter().filter(|s| s.is_skipped()).count()
    }
}
