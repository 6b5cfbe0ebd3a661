//! Result file discovery and classification.
//!
//! This module lists a results subdirectory and classifies each file
//! into a query category by its name prefix.

use crate::models::Category;
use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// A result file with its category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedFile {
    /// File name within the subdirectory
    pub name: String,
    /// Full path to the file
    pub path: PathBuf,
    pub category: Category,
}

/// List the files of `dir` and classify them.
///
/// Symlinks are followed. Subdirectories, dangling links and files with an
/// unrecognized prefix are skipped, including previously written
/// `_average_*`-style outputs. The result is sorted by file name.
pub async fn scan_subdir(dir: &Path) -> Result<Vec<ClassifiedFile>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?
    {
        let name = entry.file_name().to_string_lossy().to_string();

        // follows symlinks, so linked run files are classified too
        match tokio::fs::metadata(entry.path()).await {
            Ok(metadata) if metadata.is_file() => names.push(name),
            Ok(_) => debug!("Skipping non-file entry: {}", name),
            Err(e) => warn!("Skipping unreadable entry {}: {}", name, e),
        }
    }

    Ok(classify_files(dir, names))
}

/// Classify file names found in `dir`, dropping unrecognized ones.
pub fn classify_files(dir: &Path, mut names: Vec<String>) -> Vec<ClassifiedFile> {
    names.sort();

    names
        .into_iter()
        .filter_map(|name| match Category::classify(&name) {
            Some(category) => Some(ClassifiedFile {
                path: dir.join(&name),
                name,
                category,
            }),
            None => {
                debug!("Skipping unrecognized file: {}", name);
                None
            }
        })
        .collect()
}

/// Count files per category.
pub fn count_by_category(files: &[ClassifiedFile]) -> BTreeMap<Category, usize> {
    let mut counts = BTreeMap::new();
    for file in files {
        *counts.entry(file.category).or_default() += 1;
    }
    counts
}
