//! Output generation.
//!
//! This module writes finalized statistic tables as CSV files next to
//! their inputs and renders the run summary as text or JSON.

use crate::analysis::Table;
use crate::models::{Category, RunSummary, Statistic, SubdirOutcome};
use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use tracing::debug;

/// Write a table as CSV: header row, then one line per row index.
///
/// A table without columns produces an empty file.
pub fn write_table(table: &Table, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;

    if !table.headers.is_empty() {
        writer
            .write_record(&table.headers)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        for row in &table.rows {
            writer
                .write_record(row)
                .with_context(|| format!("Failed to write {}", path.display()))?;
        }
    }

    writer
        .flush()
        .with_context(|| format!("Failed to write {}", path.display()))?;

    Ok(())
}

/// Write every table into `dir`, overwriting earlier outputs.
///
/// Returns the file names written, in table order.
pub fn write_tables(dir: &Path, tables: &[(Category, Statistic, Table)]) -> Result<Vec<String>> {
    let mut written = Vec::with_capacity(tables.len());

    for (category, statistic, table) in tables {
        let name = statistic.file_name(*category);
        let path = dir.join(&name);
        write_table(table, &path)?;
        debug!("Wrote {} ({} rows)", path.display(), table.rows.len());
        written.push(name);
    }

    Ok(written)
}

/// Generate a human-readable summary of a run.
pub fn generate_text_summary(summary: &RunSummary) -> String {
    let mut lines = Vec::new();

    lines.push(format!(
        "Subdirectories: {} aggregated, {} skipped",
        summary.aggregated(),
        summary.skipped()
    ));
    lines.push(format!(
        "Unit divisor: {} | Median: {}",
        summary.metadata.unit_divisor,
        if summary.metadata.median { "yes" } else { "no" }
    ));

    for subdir in &summary.subdirs {
        lines.push(String::new());
        lines.push(generate_subdir_block(subdir));
    }

    lines.push(String::new());
    lines.push(format!(
        "Duration: {:.1}s",
        summary.metadata.duration_seconds
    ));

    lines.join("\n")
}

fn generate_subdir_block(subdir: &SubdirOutcome) -> String {
    let mut block = format!("{}: {}", subdir.name, subdir.status);

    for category in &subdir.categories {
        block.push_str(&format!(
            "\n  - {}: {} files, {} rows",
            category.category, category.files, category.rows
        ));
    }

    if !subdir.outputs.is_empty() {
        block.push_str(&format!("\n  wrote: {}", subdir.outputs.join(", ")));
    }

    block
}

/// Generate a JSON summary.
pub fn generate_json_summary(summary: &RunSummary) -> Result<String> {
    serde_json::to_string_pretty(summary).map_err(Into::into)
}

/// Write a JSON summary to a file.
pub fn write_json_summary(summary: &RunSummary, path: &Path) -> Result<()> {
    let content = generate_json_summary(summary)?;

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
