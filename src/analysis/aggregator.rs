//! Per-category accumulation of benchmark runs and summary statistics.
//!
//! Every file of a category is one run. Row N of every run describes the
//! same query, so cells are joined by (row index, column name). Identifier
//! columns are copied, measurement columns are accumulated and finalized
//! into one table per statistic once the whole subdirectory is read.

use crate::config::Config;
use crate::models::{Category, CategorySummary, ColumnRole, Schema, Statistic};
use crate::scanner::ClassifiedFile;
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

/// Errors raised while reading or aggregating a run file.
#[derive(Debug, Error)]
pub enum AggregateError {
    #[error("failed to read {file}: {source}")]
    Io {
        file: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed CSV in {file}: {source}")]
    Csv {
        file: String,
        #[source]
        source: csv::Error,
    },

    #[error("non-numeric value {value:?} in {file}, row {row}, column {column}")]
    NonNumeric {
        file: String,
        row: usize,
        column: String,
        value: String,
    },
}

/// Settings that shape accumulation and finalization.
#[derive(Debug, Clone)]
pub struct AggregateOptions {
    pub schema: Schema,
    /// 1 for raw units, 1000 for microseconds to milliseconds
    pub unit_divisor: u32,
    /// Keep every observed value so the median can be computed
    pub median: bool,
}

impl Default for AggregateOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for AggregateOptions {
    fn from(config: &Config) -> Self {
        Self {
            schema: config.schema.clone(),
            unit_divisor: config.unit_divisor(),
            median: config.median(),
        }
    }
}

/// Running statistics of one measurement cell across runs.
#[derive(Debug, Clone)]
pub struct CellStats {
    sum: i64,
    min: i64,
    max: i64,
    values: Option<Vec<i64>>,
}

impl CellStats {
    fn new(value: i64, keep_values: bool) -> Self {
        Self {
            sum: value,
            min: value,
            max: value,
            values: keep_values.then(|| vec![value]),
        }
    }

    fn observe(&mut self, value: i64) {
        self.sum = self.sum.saturating_add(value);
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if let Some(ref mut values) = self.values {
            values.push(value);
        }
    }

    #[cfg(test)]
    pub fn sum(&self) -> i64 {
        self.sum
    }

    /// Element at index `len / 2` of the sorted values: the upper median
    /// for even counts. `None` when values were not kept.
    pub fn median(&self) -> Option<i64> {
        let mut sorted = self.values.clone()?;
        sorted.sort_unstable();
        sorted.get(sorted.len() / 2).copied()
    }
}

#[derive(Debug, Clone)]
enum Cell {
    Identifier(String),
    Measurement(CellStats),
}

/// A finalized statistic table, ready to be written as CSV.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Value of `column` in row `row`, if present.
    #[cfg(test)]
    pub fn get(&self, row: usize, column: &str) -> Option<&str> {
        let index = self.headers.iter().position(|h| h == column)?;
        self.rows.get(row)?.get(index).map(String::as_str)
    }
}

/// Accumulated runs of a single category.
#[derive(Debug, Clone)]
pub struct CategoryAccumulator {
    category: Category,
    files: usize,
    columns: Vec<String>,
    column_index: HashMap<String, usize>,
    rows: Vec<Vec<Option<Cell>>>,
}

impl CategoryAccumulator {
    pub fn new(category: Category) -> Self {
        Self {
            category,
            files: 0,
            columns: Vec::new(),
            column_index: HashMap::new(),
            rows: Vec::new(),
        }
    }

    pub fn category(&self) -> Category {
        self.category
    }

    /// Number of runs ingested.
    pub fn files(&self) -> usize {
        self.files
    }

    /// Number of distinct row indices seen across all runs.
    pub fn rows(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files == 0
    }

    /// Fold one run into the accumulator. Returns the number of rows read.
    pub fn ingest(
        &mut self,
        file: &str,
        data: &[u8],
        options: &AggregateOptions,
    ) -> Result<usize, AggregateError> {
        let mut reader = csv::Reader::from_reader(data);
        let headers = reader
            .headers()
            .map_err(|source| AggregateError::Csv {
                file: file.to_string(),
                source,
            })?
            .clone();

        let category = self.category;
        let targets: Vec<(usize, ColumnRole)> = headers
            .iter()
            .map(|name| (self.column_slot(name), options.schema.role(category, name)))
            .collect();

        let mut count = 0;
        for (row, record) in reader.records().enumerate() {
            let record = record.map_err(|source| AggregateError::Csv {
                file: file.to_string(),
                source,
            })?;

            if self.rows.len() <= row {
                self.rows.push(Vec::new());
            }
            let cells = &mut self.rows[row];
            if cells.len() < self.columns.len() {
                cells.resize(self.columns.len(), None);
            }

            for (((slot, role), column), value) in
                targets.iter().zip(headers.iter()).zip(record.iter())
            {
                let cell = &mut cells[*slot];
                match role {
                    ColumnRole::Identifier => {
                        *cell = Some(Cell::Identifier(value.to_string()));
                    }
                    ColumnRole::Measurement => {
                        let number = parse_measurement(value).ok_or_else(|| {
                            AggregateError::NonNumeric {
                                file: file.to_string(),
                                row,
                                column: column.to_string(),
                                value: value.to_string(),
                            }
                        })?;
                        if let Some(Cell::Measurement(stats)) = cell.as_mut() {
                            stats.observe(number);
                        } else {
                            *cell = Some(Cell::Measurement(CellStats::new(number, options.median)));
                        }
                    }
                }
            }
            count += 1;
        }

        self.files += 1;
        debug!(
            "Ingested {} rows from {} into {}",
            count, file, self.category
        );
        Ok(count)
    }

    /// Position of `name` in the output header, registering it if new.
    fn column_slot(&mut self, name: &str) -> usize {
        if let Some(&index) = self.column_index.get(name) {
            return index;
        }
        let index = self.columns.len();
        self.columns.push(name.to_string());
        self.column_index.insert(name.to_string(), index);
        index
    }

    /// Running statistics of a measurement cell.
    #[cfg(test)]
    pub fn cell(&self, row: usize, column: &str) -> Option<&CellStats> {
        let index = *self.column_index.get(column)?;
        match self.rows.get(row)?.get(index)? {
            Some(Cell::Measurement(stats)) => Some(stats),
            _ => None,
        }
    }

    /// Build the output table for `statistic`.
    ///
    /// Measurements are divided by `unit_divisor`; the average is also
    /// divided by the number of runs. Missing cells are left empty.
    pub fn finalize(&self, statistic: Statistic, unit_divisor: u32) -> Table {
        let divisor = f64::from(unit_divisor.max(1));
        let runs = self.files.max(1) as f64;

        let rows = self
            .rows
            .iter()
            .map(|cells| {
                (0..self.columns.len())
                    .map(|index| match cells.get(index) {
                        Some(Some(Cell::Identifier(value))) => value.clone(),
                        Some(Some(Cell::Measurement(stats))) => {
                            let value = match statistic {
                                Statistic::Average => Some(stats.sum as f64 / runs),
                                Statistic::Median => stats.median().map(|m| m as f64),
                                Statistic::Min => Some(stats.min as f64),
                                Statistic::Max => Some(stats.max as f64),
                            };
                            value
                                .map(|v| format_value(v / divisor))
                                .unwrap_or_default()
                        }
                        _ => String::new(),
                    })
                    .collect()
            })
            .collect();

        Table {
            headers: self.columns.clone(),
            rows,
        }
    }

    pub fn summary(&self) -> CategorySummary {
        CategorySummary {
            category: self.category,
            files: self.files(),
            rows: self.rows(),
        }
    }
}

/// Accumulators for all categories of one subdirectory.
#[derive(Debug, Clone)]
pub struct Aggregator {
    options: AggregateOptions,
    categories: BTreeMap<Category, CategoryAccumulator>,
}

impl Aggregator {
    pub fn new(options: AggregateOptions) -> Self {
        let categories = Category::ALL
            .into_iter()
            .map(|c| (c, CategoryAccumulator::new(c)))
            .collect();
        Self {
            options,
            categories,
        }
    }

    /// Fold one run file into its category.
    pub fn ingest(
        &mut self,
        category: Category,
        file: &str,
        data: &[u8],
    ) -> Result<usize, AggregateError> {
        let accumulator = self
            .categories
            .entry(category)
            .or_insert_with(|| CategoryAccumulator::new(category));
        accumulator.ingest(file, data, &self.options)
    }

    #[cfg(test)]
    pub fn category(&self, category: Category) -> Option<&CategoryAccumulator> {
        self.categories.get(&category)
    }

    /// Finalized tables for every category that received at least one run.
    pub fn finalize(&self) -> Vec<(Category, Statistic, Table)> {
        let statistics = Statistic::enabled(self.options.median);

        self.categories
            .values()
            .filter(|acc| !acc.is_empty())
            .flat_map(|acc| {
                statistics.iter().map(move |&statistic| {
                    (
                        acc.category(),
                        statistic,
                        acc.finalize(statistic, self.options.unit_divisor),
                    )
                })
            })
            .collect()
    }

    pub fn summaries(&self) -> Vec<CategorySummary> {
        self.categories
            .values()
            .filter(|acc| !acc.is_empty())
            .map(CategoryAccumulator::summary)
            .collect()
    }
}

/// Upper bound on run files held in memory at once.
pub const MAX_CONCURRENT_READS: usize = 8;

/// Read files with bounded concurrency and fold them in the given order.
///
/// Ingestion order decides which run's identifier values are kept, so
/// callers pass files sorted by name.
pub async fn aggregate_files(
    files: &[ClassifiedFile],
    options: AggregateOptions,
) -> Result<Aggregator, AggregateError> {
    let mut reads = stream::iter(files)
        .map(|file| async move {
            tokio::fs::read(&file.path)
                .await
                .map(|data| (file, data))
                .map_err(|source| AggregateError::Io {
                    file: file.name.clone(),
                    source,
                })
        })
        .buffered(MAX_CONCURRENT_READS);

    let mut aggregator = Aggregator::new(options);
    while let Some(read) = reads.next().await {
        let (file, data) = read?;
        aggregator.ingest(file.category, &file.name, &data)?;
    }

    Ok(aggregator)
}

fn parse_measurement(value: &str) -> Option<i64> {
    value.trim().parse().ok()
}

/// Shortest decimal form: `300`, `0.3`, `12.5`.
fn format_value(value: f64) -> String {
    format!("{}", value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options(unit_divisor: u32, median: bool) -> AggregateOptions {
        AggregateOptions {
            schema: Schema::default(),
            unit_divisor,
            median,
        }
    }

    fn vm_runs(values: &[i64], median: bool) -> CategoryAccumulator {
        let opts = options(1, median);
        let mut acc = CategoryAccumulator::new(Category::VersionMatrix);
        for (i, v) in values.iter().enumerate() {
            let data = format!("patch,offset,time\n1,100,{}\n", v);
            acc.ingest(&format!("versionmat-{}.csv", i), data.as_bytes(), &opts)
                .unwrap();
        }
        acc
    }

    #[test]
    fn test_average_min_max() {
        let acc = vm_runs(&[200, 400], false);

        let avg = acc.finalize(Statistic::Average, 1);
        assert_eq!(avg.headers, vec!["patch", "offset", "time"]);
        assert_eq!(avg.rows, vec![vec!["1", "100", "300"]]);

        assert_eq!(acc.finalize(Statistic::Min, 1).get(0, "time"), Some("200"));
        assert_eq!(acc.finalize(Statistic::Max, 1).get(0, "time"), Some("400"));
    }

    #[test]
    fn test_average_is_sum_over_runs() {
        let acc = vm_runs(&[1, 2, 4], false);
        let stats = acc.cell(0, "time").unwrap();
        assert_eq!(stats.sum(), 7);

        let avg = acc.finalize(Statistic::Average, 1);
        let value: f64 = avg.get(0, "time").unwrap().parse().unwrap();
        assert!((value - 7.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_median_odd_count() {
        let acc = vm_runs(&[15, 5, 10], true);
        assert_eq!(acc.cell(0, "time").unwrap().median(), Some(10));
        assert_eq!(acc.finalize(Statistic::Median, 1).get(0, "time"), Some("10"));
    }

    #[test]
    fn test_median_even_count_takes_upper_middle() {
        let acc = vm_runs(&[20, 5, 15, 10], true);
        assert_eq!(acc.cell(0, "time").unwrap().median(), Some(15));
    }

    #[test]
    fn test_median_absent_when_values_not_kept() {
        let acc = vm_runs(&[1, 2], false);
        assert_eq!(acc.cell(0, "time").unwrap().median(), None);
        assert_eq!(acc.finalize(Statistic::Median, 1).get(0, "time"), Some(""));
    }

    #[test]
    fn test_unit_divisor_applies_to_every_measurement() {
        let acc = vm_runs(&[1500, 2500], true);

        assert_eq!(acc.finalize(Statistic::Average, 1000).get(0, "time"), Some("2"));
        assert_eq!(acc.finalize(Statistic::Median, 1000).get(0, "time"), Some("2.5"));
        assert_eq!(acc.finalize(Statistic::Min, 1000).get(0, "time"), Some("1.5"));
        assert_eq!(acc.finalize(Statistic::Max, 1000).get(0, "time"), Some("2.5"));
        // identifiers are never scaled
        assert_eq!(acc.finalize(Statistic::Max, 1000).get(0, "offset"), Some("100"));
    }

    #[test]
    fn test_identifier_last_run_wins_and_is_verbatim() {
        let opts = options(1, false);
        let mut acc = CategoryAccumulator::new(Category::VersionQuery);
        acc.ingest("version-a.csv", b"offset,t\n007,1\n", &opts).unwrap();
        acc.ingest("version-b.csv", b"offset,t\n8,3\n", &opts).unwrap();

        for stat in [Statistic::Average, Statistic::Min, Statistic::Max] {
            assert_eq!(acc.finalize(stat, 1).get(0, "offset"), Some("8"));
        }

        let mut acc = CategoryAccumulator::new(Category::VersionQuery);
        acc.ingest("version-a.csv", b"offset,t\n007,1\n", &opts).unwrap();
        assert_eq!(acc.finalize(Statistic::Min, 1).get(0, "offset"), Some("007"));
    }

    #[test]
    fn test_non_numeric_measurement_is_reported() {
        let opts = options(1, false);
        let mut acc = CategoryAccumulator::new(Category::VersionMatrix);
        let err = acc
            .ingest("versionmat-x.csv", b"patch,offset,time\n1,0,10\n2,0,oops\n", &opts)
            .unwrap_err();

        match err {
            AggregateError::NonNumeric {
                file,
                row,
                column,
                value,
            } => {
                assert_eq!(file, "versionmat-x.csv");
                assert_eq!(row, 1);
                assert_eq!(column, "time");
                assert_eq!(value, "oops");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_numeric_identifier_is_accepted() {
        let opts = options(1, false);
        let mut acc = CategoryAccumulator::new(Category::VersionMatrix);
        acc.ingest("versionmat-x.csv", b"patch,offset,time\nlatest,0,10\n", &opts)
            .unwrap();
        assert_eq!(acc.finalize(Statistic::Average, 1).get(0, "patch"), Some("latest"));
    }

    #[test]
    fn test_malformed_record_is_reported() {
        let opts = options(1, false);
        let mut acc = CategoryAccumulator::new(Category::VersionMatrix);
        let err = acc
            .ingest("versionmat-x.csv", b"patch,offset,time\n1,2\n", &opts)
            .unwrap_err();
        assert!(matches!(err, AggregateError::Csv { .. }));
    }

    #[test]
    fn test_misaligned_runs_extend_rows_and_columns() {
        let opts = options(1, false);
        let mut acc = CategoryAccumulator::new(Category::VersionQuery);
        acc.ingest("version-a.csv", b"offset,t\n0,10\n", &opts).unwrap();
        acc.ingest("version-b.csv", b"offset,t,u\n0,20,5\n1,30,6\n", &opts)
            .unwrap();

        assert_eq!(acc.rows(), 2);
        let min = acc.finalize(Statistic::Min, 1);
        assert_eq!(min.headers, vec!["offset", "t", "u"]);
        assert_eq!(min.rows[0], vec!["0", "10", "5"]);
        assert_eq!(min.rows[1], vec!["1", "30", "6"]);

        // the mean still divides by every run of the category
        let avg = acc.finalize(Statistic::Average, 1);
        assert_eq!(avg.get(1, "t"), Some("15"));
    }

    #[test]
    fn test_aggregator_finalizes_only_populated_categories() {
        let mut aggregator = Aggregator::new(options(1000, true));
        aggregator
            .ingest(Category::DeltaMatrix, "deltamat-1.csv", b"patch_start,patch_end,offset,t\n0,1,0,1000\n")
            .unwrap();

        assert!(aggregator.category(Category::VersionMatrix).unwrap().is_empty());
        assert_eq!(aggregator.category(Category::DeltaMatrix).unwrap().files(), 1);

        let tables = aggregator.finalize();
        assert_eq!(tables.len(), 4);
        assert!(tables.iter().all(|(c, _, _)| *c == Category::DeltaMatrix));

        let summaries = aggregator.summaries();
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].files, 1);
        assert_eq!(summaries[0].rows, 1);
    }

    #[tokio::test]
    async fn test_aggregate_files_keeps_name_order_beyond_read_window() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let runs = MAX_CONCURRENT_READS * 2 + 3;
        let files: Vec<ClassifiedFile> = (0..runs)
            .map(|i| {
                let name = format!("version-{:02}.csv", i);
                let path = temp_dir.path().join(&name);
                std::fs::write(&path, format!("offset,t\n{},{}\n", i, i * 10)).unwrap();
                ClassifiedFile {
                    name,
                    path,
                    category: Category::VersionQuery,
                }
            })
            .collect();

        let aggregator = aggregate_files(&files, options(1, true)).await.unwrap();
        let acc = aggregator.category(Category::VersionQuery).unwrap();
        assert_eq!(acc.files(), runs);

        // the last file by name supplies the identifier
        let last = (runs - 1).to_string();
        assert_eq!(acc.finalize(Statistic::Min, 1).get(0, "offset"), Some(last.as_str()));
        assert_eq!(acc.finalize(Statistic::Max, 1).get(0, "t"), Some(((runs - 1) * 10).to_string().as_str()));
    }

    #[tokio::test]
    async fn test_aggregate_files_missing_file() {
        let files = vec![ClassifiedFile {
            name: "version-gone.csv".to_string(),
            path: std::path::PathBuf::from("/definitely/not/here/version-gone.csv"),
            category: Category::VersionQuery,
        }];

        let err = aggregate_files(&files, options(1, false)).await.unwrap_err();
        assert!(matches!(err, AggregateError::Io { .. }));
    }
}
