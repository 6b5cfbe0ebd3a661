//! querystat - benchmark query-timing aggregator
//!
//! A CLI tool that folds repeated benchmark runs, stored as one CSV file
//! per run, into average, median, min and max tables per query category.
//!
//! Exit codes:
//!   0 - Success
//!   1 - Runtime error (bad config, aborted subdirectory, write failure, etc.)
//!   2 - At least one subdirectory was skipped and --strict is set

mod analysis;
mod cli;
mod config;
mod models;
mod report;
mod scanner;

use analysis::{AggregateOptions, Aggregator};
use anyhow::{Context, Result};
use chrono::Utc;
use cli::Args;
use config::{Config, CONFIG_FILE_NAME};
use indicatif::{ProgressBar, ProgressStyle};
use models::{ErrorPolicy, RunMetadata, RunSummary, SubdirOutcome, SubdirStatus};
use std::path::Path;
use std::time::Instant;
use tracing::{debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse_args();

    // Validate arguments
    if let Err(e) = args.validate() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }

    // Handle --init-config early (no logging needed)
    if args.init_config {
        return handle_init_config();
    }

    init_logging(&args);

    info!("querystat v{}", env!("CARGO_PKG_VERSION"));
    debug!("Arguments: {:?}", args);

    match run(args).await {
        Ok(exit_code) => {
            std::process::exit(exit_code);
        }
        Err(e) => {
            error!("Aggregation failed: {:#}", e);
            eprintln!("\n❌ Error: {:#}", e);
            std::process::exit(1);
        }
    }
}

/// Handle --init-config: generate a default .querystat.toml.
fn handle_init_config() -> Result<()> {
    let path = Path::new(CONFIG_FILE_NAME);

    if path.exists() {
        eprintln!("⚠️  {} already exists. Remove it first or edit it manually.", CONFIG_FILE_NAME);
        std::process::exit(1);
    }

    let content = Config::default_toml();
    std::fs::write(path, &content)
        .with_context(|| format!("Failed to write {}", CONFIG_FILE_NAME))?;

    println!("✅ Created {} with default settings.", CONFIG_FILE_NAME);
    println!("   Edit it to customize subdirectories, units and identifier columns.");
    Ok(())
}

/// Initialize logging based on verbosity settings.
fn init_logging(args: &Args) {
    let level = args.log_level();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

/// Run the aggregation over every configured subdirectory. Returns the exit code.
async fn run(args: Args) -> Result<i32> {
    let start_time = Instant::now();

    let root = args
        .root
        .clone()
        .context("A results root directory is required")?;

    let mut config = load_config(&args, &root)?;
    config.merge_with_args(&args);
    config.validate()?;

    if args.dry_run {
        return handle_dry_run(&root, &config).await;
    }

    println!("📂 Aggregating results in: {}", root.display());
    println!(
        "   Unit divisor: {} | Median: {} | On error: {:?}",
        config.unit_divisor(),
        if config.median() { "yes" } else { "no" },
        config.on_error()
    );

    let subdirs = aggregate_all(&root, &config, !args.quiet).await?;

    let summary = RunSummary {
        metadata: RunMetadata {
            root: root.display().to_string(),
            run_date: Utc::now(),
            unit_divisor: config.unit_divisor(),
            median: config.median(),
            duration_seconds: start_time.elapsed().as_secs_f64(),
        },
        subdirs,
    };

    if !args.quiet {
        println!("\n📊 Summary:\n{}", report::generate_text_summary(&summary));
    }

    if let Some(ref path) = args.summary {
        report::write_json_summary(&summary, path)?;
        info!("Summary written to {}", path.display());
    }

    if args.strict && summary.skipped() > 0 {
        eprintln!(
            "\n⛔ {} subdirectories were skipped. Failing (exit code 2).",
            summary.skipped()
        );
        return Ok(2);
    }

    Ok(0)
}

/// Aggregate each subdirectory of `root` in turn, writing its tables.
///
/// Listing and aggregation failures follow the configured error policy;
/// failing to write outputs always stops the run.
async fn aggregate_all(root: &Path, config: &Config, show_progress: bool) -> Result<Vec<SubdirOutcome>> {
    let options = AggregateOptions::from(config);
    let policy = config.on_error();
    let subdirs = &config.general.subdirs;

    let progress = if show_progress {
        let pb = ProgressBar::new(subdirs.len() as u64);
        if let Ok(style) = ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}",
        ) {
            pb.set_style(style.progress_chars("#>-"));
        }
        pb
    } else {
        ProgressBar::hidden()
    };

    let mut outcomes = Vec::with_capacity(subdirs.len());

    for name in subdirs {
        progress.set_message(name.clone());
        let dir = root.join(name);

        let aggregator = match aggregate_subdir(&dir, options.clone()).await {
            Ok(aggregator) => aggregator,
            Err(e) if policy == ErrorPolicy::Abort => {
                progress.abandon();
                return Err(e.context(format!("Aborting at subdirectory {}", name)));
            }
            Err(e) => {
                warn!("Skipping {}: {:#}", name, e);
                outcomes.push(SubdirOutcome::skipped(name, format!("{:#}", e)));
                progress.inc(1);
                continue;
            }
        };

        let outputs = report::write_tables(&dir, &aggregator.finalize())?;
        progress.suspend(|| println!("end"));

        let outcome = SubdirOutcome {
            name: name.clone(),
            status: SubdirStatus::Aggregated,
            categories: aggregator.summaries(),
            outputs,
        };
        info!(
            "{}: {} files, wrote {} tables",
            name,
            outcome.files(),
            outcome.outputs.len()
        );
        outcomes.push(outcome);
        progress.inc(1);
    }

    progress.finish_and_clear();
    Ok(outcomes)
}

/// List, classify and fold every run file of one subdirectory.
async fn aggregate_subdir(dir: &Path, options: AggregateOptions) -> Result<Aggregator> {
    let files = scanner::scan_subdir(dir).await?;
    debug!("{}: {} result files", dir.display(), files.len());

    let aggregator = analysis::aggregate_files(&files, options)
        .await
        .with_context(|| format!("Failed to aggregate {}", dir.display()))?;

    Ok(aggregator)
}

/// Handle --dry-run: classify files, print what would be aggregated, exit.
async fn handle_dry_run(root: &Path, config: &Config) -> Result<i32> {
    println!("\n🔍 Dry run: classifying files (nothing is read or written)...");

    for name in &config.general.subdirs {
        let dir = root.join(name);
        println!("\n   📁 {}", name);

        let files = match scanner::scan_subdir(&dir).await {
            Ok(files) => files,
            Err(e) => {
                println!("     ⚠️  {:#}", e);
                continue;
            }
        };

        if files.is_empty() {
            println!("     No result files found.");
            continue;
        }

        for file in &files {
            println!("     📄 {} [{}]", file.name, file.category);
        }
        let counts = scanner::count_by_category(&files)
            .into_iter()
            .map(|(category, count)| format!("{}: {}", category, count))
            .collect::<Vec<_>>()
            .join(", ");
        println!("     Total: {}", counts);
    }

    println!("\n✅ Dry run complete. No files were written.");
    Ok(0)
}

/// Load configuration: explicit path, then the results root, then the
/// working directory, then defaults.
fn load_config(args: &Args, root: &Path) -> Result<Config> {
    if let Some(ref config_path) = args.config {
        info!("Loading config from: {}", config_path.display());
        return Config::load(config_path);
    }

    if let Some(config) = Config::load_from_root(root)? {
        info!("Found {} in results root", CONFIG_FILE_NAME);
        return Ok(config);
    }

    match Config::load_default() {
        Ok(Some(config)) => {
            info!("Loaded default config from {}", CONFIG_FILE_NAME);
            Ok(config)
        }
        Ok(None) => {
            debug!("No config file found, using defaults");
            Ok(Config::default())
        }
        Err(e) => {
            warn!("Failed to load config: {}", e);
            Ok(Config::default())
        }
    }
}
