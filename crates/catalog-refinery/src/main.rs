//! CLI entry point for the catalog refinery pipeline.

use anyhow::{Context, Result, anyhow};
use catalog_refinery::imputers::ImputationStrategy;
use catalog_refinery::pipeline::{ColumnOutlierPlan, OutlierTreatment};
use catalog_refinery::{
    Pipeline, PipelineConfig, PipelineConfigBuilder, PipelineResult, RefineryError,
    ReportWriter,
};
use clap::{Parser, ValueEnum};
use std::path::{Path, PathBuf};
use tracing::{error, info};

/// Built-in configurations for known catalog exports.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliPreset {
    /// Marketing catalog: ratings, prices, derived features
    Marketing,
    /// Product catalog: latest-record dedupe, category-conditioned nulls
    Products,
}

impl From<CliPreset> for PipelineConfig {
    fn from(preset: CliPreset) -> Self {
        match preset {
            CliPreset::Marketing => PipelineConfig::marketing_preset(),
            CliPreset::Products => PipelineConfig::products_preset(),
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    version,
    about = "Adaptive data-quality pipeline for catalog exports",
    long_about = "Reads a messy delimited catalog export, repairs encoding and row-width \
                  problems, coerces declared columns, imputes and bounds numeric columns \
                  and writes a cleaned CSV plus a JSON schema report.\n\n\
                  EXAMPLES:\n  \
                  # Clean a marketing export\n  \
                  catalog-refinery -i marketing_sample.csv --preset marketing\n\n  \
                  # Preview the plans without writing anything\n  \
                  catalog-refinery -i products.csv --preset products --dry-run\n\n  \
                  # Use a JSON configuration file\n  \
                  catalog-refinery -i data.csv --config refinery.json -o cleaned/"
)]
struct Args {
    /// Path to the delimited file to process
    #[arg(short, long)]
    input: PathBuf,

    /// Output directory for the cleaned table and schema report
    #[arg(short, long, default_value = "./outputs")]
    output: PathBuf,

    /// Custom output file name (without extension)
    ///
    /// If not specified, uses "{input_stem}_cleaned"
    #[arg(long)]
    output_name: Option<String>,

    /// JSON configuration file
    ///
    /// Missing fields take their defaults. Flags below override the file.
    #[arg(short, long, conflicts_with = "preset")]
    config: Option<PathBuf>,

    /// Built-in configuration for a known export
    #[arg(short, long, value_enum)]
    preset: Option<CliPreset>,

    /// Field delimiter (single ASCII character)
    #[arg(long)]
    delimiter: Option<char>,

    /// Null fraction at or below which a partition's null rows are dropped
    #[arg(long)]
    partition_threshold: Option<f64>,

    /// Remove fully identical rows
    #[arg(long)]
    remove_duplicates: bool,

    /// Keep the original column names
    #[arg(long)]
    keep_column_names: bool,

    /// Preview what the pipeline would do without writing anything
    ///
    /// Shows how the file was read, column profiles and the imputation
    /// and outlier plans
    #[arg(long)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Suppress progress output (only show errors and final result)
    #[arg(short, long)]
    quiet: bool,

    /// Output the schema report as JSON to stdout instead of a summary
    ///
    /// Disables all logs. Useful for piping: `... --json | jq .run`
    #[arg(long)]
    json: bool,
}

/// Initialize the tracing subscriber for logging.
///
/// When `json_output` is true, logging is completely disabled so stdout
/// only carries the JSON report.
fn init_logging(level: &str, quiet: bool, json_output: bool) {
    if json_output {
        return;
    }

    use tracing_subscriber::EnvFilter;

    let effective_level = if quiet { "warn" } else { level };

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(effective_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level, args.quiet, args.json);

    let config = load_config(&args)?;
    let pipeline = build_pipeline(&args, config)?;

    info!("Processing: {}", args.input.display());
    let mut result = match pipeline.run_path(&args.input) {
        Ok(result) => result,
        Err(e) => return Err(explain_failure(&args.input, e)),
    };

    if args.dry_run {
        print_dry_run(&args, &result);
        return Ok(());
    }

    let writer = match args.output_name {
        Some(ref name) => ReportWriter::new(args.output.clone(), name.clone()),
        None => ReportWriter::for_input(args.output.clone(), &args.input),
    };
    let table_path = writer.write_table(&mut result.table)?;
    let schema_path = writer.write_schema(&result.report)?;

    if args.json {
        println!("{}", result.report.to_json()?);
        return Ok(());
    }

    print_summary(&result, &table_path, &schema_path);
    Ok(())
}

/// Resolve the configuration from a file or preset, then apply flag overrides.
fn load_config(args: &Args) -> Result<PipelineConfig> {
    let base = if let Some(ref path) = args.config {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot read config file {}", path.display()))?;
        serde_json::from_str::<PipelineConfig>(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?
    } else {
        args.preset.map(PipelineConfig::from).unwrap_or_default()
    };

    let mut builder = PipelineConfigBuilder::from_config(base.clone());

    if let Some(delimiter) = args.delimiter {
        if !delimiter.is_ascii() {
            return Err(anyhow!("Delimiter must be a single ASCII character"));
        }
        builder = builder.parse_options(catalog_refinery::ParseOptions {
            delimiter: delimiter as u8,
            ..base.parse_options
        });
    }
    if let Some(threshold) = args.partition_threshold {
        builder = builder.partition_drop_threshold(threshold);
    }
    if args.remove_duplicates {
        builder = builder.remove_duplicates(true);
    }
    if args.keep_column_names {
        builder = builder.normalize_column_names(false);
    }

    Ok(builder.build()?)
}

fn build_pipeline(args: &Args, config: PipelineConfig) -> Result<Pipeline> {
    let mut builder = Pipeline::builder().config(config);

    if !args.quiet && !args.json {
        builder = builder.on_progress(|update| {
            info!(
                "[{:.0}%] {}: {}",
                update.progress * 100.0,
                update.stage.display_name(),
                update.message
            );
        });
    }

    Ok(builder.build()?)
}

/// Turn a pipeline error into a message that names the file and what was tried.
fn explain_failure(input: &Path, err: RefineryError) -> anyhow::Error {
    error!("Pipeline failed [{}]: {}", err.error_code(), err);
    match err {
        RefineryError::SourceNotFound(_) => {
            anyhow!("Input file not found: {}", input.display())
        }
        RefineryError::ReadExhausted { ref attempted, .. } => anyhow!(
            "Could not read {} as a table. Tried: {}",
            input.display(),
            attempted.join(", ")
        ),
        other => anyhow!("Processing {} failed: {}", input.display(), other),
    }
}

/// Print the dry-run preview.
///
/// Uses `println!` on purpose: this output is the point of `--dry-run` and
/// must show regardless of log level.
fn print_dry_run(args: &Args, result: &PipelineResult) {
    println!("\n{}", "=".repeat(80));
    println!("DRY RUN - Preview of refinery actions");
    println!("{}\n", "=".repeat(80));

    println!("READ OUTCOME");
    println!("{}", "-".repeat(40));
    println!("  File: {}", args.input.display());
    println!("  Encoding: {}", result.read.encoding);
    println!("  Permissive tokenizer: {}", yes_no(result.read.permissive));
    println!("  Lossy fallback: {}", yes_no(result.read.lossy));
    println!("  Malformed rows: {}", result.read.malformed_rows);
    println!("  Attempts: {}", result.read.attempted.join(" -> "));
    println!(
        "  Rows: {}  Columns: {}",
        result.report.run.input_rows, result.report.run.input_columns
    );
    println!();

    println!("COLUMN PROFILES");
    println!("{}", "-".repeat(40));
    println!(
        "{:<28} {:<14} {:<10} {:<10}",
        "Column", "Type", "Missing %", "Distinct"
    );
    println!("{}", "-".repeat(64));
    for col in &result.profile.columns {
        println!(
            "{:<28} {:<14} {:<10.1} {:<10}",
            truncate_str(&col.name, 27),
            truncate_str(&col.dtype, 13),
            col.missing_fraction * 100.0,
            col.distinct_count
        );
    }
    println!();

    println!("IMPUTATION PLAN");
    println!("{}", "-".repeat(40));
    if result.imputation_plan.entries.is_empty() {
        println!("  No numeric columns to impute");
    }
    for entry in &result.imputation_plan.entries {
        let mut line = format!(
            "  {:<28} {:>6.2}% missing  {}",
            truncate_str(&entry.column, 27),
            entry.missing_fraction * 100.0,
            strategy_label(&entry.strategy)
        );
        if entry.excluded {
            line.push_str(" (left to pruner)");
        } else if entry.downgraded() {
            line.push_str(" (downgraded for lack of signal)");
        }
        println!("{}", line);
    }
    println!();

    println!("OUTLIER PLAN");
    println!("{}", "-".repeat(40));
    if result.outlier_plan.is_empty() {
        println!("  No numeric columns to bound");
    }
    for plan in &result.outlier_plan {
        println!("  {}", outlier_line(plan));
    }
    println!();

    println!("{}", "=".repeat(80));
    println!("To write the cleaned table and schema report, run without --dry-run");
    println!("{}", "=".repeat(80));
}

/// Print a human-readable summary of a finished run.
fn print_summary(result: &PipelineResult, table_path: &Path, schema_path: &Path) {
    let run = &result.report.run;

    println!();
    println!("{}", "=".repeat(80));
    println!("REFINERY COMPLETE");
    println!("{}", "=".repeat(80));
    println!();
    println!(
        "Input:  {} ({} rows x {} columns, {})",
        run.input_file, run.input_rows, run.input_columns, run.encoding
    );
    println!(
        "Output: {} ({} rows x {} columns)",
        table_path.display(),
        run.output_rows,
        run.output_columns
    );
    println!("Schema: {}", schema_path.display());
    println!();
    println!("Processing Summary:");
    println!("  Duration: {}ms", result.duration_ms);
    println!("  Retention: {}", run.retention_rate);
    println!("  Malformed rows: {}", run.malformed_rows);
    println!(
        "  Rows truncated/padded: {}/{}",
        run.truncated_rows, run.padded_rows
    );
    println!("  Duplicates removed: {}", run.duplicates_removed);
    println!(
        "  Rows dropped by partition policy: {}",
        run.rows_dropped_by_partition_policy
    );
    println!(
        "  Columns pruned: {}",
        result.report.pruned_columns.len()
    );
    println!(
        "  Features derived: {}",
        result.report.derived_features.len()
    );
    println!();
    println!("Use --json for machine-readable output");
    println!("{}", "=".repeat(80));
}

fn strategy_label(strategy: &ImputationStrategy) -> String {
    match strategy {
        ImputationStrategy::Knn {
            neighbors,
            features,
        } => format!("KNN (k={}, {} features)", neighbors, features.len()),
        ImputationStrategy::Iterative { columns, .. } => {
            format!("ITERATIVE ({} columns)", columns.len())
        }
        ImputationStrategy::Median => "MEDIAN".to_string(),
        ImputationStrategy::None => "NONE".to_string(),
    }
}

fn outlier_line(plan: &ColumnOutlierPlan) -> String {
    let treatment = match plan.treatment {
        OutlierTreatment::None => "none".to_string(),
        OutlierTreatment::Winsorize { lower, upper } => {
            format!("winsorize [{:.4}, {:.4}]", lower, upper)
        }
        OutlierTreatment::IqrCap { lower, upper } => {
            format!("IQR cap [{:.4}, {:.4}]", lower, upper)
        }
        OutlierTreatment::Unbounded => "left unbounded".to_string(),
    };
    format!(
        "{:<28} {:>6.2}% outliers  {}",
        truncate_str(&plan.column, 27),
        plan.outlier_fraction * 100.0,
        treatment
    )
}

fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

/// Truncate a string to max characters with ellipsis.
fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
