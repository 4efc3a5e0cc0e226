use crate::cleaner::{CoercedColumn, PartitionReport, PrunedColumn};
use crate::imputers::ColumnImputation;
use crate::ingest::{ReadReport, ReconcileReport};
use crate::pipeline::outliers::ColumnOutlierPlan;
use crate::utils::{
    DtypeCategory, collect_sample_values, get_dtype_category, mean_of, numeric_values,
};
use anyhow::Result;
use chrono::{DateTime, Local};
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;

/// Number of distinct sample values listed for text and boolean columns.
pub const SAMPLE_VALUE_COUNT: usize = 5;

// ============================================================================
// Schema Report Types
// ============================================================================

/// Snapshot of a finished run: what went in, what came out, and every
/// decision taken in between.
///
/// Built once by [`SchemaReport::build`] at the end of a run.
#[derive(Debug, Clone, Serialize)]
pub struct SchemaReport {
    pub run: RunMetadata,
    /// Per output column, in output order.
    pub columns: Vec<ColumnSchema>,
    pub coerced_columns: Vec<CoercedColumn>,
    pub imputation_plan: Vec<ColumnImputation>,
    pub outlier_plan: Vec<ColumnOutlierPlan>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub partition_policy: Option<PartitionReport>,
    pub pruned_columns: Vec<PrunedColumn>,
    pub derived_features: Vec<String>,
    /// `(original, normalized)` pairs for renamed columns.
    pub renamed_columns: Vec<(String, String)>,
    pub processing_steps: Vec<String>,
}

/// Run-level counts and ingestion details.
#[derive(Debug, Clone, Serialize)]
pub struct RunMetadata {
    pub generated_at: String,
    pub input_file: String,
    pub input_rows: usize,
    pub input_columns: usize,
    pub output_rows: usize,
    pub output_columns: usize,
    /// Output rows over input rows as a percentage, e.g. `"97.50%"`.
    pub retention_rate: String,
    pub retention_fraction: f64,
    pub encoding: String,
    pub permissive_parse: bool,
    pub lossy_decode: bool,
    pub malformed_rows: usize,
    pub truncated_rows: usize,
    pub padded_rows: usize,
    pub duplicates_removed: usize,
    pub rows_dropped_by_partition_policy: usize,
}

/// Schema entry for one output column.
#[derive(Debug, Clone, Serialize)]
pub struct ColumnSchema {
    pub name: String,
    pub dtype: String,
    pub null_count: usize,
    pub null_percentage: f64,
    pub distinct_count: usize,
    #[serde(flatten)]
    pub summary: ColumnSummary,
}

/// Type-appropriate summary of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ColumnSummary {
    Numeric {
        min: Option<f64>,
        max: Option<f64>,
        mean: Option<f64>,
    },
    Temporal {
        min: Option<String>,
        max: Option<String>,
    },
    Categorical {
        sample_values: Vec<String>,
    },
}

/// Everything a report is built from.
pub struct ReportParams<'a> {
    pub input_file: &'a str,
    pub input_shape: (usize, usize),
    pub final_df: &'a DataFrame,
    pub read: &'a ReadReport,
    pub reconcile: &'a ReconcileReport,
    pub coerced_columns: &'a [CoercedColumn],
    pub duplicates_removed: usize,
    pub imputation_plan: &'a [ColumnImputation],
    pub outlier_plan: &'a [ColumnOutlierPlan],
    pub partition_policy: Option<&'a PartitionReport>,
    pub pruned_columns: &'a [PrunedColumn],
    pub derived_features: &'a [String],
    pub renamed_columns: &'a [(String, String)],
    pub processing_steps: &'a [String],
}

impl SchemaReport {
    pub fn build(params: ReportParams<'_>) -> Result<Self> {
        let ReportParams {
            input_file,
            input_shape,
            final_df,
            read,
            reconcile,
            coerced_columns,
            duplicates_removed,
            imputation_plan,
            outlier_plan,
            partition_policy,
            pruned_columns,
            derived_features,
            renamed_columns,
            processing_steps,
        } = params;

        let (input_rows, input_columns) = input_shape;
        let retention_fraction = if input_rows == 0 {
            0.0
        } else {
            final_df.height() as f64 / input_rows as f64
        };

        let run = RunMetadata {
            generated_at: Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            input_file: input_file.to_string(),
            input_rows,
            input_columns,
            output_rows: final_df.height(),
            output_columns: final_df.width(),
            retention_rate: format!("{:.2}%", retention_fraction * 100.0),
            retention_fraction,
            encoding: read.encoding.clone(),
            permissive_parse: read.permissive,
            lossy_decode: read.lossy,
            malformed_rows: read.malformed_rows,
            truncated_rows: reconcile.truncated_rows,
            padded_rows: reconcile.padded_rows,
            duplicates_removed,
            rows_dropped_by_partition_policy: partition_policy.map_or(0, |p| p.rows_dropped),
        };

        let mut columns = Vec::with_capacity(final_df.width());
        for column in final_df.get_columns() {
            columns.push(column_schema(column.as_materialized_series())?);
        }

        Ok(Self {
            run,
            columns,
            coerced_columns: coerced_columns.to_vec(),
            imputation_plan: imputation_plan.to_vec(),
            outlier_plan: outlier_plan.to_vec(),
            partition_policy: partition_policy.cloned(),
            pruned_columns: pruned_columns.to_vec(),
            derived_features: derived_features.to_vec(),
            renamed_columns: renamed_columns.to_vec(),
            processing_steps: processing_steps.to_vec(),
        })
    }

    /// Schema entry for a column by output name.
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

fn column_schema(series: &Series) -> Result<ColumnSchema> {
    let null_count = series.null_count();
    let null_percentage = if series.is_empty() {
        0.0
    } else {
        null_count as f64 / series.len() as f64 * 100.0
    };

    let summary = match get_dtype_category(series.dtype()) {
        DtypeCategory::Numeric => {
            let values = numeric_values(series)?;
            let observed = values.iter().flatten().copied();
            ColumnSummary::Numeric {
                min: observed.clone().reduce(f64::min),
                max: observed.reduce(f64::max),
                mean: mean_of(&values),
            }
        }
        DtypeCategory::Temporal if series.dtype() != &DataType::Time => {
            let millis = series
                .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?
                .cast(&DataType::Int64)?;
            let millis = millis.i64()?;
            ColumnSummary::Temporal {
                min: millis.min().and_then(format_millis),
                max: millis.max().and_then(format_millis),
            }
        }
        _ => ColumnSummary::Categorical {
            sample_values: distinct_samples(series, SAMPLE_VALUE_COUNT),
        },
    };

    Ok(ColumnSchema {
        name: series.name().to_string(),
        dtype: series.dtype().to_string(),
        null_count,
        null_percentage,
        distinct_count: series.drop_nulls().n_unique()?,
        summary,
    })
}

/// First `max` distinct non-null values, in order of appearance.
fn distinct_samples(series: &Series, max: usize) -> Vec<String> {
    let mut seen = HashSet::new();
    collect_sample_values(series, series.len())
        .into_iter()
        .filter(|value| seen.insert(value.clone()))
        .take(max)
        .collect()
}

fn format_millis(ms: i64) -> Option<String> {
    DateTime::from_timestamp_millis(ms).map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
}
