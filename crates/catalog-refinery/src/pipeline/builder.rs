//! Main refinery pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! orchestrating a run from raw file to cleaned table and schema report.

use crate::cleaner::{
    ColumnPruner, Deduplicator, PartitionNullPolicy, PartitionReport, PrunedColumn, TypeCoercer,
};
use crate::config::PipelineConfig;
use crate::error::{RefineryError, Result};
use crate::features::FeatureDeriver;
use crate::imputers::{ImputationEngine, ImputationPlan};
use crate::ingest::{ReadOutcome, ReadReport, RowReconciler, TableReader};
use crate::pipeline::outliers::{ColumnOutlierPlan, OutlierBounder};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::profiler::{DataProfiler, TableProfile};
use crate::reporting::{ReportParams, SchemaReport};
use crate::utils::numeric_column_names;
use polars::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Everything a run produces.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// The cleaned table.
    pub table: DataFrame,
    /// Schema report built at the end of the run.
    pub report: SchemaReport,
    /// How the source file was read.
    pub read: ReadReport,
    /// Column profiles the imputation plan was built from.
    pub profile: TableProfile,
    pub imputation_plan: ImputationPlan,
    pub outlier_plan: Vec<ColumnOutlierPlan>,
    pub duration_ms: u64,
}

/// The refinery pipeline.
///
/// Use [`Pipeline::builder()`] to create a new pipeline with custom configuration.
///
/// # Example
///
/// ```rust,ignore
/// use catalog_refinery::{Pipeline, PipelineConfig};
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::marketing_preset())
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run_path("marketing_sample.csv")?;
///
/// println!("{}", result.report.run.retention_rate);
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(Pipeline: Send);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Read a file and run every stage over it.
    ///
    /// # Errors
    ///
    /// Fails only on file-level conditions: a missing or unreadable source,
    /// or a file that yields no header row under any remedy.
    pub fn run_path(&self, path: impl AsRef<Path>) -> Result<PipelineResult> {
        let path = path.as_ref();
        let start_time = Instant::now();

        self.report_progress(ProgressUpdate::new(
            PipelineStage::Reading,
            0.0,
            format!("Reading {}...", path.display()),
        ));
        info!("Step 1: Reading {}...", path.display());

        let outcome = match TableReader::new(self.config.parse_options).read_path(path) {
            Ok(outcome) => outcome,
            Err(e) => return Err(self.fail(e)),
        };

        self.run_outcome(&path.display().to_string(), outcome, start_time)
    }

    /// Run every stage after reading over an already-read table.
    pub fn run_table(&self, input_file: &str, outcome: ReadOutcome) -> Result<PipelineResult> {
        self.run_outcome(input_file, outcome, Instant::now())
    }

    fn run_outcome(
        &self,
        input_file: &str,
        outcome: ReadOutcome,
        start_time: Instant,
    ) -> Result<PipelineResult> {
        match self.process(input_file, outcome, start_time) {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete(format!(
                    "Pipeline completed: {} rows x {} columns",
                    result.table.height(),
                    result.table.width()
                )));
                Ok(result)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn fail(&self, e: RefineryError) -> RefineryError {
        error!("Pipeline error: {}", e);
        self.report_progress(ProgressUpdate::failed(e.to_string()));
        e
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn process(
        &self,
        input_file: &str,
        outcome: ReadOutcome,
        start_time: Instant,
    ) -> Result<PipelineResult> {
        let config = &self.config;
        let mut processing_steps: Vec<String> = Vec::new();
        let read = outcome.report;

        if read.lossy {
            warn!(
                "{} could only be read with the lossy fallback; undecodable bytes were replaced",
                input_file
            );
        }
        processing_steps.push(format!(
            "Read {} rows x {} columns as {}{}",
            outcome.table.height(),
            outcome.table.width(),
            read.encoding,
            if read.permissive {
                " (permissive)"
            } else {
                ""
            }
        ));

        // Step 2: Row width
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Reconciling,
            0.0,
            "Reconciling row widths...",
        ));
        info!("Step 2: Reconciling row widths...");
        let (mut df, reconcile) = RowReconciler::to_frame(outcome.table)?;
        if reconcile.discarded_data() {
            warn!(
                "Truncated {} rows to the header width of {}; their trailing fields were discarded",
                reconcile.truncated_rows, reconcile.width
            );
            processing_steps.push(format!(
                "Truncated {} rows to {} fields",
                reconcile.truncated_rows, reconcile.width
            ));
        }
        if reconcile.padded_rows > 0 {
            processing_steps.push(format!(
                "Padded {} short rows to {} fields",
                reconcile.padded_rows, reconcile.width
            ));
        }
        let input_shape = (df.height(), df.width());

        // Step 3: Types
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Coercion,
            0.0,
            "Coercing declared columns...",
        ));
        info!("Step 3: Coercing declared columns...");
        let coerced_columns = TypeCoercer::coerce(&mut df, &config.column_roles, &mut processing_steps)
            .map_err(|e| RefineryError::stage("coercion", e))?;

        // Step 4: Duplicates
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Deduplication,
            0.0,
            "Resolving duplicates...",
        ));
        info!("Step 4: Resolving duplicates...");
        let (mut df, duplicates_removed) = self
            .deduplicate(df, &mut processing_steps)
            .map_err(|e| RefineryError::stage("deduplication", e))?;

        // Step 5: Profile
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Profiling,
            0.0,
            "Profiling columns...",
        ));
        info!("Step 5: Profiling columns...");
        let profile = DataProfiler::profile_table(&df).map_err(|e| RefineryError::stage("profiling", e))?;
        for column in &profile.columns {
            debug!(
                "  {}: {} ({:.2}% missing, {} distinct)",
                column.name,
                column.dtype,
                column.missing_fraction * 100.0,
                column.distinct_count
            );
        }

        // Step 6: Imputation
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Imputation,
            0.0,
            "Imputing missing numeric values...",
        ));
        info!("Step 6: Imputing missing numeric values...");
        // Calendar parts keep their own missing cells unless asked for by name
        let calendar_parts: Vec<String> = coerced_columns
            .iter()
            .flat_map(|c| c.derived.iter().cloned())
            .collect();
        let imputation_plan =
            ImputationPlan::build_excluding(&df, &profile, config, &calendar_parts)
                .map_err(|e| RefineryError::stage("imputation", e))?;
        ImputationEngine::apply_plan(&mut df, &imputation_plan, &mut processing_steps)
            .map_err(|e| RefineryError::stage("imputation", e))?;

        // Step 7: Outliers
        self.report_progress(ProgressUpdate::new(
            PipelineStage::OutlierBounding,
            0.0,
            "Bounding outliers...",
        ));
        info!("Step 7: Bounding outliers...");
        let outlier_columns = config.outlier_columns.clone().unwrap_or_else(|| {
            numeric_column_names(&df)
                .into_iter()
                .filter(|name| !calendar_parts.contains(name))
                .collect()
        });
        let outlier_plan = OutlierBounder::bound(
            &mut df,
            Some(outlier_columns.as_slice()),
            &mut processing_steps,
        )
        .map_err(|e| RefineryError::stage("outlier bounding", e))?;

        // Step 8: Partition policy
        let (mut df, partition_policy) = self
            .apply_partition_policy(df, &mut processing_steps)
            .map_err(|e| RefineryError::stage("partition policy", e))?;

        // Step 9: Features
        self.report_progress(ProgressUpdate::new(
            PipelineStage::FeatureDerivation,
            0.0,
            "Deriving features...",
        ));
        info!("Step 9: Deriving features...");
        let derived_features =
            FeatureDeriver::derive(&mut df, &config.derived_features, &mut processing_steps)
                .map_err(|e| RefineryError::stage("feature derivation", e))?;

        // Step 10: Pruning
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Pruning,
            0.0,
            "Pruning columns...",
        ));
        info!("Step 10: Pruning columns...");
        let (df, pruned_columns, renamed_columns) = self
            .prune(df, &mut processing_steps)
            .map_err(|e| RefineryError::stage("pruning", e))?;

        // Step 11: Report
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Reporting,
            0.0,
            "Building schema report...",
        ));
        info!("Step 11: Building schema report...");
        let report = SchemaReport::build(ReportParams {
            input_file,
            input_shape,
            final_df: &df,
            read: &read,
            reconcile: &reconcile,
            coerced_columns: &coerced_columns,
            duplicates_removed,
            imputation_plan: &imputation_plan.entries,
            outlier_plan: &outlier_plan,
            partition_policy: partition_policy.as_ref(),
            pruned_columns: &pruned_columns,
            derived_features: &derived_features,
            renamed_columns: &renamed_columns,
            processing_steps: &processing_steps,
        })
        .map_err(|e| RefineryError::stage("reporting", e))?;

        info!(
            "Retained {} of {} rows ({}), {} columns",
            df.height(),
            input_shape.0,
            report.run.retention_rate,
            df.width()
        );

        Ok(PipelineResult {
            table: df,
            report,
            read,
            profile,
            imputation_plan,
            outlier_plan,
            duration_ms: start_time.elapsed().as_millis() as u64,
        })
    }

    fn deduplicate(
        &self,
        mut df: DataFrame,
        processing_steps: &mut Vec<String>,
    ) -> anyhow::Result<(DataFrame, usize)> {
        let mut removed = 0;

        if let Some(key) = &self.config.dedupe_key {
            if df.column(key).is_ok() {
                let (kept, dropped) = Deduplicator::keep_latest(
                    &df,
                    key,
                    self.config.fetch_time_column.as_deref(),
                    processing_steps,
                )?;
                df = kept;
                removed += dropped;
            } else {
                warn!("Dedupe key '{}' not present, latest-record resolution skipped", key);
            }
        }

        if self.config.remove_duplicates {
            let (kept, dropped) = Deduplicator::remove_exact_duplicates(&df, processing_steps)?;
            df = kept;
            removed += dropped;
        }

        Ok((df, removed))
    }

    fn apply_partition_policy(
        &self,
        df: DataFrame,
        processing_steps: &mut Vec<String>,
    ) -> anyhow::Result<(DataFrame, Option<PartitionReport>)> {
        let Some(key) = &self.config.partition_key else {
            return Ok((df, None));
        };

        self.report_progress(ProgressUpdate::new(
            PipelineStage::PartitionPolicy,
            0.0,
            format!("Applying partition policy on '{}'...", key),
        ));
        info!("Step 8: Applying partition policy on '{}'...", key);

        match PartitionNullPolicy::apply(
            &df,
            key,
            &self.config.partition_targets,
            self.config.partition_drop_threshold,
            processing_steps,
        )? {
            Some((result, report)) => Ok((result, Some(report))),
            None => Ok((df, None)),
        }
    }

    fn prune(
        &self,
        df: DataFrame,
        processing_steps: &mut Vec<String>,
    ) -> anyhow::Result<(DataFrame, Vec<PrunedColumn>, Vec<(String, String)>)> {
        let (mut df, pruned) =
            ColumnPruner::prune(&df, &self.config.prune_identifier_columns, processing_steps)?;

        let renamed = if self.config.normalize_column_names {
            let renamed = ColumnPruner::normalize_column_names(&mut df)?;
            if !renamed.is_empty() {
                processing_steps.push(format!("Normalized {} column names", renamed.len()));
            }
            renamed
        } else {
            Vec::new()
        };

        Ok((df, pruned, renamed))
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

static_assertions::assert_impl_all!(PipelineBuilder: Send);

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, crate::config::ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        Ok(Pipeline {
            config,
            progress_reporter: self.progress_reporter,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ColumnRole;
    use crate::ingest::RawTable;
    use std::sync::Mutex;

    fn outcome(headers: &[&str], rows: &[&[&str]]) -> ReadOutcome {
        ReadOutcome {
            table: RawTable {
                headers: headers.iter().map(|h| h.to_string()).collect(),
                rows: rows
                    .iter()
                    .map(|r| r.iter().map(|c| c.to_string()).collect())
                    .collect(),
            },
            report: ReadReport {
                encoding: "utf-8".to_string(),
                ..ReadReport::default()
            },
        }
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert!(pipeline.progress_reporter.is_none());
        assert!(pipeline.config().normalize_column_names);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let config = PipelineConfig {
            knn_max_neighbors: 0,
            ..PipelineConfig::default()
        };
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    #[test]
    fn test_run_table_end_to_end() {
        let config = PipelineConfig::builder()
            .column_role("Price", ColumnRole::Numeric)
            .column_role("Title", ColumnRole::Text)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();

        let result = pipeline
            .run_table(
                "inline",
                outcome(
                    &["Title", "Price"],
                    &[
                        &["  phone  one ", "$1,200"],
                        &["phone two", "N/A"],
                        &["", "300"],
                        &["phone four", "450.5"],
                    ],
                ),
            )
            .unwrap();

        let names: Vec<String> = result
            .table
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["title", "price"]);
        assert_eq!(result.table.column("price").unwrap().null_count(), 0);
        assert_eq!(result.report.run.input_rows, 4);
        assert_eq!(result.report.run.retention_rate, "100.00%");
        assert_eq!(
            result.report.renamed_columns,
            vec![
                ("Title".to_string(), "title".to_string()),
                ("Price".to_string(), "price".to_string())
            ]
        );
    }

    #[test]
    fn test_progress_reaches_complete() {
        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let pipeline = Pipeline::builder()
            .on_progress(move |update| sink.lock().unwrap().push(update.stage))
            .build()
            .unwrap();

        pipeline
            .run_table("inline", outcome(&["a"], &[&["1"], &["2"]]))
            .unwrap();

        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&PipelineStage::Reconciling));
        assert_eq!(stages.last(), Some(&PipelineStage::Complete));
    }

    #[test]
    fn test_missing_source_is_reported_as_failure() {
        let failed = Arc::new(Mutex::new(false));
        let sink = failed.clone();
        let pipeline = Pipeline::builder()
            .on_progress(move |update| {
                if update.stage == PipelineStage::Failed {
                    *sink.lock().unwrap() = true;
                }
            })
            .build()
            .unwrap();

        let err = pipeline.run_path("does/not/exist.csv").unwrap_err();
        assert!(err.is_unrecoverable_input());
        assert!(*failed.lock().unwrap());
    }
}
