//! Progress reporting for the refinery pipeline.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_refinery::Pipeline;
//!
//! let result = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run_path("catalog.csv");
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the refinery pipeline, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Resolving the encoding and tokenizing the raw file
    Reading,
    /// Forcing every row to the header width
    Reconciling,
    /// Converting string columns to their declared roles
    Coercion,
    /// Resolving repeated identifiers and identical rows
    Deduplication,
    /// Measuring missingness and spread per column
    Profiling,
    /// Filling missing numeric values
    Imputation,
    /// Clipping outliers
    OutlierBounding,
    /// Dropping or filling nulls within partitions
    PartitionPolicy,
    /// Appending derived columns
    FeatureDerivation,
    /// Dropping low-information columns and normalizing names
    Pruning,
    /// Building the schema report
    Reporting,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Stages that do work, in execution order.
    pub const SEQUENCE: [PipelineStage; 11] = [
        PipelineStage::Reading,
        PipelineStage::Reconciling,
        PipelineStage::Coercion,
        PipelineStage::Deduplication,
        PipelineStage::Profiling,
        PipelineStage::Imputation,
        PipelineStage::OutlierBounding,
        PipelineStage::PartitionPolicy,
        PipelineStage::FeatureDerivation,
        PipelineStage::Pruning,
        PipelineStage::Reporting,
    ];

    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Reading => "Reading Source",
            Self::Reconciling => "Reconciling Rows",
            Self::Coercion => "Coercing Types",
            Self::Deduplication => "Removing Duplicates",
            Self::Profiling => "Profiling Columns",
            Self::Imputation => "Imputing Values",
            Self::OutlierBounding => "Bounding Outliers",
            Self::PartitionPolicy => "Applying Partition Policy",
            Self::FeatureDerivation => "Deriving Features",
            Self::Pruning => "Pruning Columns",
            Self::Reporting => "Building Schema Report",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run attributed to this stage.
    pub fn weight(&self) -> f32 {
        match self {
            Self::Reading => 0.15,
            Self::Reconciling => 0.05,
            Self::Coercion => 0.10,
            Self::Deduplication => 0.05,
            Self::Profiling => 0.10,
            Self::Imputation => 0.25,
            Self::OutlierBounding => 0.10,
            Self::PartitionPolicy => 0.05,
            Self::FeatureDerivation => 0.05,
            Self::Pruning => 0.05,
            Self::Reporting => 0.05,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Complete => 1.0,
            Self::Failed => 0.0,
            _ => Self::SEQUENCE
                .iter()
                .take_while(|s| *s != self)
                .map(|s| s.weight())
                .sum(),
        }
    }
}

/// A progress update emitted between stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: PipelineStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,
}

impl ProgressUpdate {
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Receives progress updates during a run.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_stage_weights_sum_to_one() {
        let total: f32 = PipelineStage::SEQUENCE.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 0.001, "Weights should sum to 1.0");
    }

    #[test]
    fn test_base_progress_is_cumulative() {
        assert_eq!(PipelineStage::Reading.base_progress(), 0.0);
        assert!((PipelineStage::Reconciling.base_progress() - 0.15).abs() < 1e-6);
        assert!((PipelineStage::Reporting.base_progress() - 0.95).abs() < 1e-6);
        assert_eq!(PipelineStage::Complete.base_progress(), 1.0);
    }

    #[test]
    fn test_progress_update_new() {
        let update = ProgressUpdate::new(PipelineStage::Imputation, 0.5, "Imputing...");
        assert_eq!(update.stage, PipelineStage::Imputation);
        assert_eq!(update.stage_progress, 0.5);
        assert_eq!(update.message, "Imputing...");
        assert!(update.progress > PipelineStage::Imputation.base_progress());
    }

    #[test]
    fn test_closure_progress_reporter() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let reporter = ClosureProgressReporter::new(move |_update| {
            call_count_clone.fetch_add(1, Ordering::SeqCst);
        });

        reporter.report(ProgressUpdate::new(PipelineStage::Profiling, 0.5, "Test"));
        reporter.report(ProgressUpdate::complete("Done"));

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stage_json_values() {
        let json = serde_json::to_string(&PipelineStage::OutlierBounding).unwrap();
        assert_eq!(json, "\"outlier_bounding\"");

        let update: ProgressUpdate = serde_json::from_str(
            r#"{"stage":"partition_policy","progress":0.7,"stage_progress":0.0,"message":"x"}"#,
        )
        .unwrap();
        assert_eq!(update.stage, PipelineStage::PartitionPolicy);
    }
}
