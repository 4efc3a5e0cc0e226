//! Pipeline module.
//!
//! This module provides the refinery pipeline, its progress reporting, and
//! the outlier bounder that runs between imputation and the partition
//! policy.

mod builder;
pub mod outliers;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder, PipelineResult};
pub use outliers::{ColumnOutlierPlan, OutlierBounder, OutlierTreatment};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
