//! Catalog Refinery Library
//!
//! An adaptive data-quality pipeline for messy product and marketing catalog
//! exports, built with Rust and Polars.
//!
//! # Overview
//!
//! A run takes one delimited file through these stages:
//!
//! - **Ingestion**: encoding detection with a fallback ladder, strict then
//!   permissive tokenizing, and a lossy Latin-1 pass that never fails
//! - **Row reconciliation**: every row forced to the header width
//! - **Type coercion**: declared numeric, boolean, temporal and text columns
//! - **Deduplication**: latest record per identifier, exact duplicates
//! - **Profiling**: missingness, distinct counts and IQR fences per column
//! - **Imputation**: KNN, iterative or median fill chosen per column from
//!   its missing fraction
//! - **Outlier bounding**: winsorize, IQR cap or leave alone, chosen per
//!   column from its outlier fraction
//! - **Partition null policy**: drop or partition-mean fill per category
//! - **Feature derivation** and **column pruning**
//! - **Schema report**: run metadata and a per-column schema as JSON
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use catalog_refinery::{Pipeline, PipelineConfig};
//! use catalog_refinery::reporting::ReportWriter;
//! use std::path::{Path, PathBuf};
//!
//! let input = Path::new("marketing_sample.csv");
//! let mut result = Pipeline::builder()
//!     .config(PipelineConfig::marketing_preset())
//!     .build()?
//!     .run_path(input)?;
//!
//! let writer = ReportWriter::for_input(PathBuf::from("output"), input);
//! writer.write_table(&mut result.table)?;
//! writer.write_schema(&result.report)?;
//! ```
//!
//! # Configuration
//!
//! ```rust,ignore
//! use catalog_refinery::config::{ColumnRole, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .column_role("initial_price", ColumnRole::Numeric)
//!     .column_role("root_category_name", ColumnRole::Text)
//!     .partition("root_category_name", ["initial_price"])
//!     .dedupe_latest("product_id", Some("fetch_time".to_string()))
//!     .build()?;
//! ```

pub mod cleaner;
pub mod config;
pub mod error;
pub mod features;
pub mod imputers;
pub mod ingest;
pub mod pipeline;
pub mod profiler;
pub mod reporting;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    ColumnRole, ColumnRoleSpec, ConfigValidationError, ParseOptions, PipelineConfig,
    PipelineConfigBuilder,
};
pub use error::{RefineryError, Result as RefineryResult, ResultExt};
pub use features::{FeatureDeriver, FeatureSpec};
pub use imputers::{
    ImputationEngine, ImputationPlan, ImputationStrategy, IterativeImputer, KNNImputer,
    StatisticalImputer, StrategyTag,
};
pub use ingest::{ReadReport, TableReader, TextEncoding};
pub use pipeline::{
    ClosureProgressReporter, OutlierBounder, OutlierTreatment, Pipeline, PipelineBuilder,
    PipelineResult, PipelineStage, ProgressReporter, ProgressUpdate,
};
pub use profiler::{ColumnProfile, DataProfiler, TableProfile};
pub use reporting::{ReportWriter, SchemaReport};
