//! Schema report module.
//!
//! The [`SchemaReport`] is built once at the end of a run and records run
//! metadata, a per-column schema of the output, and every plan and decision
//! the pipeline made. [`ReportWriter`] persists the cleaned table as CSV and
//! the report as JSON.
//!
//! # Example
//!
//! ```rust,ignore
//! use catalog_refinery::reporting::ReportWriter;
//!
//! let mut result = pipeline.run_path(&input)?;
//! let writer = ReportWriter::for_input(PathBuf::from("output"), &input);
//! writer.write_table(&mut result.table)?;
//! writer.write_schema(&result.report)?;
//! ```

mod schema;
mod writer;

pub use schema::{
    ColumnSchema, ColumnSummary, ReportParams, RunMetadata, SAMPLE_VALUE_COUNT, SchemaReport,
};
pub use writer::ReportWriter;
