//! Ingestion of raw exports: encoding resolution, tolerant tokenizing and
//! row-width reconciliation.

pub mod encoding;
pub mod reader;
pub mod reconcile;

pub use encoding::{TextEncoding, resolve_bytes, resolve_path};
pub use reader::{RawTable, ReadOutcome, ReadReport, TableReader};
pub use reconcile::{ReconcileReport, RowReconciler};
