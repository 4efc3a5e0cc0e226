//! Row-width reconciliation and conversion of the raw grid into a table.

use crate::ingest::reader::RawTable;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{info, warn};

/// Shape changes applied while reconciling.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Declared header width every row now has.
    pub width: usize,
    /// Rows whose trailing fields were discarded.
    pub truncated_rows: usize,
    /// Rows padded with missing cells.
    pub padded_rows: usize,
    /// Header names that had to be renamed to stay unique.
    pub renamed_headers: Vec<String>,
}

impl ReconcileReport {
    /// Whether any field of any row was thrown away.
    pub fn discarded_data(&self) -> bool {
        self.truncated_rows > 0
    }
}

/// Normalizes every row to the header width.
pub struct RowReconciler;

impl RowReconciler {
    /// Truncate long rows and pad short ones with `None`.
    pub fn reconcile_rows(table: RawTable) -> (Vec<String>, Vec<Vec<Option<String>>>, ReconcileReport) {
        let width = table.width();
        let mut report = ReconcileReport {
            width,
            ..ReconcileReport::default()
        };

        let rows = table
            .rows
            .into_iter()
            .map(|row| {
                let len = row.len();
                let mut cells: Vec<Option<String>> =
                    row.into_iter().take(width).map(Some).collect();
                if len > width {
                    report.truncated_rows += 1;
                } else if len < width {
                    report.padded_rows += 1;
                    cells.resize(width, None);
                }
                cells
            })
            .collect();

        if report.truncated_rows > 0 {
            warn!(
                "Truncated {} rows wider than the {}-column header; trailing fields were discarded",
                report.truncated_rows, width
            );
        }
        if report.padded_rows > 0 {
            info!(
                "Padded {} short rows with missing cells",
                report.padded_rows
            );
        }

        let (headers, renamed) = unique_headers(table.headers);
        report.renamed_headers = renamed;
        (headers, rows, report)
    }

    /// Reconcile and build a table of `String` columns.
    ///
    /// Padding cells become nulls; empty strings stay empty strings.
    pub fn to_frame(table: RawTable) -> PolarsResult<(DataFrame, ReconcileReport)> {
        let (headers, rows, report) = Self::reconcile_rows(table);

        let mut columns: Vec<Vec<Option<String>>> =
            vec![Vec::with_capacity(rows.len()); headers.len()];
        for row in rows {
            for (column, cell) in columns.iter_mut().zip(row) {
                column.push(cell);
            }
        }

        let columns: Vec<Column> = headers
            .iter()
            .zip(columns)
            .map(|(name, values)| Column::from(Series::new(name.as_str().into(), values)))
            .collect();

        Ok((DataFrame::new(columns)?, report))
    }
}

/// Make header names unique and non-empty.
fn unique_headers(headers: Vec<String>) -> (Vec<String>, Vec<String>) {
    let mut seen: HashSet<String> = HashSet::new();
    let mut renamed = Vec::new();
    let mut result = Vec::with_capacity(headers.len());

    for (i, header) in headers.into_iter().enumerate() {
        let base = if header.trim().is_empty() {
            format!("column_{}", i + 1)
        } else {
            header
        };
        let mut name = base.clone();
        let mut suffix = 1;
        while seen.contains(&name) {
            name = format!("{}_{}", base, suffix);
            suffix += 1;
        }
        if name != base {
            warn!("Duplicate header '{}' renamed to '{}'", base, name);
            renamed.push(name.clone());
        }
        seen.insert(name.clone());
        result.push(name);
    }

    (result, renamed)
}
