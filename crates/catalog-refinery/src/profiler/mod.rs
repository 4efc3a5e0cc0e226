//! Data-quality profiling.
//!
//! This module computes, for every column of a table:
//! - Missing count and fraction
//! - Distinct (non-missing) value count
//! - For numeric columns, quartiles and IQR fences
//!
//! Profiling is a pure function of the table.

mod statistics;

pub use statistics::{IQR_FENCE_MULTIPLIER, Quartiles};
pub(crate) use statistics::{compute_quartiles, count_outliers, pearson_correlation};

use crate::utils::{is_numeric_dtype, numeric_values};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;
use tracing::debug;

/// Read-only view over one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnProfile {
    pub name: String,
    pub dtype: String,
    pub missing_count: usize,
    pub missing_fraction: f64,
    pub distinct_count: usize,
    /// Present for numeric columns with at least one observed value.
    pub quartiles: Option<Quartiles>,
}

impl ColumnProfile {
    /// Whether the column is numeric with at least one observed value.
    pub fn is_numeric(&self) -> bool {
        self.quartiles.is_some()
    }
}

/// Profiles of every column, in table order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TableProfile {
    pub rows: usize,
    pub columns: Vec<ColumnProfile>,
}

impl TableProfile {
    /// Look up a column's profile.
    pub fn get(&self, name: &str) -> Option<&ColumnProfile> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Data profiler for measuring column quality.
pub struct DataProfiler;

impl DataProfiler {
    /// Profile every column of a table.
    pub fn profile_table(df: &DataFrame) -> Result<TableProfile> {
        let mut columns = Vec::with_capacity(df.width());
        for column in df.get_columns() {
            columns.push(Self::profile_column(column.as_materialized_series())?);
        }
        debug!("Profiled {} columns over {} rows", columns.len(), df.height());

        Ok(TableProfile {
            rows: df.height(),
            columns,
        })
    }

    /// Profile a single column.
    pub fn profile_column(series: &Series) -> Result<ColumnProfile> {
        let missing_count = if is_numeric_dtype(series.dtype()) {
            // NaN counts as missing for numeric columns
            numeric_values(series)?.iter().filter(|v| v.is_none()).count()
        } else {
            series.null_count()
        };
        let missing_fraction = if series.is_empty() {
            0.0
        } else {
            missing_count as f64 / series.len() as f64
        };

        let quartiles = if is_numeric_dtype(series.dtype()) {
            compute_quartiles(&numeric_values(series)?)
        } else {
            None
        };

        Ok(ColumnProfile {
            name: series.name().to_string(),
            dtype: format!("{:?}", series.dtype()),
            missing_count,
            missing_fraction,
            distinct_count: series.drop_nulls().n_unique()?,
            quartiles,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_table() {
        let df = df![
            "price" => [Some(1.0), None, Some(3.0), Some(3.0)],
            "title" => [Some("a"), Some("b"), None, Some("a")],
        ]
        .unwrap();

        let profile = DataProfiler::profile_table(&df).unwrap();
        assert_eq!(profile.rows, 4);

        let price = profile.get("price").unwrap();
        assert_eq!(price.missing_count, 1);
        assert_eq!(price.missing_fraction, 0.25);
        assert_eq!(price.distinct_count, 2);
        assert!(price.is_numeric());

        let title = profile.get("title").unwrap();
        assert_eq!(title.distinct_count, 2);
        assert!(title.quartiles.is_none());
    }

    #[test]
    fn test_all_missing_numeric_has_no_quartiles() {
        let series = Series::new("empty".into(), vec![None::<f64>; 3]);
        let profile = DataProfiler::profile_column(&series).unwrap();

        assert_eq!(profile.missing_fraction, 1.0);
        assert_eq!(profile.distinct_count, 0);
        assert!(profile.quartiles.is_none());
    }
}
