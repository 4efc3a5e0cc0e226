//! Duplicate resolution: exact duplicate rows and repeated identifiers.

use super::converters::parse_timestamp_millis;
use crate::utils::{is_datetime_dtype, is_numeric_dtype};
use anyhow::Result;
use polars::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info};

const ROW_NUMBER: &str = "__row_number";
const FETCH_RANK: &str = "__fetch_rank";

/// Removes duplicated records.
pub struct Deduplicator;

impl Deduplicator {
    /// Drop fully identical rows, keeping the first occurrence.
    pub fn remove_exact_duplicates(
        df: &DataFrame,
        processing_steps: &mut Vec<String>,
    ) -> Result<(DataFrame, usize)> {
        let result = df.unique_stable(None, UniqueKeepStrategy::First, None)?;
        let removed = df.height() - result.height();

        if removed > 0 {
            let pct = (removed as f64 / df.height() as f64) * 100.0;
            processing_steps.push(format!(
                "Removed {} duplicate rows ({:.1}%)",
                removed, pct
            ));
            info!("Removed {} exact duplicate rows", removed);
        } else {
            debug!("No duplicate rows found");
        }

        Ok((result, removed))
    }

    /// Keep only the most recently fetched row for each identifier.
    ///
    /// Rows are compared by fetch time; a missing fetch time ranks below any
    /// present one and ties go to the later row. Rows with a missing
    /// identifier are all kept. Survivors keep their original order.
    pub fn keep_latest(
        df: &DataFrame,
        key_column: &str,
        fetch_time_column: Option<&str>,
        processing_steps: &mut Vec<String>,
    ) -> Result<(DataFrame, usize)> {
        let fetch_times = match fetch_time_column {
            Some(name) if df.column(name).is_ok() => {
                fetch_time_keys(df.column(name)?.as_materialized_series())?
            }
            Some(name) => {
                debug!("Fetch time column '{}' not present; file order decides", name);
                vec![None; df.height()]
            }
            None => vec![None; df.height()],
        };

        let row_numbers: Vec<u32> = (0..df.height() as u32).collect();
        let ranking = DataFrame::new(vec![
            df.column(key_column)?.clone(),
            Column::new(ROW_NUMBER.into(), row_numbers),
            Column::new(FETCH_RANK.into(), fetch_times),
        ])?;
        let missing_key = ranking.column(key_column)?.as_materialized_series().is_null();

        // Missing fetch times sort first; equal ranks stay in file order.
        let latest = ranking
            .filter(&!&missing_key)?
            .sort(
                [FETCH_RANK],
                SortMultipleOptions::default().with_maintain_order(true),
            )?
            .unique_stable(
                Some(&[key_column.to_string()]),
                UniqueKeepStrategy::Last,
                None,
            )?;

        let survivors: HashSet<u32> = latest
            .column(ROW_NUMBER)?
            .as_materialized_series()
            .u32()?
            .into_iter()
            .flatten()
            .collect();
        let mask: Vec<bool> = (0..df.height())
            .map(|row| survivors.contains(&(row as u32)) || missing_key.get(row).unwrap_or(false))
            .collect();

        let result = df.filter(&BooleanChunked::from_slice("mask".into(), &mask))?;
        let removed = df.height() - result.height();

        if removed > 0 {
            processing_steps.push(format!(
                "Kept latest record per '{}' ({} superseded rows removed)",
                key_column, removed
            ));
            info!(
                "Removed {} superseded rows by identifier '{}'",
                removed, key_column
            );
        }

        Ok((result, removed))
    }
}

/// Comparable fetch-time values (epoch milliseconds where possible).
fn fetch_time_keys(series: &Series) -> PolarsResult<Vec<Option<i64>>> {
    if is_datetime_dtype(series.dtype()) {
        let millis = series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?;
        let millis = millis.cast(&DataType::Int64)?;
        return Ok(millis.i64()?.into_iter().collect());
    }
    if is_numeric_dtype(series.dtype()) {
        let values = series.cast(&DataType::Int64)?;
        return Ok(values.i64()?.into_iter().collect());
    }

    let text = series.cast(&DataType::String)?;
    Ok(text
        .str()?
        .into_iter()
        .map(|v| v.and_then(parse_timestamp_millis))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(df: &DataFrame, column: &str) -> Vec<Option<String>> {
        let series = df.column(column).unwrap().as_materialized_series();
        series
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    // =========================================================================
    // remove_exact_duplicates() tests
    // =========================================================================

    #[test]
    fn test_remove_exact_duplicates_keeps_first() {
        let df = df![
            "id" => ["a", "b", "a", "a"],
            "price" => [Some(1.0), Some(2.0), Some(1.0), None],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, removed) = Deduplicator::remove_exact_duplicates(&df, &mut steps).unwrap();

        assert_eq!(removed, 1);
        assert_eq!(result.height(), 3);
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_remove_exact_duplicates_distinguishes_null_from_empty() {
        let df = df![
            "name" => [Some(""), None],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (_, removed) = Deduplicator::remove_exact_duplicates(&df, &mut steps).unwrap();
        assert_eq!(removed, 0);
    }

    // =========================================================================
    // keep_latest() tests
    // =========================================================================

    #[test]
    fn test_keep_latest_by_fetch_time() {
        let df = df![
            "product_id" => [Some("p1"), Some("p2"), Some("p1"), Some("p1"), None, None],
            "fetch_time" => [
                Some("2024-03-02 10:00:00"),
                Some("2024-03-01 10:00:00"),
                Some("2024-03-05 10:00:00"),
                Some("2024-03-03 10:00:00"),
                Some("2024-03-01 10:00:00"),
                None,
            ],
            "price" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, removed) =
            Deduplicator::keep_latest(&df, "product_id", Some("fetch_time"), &mut steps).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(
            ids(&result, "product_id"),
            vec![Some("p2".to_string()), Some("p1".to_string()), None, None]
        );
        let prices: Vec<Option<f64>> = result
            .column("price")
            .unwrap()
            .as_materialized_series()
            .f64()
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(prices, vec![Some(2.0), Some(3.0), Some(5.0), Some(6.0)]);
    }

    #[test]
    fn test_keep_latest_ties_go_to_later_row() {
        let df = df![
            "id" => ["x", "x", "x"],
            "seq" => [1, 2, 3],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, _) = Deduplicator::keep_latest(&df, "id", None, &mut steps).unwrap();

        assert_eq!(result.height(), 1);
        let seq = result.column("seq").unwrap().get(0).unwrap();
        assert_eq!(seq.try_extract::<i32>().unwrap(), 3);
    }

    #[test]
    fn test_keep_latest_missing_fetch_time_ranks_lowest() {
        let df = df![
            "id" => ["x", "x"],
            "fetched" => [Some("2024-01-01"), None],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, _) =
            Deduplicator::keep_latest(&df, "id", Some("fetched"), &mut steps).unwrap();

        assert_eq!(
            ids(&result, "fetched"),
            vec![Some("2024-01-01".to_string())]
        );
    }
}
