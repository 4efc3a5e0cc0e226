//! Category-conditioned null policy.
//!
//! Rows are grouped by a partition key. Within each partition, rows with a
//! null in any target column are dropped when they are rare (at or below the
//! threshold) or when they make up the whole partition. Nulls that survive
//! are filled with the partition's own mean, computed after the drop.

use crate::utils::{any_value_to_string, mean_of, numeric_values};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// What the policy decided for one partition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartitionDecision {
    /// Partition key value; `None` groups the rows whose key is missing.
    pub partition: Option<String>,
    /// Rows in the partition before dropping.
    pub total_rows: usize,
    /// Rows with a null in at least one target column.
    pub null_rows: usize,
    /// `null_rows / total_rows`, evaluated before dropping.
    pub null_fraction: f64,
    /// Whether the null rows were dropped.
    pub drop_null_rows: bool,
    /// Partition mean used for each target column among retained rows.
    pub fill_values: BTreeMap<String, Option<f64>>,
}

/// Outcome of applying the policy.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PartitionReport {
    pub key: String,
    pub targets: Vec<String>,
    pub threshold: f64,
    pub rows_dropped: usize,
    pub cells_filled: usize,
    pub decisions: Vec<PartitionDecision>,
}

/// Drops or mean-fills target nulls per partition.
pub struct PartitionNullPolicy;

impl PartitionNullPolicy {
    /// Apply the policy. Returns `None` when the key or a target is absent.
    pub fn apply(
        df: &DataFrame,
        key: &str,
        targets: &[String],
        threshold: f64,
        processing_steps: &mut Vec<String>,
    ) -> Result<Option<(DataFrame, PartitionReport)>> {
        if df.column(key).is_err() {
            warn!("Partition key '{}' not present, policy skipped", key);
            return Ok(None);
        }
        if let Some(missing) = targets.iter().find(|t| df.column(t.as_str()).is_err()) {
            warn!("Partition target '{}' not present, policy skipped", missing);
            return Ok(None);
        }

        let height = df.height();
        let key_series = df.column(key)?.as_materialized_series().clone();
        let mut partition_keys: Vec<Option<String>> = Vec::with_capacity(height);
        for row in 0..height {
            let value = key_series.get(row)?;
            partition_keys.push(if value.is_null() {
                None
            } else {
                Some(any_value_to_string(&value))
            });
        }

        let mut target_values: Vec<Vec<Option<f64>>> = Vec::with_capacity(targets.len());
        for target in targets {
            target_values.push(numeric_values(df.column(target)?.as_materialized_series())?);
        }
        let row_has_null: Vec<bool> = (0..height)
            .map(|row| target_values.iter().any(|values| values[row].is_none()))
            .collect();

        // Partitions in order of first appearance
        let mut order: Vec<Option<String>> = Vec::new();
        let mut members: HashMap<Option<String>, Vec<usize>> = HashMap::new();
        for (row, partition) in partition_keys.iter().enumerate() {
            members
                .entry(partition.clone())
                .or_insert_with(|| {
                    order.push(partition.clone());
                    Vec::new()
                })
                .push(row);
        }

        let mut keep = vec![true; height];
        let mut decisions = Vec::with_capacity(order.len());
        let mut cells_filled = 0usize;

        for partition in order {
            let rows = &members[&partition];
            let total_rows = rows.len();
            let null_rows = rows.iter().filter(|&&row| row_has_null[row]).count();
            let null_fraction = null_rows as f64 / total_rows as f64;
            let drop_null_rows =
                null_rows > 0 && (null_fraction <= threshold || null_rows == total_rows);

            if drop_null_rows {
                for &row in rows {
                    if row_has_null[row] {
                        keep[row] = false;
                    }
                }
            }

            let retained: Vec<usize> = rows.iter().copied().filter(|&row| keep[row]).collect();
            let mut fill_values = BTreeMap::new();
            for (target, values) in targets.iter().zip(target_values.iter_mut()) {
                let observed: Vec<Option<f64>> = retained.iter().map(|&row| values[row]).collect();
                let mean = mean_of(&observed);
                fill_values.insert(target.clone(), mean);

                let gaps: Vec<usize> = retained
                    .iter()
                    .copied()
                    .filter(|&row| values[row].is_none())
                    .collect();
                match mean {
                    Some(mean) => {
                        for row in gaps {
                            values[row] = Some(mean);
                            cells_filled += 1;
                        }
                    }
                    None if !gaps.is_empty() => {
                        warn!(
                            "No observed '{}' in partition {:?}; {} nulls left",
                            target,
                            partition,
                            gaps.len()
                        );
                    }
                    None => {}
                }
            }

            debug!(
                "Partition {:?}: {}/{} null rows ({:.1}%), drop = {}",
                partition,
                null_rows,
                total_rows,
                null_fraction * 100.0,
                drop_null_rows
            );
            decisions.push(PartitionDecision {
                partition,
                total_rows,
                null_rows,
                null_fraction,
                drop_null_rows,
                fill_values,
            });
        }

        let mut result = df.clone();
        for (target, values) in targets.iter().zip(target_values) {
            result.replace(target, Series::new(target.as_str().into(), values))?;
        }
        let result = result.filter(&BooleanChunked::from_slice("mask".into(), &keep))?;
        let rows_dropped = height - result.height();

        info!(
            "Partition policy on '{}': dropped {} rows, filled {} cells",
            key, rows_dropped, cells_filled
        );
        processing_steps.push(format!(
            "Partition policy on '{}': dropped {} rows with null targets, mean-filled {} cells",
            key, rows_dropped, cells_filled
        ));

        Ok(Some((
            result,
            PartitionReport {
                key: key.to_string(),
                targets: targets.to_vec(),
                threshold,
                rows_dropped,
                cells_filled,
                decisions,
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn targets() -> Vec<String> {
        vec!["price".to_string()]
    }

    fn prices(df: &DataFrame) -> Vec<Option<f64>> {
        numeric_values(df.column("price").unwrap().as_materialized_series()).unwrap()
    }

    #[test]
    fn test_sparse_partition_is_filled_and_full_null_partition_dropped() {
        let mut category: Vec<&str> = vec!["A"; 10];
        category.extend(vec!["B"; 5]);
        let mut price: Vec<Option<f64>> = (1..=9).map(|v| Some(v as f64)).collect();
        price.push(None);
        price.extend(vec![None; 5]);

        let df = df!["category" => category, "price" => price].unwrap();
        let mut steps = Vec::new();

        let (result, report) =
            PartitionNullPolicy::apply(&df, "category", &targets(), 0.05, &mut steps)
                .unwrap()
                .unwrap();

        assert_eq!(result.height(), 10);
        let values = prices(&result);
        assert!(values.iter().all(|v| v.is_some()));
        // A's own mean over its 9 observed values
        assert_eq!(values[9], Some(5.0));

        assert_eq!(report.rows_dropped, 5);
        assert_eq!(report.cells_filled, 1);
        let a = &report.decisions[0];
        assert_eq!(a.partition.as_deref(), Some("A"));
        assert!(!a.drop_null_rows);
        let b = &report.decisions[1];
        assert!(b.drop_null_rows);
        assert_eq!(b.null_fraction, 1.0);
    }

    #[test]
    fn test_rare_nulls_at_threshold_are_dropped() {
        let category = vec!["A"; 20];
        let mut price: Vec<Option<f64>> = (0..19).map(|v| Some(v as f64)).collect();
        price.push(None);

        let df = df!["category" => category, "price" => price].unwrap();
        let mut steps = Vec::new();

        let (result, report) =
            PartitionNullPolicy::apply(&df, "category", &targets(), 0.05, &mut steps)
                .unwrap()
                .unwrap();

        // 1 / 20 == 0.05 sits at the threshold
        assert_eq!(result.height(), 19);
        assert_eq!(report.cells_filled, 0);
    }

    #[test]
    fn test_null_keys_form_their_own_partition() {
        let df = df![
            "category" => [Some("A"), Some("A"), None, None, None],
            "price" => [Some(1.0), Some(3.0), Some(10.0), Some(20.0), None],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, report) =
            PartitionNullPolicy::apply(&df, "category", &targets(), 0.05, &mut steps)
                .unwrap()
                .unwrap();

        assert_eq!(report.decisions.len(), 2);
        assert_eq!(report.decisions[1].partition, None);
        assert_eq!(prices(&result)[4], Some(15.0));
    }

    #[test]
    fn test_missing_key_skips_policy() {
        let df = df!["price" => [1.0, 2.0]].unwrap();
        let mut steps = Vec::new();

        let outcome =
            PartitionNullPolicy::apply(&df, "category", &targets(), 0.05, &mut steps).unwrap();
        assert!(outcome.is_none());
        assert!(steps.is_empty());
    }
}
