//! Low-information column pruning and output name normalization.

use anyhow::Result;
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use tracing::{debug, info};

/// Columns with a larger null fraction than this are dropped.
pub const MAX_NULL_FRACTION: f64 = 0.95;

/// Identifier columns with more distinct values than this share of rows are dropped.
pub const MAX_IDENTIFIER_UNIQUENESS: f64 = 0.95;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s").unwrap());
static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]").unwrap());

/// Why a column was removed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum PruneReason {
    MostlyMissing { null_fraction: f64 },
    Constant,
    NearlyUniqueIdentifier { distinct_fraction: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PrunedColumn {
    pub column: String,
    #[serde(flatten)]
    pub reason: PruneReason,
}

/// Drops columns that carry little information.
pub struct ColumnPruner;

impl ColumnPruner {
    /// Decide which columns to drop without touching the table.
    pub fn plan(df: &DataFrame, identifier_columns: &[String]) -> Result<Vec<PrunedColumn>> {
        let height = df.height();
        if height == 0 {
            return Ok(Vec::new());
        }

        let mut pruned = Vec::new();
        for column in df.get_columns() {
            let series = column.as_materialized_series();
            let name = series.name().to_string();
            let null_fraction = series.null_count() as f64 / height as f64;
            let distinct = series.drop_nulls().n_unique()?;

            let reason = if null_fraction > MAX_NULL_FRACTION {
                Some(PruneReason::MostlyMissing { null_fraction })
            } else if distinct == 1 {
                Some(PruneReason::Constant)
            } else if identifier_columns.contains(&name)
                && distinct as f64 / height as f64 > MAX_IDENTIFIER_UNIQUENESS
            {
                Some(PruneReason::NearlyUniqueIdentifier {
                    distinct_fraction: distinct as f64 / height as f64,
                })
            } else {
                None
            };

            if let Some(reason) = reason {
                debug!("Pruning '{}': {:?}", name, reason);
                pruned.push(PrunedColumn {
                    column: name,
                    reason,
                });
            }
        }

        Ok(pruned)
    }

    /// Drop low-information columns.
    pub fn prune(
        df: &DataFrame,
        identifier_columns: &[String],
        processing_steps: &mut Vec<String>,
    ) -> Result<(DataFrame, Vec<PrunedColumn>)> {
        let pruned = Self::plan(df, identifier_columns)?;
        if pruned.is_empty() {
            return Ok((df.clone(), pruned));
        }

        let names: Vec<PlSmallStr> = pruned.iter().map(|p| p.column.as_str().into()).collect();
        let result = df.drop_many(names);

        info!("Pruned {} low-information columns", pruned.len());
        processing_steps.push(format!(
            "Dropped {} low-information columns: {}",
            pruned.len(),
            pruned
                .iter()
                .map(|p| p.column.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ));
        Ok((result, pruned))
    }

    /// Rename columns to trimmed, lower-case, underscore-separated word characters.
    ///
    /// Names that collide after normalization get a numeric suffix.
    pub fn normalize_column_names(df: &mut DataFrame) -> Result<Vec<(String, String)>> {
        let originals: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();

        let mut seen: HashSet<String> = HashSet::new();
        let mut renames = Vec::new();
        let mut columns = Vec::with_capacity(originals.len());

        for (original, column) in originals.iter().zip(df.get_columns()) {
            let base = normalize_name(original);
            let base = if base.is_empty() {
                "column".to_string()
            } else {
                base
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while seen.contains(&name) {
                name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            seen.insert(name.clone());

            if &name != original {
                renames.push((original.clone(), name.clone()));
            }
            let series = column.as_materialized_series().clone().with_name(name.into());
            columns.push(Column::from(series));
        }

        *df = DataFrame::new(columns)?;
        Ok(renames)
    }
}

/// Normalize one column name.
pub fn normalize_name(name: &str) -> String {
    let lowered = name.trim().to_lowercase();
    let underscored = WHITESPACE.replace_all(&lowered, "_");
    NON_WORD.replace_all(&underscored, "").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // plan() / prune() tests
    // =========================================================================

    #[test]
    fn test_prune_rules() {
        let sparse: Vec<Option<f64>> = vec![None; 20];
        let ids: Vec<String> = (0..20).map(|i| format!("id-{}", i)).collect();
        let values: Vec<f64> = (0..20).map(|i| (i % 3) as f64).collect();

        let df = df![
            "sparse" => sparse,
            "constant" => vec!["same"; 20],
            "Uniq Id" => ids.clone(),
            "label" => ids,
            "value" => values,
        ]
        .unwrap();
        let mut steps = Vec::new();

        let (result, pruned) =
            ColumnPruner::prune(&df, &["Uniq Id".to_string()], &mut steps).unwrap();

        let dropped: Vec<&str> = pruned.iter().map(|p| p.column.as_str()).collect();
        assert_eq!(dropped, vec!["sparse", "constant", "Uniq Id"]);
        assert_eq!(result.width(), 2);
        assert!(matches!(pruned[0].reason, PruneReason::MostlyMissing { .. }));
        assert!(matches!(pruned[1].reason, PruneReason::Constant));
        assert_eq!(steps.len(), 1);
    }

    #[test]
    fn test_prune_keeps_informative_columns() {
        let df = df!["a" => [1.0, 2.0, 3.0], "b" => ["x", "y", "x"]].unwrap();
        let mut steps = Vec::new();

        let (result, pruned) = ColumnPruner::prune(&df, &[], &mut steps).unwrap();
        assert!(pruned.is_empty());
        assert_eq!(result.width(), 2);
        assert!(steps.is_empty());
    }

    // =========================================================================
    // normalize_column_names() tests
    // =========================================================================

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Monthly Price "), "monthly_price");
        assert_eq!(normalize_name("Price ($)"), "price_");
        assert_eq!(normalize_name("Num Of Reviews"), "num_of_reviews");
        assert_eq!(normalize_name("Crawl Timestamp_year"), "crawl_timestamp_year");
    }

    #[test]
    fn test_normalize_column_names_disambiguates() {
        let mut df = df!["Price" => [1.0], "price" => [2.0], "Pageurl" => ["x"]].unwrap();

        let renames = ColumnPruner::normalize_column_names(&mut df).unwrap();

        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|n| n.to_string())
            .collect();
        assert_eq!(names, vec!["price", "price_1", "pageurl"]);
        assert_eq!(renames.len(), 3);
    }
}
