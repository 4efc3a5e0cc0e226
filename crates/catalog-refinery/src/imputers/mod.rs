//! Imputation module for handling missing numeric values.
//!
//! This module provides:
//! - Strategy selection from measured missing fractions ([`ImputationPlan`])
//! - KNN imputation over correlated companion columns
//! - Iterative (chained-equation) imputation over the numeric block
//! - Median imputation
//!
//! Every strategy reads the table as it was before imputation started, so
//! the result does not depend on the order in which columns are visited
//! except where two multi-column strategies write the same cell; there the
//! later column in table order wins. Multi-column strategies read companions
//! from every usable numeric column but only write planned columns.

mod iterative;
mod knn;
pub mod plan;
mod statistical;

pub use iterative::IterativeImputer;
pub use knn::KNNImputer;
pub use plan::{ColumnImputation, ImputationPlan, ImputationStrategy, StrategyTag, select_strategy};
pub use statistical::StatisticalImputer;

use crate::utils::numeric_values;
use anyhow::Result;
use polars::prelude::*;
use std::collections::{HashMap, HashSet};
use tracing::{debug, info};

/// Imputed values for a set of columns.
pub type ImputedColumns = Vec<(String, Vec<Option<f64>>)>;

/// A concrete imputation strategy ready to run.
pub enum Imputer {
    Knn {
        imputer: KNNImputer,
        features: Vec<String>,
    },
    Iterative {
        imputer: IterativeImputer,
        columns: Vec<String>,
    },
    Median,
}

impl Imputer {
    /// Instantiate the imputer for a planned strategy. `None` means no-op.
    pub fn from_strategy(strategy: &ImputationStrategy) -> Option<Self> {
        match strategy {
            ImputationStrategy::Knn {
                neighbors,
                features,
            } => Some(Imputer::Knn {
                imputer: KNNImputer::new(*neighbors),
                features: features.clone(),
            }),
            ImputationStrategy::Iterative {
                columns,
                max_iter,
                seed,
            } => Some(Imputer::Iterative {
                imputer: IterativeImputer::new(*max_iter, *seed),
                columns: columns.clone(),
            }),
            ImputationStrategy::Median => Some(Imputer::Median),
            ImputationStrategy::None => None,
        }
    }

    /// Compute imputed values for `column` and, for the multi-column
    /// strategies, for every other column of its block.
    pub fn apply(&self, snapshot: &DataFrame, column: &str) -> Result<ImputedColumns> {
        match self {
            Imputer::Knn { imputer, features } => imputer.impute_block(snapshot, features),
            Imputer::Iterative { imputer, columns } => imputer.impute_block(snapshot, columns),
            Imputer::Median => {
                let series = snapshot.column(column)?.as_materialized_series();
                let filled = StatisticalImputer::median_filled(series)?;
                Ok(vec![(column.to_string(), numeric_values(&filled)?)])
            }
        }
    }
}

/// Applies an imputation plan to a table.
pub struct ImputationEngine;

impl ImputationEngine {
    /// Apply every active plan entry, returning the number of cells filled.
    pub fn apply_plan(
        df: &mut DataFrame,
        plan: &ImputationPlan,
        processing_steps: &mut Vec<String>,
    ) -> Result<usize> {
        let snapshot = df.clone();
        let missing_before = count_missing(df)?;
        // The iterative block is fitted once and shared by its columns
        let mut block_cache: HashMap<Vec<String>, ImputedColumns> = HashMap::new();
        // Companions outside the plan are read, never written
        let writable: HashSet<&str> = plan.entries.iter().map(|e| e.column.as_str()).collect();

        for entry in plan.active() {
            let Some(imputer) = Imputer::from_strategy(&entry.strategy) else {
                continue;
            };

            let updates = match &imputer {
                Imputer::Iterative { columns, .. } => {
                    if let Some(cached) = block_cache.get(columns) {
                        cached.clone()
                    } else {
                        let computed = imputer.apply(&snapshot, &entry.column)?;
                        block_cache.insert(columns.clone(), computed.clone());
                        computed
                    }
                }
                _ => imputer.apply(&snapshot, &entry.column)?,
            };

            for (name, values) in updates {
                if !writable.contains(name.as_str()) {
                    continue;
                }
                df.replace(&name, Series::new(name.as_str().into(), values))?;
            }

            debug!(
                "'{}' imputed with {:?}",
                entry.column,
                entry.strategy.tag()
            );
            processing_steps.push(format!(
                "Imputed '{}' ({:.2}% missing) with {:?}{}",
                entry.column,
                entry.missing_fraction * 100.0,
                entry.strategy.tag(),
                if entry.downgraded() {
                    " (insufficient signal)"
                } else {
                    ""
                }
            ));
        }

        let missing_after = count_missing(df)?;
        let filled = missing_before.saturating_sub(missing_after);
        info!("Imputation filled {} cells", filled);
        Ok(filled)
    }
}

fn count_missing(df: &DataFrame) -> Result<usize> {
    let mut total = 0;
    for column in df.get_columns() {
        if crate::utils::is_numeric_dtype(column.dtype()) {
            total += numeric_values(column.as_materialized_series())?
                .iter()
                .filter(|v| v.is_none())
                .count();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::profiler::DataProfiler;

    fn run(df: &mut DataFrame) -> (ImputationPlan, usize) {
        let profile = DataProfiler::profile_table(df).unwrap();
        let plan = ImputationPlan::build(df, &profile, &PipelineConfig::default()).unwrap();
        let mut steps = Vec::new();
        let filled = ImputationEngine::apply_plan(df, &plan, &mut steps).unwrap();
        (plan, filled)
    }

    #[test]
    fn test_median_strategy_leaves_no_missing() {
        let values: Vec<Option<f64>> = (0..10)
            .map(|i| if i < 4 { None } else { Some(i as f64) })
            .collect();
        let mut df = df!["price" => values].unwrap();

        let (plan, filled) = run(&mut df);

        assert_eq!(plan.get("price").unwrap().strategy, ImputationStrategy::Median);
        assert_eq!(filled, 4);
        assert_eq!(df.column("price").unwrap().null_count(), 0);
        // median of 4..=9
        let value = df.column("price").unwrap().get(0).unwrap();
        assert_eq!(value.try_extract::<f64>().unwrap(), 6.5);
    }

    #[test]
    fn test_iterative_block_fills_every_member() {
        let a: Vec<Option<f64>> = (0..20)
            .map(|i| if i % 10 == 0 { None } else { Some(i as f64) })
            .collect();
        let b: Vec<Option<f64>> = (0..20)
            .map(|i| if i % 10 == 5 { None } else { Some(i as f64 * 2.0) })
            .collect();
        let mut df = df!["a" => a, "b" => b].unwrap();

        let (plan, filled) = run(&mut df);

        assert_eq!(plan.get("a").unwrap().strategy.tag(), StrategyTag::Iterative);
        assert_eq!(filled, 4);
        assert_eq!(df.column("a").unwrap().null_count(), 0);
        assert_eq!(df.column("b").unwrap().null_count(), 0);
    }

    #[test]
    fn test_imputer_from_none_strategy() {
        assert!(Imputer::from_strategy(&ImputationStrategy::None).is_none());
        assert!(matches!(
            Imputer::from_strategy(&ImputationStrategy::Median),
            Some(Imputer::Median)
        ));
    }

    #[test]
    fn test_companions_outside_the_plan_are_not_written() {
        let n = 50;
        let base: Vec<Option<f64>> = (0..n)
            .map(|i| if i == 20 { None } else { Some(i as f64) })
            .collect();
        let mut target: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64 * 3.0)).collect();
        target[10] = None;
        let mut df = df!["target" => target, "base" => base].unwrap();
        let profile = DataProfiler::profile_table(&df).unwrap();
        let config = PipelineConfig::builder()
            .imputation_targets(["target"])
            .build()
            .unwrap();
        let plan = ImputationPlan::build(&df, &profile, &config).unwrap();

        let mut steps = Vec::new();
        ImputationEngine::apply_plan(&mut df, &plan, &mut steps).unwrap();

        assert_eq!(df.column("target").unwrap().null_count(), 0);
        assert_eq!(df.column("base").unwrap().null_count(), 1);
    }
}
