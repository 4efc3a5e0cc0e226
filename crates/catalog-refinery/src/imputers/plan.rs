//! Imputation strategy selection.
//!
//! The plan is computed once per run from the column profiles and the
//! pre-imputation table, and is not changed afterwards.

use crate::config::PipelineConfig;
use crate::profiler::{TableProfile, pearson_correlation};
use crate::utils::{is_numeric_dtype, numeric_values};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

/// Missing fraction below which the KNN strategy is chosen.
pub const KNN_MAX_MISSING: f64 = 0.05;

/// Missing fraction below which the iterative strategy is chosen.
pub const ITERATIVE_MAX_MISSING: f64 = 0.30;

/// Strategy family chosen purely from the missing fraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StrategyTag {
    Knn,
    Iterative,
    Median,
    None,
}

/// Select the strategy family for a missing fraction.
///
/// Columns at or above `exclusion` are left alone.
pub fn select_strategy(missing_fraction: f64, exclusion: f64) -> StrategyTag {
    if missing_fraction <= 0.0 || missing_fraction >= exclusion {
        StrategyTag::None
    } else if missing_fraction < KNN_MAX_MISSING {
        StrategyTag::Knn
    } else if missing_fraction < ITERATIVE_MAX_MISSING {
        StrategyTag::Iterative
    } else {
        StrategyTag::Median
    }
}

/// Concrete strategy with its parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "strategy", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ImputationStrategy {
    Knn {
        neighbors: usize,
        /// Feature block, the target column first.
        features: Vec<String>,
    },
    Iterative {
        /// Jointly modeled columns.
        columns: Vec<String>,
        max_iter: usize,
        seed: u64,
    },
    Median,
    None,
}

impl ImputationStrategy {
    pub fn tag(&self) -> StrategyTag {
        match self {
            ImputationStrategy::Knn { .. } => StrategyTag::Knn,
            ImputationStrategy::Iterative { .. } => StrategyTag::Iterative,
            ImputationStrategy::Median => StrategyTag::Median,
            ImputationStrategy::None => StrategyTag::None,
        }
    }
}

/// Plan entry for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnImputation {
    pub column: String,
    pub missing_fraction: f64,
    #[serde(flatten)]
    pub strategy: ImputationStrategy,
    /// Left to the pruner because almost nothing is observed.
    pub excluded: bool,
    /// Strategy family chosen by missing fraction before any downgrade to median.
    pub selected: StrategyTag,
}

impl ColumnImputation {
    /// Whether the strategy was downgraded for lack of signal.
    pub fn downgraded(&self) -> bool {
        self.selected != self.strategy.tag()
    }
}

/// Per-column imputation decisions, in table order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImputationPlan {
    pub entries: Vec<ColumnImputation>,
}

impl ImputationPlan {
    /// Build the plan for the numeric imputation targets.
    pub fn build(
        df: &DataFrame,
        profile: &TableProfile,
        config: &PipelineConfig,
    ) -> Result<Self> {
        Self::build_excluding(df, profile, config, &[])
    }

    /// Build the plan, leaving `excluded` columns out of the default targets
    /// and the companion pool. Columns named in `imputation_targets` are
    /// still planned.
    pub fn build_excluding(
        df: &DataFrame,
        profile: &TableProfile,
        config: &PipelineConfig,
        excluded: &[String],
    ) -> Result<Self> {
        let requested = |name: &String| {
            config
                .imputation_targets
                .as_ref()
                .is_some_and(|wanted| wanted.contains(name))
        };
        let candidates: Vec<String> = df
            .get_columns()
            .iter()
            .filter(|c| is_numeric_dtype(c.dtype()))
            .map(|c| c.name().to_string())
            .filter(|name| !excluded.contains(name) || requested(name))
            .collect();

        let missing: HashMap<&str, f64> = candidates
            .iter()
            .filter_map(|name| {
                profile
                    .get(name)
                    .map(|p| (name.as_str(), p.missing_fraction))
            })
            .collect();

        let targets: Vec<String> = candidates
            .iter()
            .filter(|name| config.imputation_targets.is_none() || requested(*name))
            // Partition targets are left to the partition null policy
            .filter(|name| config.partition_key.is_none() || !config.partition_targets.contains(name))
            .cloned()
            .collect();

        // Columns observed well enough to take part in multi-column strategies
        let pool: Vec<String> = candidates
            .iter()
            .filter(|name| {
                missing.get(name.as_str()).copied().unwrap_or(1.0)
                    < config.exclusion_missing_fraction
            })
            .cloned()
            .collect();

        let mut values: HashMap<String, Vec<Option<f64>>> = HashMap::new();
        for name in &pool {
            values.insert(
                name.clone(),
                numeric_values(df.column(name)?.as_materialized_series())?,
            );
        }

        let mut entries = Vec::with_capacity(targets.len());
        for column in &targets {
            let missing_fraction = missing.get(column.as_str()).copied().unwrap_or(0.0);
            let selected = select_strategy(missing_fraction, config.exclusion_missing_fraction);
            let excluded = missing_fraction >= config.exclusion_missing_fraction;

            let strategy = match selected {
                StrategyTag::None => ImputationStrategy::None,
                StrategyTag::Median => ImputationStrategy::Median,
                StrategyTag::Knn => knn_strategy(column, &pool, &values, config)
                    .unwrap_or(ImputationStrategy::Median),
                StrategyTag::Iterative => {
                    if pool.len() >= 2 {
                        ImputationStrategy::Iterative {
                            columns: pool.clone(),
                            max_iter: config.iterative_max_iter,
                            seed: config.iterative_seed,
                        }
                    } else {
                        ImputationStrategy::Median
                    }
                }
            };

            let entry = ColumnImputation {
                column: column.clone(),
                missing_fraction,
                strategy,
                excluded,
                selected,
            };
            if entry.downgraded() {
                info!(
                    "'{}': not enough signal for {:?}, using median",
                    column, selected
                );
            } else {
                debug!(
                    "'{}': {:.2}% missing -> {:?}",
                    column,
                    missing_fraction * 100.0,
                    entry.strategy.tag()
                );
            }
            entries.push(entry);
        }

        Ok(Self { entries })
    }

    /// Look up the entry for a column.
    pub fn get(&self, column: &str) -> Option<&ColumnImputation> {
        self.entries.iter().find(|e| e.column == column)
    }

    /// Entries that will change the table.
    pub fn active(&self) -> impl Iterator<Item = &ColumnImputation> {
        self.entries
            .iter()
            .filter(|e| e.strategy != ImputationStrategy::None)
    }
}

/// Companion selection and neighbor count for one KNN column.
///
/// Returns `None` when the block lacks signal.
fn knn_strategy(
    column: &str,
    pool: &[String],
    values: &HashMap<String, Vec<Option<f64>>>,
    config: &PipelineConfig,
) -> Option<ImputationStrategy> {
    let target = values.get(column)?;

    // Companions without a defined, non-zero correlation carry no signal
    let mut ranked: Vec<(String, f64)> = pool
        .iter()
        .filter_map(|name| {
            if name == column {
                return Some((name.clone(), f64::INFINITY));
            }
            let score = values
                .get(name)
                .and_then(|other| pearson_correlation(target, other))
                .map(f64::abs)
                .filter(|r| r.is_finite() && *r > 0.0)?;
            Some((name.clone(), score))
        })
        .collect();
    // Stable: equal scores keep table order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

    let features: Vec<String> = ranked
        .into_iter()
        .take(config.knn_max_features)
        .map(|(name, _)| name)
        .collect();
    if features.len() < 2 {
        return None;
    }

    let height = target.len();
    let complete_rows = (0..height)
        .filter(|&row| {
            features
                .iter()
                .all(|f| values.get(f).is_some_and(|v| v[row].is_some()))
        })
        .count();
    let neighbors = config.knn_max_neighbors.min(complete_rows);
    if neighbors == 0 {
        return None;
    }

    Some(ImputationStrategy::Knn {
        neighbors,
        features,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::profiler::DataProfiler;

    // =========================================================================
    // select_strategy() tests
    // =========================================================================

    #[test]
    fn test_select_strategy_bands() {
        assert_eq!(select_strategy(0.0, 0.95), StrategyTag::None);
        assert_eq!(select_strategy(0.02, 0.95), StrategyTag::Knn);
        assert_eq!(select_strategy(0.05, 0.95), StrategyTag::Iterative);
        assert_eq!(select_strategy(0.29, 0.95), StrategyTag::Iterative);
        assert_eq!(select_strategy(0.30, 0.95), StrategyTag::Median);
        assert_eq!(select_strategy(0.40, 0.95), StrategyTag::Median);
        assert_eq!(select_strategy(0.95, 0.95), StrategyTag::None);
    }

    // =========================================================================
    // ImputationPlan::build() tests
    // =========================================================================

    fn plan_for(df: &DataFrame) -> ImputationPlan {
        let profile = DataProfiler::profile_table(df).unwrap();
        ImputationPlan::build(df, &profile, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_knn_picks_correlated_companions() {
        let n = 50;
        let base: Vec<f64> = (0..n).map(|i| i as f64).collect();
        let mut target: Vec<Option<f64>> = base.iter().map(|v| Some(v * 2.0)).collect();
        target[10] = None;
        let noise: Vec<f64> = (0..n).map(|i| ((i * 7) % 5) as f64).collect();

        let df = df![
            "target" => target,
            "base" => base,
            "noise" => noise,
        ]
        .unwrap();

        let plan = plan_for(&df);
        let entry = plan.get("target").unwrap();

        match &entry.strategy {
            ImputationStrategy::Knn {
                neighbors,
                features,
            } => {
                assert_eq!(*neighbors, 5);
                assert_eq!(features[0], "target");
                assert_eq!(features[1], "base");
            }
            other => panic!("expected KNN, got {:?}", other),
        }
        assert!(!entry.downgraded());
        assert_eq!(plan.get("base").unwrap().strategy, ImputationStrategy::None);
    }

    #[test]
    fn test_knn_without_companions_downgrades_to_median() {
        let mut values: Vec<Option<f64>> = (0..50).map(|i| Some(i as f64)).collect();
        values[3] = None;
        let df = df!["only" => values, "label" => vec!["x"; 50]].unwrap();

        let entry = plan_for(&df).get("only").cloned().unwrap();
        assert_eq!(entry.selected, StrategyTag::Knn);
        assert_eq!(entry.strategy, ImputationStrategy::Median);
        assert!(entry.downgraded());
    }

    #[test]
    fn test_iterative_block_and_exclusion() {
        let n = 20;
        let a: Vec<Option<f64>> = (0..n)
            .map(|i| if i % 5 == 0 { None } else { Some(i as f64) })
            .collect();
        let b: Vec<f64> = (0..n).map(|i| i as f64 * 3.0).collect();
        let mut dead: Vec<Option<f64>> = vec![None; n];
        dead[0] = Some(1.0);

        let df = df!["a" => a, "b" => b, "dead" => dead].unwrap();
        let plan = plan_for(&df);

        let a_entry = plan.get("a").unwrap();
        assert_eq!(
            a_entry.strategy,
            ImputationStrategy::Iterative {
                columns: vec!["a".to_string(), "b".to_string()],
                max_iter: 10,
                seed: 42,
            }
        );

        let dead_entry = plan.get("dead").unwrap();
        assert!(dead_entry.excluded);
        assert_eq!(dead_entry.strategy, ImputationStrategy::None);
        assert_eq!(plan.active().count(), 1);
    }

    #[test]
    fn test_imputation_targets_restrict_plan() {
        let df = df![
            "a" => [Some(1.0), None, Some(3.0)],
            "b" => [Some(1.0), None, Some(3.0)],
        ]
        .unwrap();
        let profile = DataProfiler::profile_table(&df).unwrap();
        let config = PipelineConfig::builder()
            .imputation_targets(["b"])
            .build()
            .unwrap();

        let plan = ImputationPlan::build(&df, &profile, &config).unwrap();
        assert!(plan.get("a").is_none());
        assert_eq!(plan.get("b").unwrap().strategy, ImputationStrategy::Median);
    }

    #[test]
    fn test_partition_targets_are_left_to_partition_policy() {
        let df = df![
            "category" => ["x", "x", "y"],
            "discount" => [Some(1.0), None, Some(3.0)],
            "rating" => [Some(1.0), None, Some(3.0)],
        ]
        .unwrap();
        let profile = DataProfiler::profile_table(&df).unwrap();
        let config = PipelineConfig::builder()
            .partition("category", ["discount"])
            .build()
            .unwrap();

        let plan = ImputationPlan::build(&df, &profile, &config).unwrap();
        assert!(plan.get("discount").is_none());
        assert!(plan.get("rating").is_some());
    }

    #[test]
    fn test_uncorrelated_companion_does_not_count_toward_knn_block() {
        let mut target: Vec<Option<f64>> = (0..50).map(|i| Some((i * i) as f64)).collect();
        target[49] = None;
        let df = df![
            "target" => target,
            "constant" => vec![1.0; 50],
        ]
        .unwrap();

        let entry = plan_for(&df).get("target").cloned().unwrap();
        assert_eq!(entry.selected, StrategyTag::Knn);
        assert_eq!(entry.strategy, ImputationStrategy::Median);
        assert!(entry.downgraded());
    }

    #[test]
    fn test_companions_come_from_outside_the_requested_targets() {
        let n = 50;
        let base: Vec<Option<f64>> = (0..n)
            .map(|i| if i == 20 { None } else { Some(i as f64) })
            .collect();
        let mut target: Vec<Option<f64>> = (0..n).map(|i| Some(i as f64 * 3.0)).collect();
        target[10] = None;
        let df = df!["target" => target, "base" => base].unwrap();
        let profile = DataProfiler::profile_table(&df).unwrap();
        let config = PipelineConfig::builder()
            .imputation_targets(["target"])
            .build()
            .unwrap();

        let plan = ImputationPlan::build(&df, &profile, &config).unwrap();

        assert!(plan.get("base").is_none());
        match &plan.get("target").unwrap().strategy {
            ImputationStrategy::Knn { features, .. } => {
                assert_eq!(features, &vec!["target".to_string(), "base".to_string()]);
            }
            other => panic!("expected KNN, got {:?}", other),
        }
    }

    #[test]
    fn test_excluded_columns_are_not_planned_by_default() {
        let df = df![
            "price" => [Some(1.0), None, Some(3.0)],
            "crawled_year" => [Some(2020), None, Some(2021)],
        ]
        .unwrap();
        let profile = DataProfiler::profile_table(&df).unwrap();
        let excluded = vec!["crawled_year".to_string()];

        let plan = ImputationPlan::build_excluding(
            &df,
            &profile,
            &PipelineConfig::default(),
            &excluded,
        )
        .unwrap();
        assert!(plan.get("crawled_year").is_none());
        assert_eq!(plan.get("price").unwrap().strategy, ImputationStrategy::Median);

        let config = PipelineConfig::builder()
            .imputation_targets(["crawled_year"])
            .build()
            .unwrap();
        let plan = ImputationPlan::build_excluding(&df, &profile, &config, &excluded).unwrap();
        assert!(plan.get("crawled_year").is_some());
    }
}
