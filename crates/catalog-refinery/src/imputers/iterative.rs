//! Iterative (chained-equation) imputation.
//!
//! Every column in the block is modeled as a ridge-regularized linear
//! function of the others. Missing cells start at the column mean and are
//! re-estimated column by column until the estimates settle or the
//! iteration cap is reached.

use crate::utils::numeric_values;
use anyhow::Result;
use linfa::prelude::{Dataset, Fit, Predict};
use linfa_elasticnet::ElasticNet;
use ndarray::{Array1, Array2, Axis};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use tracing::debug;

/// Ridge penalty on standardized predictors.
const RIDGE_PENALTY: f64 = 1e-3;

/// Stop when the largest change drops below this share of the largest
/// observed magnitude.
const TOLERANCE: f64 = 1e-3;

/// Chained-equation imputer with a fixed seed.
pub struct IterativeImputer {
    max_iter: usize,
    seed: u64,
}

impl IterativeImputer {
    pub fn new(max_iter: usize, seed: u64) -> Self {
        Self {
            max_iter: max_iter.max(1),
            seed,
        }
    }

    /// Impute every missing cell of the column block.
    pub fn impute_block(
        &self,
        df: &DataFrame,
        columns: &[String],
    ) -> Result<Vec<(String, Vec<Option<f64>>)>> {
        let mut observed: Vec<Vec<Option<f64>>> = Vec::with_capacity(columns.len());
        for name in columns {
            observed.push(numeric_values(df.column(name)?.as_materialized_series())?);
        }

        let imputed = self.impute_matrix(&observed);
        Ok(columns
            .iter()
            .cloned()
            .zip(imputed.into_iter().map(|col| col.into_iter().map(Some).collect()))
            .collect())
    }

    /// Column-major imputation. Columns with no observed value are filled with 0.
    fn impute_matrix(&self, observed: &[Vec<Option<f64>>]) -> Vec<Vec<f64>> {
        let n_cols = observed.len();
        let n_rows = observed.first().map_or(0, Vec::len);

        // Mean initialization
        let mut current: Vec<Vec<f64>> = observed
            .iter()
            .map(|col| {
                let present: Vec<f64> = col.iter().flatten().copied().collect();
                let mean = if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                };
                col.iter().map(|v| v.unwrap_or(mean)).collect()
            })
            .collect();

        let missing_counts: Vec<usize> = observed
            .iter()
            .map(|col| col.iter().filter(|v| v.is_none()).count())
            .collect();

        // Ascending missing count; ties in seeded random order
        let mut order: Vec<usize> = (0..n_cols)
            .filter(|&j| missing_counts[j] > 0 && missing_counts[j] < n_rows)
            .collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        order.shuffle(&mut rng);
        order.sort_by_key(|&j| missing_counts[j]);

        if order.is_empty() || n_cols < 2 {
            return current;
        }

        let max_abs_observed = observed
            .iter()
            .flatten()
            .flatten()
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        let tolerance = TOLERANCE * max_abs_observed;

        for iteration in 0..self.max_iter {
            let mut max_change = 0.0f64;

            for &target in &order {
                let predictors: Vec<usize> = (0..n_cols).filter(|&j| j != target).collect();
                let train_rows: Vec<usize> = (0..n_rows)
                    .filter(|&r| observed[target][r].is_some())
                    .collect();

                let missing_rows: Vec<usize> = (0..n_rows)
                    .filter(|&r| observed[target][r].is_none())
                    .collect();

                let estimates = match predict_missing(
                    &current,
                    &predictors,
                    target,
                    &train_rows,
                    &missing_rows,
                ) {
                    Ok(estimates) => estimates,
                    Err(e) => {
                        debug!("Skipping column {} this pass: {}", target, e);
                        continue;
                    }
                };

                for (&row, estimate) in missing_rows.iter().zip(estimates) {
                    max_change = max_change.max((estimate - current[target][row]).abs());
                    current[target][row] = estimate;
                }
            }

            debug!(
                "Iterative imputation pass {}: max change {:.6}",
                iteration + 1,
                max_change
            );
            if max_change < tolerance {
                break;
            }
        }

        current
    }
}

/// Fit a ridge model of `target` on `predictors` over `train_rows` and
/// predict `missing_rows`.
fn predict_missing(
    current: &[Vec<f64>],
    predictors: &[usize],
    target: usize,
    train_rows: &[usize],
    missing_rows: &[usize],
) -> Result<Array1<f64>> {
    let records = |rows: &[usize]| {
        Array2::from_shape_fn((rows.len(), predictors.len()), |(i, k)| {
            current[predictors[k]][rows[i]]
        })
    };

    let x_train = records(train_rows);
    let mean = x_train
        .mean_axis(Axis(0))
        .ok_or_else(|| anyhow::anyhow!("no training rows"))?;
    let std = x_train
        .std_axis(Axis(0), 0.0)
        .mapv(|s| if s > 0.0 { s } else { 1.0 });

    let y_train: Array1<f64> = train_rows.iter().map(|&r| current[target][r]).collect();
    let dataset = Dataset::new((x_train - &mean) / &std, y_train);

    let model = ElasticNet::<f64>::params()
        .penalty(RIDGE_PENALTY)
        .l1_ratio(0.0)
        .fit(&dataset)
        .map_err(|e| anyhow::anyhow!("ridge fit failed: {}", e))?;

    let x_missing = (records(missing_rows) - &mean) / &std;
    Ok(model.predict(&x_missing))
}
