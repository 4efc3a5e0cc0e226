//! Distribution statistics shared by the profiler, imputers and bounder.

use crate::utils::{sorted_observed, sorted_quantile};
use serde::Serialize;

/// Multiplier applied to the IQR to place the outlier fences.
pub const IQR_FENCE_MULTIPLIER: f64 = 1.5;

/// Interquartile summary of a numeric column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quartiles {
    pub q1: f64,
    pub q3: f64,
    pub iqr: f64,
    pub lower_fence: f64,
    pub upper_fence: f64,
}

impl Quartiles {
    /// Whether a value lies strictly outside the fences.
    #[inline]
    pub fn is_outlier(&self, value: f64) -> bool {
        value < self.lower_fence || value > self.upper_fence
    }
}

/// Quartiles by linear interpolation over observed values.
pub(crate) fn compute_quartiles(values: &[Option<f64>]) -> Option<Quartiles> {
    let sorted = sorted_observed(values);
    let q1 = sorted_quantile(&sorted, 0.25)?;
    let q3 = sorted_quantile(&sorted, 0.75)?;
    let iqr = q3 - q1;
    Some(Quartiles {
        q1,
        q3,
        iqr,
        lower_fence: q1 - IQR_FENCE_MULTIPLIER * iqr,
        upper_fence: q3 + IQR_FENCE_MULTIPLIER * iqr,
    })
}

/// Count of observed values outside the fences.
pub(crate) fn count_outliers(values: &[Option<f64>], quartiles: &Quartiles) -> usize {
    values
        .iter()
        .flatten()
        .filter(|&&v| quartiles.is_outlier(v))
        .count()
}

/// Pearson correlation over rows where both values are observed.
///
/// Returns `None` with fewer than two complete pairs or zero variance.
pub(crate) fn pearson_correlation(a: &[Option<f64>], b: &[Option<f64>]) -> Option<f64> {
    let pairs: Vec<(f64, f64)> = a
        .iter()
        .zip(b)
        .filter_map(|(x, y)| Some(((*x)?, (*y)?)))
        .collect();
    if pairs.len() < 2 {
        return None;
    }

    let n = pairs.len() as f64;
    let mean_a = pairs.iter().map(|(x, _)| x).sum::<f64>() / n;
    let mean_b = pairs.iter().map(|(_, y)| y).sum::<f64>() / n;

    let mut cov = 0.0;
    let mut var_a = 0.0;
    let mut var_b = 0.0;
    for (x, y) in &pairs {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    if var_a == 0.0 || var_b == 0.0 {
        return None;
    }
    let r = cov / (var_a.sqrt() * var_b.sqrt());
    r.is_finite().then_some(r)
}
