//! Outlier handling module.
//!
//! Chooses a treatment per numeric column from the share of rows lying
//! outside the IQR fences:
//! - none outside: nothing to do
//! - under 5%: winsorize to the 1st/99th percentile band
//! - under 15%: clip to the fences
//! - otherwise: leave the spread alone
//!
//! Columns are handled one at a time, each from its own current values.
//! Running the bounder twice changes nothing the second time.

use crate::profiler::{Quartiles, compute_quartiles, count_outliers};
use crate::utils::{is_numeric_dtype, numeric_values, sorted_observed};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Outlier fraction below which the column is winsorized.
pub const WINSORIZE_MAX_FRACTION: f64 = 0.05;

/// Outlier fraction below which the column is clipped to its fences.
pub const IQR_CAP_MAX_FRACTION: f64 = 0.15;

const WINSORIZE_LOWER_PERCENTILE: f64 = 0.01;
const WINSORIZE_UPPER_PERCENTILE: f64 = 0.99;

/// Treatment chosen for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "treatment", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutlierTreatment {
    /// No value outside the fences.
    None,
    Winsorize { lower: f64, upper: f64 },
    IqrCap { lower: f64, upper: f64 },
    /// Too many values outside the fences to call them errors.
    Unbounded,
}

impl OutlierTreatment {
    /// Clip range, if the treatment clips.
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match *self {
            OutlierTreatment::Winsorize { lower, upper }
            | OutlierTreatment::IqrCap { lower, upper } => Some((lower, upper)),
            OutlierTreatment::None | OutlierTreatment::Unbounded => None,
        }
    }
}

/// Outlier plan entry for one column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnOutlierPlan {
    pub column: String,
    pub outlier_fraction: f64,
    pub quartiles: Option<Quartiles>,
    #[serde(flatten)]
    pub treatment: OutlierTreatment,
    /// Cells whose value was changed.
    pub cells_changed: usize,
}

/// Clips numeric columns by measured outlier density.
pub struct OutlierBounder;

impl OutlierBounder {
    /// Choose a treatment for one column's values.
    pub fn plan_column(values: &[Option<f64>]) -> (Option<Quartiles>, f64, OutlierTreatment) {
        let Some(quartiles) = compute_quartiles(values) else {
            return (None, 0.0, OutlierTreatment::None);
        };
        let outliers = count_outliers(values, &quartiles);
        let fraction = if values.is_empty() {
            0.0
        } else {
            outliers as f64 / values.len() as f64
        };

        let treatment = if outliers == 0 {
            OutlierTreatment::None
        } else if fraction < WINSORIZE_MAX_FRACTION {
            let (lower, upper) = winsorize_bounds(values);
            OutlierTreatment::Winsorize { lower, upper }
        } else if fraction < IQR_CAP_MAX_FRACTION {
            OutlierTreatment::IqrCap {
                lower: quartiles.lower_fence,
                upper: quartiles.upper_fence,
            }
        } else {
            OutlierTreatment::Unbounded
        };

        (Some(quartiles), fraction, treatment)
    }

    /// Bound the given columns (or every numeric column) in order.
    pub fn bound(
        df: &mut DataFrame,
        columns: Option<&[String]>,
        processing_steps: &mut Vec<String>,
    ) -> Result<Vec<ColumnOutlierPlan>> {
        let order: Vec<String> = match columns {
            Some(columns) => columns.to_vec(),
            None => crate::utils::numeric_column_names(df),
        };

        let mut plans = Vec::with_capacity(order.len());
        for column in order {
            let Ok(existing) = df.column(&column) else {
                debug!("Outlier column '{}' not present, skipping", column);
                continue;
            };
            if !is_numeric_dtype(existing.dtype()) {
                debug!("Outlier column '{}' is not numeric, skipping", column);
                continue;
            }

            let values = numeric_values(existing.as_materialized_series())?;
            let (quartiles, outlier_fraction, treatment) = Self::plan_column(&values);

            let mut cells_changed = 0;
            if let Some((lower, upper)) = treatment.bounds() {
                let clipped: Vec<Option<f64>> = values
                    .iter()
                    .map(|v| {
                        v.map(|x| {
                            let y = x.clamp(lower, upper);
                            if y != x {
                                cells_changed += 1;
                            }
                            y
                        })
                    })
                    .collect();
                if cells_changed > 0 {
                    df.replace(&column, Series::new(column.as_str().into(), clipped))?;
                    processing_steps.push(format!(
                        "Bounded {} values in '{}' to [{:.4}, {:.4}] ({:?})",
                        cells_changed, column, lower, upper, treatment
                    ));
                }
            }

            debug!(
                "'{}': {:.2}% outside fences -> {:?}",
                column,
                outlier_fraction * 100.0,
                treatment
            );
            plans.push(ColumnOutlierPlan {
                column,
                outlier_fraction,
                quartiles,
                treatment,
                cells_changed,
            });
        }

        let changed: usize = plans.iter().map(|p| p.cells_changed).sum();
        info!("Outlier bounding changed {} cells", changed);
        Ok(plans)
    }
}

/// Clip range for winsorizing: observed values at the inward nearest ranks of
/// the 1st and 99th percentiles. Both lie inside the interpolated band, and
/// clipping to them leaves the same ranks in place.
fn winsorize_bounds(values: &[Option<f64>]) -> (f64, f64) {
    let sorted = sorted_observed(values);
    let last = (sorted.len() - 1) as f64;
    let lower_rank = (WINSORIZE_LOWER_PERCENTILE * last).ceil() as usize;
    let upper_rank = (WINSORIZE_UPPER_PERCENTILE * last).floor() as usize;
    (sorted[lower_rank], sorted[upper_rank.max(lower_rank)])
}
