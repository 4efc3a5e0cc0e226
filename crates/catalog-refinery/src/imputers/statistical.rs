//! Statistical imputation methods.
//!
//! Provides the median fill used for heavily-missing columns and as the
//! fallback when a multi-column strategy lacks signal.

use crate::utils::{fill_numeric_nulls, median_of, numeric_values};
use anyhow::Result;
use polars::prelude::*;

/// Statistical imputation methods for filling missing values.
pub struct StatisticalImputer;

impl StatisticalImputer {
    /// Median of the observed values, or 0 when nothing is observed.
    pub fn median_or_zero(series: &Series) -> Result<f64> {
        Ok(median_of(&numeric_values(series)?).unwrap_or(0.0))
    }

    /// Median-filled copy of a numeric series.
    pub fn median_filled(series: &Series) -> Result<Series> {
        let median = Self::median_or_zero(series)?;
        Ok(fill_numeric_nulls(series, median)?)
    }

    /// Apply median imputation to a numeric column in place.
    pub fn apply_numeric_median(
        df: &mut DataFrame,
        col_name: &str,
        processing_steps: &mut Vec<String>,
    ) -> Result<()> {
        let series = df.column(col_name)?.as_materialized_series().clone();
        let missing = numeric_values(&series)?.iter().filter(|v| v.is_none()).count();
        if missing == 0 {
            return Ok(());
        }

        let median = Self::median_or_zero(&series)?;
        df.replace(col_name, fill_numeric_nulls(&series, median)?)?;
        processing_steps.push(format!(
            "Filled {} missing values in '{}' with median: {:.4}",
            missing, col_name, median
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_numeric_median() {
        let mut df = df![
            "price" => [Some(1.0), None, Some(3.0), Some(10.0)],
        ]
        .unwrap();
        let mut steps = Vec::new();

        StatisticalImputer::apply_numeric_median(&mut df, "price", &mut steps).unwrap();

        let price = df.column("price").unwrap();
        assert_eq!(price.null_count(), 0);
        assert_eq!(price.get(1).unwrap().try_extract::<f64>().unwrap(), 3.0);
        assert_eq!(steps.len(), 1);
        assert!(steps[0].contains("median"));
    }

    #[test]
    fn test_all_missing_column_is_filled_with_zero() {
        let series = Series::new("empty".into(), vec![None::<f64>; 4]);
        let filled = StatisticalImputer::median_filled(&series).unwrap();

        assert_eq!(filled.null_count(), 0);
        assert_eq!(filled.get(0).unwrap().try_extract::<f64>().unwrap(), 0.0);
    }

    #[test]
    fn test_no_missing_is_noop() {
        let mut df = df!["price" => [1.0, 2.0]].unwrap();
        let mut steps = Vec::new();

        StatisticalImputer::apply_numeric_median(&mut df, "price", &mut steps).unwrap();
        assert!(steps.is_empty());
    }
}
