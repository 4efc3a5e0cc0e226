use crate::utils::numeric_values;
use anyhow::Result;
use polars::prelude::*;
use tracing::debug;

/// Nearest-neighbor imputer over a block of numeric feature columns.
pub struct KNNImputer {
    n_neighbors: usize,
}

impl KNNImputer {
    /// Create a new KNN imputer with specified number of neighbors
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1), // Ensure at least 1 neighbor
        }
    }

    /// Impute every missing cell of the feature block.
    ///
    /// All distances are measured on the table as given; values imputed for
    /// one column are never used as coordinates for another.
    pub fn impute_block(
        &self,
        df: &DataFrame,
        features: &[String],
    ) -> Result<Vec<(String, Vec<Option<f64>>)>> {
        let data_matrix = self.create_data_matrix(df, features)?;
        let n_rows = df.height();

        let mut block = Vec::with_capacity(features.len());
        for (col_idx, col_name) in features.iter().enumerate() {
            let mut filled = 0usize;
            let values: Vec<Option<f64>> = (0..n_rows)
                .map(|row_idx| match data_matrix[row_idx][col_idx] {
                    Some(value) => Some(value),
                    None => {
                        filled += 1;
                        self.impute_value(&data_matrix, row_idx, col_idx)
                    }
                })
                .collect();

            if filled > 0 {
                debug!("KNN imputed {} cells in '{}'", filled, col_name);
            }
            block.push((col_name.clone(), values));
        }

        Ok(block)
    }

    /// Fit and transform the dataframe, imputing missing values in the block.
    pub fn fit_transform(&self, df: &DataFrame, features: &[String]) -> Result<DataFrame> {
        let mut result_df = df.clone();
        for (name, values) in self.impute_block(df, features)? {
            result_df.replace(&name, Series::new(name.as_str().into(), values))?;
        }
        Ok(result_df)
    }

    /// Create a row-major data matrix from the feature columns
    fn create_data_matrix(
        &self,
        df: &DataFrame,
        columns: &[String],
    ) -> Result<Vec<Vec<Option<f64>>>> {
        let n_rows = df.height();
        let mut matrix = vec![vec![None; columns.len()]; n_rows];

        for (col_idx, col_name) in columns.iter().enumerate() {
            let values = numeric_values(df.column(col_name)?.as_materialized_series())?;
            for (row, value) in matrix.iter_mut().zip(values) {
                row[col_idx] = value;
            }
        }

        Ok(matrix)
    }

    /// Impute a single missing value from the nearest donors.
    fn impute_value(
        &self,
        data_matrix: &[Vec<Option<f64>>],
        target_row: usize,
        target_col: usize,
    ) -> Option<f64> {
        // Donors: rows observing the target column at a finite distance
        let mut distances: Vec<(usize, f64)> = data_matrix
            .iter()
            .enumerate()
            .filter(|(row, values)| *row != target_row && values[target_col].is_some())
            .map(|(row, values)| (row, nan_euclidean(&data_matrix[target_row], values)))
            .filter(|(_, distance)| distance.is_finite())
            .collect();

        if distances.is_empty() {
            return column_mean(data_matrix, target_col);
        }

        // Sort by distance (ascending); equal distances keep row order
        distances.sort_by(|a, b| a.1.total_cmp(&b.1));
        let k = self.n_neighbors.min(distances.len());
        let nearest = &distances[..k];

        // Exact matches take all of the weight
        let exact: Vec<f64> = nearest
            .iter()
            .filter(|(_, d)| *d == 0.0)
            .filter_map(|(row, _)| data_matrix[*row][target_col])
            .collect();
        if !exact.is_empty() {
            return Some(exact.iter().sum::<f64>() / exact.len() as f64);
        }

        let mut weighted_sum = 0.0;
        let mut weight_sum = 0.0;
        for &(row, distance) in nearest {
            if let Some(value) = data_matrix[row][target_col] {
                let weight = 1.0 / distance;
                weighted_sum += value * weight;
                weight_sum += weight;
            }
        }

        if weight_sum > 0.0 {
            Some(weighted_sum / weight_sum)
        } else {
            column_mean(data_matrix, target_col)
        }
    }
}

/// Euclidean distance over coordinates present in both rows, scaled up by
/// the share of coordinates that were missing.
///
/// Returns infinity when the rows share no coordinate.
pub(crate) fn nan_euclidean(a: &[Option<f64>], b: &[Option<f64>]) -> f64 {
    let total = a.len();
    let mut present = 0usize;
    let mut sum_squared_diff = 0.0;

    for (x, y) in a.iter().zip(b) {
        if let (Some(x), Some(y)) = (x, y) {
            let diff = x - y;
            sum_squared_diff += diff * diff;
            present += 1;
        }
    }

    if present == 0 {
        f64::INFINITY
    } else {
        (total as f64 / present as f64 * sum_squared_diff).sqrt()
    }
}

fn column_mean(data_matrix: &[Vec<Option<f64>>], col: usize) -> Option<f64> {
    let observed: Vec<f64> = data_matrix.iter().filter_map(|row| row[col]).collect();
    if observed.is_empty() {
        None
    } else {
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    // ========================================================================
    // KNNImputer::new() tests
    // ========================================================================

    #[test]
    fn test_knn_imputer_new_with_valid_neighbors() {
        let imputer = KNNImputer::new(5);
        assert_eq!(imputer.n_neighbors, 5);
    }

    #[test]
    fn test_knn_imputer_new_with_zero_neighbors_defaults_to_one() {
        let imputer = KNNImputer::new(0);
        assert_eq!(imputer.n_neighbors, 1);
    }

    // ========================================================================
    // nan_euclidean() tests
    // ========================================================================

    #[test]
    fn test_nan_euclidean_scales_for_missing_coordinates() {
        let a = [Some(0.0), Some(0.0), None];
        let b = [Some(3.0), Some(4.0), Some(1.0)];
        // sqrt(3/2 * 25)
        let expected = (1.5f64 * 25.0).sqrt();
        assert!((nan_euclidean(&a, &b) - expected).abs() < 1e-12);
        assert!(nan_euclidean(&[None, Some(1.0)], &[Some(1.0), None]).is_infinite());
    }

    // ========================================================================
    // fit_transform() tests
    // ========================================================================

    #[test]
    fn test_fit_transform_basic_imputation() {
        let imputer = KNNImputer::new(2);

        let df = df![
            "feature1" => [1.0, 2.0, 3.0, 4.0, 5.0],
            "feature2" => [Some(10.0), Some(20.0), None, Some(40.0), Some(50.0)],
        ]
        .unwrap();

        let result = imputer
            .fit_transform(&df, &features(&["feature2", "feature1"]))
            .unwrap();

        let feature2 = result.column("feature2").unwrap();
        assert_eq!(feature2.null_count(), 0);

        // Rows 1 and 3 are equally near, so the estimate sits between them
        let imputed_value = feature2.get(2).unwrap().try_extract::<f64>().unwrap();
        assert!((imputed_value - 30.0).abs() < 1e-9);
    }

    #[test]
    fn test_exact_match_takes_all_weight() {
        let imputer = KNNImputer::new(3);
        let df = df![
            "x" => [1.0, 1.0, 5.0, 9.0],
            "y" => [Some(7.0), None, Some(100.0), Some(200.0)],
        ]
        .unwrap();

        let result = imputer.fit_transform(&df, &features(&["y", "x"])).unwrap();
        let y = result.column("y").unwrap();
        assert_eq!(y.get(1).unwrap().try_extract::<f64>().unwrap(), 7.0);
    }

    #[test]
    fn test_block_imputes_companion_columns_too() {
        let imputer = KNNImputer::new(2);
        let df = df![
            "a" => [Some(1.0), None, Some(3.0), Some(4.0)],
            "b" => [Some(10.0), Some(20.0), None, Some(40.0)],
        ]
        .unwrap();

        let block = imputer.impute_block(&df, &features(&["a", "b"])).unwrap();

        assert_eq!(block.len(), 2);
        for (_, values) in &block {
            assert!(values.iter().all(|v| v.is_some()));
        }
    }

    #[test]
    fn test_no_donors_falls_back_to_mean() {
        let imputer = KNNImputer::new(2);
        let df = df![
            "a" => [Some(2.0), Some(4.0), None],
            "b" => [None, None, Some(1.0)],
        ]
        .unwrap();

        let block = imputer.impute_block(&df, &features(&["a", "b"])).unwrap();
        // Row 2 shares no coordinate with the rows observing 'a'
        assert_eq!(block[0].1[2], Some(3.0));
    }

    #[test]
    fn test_fit_transform_no_missing_values() {
        let imputer = KNNImputer::new(3);
        let df = df![
            "feature1" => [1.0, 2.0, 3.0],
            "feature2" => [4.0, 5.0, 6.0],
        ]
        .unwrap();

        let result = imputer
            .fit_transform(&df, &features(&["feature1", "feature2"]))
            .unwrap();
        assert!(result.equals(&df));
    }
}
