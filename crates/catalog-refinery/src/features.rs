//! Feature derivation.
//!
//! Declarative column derivations appended to the cleaned table. A
//! derivation whose input columns are absent is skipped.

use crate::utils::numeric_values;
use anyhow::Result;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// A derived column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FeatureSpec {
    /// Row-wise sum; missing if any input is missing.
    Sum { output: String, inputs: Vec<String> },

    /// 1 when the input is positive, otherwise 0.
    Indicator { output: String, input: String },

    /// Label of the right-closed interval `(edges[i], edges[i + 1]]` the
    /// input falls in. With `unbounded_above`, the last label covers
    /// everything above the final edge.
    Bins {
        output: String,
        input: String,
        edges: Vec<f64>,
        labels: Vec<String>,
        #[serde(default)]
        unbounded_above: bool,
    },

    /// `numerator / (denominator + offset)`.
    Ratio {
        output: String,
        numerator: String,
        denominator: String,
        #[serde(default)]
        offset: f64,
    },
}

impl FeatureSpec {
    /// Derivations for the marketing catalog export.
    pub fn marketing_catalog() -> Vec<FeatureSpec> {
        let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();

        vec![
            FeatureSpec::Sum {
                output: "total_star_ratings".to_string(),
                inputs: strings(&["Five Star", "Four Star", "Three Star", "Two Star", "One Star"]),
            },
            FeatureSpec::Indicator {
                output: "has_reviews".to_string(),
                input: "Num Of Reviews".to_string(),
            },
            FeatureSpec::Bins {
                output: "price_range".to_string(),
                input: "Price".to_string(),
                edges: vec![0.0, 50.0, 100.0, 200.0, 500.0],
                labels: strings(&["Budget", "Mid", "Premium", "High-end", "Luxury"]),
                unbounded_above: true,
            },
            FeatureSpec::Bins {
                output: "rating_quality".to_string(),
                input: "Average Rating".to_string(),
                edges: vec![0.0, 2.0, 3.0, 4.0, 5.0],
                labels: strings(&["Poor", "Fair", "Good", "Excellent"]),
                unbounded_above: false,
            },
            FeatureSpec::Ratio {
                output: "review_density".to_string(),
                numerator: "Num Of Reviews".to_string(),
                denominator: "Number Of Ratings".to_string(),
                offset: 1.0,
            },
            FeatureSpec::Ratio {
                output: "price_per_rating".to_string(),
                numerator: "Price".to_string(),
                denominator: "Average Rating".to_string(),
                offset: 0.1,
            },
        ]
    }

    pub fn output(&self) -> &str {
        match self {
            FeatureSpec::Sum { output, .. }
            | FeatureSpec::Indicator { output, .. }
            | FeatureSpec::Bins { output, .. }
            | FeatureSpec::Ratio { output, .. } => output,
        }
    }

    /// Columns the derivation reads.
    pub fn inputs(&self) -> Vec<&str> {
        match self {
            FeatureSpec::Sum { inputs, .. } => inputs.iter().map(String::as_str).collect(),
            FeatureSpec::Indicator { input, .. } | FeatureSpec::Bins { input, .. } => {
                vec![input.as_str()]
            }
            FeatureSpec::Ratio {
                numerator,
                denominator,
                ..
            } => vec![numerator.as_str(), denominator.as_str()],
        }
    }

    /// Check the derivation is well formed.
    pub fn validate(&self) -> std::result::Result<(), String> {
        match self {
            FeatureSpec::Sum { inputs, .. } if inputs.is_empty() => {
                Err("a sum needs at least one input".to_string())
            }
            FeatureSpec::Bins {
                edges,
                labels,
                unbounded_above,
                ..
            } => {
                if edges.is_empty() {
                    return Err("bins need at least one edge".to_string());
                }
                if edges.iter().any(|e| !e.is_finite()) || edges.windows(2).any(|w| w[0] >= w[1]) {
                    return Err("bin edges must be finite and strictly increasing".to_string());
                }
                let intervals = edges.len() - 1 + usize::from(*unbounded_above);
                if labels.len() != intervals {
                    return Err(format!("expected {} labels, got {}", intervals, labels.len()));
                }
                Ok(())
            }
            FeatureSpec::Ratio { offset, .. } if !offset.is_finite() => {
                Err("ratio offset must be finite".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// Applies [`FeatureSpec`] derivations to a table.
pub struct FeatureDeriver;

impl FeatureDeriver {
    /// Append every derivable feature. Returns the names of the created
    /// columns in derivation order.
    pub fn derive(
        df: &mut DataFrame,
        specs: &[FeatureSpec],
        processing_steps: &mut Vec<String>,
    ) -> Result<Vec<String>> {
        let mut created = Vec::new();

        for spec in specs {
            let missing: Vec<&str> = spec
                .inputs()
                .into_iter()
                .filter(|c| df.column(c).is_err())
                .collect();
            if !missing.is_empty() {
                debug!(
                    "Skipping feature '{}': missing input columns {:?}",
                    spec.output(),
                    missing
                );
                continue;
            }

            let series = Self::compute(df, spec)?;
            df.with_column(series)?;
            created.push(spec.output().to_string());
        }

        if !created.is_empty() {
            info!("Derived {} features", created.len());
            processing_steps.push(format!(
                "Derived {} features: {}",
                created.len(),
                created.join(", ")
            ));
        }
        Ok(created)
    }

    fn compute(df: &DataFrame, spec: &FeatureSpec) -> Result<Series> {
        let name: PlSmallStr = spec.output().into();
        let column = |c: &str| -> Result<Vec<Option<f64>>> {
            Ok(numeric_values(df.column(c)?.as_materialized_series())?)
        };

        let series = match spec {
            FeatureSpec::Sum { inputs, .. } => {
                let mut totals: Vec<Option<f64>> = vec![Some(0.0); df.height()];
                for input in inputs {
                    for (total, value) in totals.iter_mut().zip(column(input)?) {
                        *total = match (*total, value) {
                            (Some(t), Some(v)) => Some(t + v),
                            _ => None,
                        };
                    }
                }
                Series::new(name, totals)
            }
            FeatureSpec::Indicator { input, .. } => {
                let flags: Vec<i32> = column(input)?
                    .into_iter()
                    .map(|v| i32::from(v.is_some_and(|x| x > 0.0)))
                    .collect();
                Series::new(name, flags)
            }
            FeatureSpec::Bins {
                input,
                edges,
                labels,
                unbounded_above,
                ..
            } => {
                let binned: Vec<Option<&str>> = column(input)?
                    .into_iter()
                    .map(|v| v.and_then(|x| bin_index(x, edges, *unbounded_above)))
                    .map(|idx| idx.map(|i| labels[i].as_str()))
                    .collect();
                Series::new(name, binned)
            }
            FeatureSpec::Ratio {
                numerator,
                denominator,
                offset,
                ..
            } => {
                let ratios: Vec<Option<f64>> = column(numerator)?
                    .into_iter()
                    .zip(column(denominator)?)
                    .map(|(n, d)| match (n, d) {
                        (Some(n), Some(d)) => Some(n / (d + offset)).filter(|r| r.is_finite()),
                        _ => None,
                    })
                    .collect();
                Series::new(name, ratios)
            }
        };
        Ok(series)
    }
}

/// Index of the right-closed interval containing `value`.
fn bin_index(value: f64, edges: &[f64], unbounded_above: bool) -> Option<usize> {
    let last = *edges.last()?;
    if value > last {
        return unbounded_above.then(|| edges.len() - 1);
    }
    edges
        .windows(2)
        .position(|w| value > w[0] && value <= w[1])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        df.column(name)
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()
    }

    // ========================================================================
    // bin_index() tests
    // ========================================================================

    #[test]
    fn test_bins_are_right_closed() {
        let edges = [0.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(bin_index(0.0, &edges, false), None);
        assert_eq!(bin_index(2.0, &edges, false), Some(0));
        assert_eq!(bin_index(2.5, &edges, false), Some(1));
        assert_eq!(bin_index(5.0, &edges, false), Some(3));
        assert_eq!(bin_index(5.1, &edges, false), None);
        assert_eq!(bin_index(5.1, &edges, true), Some(4));
    }

    // ========================================================================
    // derive() tests
    // ========================================================================

    #[test]
    fn test_marketing_features() {
        let mut df = df![
            "Price" => [Some(30.0), Some(150.0), Some(900.0), None],
            "Average Rating" => [Some(4.5), Some(1.0), Some(3.0), Some(0.0)],
            "Num Of Reviews" => [Some(10.0), Some(0.0), None, Some(3.0)],
            "Number Of Ratings" => [Some(9.0), Some(4.0), Some(1.0), Some(0.0)],
            "Five Star" => [Some(1.0), Some(2.0), Some(3.0), Some(4.0)],
            "Four Star" => [Some(1.0), Some(1.0), Some(1.0), None],
            "Three Star" => [0.0, 0.0, 0.0, 0.0],
            "Two Star" => [0.0, 0.0, 0.0, 0.0],
            "One Star" => [1.0, 0.0, 0.0, 0.0],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let created =
            FeatureDeriver::derive(&mut df, &FeatureSpec::marketing_catalog(), &mut steps).unwrap();
        assert_eq!(created.len(), 6);

        let totals = numeric_values(df.column("total_star_ratings").unwrap().as_materialized_series()).unwrap();
        assert_eq!(totals, vec![Some(3.0), Some(3.0), Some(4.0), None]);

        let has_reviews: Vec<Option<i32>> =
            df.column("has_reviews").unwrap().i32().unwrap().into_iter().collect();
        assert_eq!(has_reviews, vec![Some(1), Some(0), Some(0), Some(1)]);

        assert_eq!(
            strings(&df, "price_range"),
            vec![Some("Budget".into()), Some("Premium".into()), Some("Luxury".into()), None]
        );
        assert_eq!(
            strings(&df, "rating_quality"),
            vec![Some("Excellent".into()), Some("Poor".into()), Some("Fair".into()), None]
        );

        let density = numeric_values(df.column("review_density").unwrap().as_materialized_series()).unwrap();
        assert_eq!(density[0], Some(1.0));
        assert_eq!(density[2], None);
    }

    #[test]
    fn test_missing_inputs_are_skipped() {
        let mut df = df!["Price" => [10.0, 20.0]].unwrap();
        let mut steps = Vec::new();

        let created =
            FeatureDeriver::derive(&mut df, &FeatureSpec::marketing_catalog(), &mut steps).unwrap();

        assert_eq!(created, vec!["price_range"]);
        assert_eq!(df.width(), 2);
    }

    // ========================================================================
    // validate() tests
    // ========================================================================

    #[test]
    fn test_validate_bins() {
        for spec in FeatureSpec::marketing_catalog() {
            assert!(spec.validate().is_ok(), "{:?}", spec);
        }

        let bad = FeatureSpec::Bins {
            output: "b".into(),
            input: "x".into(),
            edges: vec![0.0, 1.0, 1.0],
            labels: vec!["a".into(), "b".into()],
            unbounded_above: false,
        };
        assert!(bad.validate().is_err());
    }

    #[test]
    fn test_spec_deserializes_from_json() {
        let spec: FeatureSpec = serde_json::from_str(
            r#"{"kind": "ratio", "output": "r", "numerator": "a", "denominator": "b"}"#,
        )
        .unwrap();
        assert_eq!(spec.inputs(), vec!["a", "b"]);
        assert!(matches!(spec, FeatureSpec::Ratio { offset, .. } if offset == 0.0));
    }
}
