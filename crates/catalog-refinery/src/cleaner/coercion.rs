//! Applies the declared column roles to a table of raw string columns.

use super::converters::{
    datetime_parts, normalize_text, string_to_boolean, string_to_datetime, string_to_numeric,
};
use crate::config::{ColumnRole, ColumnRoleSpec};
use anyhow::Result;
use polars::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

/// Outcome of coercing one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoercedColumn {
    pub column: String,
    pub role: ColumnRole,
    /// Non-missing cells that could not be interpreted (numeric, temporal),
    /// were defaulted to `false` (boolean) or replaced by the text sentinel.
    pub unparseable: usize,
    /// Columns added alongside the coerced one.
    pub derived: Vec<String>,
}

/// Converts raw string columns per declared role.
pub struct TypeCoercer;

impl TypeCoercer {
    /// Coerce every declared column present in the table.
    ///
    /// Declared columns that are absent are skipped.
    pub fn coerce(
        df: &mut DataFrame,
        roles: &[ColumnRoleSpec],
        processing_steps: &mut Vec<String>,
    ) -> Result<Vec<CoercedColumn>> {
        let mut outcomes = Vec::new();

        for spec in roles {
            if df.column(&spec.column).is_err() {
                debug!("Declared column '{}' not present, skipping", spec.column);
                continue;
            }
            let outcome = Self::coerce_column(df, &spec.column, spec.role)?;

            if outcome.unparseable > 0 {
                processing_steps.push(format!(
                    "Coerced '{}' to {:?} ({} cells unparseable)",
                    outcome.column, outcome.role, outcome.unparseable
                ));
            } else {
                processing_steps.push(format!("Coerced '{}' to {:?}", outcome.column, outcome.role));
            }
            outcomes.push(outcome);
        }

        info!("Coerced {} declared columns", outcomes.len());
        Ok(outcomes)
    }

    /// Coerce a single column in place.
    pub fn coerce_column(df: &mut DataFrame, column: &str, role: ColumnRole) -> Result<CoercedColumn> {
        let series = df.column(column)?.as_materialized_series().clone();

        let (converted, unparseable) = match role {
            ColumnRole::Numeric => string_to_numeric(&series)?,
            ColumnRole::Boolean => string_to_boolean(&series)?,
            ColumnRole::Temporal => string_to_datetime(&series)?,
            ColumnRole::Text => normalize_text(&series)?,
        };

        let mut derived = Vec::new();
        if role == ColumnRole::Temporal {
            for part in datetime_parts(&converted)? {
                derived.push(part.name().to_string());
                df.with_column(part)?;
            }
        }
        df.replace(column, converted)?;

        debug!(
            "Column '{}' coerced to {:?}, {} cells unparseable",
            column, role, unparseable
        );

        Ok(CoercedColumn {
            column: column.to_string(),
            role,
            unparseable,
            derived,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::is_numeric_dtype;

    fn roles() -> Vec<ColumnRoleSpec> {
        vec![
            ColumnRoleSpec::new("price", ColumnRole::Numeric),
            ColumnRoleSpec::new("stock", ColumnRole::Boolean),
            ColumnRoleSpec::new("crawled", ColumnRole::Temporal),
            ColumnRoleSpec::new("title", ColumnRole::Text),
            ColumnRoleSpec::new("absent", ColumnRole::Numeric),
        ]
    }

    #[test]
    fn test_coerce_declared_roles() {
        let mut df = df![
            "price" => [Some("$1,000"), Some("N/A"), Some("12.5")],
            "stock" => [Some("True"), Some("nope"), None],
            "crawled" => [Some("2020-02-03 04:05:06 +0000"), Some("bad"), None],
            "title" => [Some("  a   b "), None, Some("--")],
            "raw" => [Some("x"), Some("y"), Some("z")],
        ]
        .unwrap();
        let mut steps = Vec::new();

        let outcomes = TypeCoercer::coerce(&mut df, &roles(), &mut steps).unwrap();

        assert_eq!(outcomes.len(), 4);
        assert!(is_numeric_dtype(df.column("price").unwrap().dtype()));
        assert_eq!(df.column("stock").unwrap().dtype(), &DataType::Boolean);
        assert_eq!(df.column("title").unwrap().null_count(), 0);
        assert_eq!(df.column("raw").unwrap().dtype(), &DataType::String);

        for part in ["crawled_year", "crawled_month", "crawled_day", "crawled_dayofweek"] {
            let column = df.column(part).unwrap();
            assert_eq!(column.dtype(), &DataType::Int32);
            assert_eq!(column.null_count(), 2);
        }
        assert_eq!(steps.len(), 4);
    }

    #[test]
    fn test_numeric_cells_are_finite_or_missing() {
        let mut df = df![
            "price" => ["$5", "1,2,3", "€7.50", "abc", "-0.5", "1e400"],
        ]
        .unwrap();

        TypeCoercer::coerce_column(&mut df, "price", ColumnRole::Numeric).unwrap();

        let series = df.column("price").unwrap().as_materialized_series();
        for value in series.f64().unwrap().into_iter().flatten() {
            assert!(value.is_finite());
        }
        assert_eq!(series.null_count(), 2);
    }
}
