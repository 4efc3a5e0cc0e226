//! Shared utilities for the refinery pipeline.
//!
//! This module contains common helper functions used across multiple modules
//! to reduce code duplication and ensure consistency.

use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Category of a data type for reporting purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DtypeCategory {
    /// Integer or floating point numbers
    Numeric,
    /// Date or datetime types
    Temporal,
    /// Boolean type
    Boolean,
    /// String/text type
    Text,
    /// Other/unknown types
    Other,
}

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

/// Check if a DataType is a datetime type.
#[inline]
pub fn is_datetime_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Datetime(_, _) | DataType::Date | DataType::Time
    )
}

/// Get the category of a DataType.
pub fn get_dtype_category(dtype: &DataType) -> DtypeCategory {
    if is_numeric_dtype(dtype) {
        DtypeCategory::Numeric
    } else if is_datetime_dtype(dtype) {
        DtypeCategory::Temporal
    } else if matches!(dtype, DataType::Boolean) {
        DtypeCategory::Boolean
    } else if matches!(dtype, DataType::String | DataType::Categorical(_, _)) {
        DtypeCategory::Text
    } else {
        DtypeCategory::Other
    }
}

/// Names of the numeric columns of a table, in table order.
pub fn numeric_column_names(df: &DataFrame) -> Vec<String> {
    df.get_columns()
        .iter()
        .filter(|c| is_numeric_dtype(c.dtype()))
        .map(|c| c.name().to_string())
        .collect()
}

// =============================================================================
// String Parsing Utilities
// =============================================================================

/// Characters stripped before numeric parsing.
pub const NUMERIC_FORMAT_CHARS: [char; 4] = [',', '$', '€', '£'];

/// Spellings treated as missing by every coercion (compared case-insensitively
/// after trimming; the empty string is included).
pub const NULL_SPELLINGS: [&str; 4] = ["na", "n/a", "null", ""];

/// Check if a string is one of the recognized missing-value spellings.
///
/// # Example
///
/// ```rust,ignore
/// use catalog_refinery::utils::is_null_spelling;
///
/// assert!(is_null_spelling("N/A"));
/// assert!(is_null_spelling("  "));
/// assert!(!is_null_spelling("42"));
/// ```
pub fn is_null_spelling(s: &str) -> bool {
    let lower = s.trim().to_ascii_lowercase();
    NULL_SPELLINGS.iter().any(|&marker| lower == marker)
}

/// Clean a string for numeric parsing by removing formatting characters
/// and all whitespace.
///
/// # Example
///
/// ```rust,ignore
/// use catalog_refinery::utils::clean_numeric_string;
///
/// assert_eq!(clean_numeric_string("$1,234.56"), "1234.56");
/// assert_eq!(clean_numeric_string(" € 1 000 "), "1000");
/// ```
pub fn clean_numeric_string(s: &str) -> String {
    s.chars()
        .filter(|c| !c.is_whitespace() && !NUMERIC_FORMAT_CHARS.contains(c))
        .collect()
}

/// Try to parse a string as a finite numeric value (f64).
///
/// Null spellings, unparseable text and non-finite results all yield `None`.
pub fn parse_numeric_string(s: &str) -> Option<f64> {
    if is_null_spelling(s) {
        return None;
    }
    let cleaned = clean_numeric_string(s);
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

// =============================================================================
// Boolean Token Utilities
// =============================================================================

/// Tokens mapped to `true`.
pub const BOOLEAN_TRUE_VALUES: [&str; 3] = ["true", "t", "1"];

/// Tokens mapped to `false`.
pub const BOOLEAN_FALSE_VALUES: [&str; 3] = ["false", "f", "0"];

/// Map a token through the boolean table, case-insensitively.
///
/// Returns `None` for tokens outside the table.
pub fn parse_boolean_token(s: &str) -> Option<bool> {
    let lower = s.trim().to_ascii_lowercase();
    if BOOLEAN_TRUE_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if BOOLEAN_FALSE_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

// =============================================================================
// Series Statistics Utilities
// =============================================================================

/// Read a numeric Series as `f64` values, keeping nulls in place.
pub fn numeric_values(series: &Series) -> PolarsResult<Vec<Option<f64>>> {
    let casted = series.cast(&DataType::Float64)?;
    let values = casted.f64()?;
    Ok(values
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Linear-interpolation quantile over values that are already sorted ascending.
///
/// Returns `None` for an empty slice.
pub fn sorted_quantile(sorted: &[f64], q: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Sorted copy of the observed values of a column.
pub fn sorted_observed(values: &[Option<f64>]) -> Vec<f64> {
    let mut observed: Vec<f64> = values.iter().flatten().copied().collect();
    observed.sort_by(|a, b| a.total_cmp(b));
    observed
}

/// Median of the observed values, if any.
pub fn median_of(values: &[Option<f64>]) -> Option<f64> {
    sorted_quantile(&sorted_observed(values), 0.5)
}

/// Mean of the observed values, if any.
pub fn mean_of(values: &[Option<f64>]) -> Option<f64> {
    let observed: Vec<f64> = values.iter().flatten().copied().collect();
    if observed.is_empty() {
        None
    } else {
        Some(observed.iter().sum::<f64>() / observed.len() as f64)
    }
}

/// Render a single cell for reports and row keys.
pub fn any_value_to_string(value: &AnyValue) -> String {
    match value {
        AnyValue::Null => String::new(),
        AnyValue::String(s) => s.to_string(),
        AnyValue::StringOwned(s) => s.to_string(),
        other => format!("{}", other),
    }
}

// =============================================================================
// Series Transformation Utilities
// =============================================================================

/// Fill null values in a numeric Series with a specific value.
pub fn fill_numeric_nulls(series: &Series, fill_value: f64) -> PolarsResult<Series> {
    let filled: Vec<Option<f64>> = numeric_values(series)?
        .into_iter()
        .map(|v| Some(v.unwrap_or(fill_value)))
        .collect();

    Ok(Series::new(series.name().clone(), filled))
}

/// Collect sample values from a Series (non-null values only).
pub fn collect_sample_values(series: &Series, max_samples: usize) -> Vec<String> {
    let non_null = series.drop_nulls();
    if non_null.is_empty() {
        return Vec::new();
    }

    let sample_size = std::cmp::min(max_samples, non_null.len());
    let mut samples = Vec::with_capacity(sample_size);

    for i in 0..sample_size {
        if let Ok(val) = non_null.get(i) {
            samples.push(any_value_to_string(&val));
        }
    }

    samples
}

// =============================================================================
// Tests
// =============================================================================
