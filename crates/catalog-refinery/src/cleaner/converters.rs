//! Cell-level conversions from raw strings to typed columns.
//!
//! Every converter returns the new Series together with the number of
//! non-missing input cells it could not interpret. None of them fail on
//! cell content; only a column of the wrong physical type is an error.

use crate::utils::{is_null_spelling, parse_boolean_token, parse_numeric_string};
use anyhow::Result;
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;

/// Placeholder written into text cells that are empty or missing.
pub const TEXT_SENTINEL: &str = "Unknown";

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static EDGE_NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[^\w]+|[^\w]+$").unwrap());

const DATETIME_WITH_OFFSET_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f %z", "%Y-%m-%dT%H:%M:%S%.f%z"];

const NAIVE_DATETIME_FORMATS: [&str; 5] = [
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

fn string_values(series: &Series) -> Result<StringChunked> {
    if series.dtype() == &DataType::String {
        Ok(series.str()?.clone())
    } else {
        Ok(series.cast(&DataType::String)?.str()?.clone())
    }
}

/// Convert a string series to Float64.
///
/// Thousands separators, currency symbols and whitespace are stripped; null
/// spellings, parse failures and non-finite results become null.
pub(crate) fn string_to_numeric(series: &Series) -> Result<(Series, usize)> {
    let str_series = string_values(series)?;
    let mut unparseable = 0usize;
    let mut result_vec: Vec<Option<f64>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) if !is_null_spelling(val) => {
                let parsed = parse_numeric_string(val);
                if parsed.is_none() {
                    unparseable += 1;
                }
                result_vec.push(parsed);
            }
            _ => result_vec.push(None),
        }
    }

    Ok((Series::new(series.name().clone(), result_vec), unparseable))
}

/// Convert a string series to Boolean.
///
/// Tokens outside the true/false table, and missing cells, become `false`.
/// The count reports non-missing tokens that were defaulted.
pub(crate) fn string_to_boolean(series: &Series) -> Result<(Series, usize)> {
    let str_series = string_values(series)?;
    let mut unmapped = 0usize;
    let mut result_vec: Vec<bool> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        let mapped = match opt_val {
            Some(val) => {
                let token = parse_boolean_token(val);
                if token.is_none() && !is_null_spelling(val) {
                    unmapped += 1;
                }
                token
            }
            None => None,
        };
        result_vec.push(mapped.unwrap_or(false));
    }

    Ok((Series::new(series.name().clone(), result_vec), unmapped))
}

/// Parse a single timestamp cell into epoch milliseconds (UTC).
pub(crate) fn parse_timestamp_millis(raw: &str) -> Option<i64> {
    let value = raw.trim();
    if is_null_spelling(value) {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.timestamp_millis());
    }
    for format in DATETIME_WITH_OFFSET_FORMATS {
        if let Ok(dt) = DateTime::parse_from_str(value, format) {
            return Some(dt.timestamp_millis());
        }
    }
    for format in NAIVE_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt.and_utc().timestamp_millis());
        }
    }
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(value, format) {
            return date
                .and_hms_opt(0, 0, 0)
                .map(|dt| dt.and_utc().timestamp_millis());
        }
    }

    // Bare epoch values: seconds or milliseconds in a plausible range
    if let Ok(timestamp) = value.parse::<i64>() {
        if (1_000_000_000..2_000_000_000).contains(&timestamp) {
            return Some(timestamp * 1000);
        }
        if (1_000_000_000_000..2_000_000_000_000).contains(&timestamp) {
            return Some(timestamp);
        }
    }

    None
}

/// Convert a string series to `Datetime(Milliseconds)`.
pub(crate) fn string_to_datetime(series: &Series) -> Result<(Series, usize)> {
    let str_series = string_values(series)?;
    let mut unparseable = 0usize;
    let mut timestamps: Vec<Option<i64>> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        match opt_val {
            Some(val) if !is_null_spelling(val) => {
                let parsed = parse_timestamp_millis(val);
                if parsed.is_none() {
                    unparseable += 1;
                }
                timestamps.push(parsed);
            }
            _ => timestamps.push(None),
        }
    }

    let timestamp_series = Series::new(series.name().clone(), timestamps);
    Ok((
        timestamp_series.cast(&DataType::Datetime(TimeUnit::Milliseconds, None))?,
        unparseable,
    ))
}

/// Derive `<name>_year`, `<name>_month`, `<name>_day` and `<name>_dayofweek`
/// (Monday = 0) from a millisecond datetime series. Missing stays missing.
pub(crate) fn datetime_parts(series: &Series) -> Result<Vec<Series>> {
    let millis = series.cast(&DataType::Int64)?;
    let millis = millis.i64()?;
    let len = millis.len();

    let mut year: Vec<Option<i32>> = Vec::with_capacity(len);
    let mut month: Vec<Option<i32>> = Vec::with_capacity(len);
    let mut day: Vec<Option<i32>> = Vec::with_capacity(len);
    let mut weekday: Vec<Option<i32>> = Vec::with_capacity(len);

    for opt_val in millis.into_iter() {
        let dt = opt_val.and_then(DateTime::from_timestamp_millis);
        year.push(dt.map(|d| d.year()));
        month.push(dt.map(|d| d.month() as i32));
        day.push(dt.map(|d| d.day() as i32));
        weekday.push(dt.map(|d| d.weekday().num_days_from_monday() as i32));
    }

    let name = series.name().to_string();
    Ok(vec![
        Series::new(format!("{}_year", name).into(), year),
        Series::new(format!("{}_month", name).into(), month),
        Series::new(format!("{}_day", name).into(), day),
        Series::new(format!("{}_dayofweek", name).into(), weekday),
    ])
}

/// Normalize a single text cell.
pub(crate) fn normalize_text_value(raw: Option<&str>) -> String {
    let Some(value) = raw else {
        return TEXT_SENTINEL.to_string();
    };
    if is_null_spelling(value) {
        return TEXT_SENTINEL.to_string();
    }

    let collapsed = WHITESPACE_RUN.replace_all(value.trim(), " ");
    let stripped = EDGE_NON_WORD.replace_all(&collapsed, "");
    if stripped.is_empty() || is_null_spelling(&stripped) {
        TEXT_SENTINEL.to_string()
    } else {
        stripped.into_owned()
    }
}

/// Normalize a text series. The result never contains nulls.
pub(crate) fn normalize_text(series: &Series) -> Result<(Series, usize)> {
    let str_series = string_values(series)?;
    let mut substituted = 0usize;
    let mut result_vec: Vec<String> = Vec::with_capacity(str_series.len());

    for opt_val in str_series.into_iter() {
        let normalized = normalize_text_value(opt_val);
        if normalized == TEXT_SENTINEL && opt_val != Some(TEXT_SENTINEL) {
            substituted += 1;
        }
        result_vec.push(normalized);
    }

    Ok((Series::new(series.name().clone(), result_vec), substituted))
}
