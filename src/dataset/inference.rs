//! Column type inference
//!
//! Picks one storage type per column from a bounded sample of its raw text
//! values, and coerces raw cells into typed scalars for insertion.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::dataset::types::{ScalarValue, TypeTag};

// ============================================================================
// Constants for Type Inference
// ============================================================================

/// Maximum number of values examined per column
pub const DEFAULT_SAMPLE_SIZE: usize = 500;

static INTEGER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[+-]?\d+$").expect("integer pattern"));

static FLOAT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+(?:\.\d*)?|\.\d+)(?:[eE][+-]?\d+)?$").expect("float pattern")
});

/// Datetime layouts tried after RFC 3339 / RFC 2822. `%.f` also accepts
/// values without a fractional part.
const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Normalized text form for timestamp cells.
const TIMESTAMP_OUTPUT_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ============================================================================
// Type Inference
// ============================================================================

/// Infer the storage type of a column.
///
/// Only the first `sample_size` values are examined. Empty values and the
/// literal `null` (any case) are skipped and never disqualify a type.
///
/// # Detection Order
/// 1. Boolean (`true`, `false`, `1`, `0`)
/// 2. Integer (optionally signed digits that fit in `i64`)
/// 3. Float (optionally signed finite decimal, integers included)
/// 4. Timestamp (calendar date or date-time)
/// 5. Text (fallback, also used when every sampled value is skipped)
pub fn infer_type<S: AsRef<str>>(values: &[S], sample_size: usize) -> TypeTag {
    let sample: Vec<&str> = values
        .iter()
        .take(sample_size)
        .map(|v| v.as_ref().trim())
        .filter(|v| !is_null_token(v))
        .collect();

    if sample.is_empty() {
        return TypeTag::Text;
    }

    if sample.iter().all(|v| is_boolean(v)) {
        return TypeTag::Boolean;
    }

    if sample.iter().all(|v| parse_integer(v).is_some()) {
        return TypeTag::Integer;
    }

    if sample.iter().all(|v| is_float(v)) {
        return TypeTag::Float;
    }

    if sample.iter().all(|v| parse_timestamp(v).is_some()) {
        return TypeTag::Timestamp;
    }

    TypeTag::Text
}

/// Empty cells and the `null` token mean "no value".
pub fn is_null_token(value: &str) -> bool {
    let value = value.trim();
    value.is_empty() || value.eq_ignore_ascii_case("null")
}

fn parse_integer(value: &str) -> Option<i64> {
    if !INTEGER_PATTERN.is_match(value) {
        return None;
    }
    value.trim_start_matches('+').parse::<i64>().ok()
}

// Digit runs that overflow i64 are not floats either; they stay text.
fn is_float(value: &str) -> bool {
    if INTEGER_PATTERN.is_match(value) {
        return parse_integer(value).is_some();
    }
    FLOAT_PATTERN.is_match(value) && parse_float(value).is_some()
}

fn parse_float(value: &str) -> Option<f64> {
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}

fn is_boolean(value: &str) -> bool {
    parse_boolean(value).is_some()
}

fn parse_boolean(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("true") || value == "1" {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") || value == "0" {
        Some(false)
    } else {
        None
    }
}

/// Parse a calendar date or date-time.
///
/// Offsets are converted to UTC; bare dates become midnight.
pub fn parse_timestamp(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.naive_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc2822(value) {
        return Some(dt.naive_utc());
    }

    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(value, format) {
            return Some(dt);
        }
    }

    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .and_then(|date| date.and_hms_opt(0, 0, 0))
}

// ============================================================================
// Value Coercion
// ============================================================================

/// Convert a raw cell into a typed scalar for the given column type.
///
/// Missing values become `Null`. A value that does not parse as the column
/// type also becomes `Null` instead of failing the upload. Every sampled
/// value parses as the inferred type, so this only happens past the sample.
pub fn coerce_value(raw: &str, type_tag: TypeTag) -> ScalarValue {
    let value = raw.trim();
    if is_null_token(value) {
        return ScalarValue::Null;
    }

    let coerced = match type_tag {
        TypeTag::Boolean => parse_boolean(value).map(ScalarValue::Boolean),
        TypeTag::Integer => parse_integer(value).map(ScalarValue::Integer),
        TypeTag::Float => parse_float(value).map(ScalarValue::Float),
        TypeTag::Timestamp => parse_timestamp(value)
            .map(|dt| ScalarValue::Timestamp(dt.format(TIMESTAMP_OUTPUT_FORMAT).to_string())),
        TypeTag::Text => Some(ScalarValue::Text(value.to_string())),
    };

    coerced.unwrap_or_else(|| {
        tracing::debug!("Coercion of {:?} to {} failed, storing NULL", value, type_tag);
        ScalarValue::Null
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn infer(values: &[&str]) -> TypeTag {
        infer_type(values, DEFAULT_SAMPLE_SIZE)
    }

    #[test]
    fn test_infer_integer() {
        assert_eq!(infer(&["1", "2", "3"]), TypeTag::Integer);
        assert_eq!(infer(&["-10", "+4", "300000"]), TypeTag::Integer);
    }

    #[test]
    fn test_infer_mixed_integer_and_decimal_is_float() {
        assert_eq!(infer(&["1", "2.5"]), TypeTag::Float);
        assert_eq!(infer(&["-0.5", ".25", "3.", "1e3"]), TypeTag::Float);
    }

    #[test]
    fn test_infer_boolean() {
        assert_eq!(infer(&["true", "false"]), TypeTag::Boolean);
        assert_eq!(infer(&["TRUE", "False", "1", "0"]), TypeTag::Boolean);
    }

    #[test]
    fn test_infer_zero_one_column_is_boolean() {
        assert_eq!(infer(&["0", "1", "1"]), TypeTag::Boolean);
    }

    #[test]
    fn test_infer_all_empty_is_text() {
        assert_eq!(infer(&["", "", ""]), TypeTag::Text);
        assert_eq!(infer(&["null", "NULL", " "]), TypeTag::Text);
        assert_eq!(infer(&[]), TypeTag::Text);
    }

    #[test]
    fn test_infer_nulls_do_not_disqualify() {
        assert_eq!(infer(&["1", "", "null", "7"]), TypeTag::Integer);
        assert_eq!(infer(&["", "true", "Null"]), TypeTag::Boolean);
    }

    #[test]
    fn test_infer_timestamp() {
        assert_eq!(infer(&["2024-01-01", "2024-02-29"]), TypeTag::Timestamp);
        assert_eq!(
            infer(&["2024-01-01T10:00:00Z", "2024-01-02 08:30:00", "2024-01-03 08:30"]),
            TypeTag::Timestamp
        );
        assert_eq!(infer(&["03/15/2024", "2024/03/16"]), TypeTag::Timestamp);
    }

    #[test]
    fn test_infer_oversized_digits_stay_text() {
        let ids = ["12345678901234567890", "98765432109876543210"];
        assert_eq!(infer(&ids), TypeTag::Text);
        assert_eq!(
            coerce_value(ids[0], infer(&ids)),
            ScalarValue::Text("12345678901234567890".to_string())
        );
        assert_eq!(infer(&["9223372036854775807", "-9223372036854775808"]), TypeTag::Integer);
    }

    #[test]
    fn test_infer_non_finite_float_is_text() {
        assert_eq!(infer(&["1.5", "1e400"]), TypeTag::Text);
        assert_eq!(infer(&["1.5", "1e300"]), TypeTag::Float);
    }

    #[test]
    fn test_infer_partial_timestamp_is_text() {
        assert_eq!(infer(&["2024-01-01", "not a date"]), TypeTag::Text);
        assert_eq!(infer(&["2024-02-30"]), TypeTag::Text);
    }

    #[test]
    fn test_infer_text_fallback() {
        assert_eq!(infer(&["Alice", "Bob"]), TypeTag::Text);
        assert_eq!(infer(&["1", "two"]), TypeTag::Text);
        assert_eq!(infer(&["1,000", "2,000"]), TypeTag::Text);
    }

    #[test]
    fn test_infer_respects_sample_size() {
        let mut values: Vec<String> = (0..10).map(|i| i.to_string()).collect();
        values.push("not a number".to_string());

        assert_eq!(infer_type(&values, 10), TypeTag::Integer);
        assert_eq!(infer_type(&values, 11), TypeTag::Text);
    }

    #[test]
    fn test_coerce_values() {
        assert_eq!(coerce_value("", TypeTag::Integer), ScalarValue::Null);
        assert_eq!(coerce_value("NULL", TypeTag::Text), ScalarValue::Null);
        assert_eq!(coerce_value("42", TypeTag::Integer), ScalarValue::Integer(42));
        assert_eq!(coerce_value("+7", TypeTag::Integer), ScalarValue::Integer(7));
        assert_eq!(coerce_value("2.5", TypeTag::Float), ScalarValue::Float(2.5));
        assert_eq!(coerce_value("True", TypeTag::Boolean), ScalarValue::Boolean(true));
        assert_eq!(coerce_value("0", TypeTag::Boolean), ScalarValue::Boolean(false));
        assert_eq!(
            coerce_value(" hello ", TypeTag::Text),
            ScalarValue::Text("hello".to_string())
        );
    }

    #[test]
    fn test_coerce_timestamp_normalizes() {
        assert_eq!(
            coerce_value("2024-01-01", TypeTag::Timestamp),
            ScalarValue::Timestamp("2024-01-01 00:00:00".to_string())
        );
        assert_eq!(
            coerce_value("2024-01-01T12:30:00+02:00", TypeTag::Timestamp),
            ScalarValue::Timestamp("2024-01-01 10:30:00".to_string())
        );
    }

    #[test]
    fn test_coerce_failure_degrades_to_null() {
        assert_eq!(coerce_value("abc", TypeTag::Integer), ScalarValue::Null);
        assert_eq!(coerce_value("99999999999999999999", TypeTag::Integer), ScalarValue::Null);
        assert_eq!(coerce_value("yesterday", TypeTag::Timestamp), ScalarValue::Null);
        assert_eq!(coerce_value("maybe", TypeTag::Boolean), ScalarValue::Null);
    }
}
