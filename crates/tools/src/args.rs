//! Argument decoding shared by the capabilities.
//!
//! Models send numbers as strings and IDs as numbers often enough that the
//! scalar accessors accept both. [`decode`] is strict: typed payloads such
//! as a new workout must match their schema.

use chrono::{Duration, NaiveDateTime};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use stridecoach_core::error::ToolError;

pub type Args = Map<String, Value>;

fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Optional whole number with a default. Fractions are truncated.
pub fn int_or(args: &Args, key: &str, default: i64) -> Result<i64, ToolError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(v) => as_f64(v)
            .map(|f| f as i64)
            .ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number, got {v}"))),
    }
}

pub fn required_f64(args: &Args, key: &str) -> Result<f64, ToolError> {
    let value = args
        .get(key)
        .ok_or_else(|| ToolError::InvalidArguments(format!("missing '{key}'")))?;
    as_f64(value).ok_or_else(|| ToolError::InvalidArguments(format!("'{key}' must be a number, got {value}")))
}

/// Start of a look-back window of `days` days from now.
pub fn days_back(days: i64) -> Result<NaiveDateTime, ToolError> {
    Duration::try_days(days)
        .and_then(|span| crate::now().checked_sub_signed(span))
        .ok_or_else(|| ToolError::InvalidArguments(format!("'days' out of range: {days}")))
}

/// Start of a look-back window of `weeks` weeks from now.
pub fn weeks_back(weeks: i64) -> Result<NaiveDateTime, ToolError> {
    Duration::try_weeks(weeks)
        .and_then(|span| crate::now().checked_sub_signed(span))
        .ok_or_else(|| ToolError::InvalidArguments(format!("'weeks' out of range: {weeks}")))
}

/// An ID given as string or number, returned as its string form.
pub fn required_id(args: &Args, key: &str) -> Result<String, ToolError> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ToolError::InvalidArguments(format!("'{key}' must be an ID, got {other}"))),
        None => Err(ToolError::InvalidArguments(format!("missing '{key}'"))),
    }
}

/// Decode the whole argument map into a typed value.
pub fn decode<T: DeserializeOwned>(args: Args) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

pub fn round(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Args {
        v.as_object().unwrap().clone()
    }

    #[test]
    fn int_accepts_strings_and_defaults() {
        assert_eq!(int_or(&args(json!({"days": "14"})), "days", 7).unwrap(), 14);
        assert_eq!(int_or(&args(json!({"days": 3.0})), "days", 7).unwrap(), 3);
        assert_eq!(int_or(&args(json!({})), "days", 7).unwrap(), 7);
        assert!(int_or(&args(json!({"days": "soon"})), "days", 7).is_err());
    }

    #[test]
    fn huge_look_back_is_rejected_not_panicking() {
        assert!(matches!(days_back(1_000_000_000_000), Err(ToolError::InvalidArguments(_))));
        assert!(matches!(weeks_back(i64::MAX), Err(ToolError::InvalidArguments(_))));
        assert!(days_back(7).unwrap() < crate::now());
    }

    #[test]
    fn decode_is_strict_about_numeric_strings() {
        let err = decode::<stridecoach_core::training::NewWorkout>(args(json!({
            "date": "2026-10-20",
            "distance_km": "8"
        })))
        .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn id_accepts_number_or_string() {
        assert_eq!(required_id(&args(json!({"id": 1234567890123u64})), "id").unwrap(), "1234567890123");
        assert_eq!(required_id(&args(json!({"id": " 42 "})), "id").unwrap(), "42");
        assert!(required_id(&args(json!({})), "id").is_err());
    }

    #[test]
    fn rounding() {
        assert_eq!(round(5.4567, 2), 5.46);
        assert_eq!(round(71.25, 1), 71.3);
    }
}
