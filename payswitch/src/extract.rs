//! Lenient accessors over provider JSON bodies.
//!
//! Providers disagree on whether identifiers are numbers or strings and
//! whether amounts are numbers or decimal strings; these helpers accept both.
//! Paths are JSON pointers (`/data/reference`).

use std::str::FromStr;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::error::SwitchError;
use crate::model::{Currency, Metadata};

/// String at `pointer`, if it is a non-empty JSON string.
#[must_use]
pub fn str_at<'a>(value: &'a Value, pointer: &str) -> Option<&'a str> {
    value
        .pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
}

/// String or number at `pointer`, rendered as a string.
#[must_use]
pub fn string_at(value: &Value, pointer: &str) -> Option<String> {
    match value.pointer(pointer)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// First of several pointers that yields a string.
#[must_use]
pub fn first_string_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers.iter().find_map(|p| string_at(value, p))
}

/// Parses a JSON number or numeric string into a decimal.
#[must_use]
pub fn decimal_from_value(value: &Value) -> Option<Decimal> {
    let text = match value {
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.trim().to_owned(),
        _ => return None,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .ok()
}

/// Decimal at `pointer`.
#[must_use]
pub fn decimal_at(value: &Value, pointer: &str) -> Option<Decimal> {
    value.pointer(pointer).and_then(decimal_from_value)
}

/// Object at `pointer`, cloned; empty when absent or not an object.
#[must_use]
pub fn object_at(value: &Value, pointer: &str) -> Metadata {
    value
        .pointer(pointer)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// RFC 3339 timestamp at `pointer`.
#[must_use]
pub fn datetime_at(value: &Value, pointer: &str) -> Option<DateTime<Utc>> {
    str_at(value, pointer)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Currency at `pointer`, or `default` when the field is absent.
///
/// # Errors
///
/// Returns [`SwitchError::Decode`] when the field holds an unrecognized code.
pub fn currency_at(
    value: &Value,
    pointer: &str,
    default: Currency,
    context: &'static str,
) -> Result<Currency, SwitchError> {
    str_at(value, pointer).map_or(Ok(default), |code| {
        code.parse()
            .map_err(|e| SwitchError::decode(context, format!("{e}"), value.clone()))
    })
}

/// Required identifier at `pointer`.
///
/// # Errors
///
/// Returns [`SwitchError::Decode`] when the field is absent.
pub fn required_string_at(
    value: &Value,
    pointer: &str,
    context: &'static str,
) -> Result<String, SwitchError> {
    string_at(value, pointer).ok_or_else(|| {
        SwitchError::decode(context, format!("missing field {pointer}"), value.clone())
    })
}

/// Required decimal at `pointer`.
///
/// # Errors
///
/// Returns [`SwitchError::Decode`] when the field is absent or not numeric.
pub fn required_decimal_at(
    value: &Value,
    pointer: &str,
    context: &'static str,
) -> Result<Decimal, SwitchError> {
    decimal_at(value, pointer).ok_or_else(|| {
        SwitchError::decode(context, format!("missing or non-numeric field {pointer}"), value.clone())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_string_at_accepts_numbers() {
        let body = json!({"data": {"id": 4099260516u64, "reference": "ref_1", "empty": ""}});
        assert_eq!(string_at(&body, "/data/id").as_deref(), Some("4099260516"));
        assert_eq!(string_at(&body, "/data/reference").as_deref(), Some("ref_1"));
        assert!(string_at(&body, "/data/empty").is_none());
        assert_eq!(
            first_string_at(&body, &["/data/missing", "/data/reference"]).as_deref(),
            Some("ref_1")
        );
    }

    #[test]
    fn test_decimal_from_number_or_string() {
        let body = json!({"a": 5000, "b": "12.50", "c": 1.5, "d": true});
        assert_eq!(decimal_at(&body, "/a"), Some(Decimal::from(5000)));
        assert_eq!(decimal_at(&body, "/b"), Some(Decimal::new(1250, 2)));
        assert_eq!(decimal_at(&body, "/c"), Some(Decimal::new(15, 1)));
        assert_eq!(decimal_at(&body, "/d"), None);
        assert_eq!(required_decimal_at(&body, "/a", "test").unwrap(), Decimal::from(5000));
        assert!(matches!(
            required_decimal_at(&body, "/missing", "test"),
            Err(SwitchError::Decode { .. })
        ));
    }

    #[test]
    fn test_currency_at_defaults_and_rejects() {
        let body = json!({"currency": "ngn", "bad": "ZZZ"});
        assert_eq!(currency_at(&body, "/currency", Currency::EUR, "t").unwrap(), Currency::NGN);
        assert_eq!(currency_at(&body, "/missing", Currency::EUR, "t").unwrap(), Currency::EUR);
        assert!(matches!(
            currency_at(&body, "/bad", Currency::EUR, "t"),
            Err(SwitchError::Decode { .. })
        ));
    }

    #[test]
    fn test_datetime_at() {
        let body = json!({"created_at": "2024-05-01T10:00:00Z", "bad": "yesterday"});
        assert!(datetime_at(&body, "/created_at").is_some());
        assert!(datetime_at(&body, "/bad").is_none());
    }
}
