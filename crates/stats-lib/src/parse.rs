//! Numeric value parsing for CLI-reported readings
//!
//! Readings arrive as JSON numbers or as text such as `"42.5%"`, `"1200 pps"`
//! or `"n/a"`. Anything unparsable is treated as absent.

use serde_json::Value;

const NOT_AVAILABLE: &str = "n/a";

/// Convert a raw reading to a number, or `None` when it is not available.
pub fn parse_value(raw: &Value) -> Option<f64> {
    match raw {
        Value::Number(n) => n.as_f64().filter(|v| v.is_finite()),
        Value::String(s) => parse_text(s),
        _ => None,
    }
}

/// Text form of [`parse_value`]
pub fn parse_text(raw: &str) -> Option<f64> {
    let text = raw.trim();
    if text == NOT_AVAILABLE {
        return None;
    }

    let candidate = if text.contains('%') {
        text.replace('%', "")
    } else if text.contains("pps") {
        text.split_whitespace().next()?.to_string()
    } else {
        text.to_string()
    };

    candidate
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}
