//! Lenient field access for loosely-typed JSON records.
//!
//! Bulk files and saved documents come from many tools. Numbers may arrive as
//! strings, keys have aliases, and any field may be missing or null.

use serde_json::{Map, Value};

/// Coerces a JSON value to a finite number.
///
/// Accepts numbers and numeric strings (surrounding whitespace ignored).
/// Everything else, including empty strings, is `None`.
pub fn number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            s.parse::<f64>().ok()?
        }
        _ => return None,
    };
    n.is_finite().then_some(n)
}

/// First present, non-null value among `aliases`.
pub fn field<'a>(obj: &'a Map<String, Value>, aliases: &[&str]) -> Option<&'a Value> {
    aliases
        .iter()
        .filter_map(|key| obj.get(*key))
        .find(|v| !v.is_null())
}

/// First alias that coerces to a number.
pub fn number_field(obj: &Map<String, Value>, aliases: &[&str]) -> Option<f64> {
    aliases
        .iter()
        .filter_map(|key| obj.get(*key))
        .find_map(number)
}

/// Renders a scalar as display text; strings are taken verbatim.
pub fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
