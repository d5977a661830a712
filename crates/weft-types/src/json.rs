//! Conversions between the value model and `serde_json::Value`.
//!
//! These allow embedding hosts to move slot values across an API boundary
//! without hand-written mapping code. The JSON rendering is lossy for the
//! tags JSON cannot express: symbols and strings both become JSON strings
//! (symbols round-trip as symbols on the way back in), instance names gain
//! a `[...]` wrapper, and external addresses and bitmaps are rejected.

use std::fmt;

use crate::intern::AtomTable;
use crate::multifield::Multifield;
use crate::value::Value;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JsonConvertError {
    /// External addresses and bitmaps have no JSON rendering.
    Unrepresentable(&'static str),
    /// A JSON number outside i64/f64 range.
    UnsupportedNumber(String),
    /// JSON objects have no slot-value counterpart.
    UnsupportedObject,
}

impl fmt::Display for JsonConvertError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JsonConvertError::Unrepresentable(tag) => {
                write!(f, "{tag} values cannot be represented as JSON")
            }
            JsonConvertError::UnsupportedNumber(n) => write!(f, "unsupported number value: {n}"),
            JsonConvertError::UnsupportedObject => {
                write!(f, "JSON objects cannot be converted to slot values")
            }
        }
    }
}

impl std::error::Error for JsonConvertError {}

pub fn value_to_json(value: &Value) -> Result<serde_json::Value, JsonConvertError> {
    Ok(match value {
        Value::Symbol(l) | Value::Str(l) => serde_json::Value::String(l.text().to_string()),
        Value::InstanceName(l) => serde_json::Value::String(format!("[{}]", l.text())),
        Value::Int(i) => serde_json::Value::Number(serde_json::Number::from(*i)),
        Value::Float(x) => serde_json::Number::from_f64(*x)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::External(_) => {
            return Err(JsonConvertError::Unrepresentable("EXTERNAL-ADDRESS"));
        }
        Value::Bitmap(_) => return Err(JsonConvertError::Unrepresentable("BITMAP")),
        Value::Void => serde_json::Value::Null,
        Value::Multifield(m) => {
            let elems = m
                .iter()
                .map(value_to_json)
                .collect::<Result<Vec<_>, _>>()?;
            serde_json::Value::Array(elems)
        }
    })
}

/// JSON strings intern as symbols unless quoted in the `"\"...\""` style a
/// prior export produced; `[name]` strings intern as instance names.
pub fn value_from_json(
    atoms: &mut AtomTable,
    json: &serde_json::Value,
) -> Result<Value, JsonConvertError> {
    Ok(match json {
        serde_json::Value::Null => Value::Void,
        serde_json::Value::Bool(b) => {
            let text = if *b { "TRUE" } else { "FALSE" };
            Value::Symbol(atoms.symbol(text))
        }
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int(i)
            } else if let Some(f) = n.as_f64() {
                Value::Float(f)
            } else {
                return Err(JsonConvertError::UnsupportedNumber(n.to_string()));
            }
        }
        serde_json::Value::String(s) => {
            if s.len() >= 2 && s.starts_with('[') && s.ends_with(']') {
                Value::InstanceName(atoms.instance_name(&s[1..s.len() - 1]))
            } else {
                Value::Symbol(atoms.symbol(s))
            }
        }
        serde_json::Value::Array(items) => {
            let elems = items
                .iter()
                .map(|item| value_from_json(atoms, item))
                .collect::<Result<Vec<_>, _>>()?;
            Value::Multifield(Multifield::from_values(elems))
        }
        serde_json::Value::Object(_) => return Err(JsonConvertError::UnsupportedObject),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_scalars() {
        let mut atoms = AtomTable::new();
        let v = Value::Int(42);
        let json = value_to_json(&v).unwrap();
        assert_eq!(value_from_json(&mut atoms, &json).unwrap(), v);

        let v = Value::Float(2.5);
        let json = value_to_json(&v).unwrap();
        assert_eq!(value_from_json(&mut atoms, &json).unwrap(), v);
    }

    #[test]
    fn multifield_maps_to_array() {
        let mut atoms = AtomTable::new();
        let v = Value::Multifield(Multifield::from_values(vec![
            Value::Int(1),
            Value::Symbol(atoms.symbol("two")),
        ]));
        let json = value_to_json(&v).unwrap();
        assert!(json.is_array());
        let back = value_from_json(&mut atoms, &json).unwrap();
        assert_eq!(back, v);
    }

    #[test]
    fn bitmap_is_rejected() {
        let mut atoms = AtomTable::new();
        let v = Value::Bitmap(atoms.bitmap(&[1]));
        assert!(value_to_json(&v).is_err());
    }
}
