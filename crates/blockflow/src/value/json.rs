//! Conversion between values and JSON

use indexmap::IndexMap;
use serde_json::{Map, Number};

use super::*;
use crate::error::{BlockflowError, Result};

impl Value {
    /// Build a value from JSON. Objects become dicts with string keys.
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::None,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::str(s),
            serde_json::Value::Array(items) => {
                Value::list(items.iter().map(Value::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                let entries: IndexMap<Key, Value> = map
                    .iter()
                    .map(|(k, v)| (Key::from(k.as_str()), Value::from_json(v)))
                    .collect();
                Value::dict(entries)
            }
        }
    }

    /// Convert to JSON. Tuples become arrays, dict keys are stringified
    /// and sub-contexts become objects. Callables cannot be converted.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Value::None => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(n) => serde_json::Value::Number((*n).into()),
            Value::Float(f) => Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .ok_or_else(|| {
                    BlockflowError::Serialization(format!("{} has no JSON form", f))
                })?,
            Value::Str(s) => serde_json::Value::String(s.to_string()),
            Value::List(items) | Value::Tuple(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Value::Dict(map) => {
                let mut object = Map::new();
                for (k, v) in map.iter() {
                    let key = match k {
                        Key::Str(s) => s.to_string(),
                        other => other.to_value().to_string(),
                    };
                    object.insert(key, v.to_json()?);
                }
                serde_json::Value::Object(object)
            }
            Value::Context(ctx) => ctx.to_json()?,
            other => {
                return Err(BlockflowError::Serialization(format!(
                    "cannot serialize {} value",
                    other.type_name()
                )))
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_round_trip_of_plain_data() {
        let source = json!({"a": 1, "b": [1.5, "x", null, true]});
        let value = Value::from_json(&source);
        assert_eq!(value.to_json().unwrap(), source);
    }

    #[test]
    fn test_tuple_becomes_array() {
        let value = Value::tuple(vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(value.to_json().unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_nan_is_rejected() {
        assert!(Value::Float(f64::NAN).to_json().is_err());
    }
}
