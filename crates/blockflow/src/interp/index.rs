//! Indexing, slicing and iteration

use crate::error::EvalError;
use crate::value::{Key, Value};

/// Items produced by iterating over a value.
pub fn iter_values(value: &Value) -> Result<Vec<Value>, EvalError> {
    match value {
        Value::List(items) | Value::Tuple(items) => Ok(items.as_ref().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Dict(map) => Ok(map.keys().map(Key::to_value).collect()),
        Value::Context(ctx) => Ok(ctx.keys().into_iter().map(Value::from).collect()),
        other => Err(EvalError::TypeError {
            message: format!("'{}' object is not iterable", other.type_name()),
        }),
    }
}

/// Resolve a possibly negative index against a length.
pub fn normalize_index(index: i64, len: usize) -> Result<usize, EvalError> {
    let resolved = if index < 0 {
        index + len as i64
    } else {
        index
    };
    if resolved < 0 || resolved >= len as i64 {
        return Err(EvalError::IndexOutOfRange { index, len });
    }
    Ok(resolved as usize)
}

fn index_of(index: &Value) -> Result<i64, EvalError> {
    index.as_int().ok_or_else(|| EvalError::TypeError {
        message: format!("indices must be integers, not {}", index.type_name()),
    })
}

/// `container[index]`
pub fn get_item(container: &Value, index: &Value) -> Result<Value, EvalError> {
    match container {
        Value::List(items) | Value::Tuple(items) => {
            let i = normalize_index(index_of(index)?, items.len())?;
            Ok(items[i].clone())
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let i = normalize_index(index_of(index)?, chars.len())?;
            Ok(Value::str(chars[i].to_string()))
        }
        Value::Dict(map) => map
            .get(&Key::from_value(index)?)
            .cloned()
            .ok_or_else(|| EvalError::KeyError { key: index.repr() }),
        Value::Context(ctx) => {
            let key = index.as_str().ok_or_else(|| EvalError::TypeError {
                message: format!("context keys must be str, not {}", index.type_name()),
            })?;
            ctx.get(key)
                .ok_or_else(|| EvalError::KeyError { key: index.repr() })
        }
        other => Err(EvalError::TypeError {
            message: format!("'{}' object is not subscriptable", other.type_name()),
        }),
    }
}

/// Positions selected by a slice, following the host-language clamping
/// rules.
pub fn slice_positions(
    len: usize,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Vec<usize>, EvalError> {
    let step = step.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::ValueError {
            message: "slice step cannot be zero".to_string(),
        });
    }
    let len = len as i64;
    let clamp = |bound: i64, lo: i64, hi: i64| {
        let bound = if bound < 0 { bound + len } else { bound };
        bound.clamp(lo, hi)
    };
    let mut positions = Vec::new();
    if step > 0 {
        let start = lower.map_or(0, |b| clamp(b, 0, len));
        let stop = upper.map_or(len, |b| clamp(b, 0, len));
        let mut i = start;
        while i < stop {
            positions.push(i as usize);
            i += step;
        }
    } else {
        let start = lower.map_or(len - 1, |b| clamp(b, -1, len - 1));
        let stop = upper.map_or(-1, |b| clamp(b, -1, len - 1));
        let mut i = start;
        while i > stop {
            positions.push(i as usize);
            i += step;
        }
    }
    Ok(positions)
}

/// `container[lower:upper:step]`
pub fn get_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    step: Option<i64>,
) -> Result<Value, EvalError> {
    match container {
        Value::List(items) => {
            let positions = slice_positions(items.len(), lower, upper, step)?;
            Ok(Value::list(positions.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Tuple(items) => {
            let positions = slice_positions(items.len(), lower, upper, step)?;
            Ok(Value::tuple(positions.into_iter().map(|i| items[i].clone()).collect()))
        }
        Value::Str(s) => {
            let chars: Vec<char> = s.chars().collect();
            let positions = slice_positions(chars.len(), lower, upper, step)?;
            Ok(Value::str(positions.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        other => Err(EvalError::TypeError {
            message: format!("'{}' object is not sliceable", other.type_name()),
        }),
    }
}

/// `container[index] = value`.
///
/// Returns the updated container, or `None` when the container was a
/// context and has been written in place.
pub fn set_item(container: &Value, index: &Value, value: Value) -> Result<Option<Value>, EvalError> {
    match container {
        Value::List(items) => {
            let i = normalize_index(index_of(index)?, items.len())?;
            let mut items = items.clone();
            std::rc::Rc::make_mut(&mut items)[i] = value;
            Ok(Some(Value::List(items)))
        }
        Value::Dict(map) => {
            let mut map = map.clone();
            std::rc::Rc::make_mut(&mut map).insert(Key::from_value(index)?, value);
            Ok(Some(Value::Dict(map)))
        }
        Value::Context(ctx) => {
            let key = index.as_str().ok_or_else(|| EvalError::TypeError {
                message: format!("context keys must be str, not {}", index.type_name()),
            })?;
            ctx.set(key, value)?;
            Ok(None)
        }
        other => Err(EvalError::TypeError {
            message: format!(
                "'{}' object does not support item assignment",
                other.type_name()
            ),
        }),
    }
}

/// `container[lower:upper] = value` for lists.
pub fn set_slice(
    container: &Value,
    lower: Option<i64>,
    upper: Option<i64>,
    value: &Value,
) -> Result<Value, EvalError> {
    let Value::List(items) = container else {
        return Err(EvalError::TypeError {
            message: format!(
                "'{}' object does not support slice assignment",
                container.type_name()
            ),
        });
    };
    let positions = slice_positions(items.len(), lower, upper, None)?;
    let start = positions.first().copied().unwrap_or_else(|| {
        lower
            .map(|b| if b < 0 { b + items.len() as i64 } else { b })
            .unwrap_or(0)
            .clamp(0, items.len() as i64) as usize
    });
    let end = positions.last().map_or(start, |last| last + 1);
    let mut out = items.as_ref().clone();
    out.splice(start..end, iter_values(value)?);
    Ok(Value::list(out))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn test_negative_index() {
        assert_eq!(get_item(&ints(&[1, 2, 3]), &Value::Int(-1)).unwrap(), Value::Int(3));
        assert!(matches!(
            get_item(&ints(&[1]), &Value::Int(3)),
            Err(EvalError::IndexOutOfRange { index: 3, len: 1 })
        ));
    }

    #[test]
    fn test_slices() {
        let xs = ints(&[0, 1, 2, 3, 4]);
        assert_eq!(get_slice(&xs, Some(1), Some(3), None).unwrap(), ints(&[1, 2]));
        assert_eq!(get_slice(&xs, None, None, Some(-1)).unwrap(), ints(&[4, 3, 2, 1, 0]));
        assert_eq!(get_slice(&xs, Some(-2), None, None).unwrap(), ints(&[3, 4]));
        assert_eq!(get_slice(&xs, None, None, Some(2)).unwrap(), ints(&[0, 2, 4]));
        assert_eq!(
            get_slice(&Value::str("hello"), Some(1), Some(-1), None).unwrap(),
            Value::str("ell")
        );
    }

    #[test]
    fn test_set_item_copies_on_write() {
        let original = ints(&[1, 2]);
        let updated = set_item(&original, &Value::Int(0), Value::Int(9))
            .unwrap()
            .unwrap();
        assert_eq!(original, ints(&[1, 2]));
        assert_eq!(updated, ints(&[9, 2]));
    }

    #[test]
    fn test_set_slice() {
        let xs = ints(&[0, 1, 2, 3]);
        assert_eq!(
            set_slice(&xs, Some(1), Some(3), &ints(&[7])).unwrap(),
            ints(&[0, 7, 3])
        );
        assert_eq!(
            set_slice(&xs, Some(2), Some(2), &ints(&[5, 6])).unwrap(),
            ints(&[0, 1, 5, 6, 2, 3])
        );
    }
}
