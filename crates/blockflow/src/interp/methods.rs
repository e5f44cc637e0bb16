//! Methods of strings, lists, tuples and dicts
//!
//! Values are copied on write, so mutating methods hand back the updated
//! receiver and the caller rebinds it.

use std::rc::Rc;

use indexmap::IndexMap;

use super::binary::compare_values;
use super::index::{iter_values, normalize_index};
use super::Interpreter;
use crate::error::EvalError;
use crate::value::{Arity, Key, Kwargs, Value};

/// Outcome of a method call.
#[derive(Debug, Clone)]
pub struct MethodResult {
    /// Return value of the method
    pub value: Value,
    /// New receiver, when the method mutates it
    pub updated: Option<Value>,
}

impl MethodResult {
    fn pure(value: Value) -> Self {
        Self {
            value,
            updated: None,
        }
    }

    fn mutated(value: Value, updated: Value) -> Self {
        Self {
            value,
            updated: Some(updated),
        }
    }
}

const STR_METHODS: &[&str] = &[
    "upper",
    "lower",
    "strip",
    "lstrip",
    "rstrip",
    "split",
    "join",
    "replace",
    "startswith",
    "endswith",
    "find",
    "count",
    "format",
    "isdigit",
];

const LIST_METHODS: &[&str] = &[
    "append", "extend", "insert", "pop", "remove", "clear", "index", "count", "sort", "reverse",
    "copy",
];

const TUPLE_METHODS: &[&str] = &["index", "count"];

const DICT_METHODS: &[&str] = &[
    "keys",
    "values",
    "items",
    "get",
    "pop",
    "update",
    "clear",
    "setdefault",
    "copy",
];

/// Whether `value` has a method called `name`.
pub fn has_method(value: &Value, name: &str) -> bool {
    let table = match value {
        Value::Str(_) => STR_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Tuple(_) => TUPLE_METHODS,
        Value::Dict(_) => DICT_METHODS,
        _ => return false,
    };
    table.contains(&name)
}

fn no_method(receiver: &Value, name: &str) -> EvalError {
    EvalError::AttributeError {
        type_name: receiver.type_name().to_string(),
        attr: name.to_string(),
    }
}

fn str_arg<'a>(method: &str, value: &'a Value) -> Result<&'a str, EvalError> {
    value.as_str().ok_or_else(|| EvalError::TypeError {
        message: format!("{}() argument must be str, not {}", method, value.type_name()),
    })
}

fn int_arg(method: &str, value: &Value) -> Result<i64, EvalError> {
    value.as_int().ok_or_else(|| EvalError::TypeError {
        message: format!(
            "{}() argument must be int, not {}",
            method,
            value.type_name()
        ),
    })
}

fn kwarg<'a>(kwargs: &'a Kwargs, name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

/// Call method `name` on `receiver`.
pub fn call_method(
    interp: &Interpreter,
    receiver: &Value,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<MethodResult, EvalError> {
    interp.check_interrupt()?;
    match receiver {
        Value::Str(s) => str_method(s, name, args, kwargs).map(MethodResult::pure),
        Value::List(items) => list_method(interp, items, name, args, kwargs),
        Value::Tuple(items) => match name {
            "index" | "count" => sequence_query(items, name, args).map(MethodResult::pure),
            _ => Err(no_method(receiver, name)),
        },
        Value::Dict(map) => dict_method(map, name, args),
        _ => Err(no_method(receiver, name)),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Strings
// ═══════════════════════════════════════════════════════════════════════

fn strip_chars(args: &[Value], method: &str) -> Result<Option<Vec<char>>, EvalError> {
    match args.first() {
        None | Some(Value::None) => Ok(None),
        Some(chars) => Ok(Some(str_arg(method, chars)?.chars().collect())),
    }
}

fn str_method(s: &str, name: &str, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    let arity = match name {
        "upper" | "lower" | "isdigit" => Arity::exact(0),
        "strip" | "lstrip" | "rstrip" => Arity::range(0, 1),
        "split" => Arity::range(0, 2),
        "join" | "startswith" | "endswith" | "find" | "count" => Arity::exact(1),
        "replace" => Arity::exact(2),
        "format" => Arity::at_least(0),
        _ => return Err(no_method(&Value::str(s), name)),
    };
    arity.check(name, args.len())?;

    let value = match name {
        "upper" => Value::str(s.to_uppercase()),
        "lower" => Value::str(s.to_lowercase()),
        "isdigit" => Value::Bool(!s.is_empty() && s.chars().all(|c| c.is_ascii_digit())),
        "strip" => match strip_chars(&args, name)? {
            Some(chars) => Value::str(s.trim_matches(chars.as_slice())),
            None => Value::str(s.trim()),
        },
        "lstrip" => match strip_chars(&args, name)? {
            Some(chars) => Value::str(s.trim_start_matches(chars.as_slice())),
            None => Value::str(s.trim_start()),
        },
        "rstrip" => match strip_chars(&args, name)? {
            Some(chars) => Value::str(s.trim_end_matches(chars.as_slice())),
            None => Value::str(s.trim_end()),
        },
        "split" => {
            let maxsplit = match args.get(1) {
                Some(n) => int_arg(name, n)?,
                None => -1,
            };
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => {
                    let words = s.split_whitespace().map(Value::str);
                    if maxsplit < 0 {
                        words.collect()
                    } else {
                        split_whitespace_n(s, maxsplit as usize)
                    }
                }
                Some(sep) => {
                    let sep = str_arg(name, sep)?;
                    if sep.is_empty() {
                        return Err(EvalError::ValueError {
                            message: "empty separator".to_string(),
                        });
                    }
                    if maxsplit < 0 {
                        s.split(sep).map(Value::str).collect()
                    } else {
                        s.splitn(maxsplit as usize + 1, sep).map(Value::str).collect()
                    }
                }
            };
            Value::list(parts)
        }
        "join" => {
            let items = iter_values(&args[0])?;
            let mut parts = Vec::with_capacity(items.len());
            for item in &items {
                parts.push(str_arg(name, item)?.to_string());
            }
            Value::str(parts.join(s))
        }
        "replace" => Value::str(s.replace(str_arg(name, &args[0])?, str_arg(name, &args[1])?)),
        "startswith" => Value::Bool(s.starts_with(str_arg(name, &args[0])?)),
        "endswith" => Value::Bool(s.ends_with(str_arg(name, &args[0])?)),
        "find" => {
            let needle = str_arg(name, &args[0])?;
            match s.find(needle) {
                Some(byte) => Value::Int(s[..byte].chars().count() as i64),
                None => Value::Int(-1),
            }
        }
        "count" => {
            let needle = str_arg(name, &args[0])?;
            if needle.is_empty() {
                Value::Int(s.chars().count() as i64 + 1)
            } else {
                Value::Int(s.matches(needle).count() as i64)
            }
        }
        "format" => Value::str(format_string(s, &args, &kwargs)?),
        _ => return Err(no_method(&Value::str(s), name)),
    };
    Ok(value)
}

fn split_whitespace_n(s: &str, maxsplit: usize) -> Vec<Value> {
    let mut parts = Vec::new();
    let mut rest = s.trim_start();
    while !rest.is_empty() && parts.len() < maxsplit {
        match rest.find(char::is_whitespace) {
            Some(end) => {
                parts.push(Value::str(&rest[..end]));
                rest = rest[end..].trim_start();
            }
            None => {
                parts.push(Value::str(rest));
                rest = "";
            }
        }
    }
    if !rest.is_empty() {
        parts.push(Value::str(rest.trim_end()));
    }
    parts
}

/// `str.format` with `{}`, `{0}`, `{name}` fields and `:.Nf` / `:d` specs.
fn format_string(template: &str, args: &[Value], kwargs: &Kwargs) -> Result<String, EvalError> {
    let mut out = String::with_capacity(template.len());
    let mut chars = template.chars().peekable();
    let mut next_auto = 0;
    while let Some(ch) = chars.next() {
        match ch {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => {
                            return Err(EvalError::ValueError {
                                message: "unmatched '{' in format string".to_string(),
                            })
                        }
                    }
                }
                let (name, spec) = match field.split_once(':') {
                    Some((name, spec)) => (name.to_string(), Some(spec.to_string())),
                    None => (field, None),
                };
                let value = if name.is_empty() {
                    let value = args.get(next_auto).cloned();
                    next_auto += 1;
                    value
                } else if let Ok(position) = name.parse::<usize>() {
                    args.get(position).cloned()
                } else {
                    kwarg(kwargs, &name).cloned()
                };
                let value = value.ok_or_else(|| EvalError::KeyError { key: name.clone() })?;
                out.push_str(&format_field(&value, spec.as_deref())?);
            }
            c => out.push(c),
        }
    }
    Ok(out)
}

fn format_field(value: &Value, spec: Option<&str>) -> Result<String, EvalError> {
    let Some(spec) = spec.filter(|s| !s.is_empty()) else {
        return Ok(value.to_string());
    };
    if let Some(precision) = spec.strip_prefix('.').and_then(|p| p.strip_suffix('f')) {
        let precision: usize = precision.parse().map_err(|_| EvalError::ValueError {
            message: format!("invalid format spec '{}'", spec),
        })?;
        let f = value.as_float().ok_or_else(|| EvalError::TypeError {
            message: format!("cannot format {} as float", value.type_name()),
        })?;
        return Ok(format!("{:.*}", precision, f));
    }
    if spec == "d" {
        let n = value.as_int().ok_or_else(|| EvalError::TypeError {
            message: format!("cannot format {} as int", value.type_name()),
        })?;
        return Ok(n.to_string());
    }
    Err(EvalError::ValueError {
        message: format!("unsupported format spec '{}'", spec),
    })
}

// ═══════════════════════════════════════════════════════════════════════
// Lists and tuples
// ═══════════════════════════════════════════════════════════════════════

fn sequence_query(items: &[Value], name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
    Arity::exact(1).check(name, args.len())?;
    let needle = &args[0];
    match name {
        "count" => Ok(Value::Int(
            items.iter().filter(|v| *v == needle).count() as i64,
        )),
        _ => items
            .iter()
            .position(|v| v == needle)
            .map(Value::from)
            .ok_or_else(|| EvalError::ValueError {
                message: format!("{} is not in sequence", needle.repr()),
            }),
    }
}

fn list_method(
    interp: &Interpreter,
    items: &Rc<Vec<Value>>,
    name: &str,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<MethodResult, EvalError> {
    let mut list = items.as_ref().clone();
    let value = match name {
        "index" | "count" => return sequence_query(items, name, args).map(MethodResult::pure),
        "copy" => {
            Arity::exact(0).check(name, args.len())?;
            return Ok(MethodResult::pure(Value::list(list)));
        }
        "append" => {
            Arity::exact(1).check(name, args.len())?;
            list.extend(args);
            Value::None
        }
        "extend" => {
            Arity::exact(1).check(name, args.len())?;
            list.extend(iter_values(&args[0])?);
            Value::None
        }
        "insert" => {
            Arity::exact(2).check(name, args.len())?;
            let len = list.len() as i64;
            let at = int_arg(name, &args[0])?;
            let at = if at < 0 { (at + len).max(0) } else { at.min(len) };
            let mut args = args;
            list.insert(at as usize, args.remove(1));
            Value::None
        }
        "pop" => {
            Arity::range(0, 1).check(name, args.len())?;
            if list.is_empty() {
                return Err(EvalError::IndexOutOfRange { index: 0, len: 0 });
            }
            let at = match args.first() {
                Some(i) => normalize_index(int_arg(name, i)?, list.len())?,
                None => list.len() - 1,
            };
            list.remove(at)
        }
        "remove" => {
            Arity::exact(1).check(name, args.len())?;
            let at = list
                .iter()
                .position(|v| *v == args[0])
                .ok_or_else(|| EvalError::ValueError {
                    message: format!("{} is not in list", args[0].repr()),
                })?;
            list.remove(at);
            Value::None
        }
        "clear" => {
            Arity::exact(0).check(name, args.len())?;
            list.clear();
            Value::None
        }
        "reverse" => {
            Arity::exact(0).check(name, args.len())?;
            list.reverse();
            Value::None
        }
        "sort" => {
            Arity::exact(0).check(name, args.len())?;
            let key = kwarg(&kwargs, "key").cloned();
            let reverse = kwarg(&kwargs, "reverse").is_some_and(Value::truthy);
            list = sort_values(interp, list, key.as_ref(), reverse)?;
            Value::None
        }
        _ => return Err(no_method(&Value::List(items.clone()), name)),
    };
    Ok(MethodResult::mutated(value, Value::list(list)))
}

/// Stable sort, optionally by a key function.
pub fn sort_values(
    interp: &Interpreter,
    items: Vec<Value>,
    key: Option<&Value>,
    reverse: bool,
) -> Result<Vec<Value>, EvalError> {
    let mut keyed = Vec::with_capacity(items.len());
    for item in items {
        let k = match key {
            Some(Value::None) | None => item.clone(),
            Some(func) => interp.call_value(func, vec![item.clone()], Vec::new())?,
        };
        keyed.push((k, item));
    }
    // Surface type errors before sorting
    for pair in keyed.windows(2) {
        compare_values(&pair[0].0, &pair[1].0)?;
    }
    keyed.sort_by(|a, b| {
        let ord = compare_values(&a.0, &b.0).unwrap_or(std::cmp::Ordering::Equal);
        if reverse {
            ord.reverse()
        } else {
            ord
        }
    });
    Ok(keyed.into_iter().map(|(_, item)| item).collect())
}

// ═══════════════════════════════════════════════════════════════════════
// Dicts
// ═══════════════════════════════════════════════════════════════════════

fn dict_method(
    map: &Rc<IndexMap<Key, Value>>,
    name: &str,
    args: Vec<Value>,
) -> Result<MethodResult, EvalError> {
    let pure = |value| Ok(MethodResult::pure(value));
    match name {
        "keys" => {
            Arity::exact(0).check(name, args.len())?;
            pure(Value::list(map.keys().map(Key::to_value).collect()))
        }
        "values" => {
            Arity::exact(0).check(name, args.len())?;
            pure(Value::list(map.values().cloned().collect()))
        }
        "items" => {
            Arity::exact(0).check(name, args.len())?;
            pure(Value::list(
                map.iter()
                    .map(|(k, v)| Value::tuple(vec![k.to_value(), v.clone()]))
                    .collect(),
            ))
        }
        "get" => {
            Arity::range(1, 2).check(name, args.len())?;
            let key = Key::from_value(&args[0])?;
            pure(
                map.get(&key)
                    .cloned()
                    .or_else(|| args.get(1).cloned())
                    .unwrap_or(Value::None),
            )
        }
        "copy" => {
            Arity::exact(0).check(name, args.len())?;
            pure(Value::Dict(Rc::new(map.as_ref().clone())))
        }
        "pop" => {
            Arity::range(1, 2).check(name, args.len())?;
            let key = Key::from_value(&args[0])?;
            let mut updated = map.as_ref().clone();
            match updated.shift_remove(&key) {
                Some(value) => Ok(MethodResult::mutated(value, Value::dict(updated))),
                None => args
                    .get(1)
                    .cloned()
                    .map(MethodResult::pure)
                    .ok_or_else(|| EvalError::KeyError {
                        key: args[0].repr(),
                    }),
            }
        }
        "update" => {
            Arity::exact(1).check(name, args.len())?;
            let Value::Dict(other) = &args[0] else {
                return Err(EvalError::TypeError {
                    message: format!("update() argument must be dict, not {}", args[0].type_name()),
                });
            };
            let mut updated = map.as_ref().clone();
            for (k, v) in other.iter() {
                updated.insert(k.clone(), v.clone());
            }
            Ok(MethodResult::mutated(Value::None, Value::dict(updated)))
        }
        "clear" => {
            Arity::exact(0).check(name, args.len())?;
            Ok(MethodResult::mutated(Value::None, Value::dict(IndexMap::new())))
        }
        "setdefault" => {
            Arity::range(1, 2).check(name, args.len())?;
            let key = Key::from_value(&args[0])?;
            if let Some(existing) = map.get(&key) {
                return pure(existing.clone());
            }
            let default = args.get(1).cloned().unwrap_or(Value::None);
            let mut updated = map.as_ref().clone();
            updated.insert(key, default.clone());
            Ok(MethodResult::mutated(default, Value::dict(updated)))
        }
        _ => Err(no_method(&Value::Dict(map.clone()), name)),
    }
}
