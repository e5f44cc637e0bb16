//! Standard prelude with built-in functions

use indexmap::IndexMap;

use super::binary::{binary_op, compare_values};
use super::index::iter_values;
use super::methods::sort_values;
use super::Interpreter;
use crate::ast::BinOp;
use crate::error::EvalError;
use crate::value::{Arity, BuiltinFn, Key, Kwargs, Namespace, Value};

type NativeFn = fn(&Interpreter, Vec<Value>, Kwargs) -> Result<Value, EvalError>;

const BUILTINS: &[(&str, Arity, NativeFn)] = &[
    // Output
    ("print", Arity::at_least(0), builtin_print),
    ("repr", Arity::exact(1), builtin_repr),
    // Sequences
    ("len", Arity::exact(1), builtin_len),
    ("range", Arity::range(1, 3), builtin_range),
    ("zip", Arity::at_least(0), builtin_zip),
    ("enumerate", Arity::range(1, 2), builtin_enumerate),
    ("sorted", Arity::exact(1), builtin_sorted),
    ("reversed", Arity::exact(1), builtin_reversed),
    ("any", Arity::exact(1), builtin_any),
    ("all", Arity::exact(1), builtin_all),
    // Arithmetic
    ("sum", Arity::range(1, 2), builtin_sum),
    ("min", Arity::at_least(1), builtin_min),
    ("max", Arity::at_least(1), builtin_max),
    ("abs", Arity::exact(1), builtin_abs),
    ("round", Arity::range(1, 2), builtin_round),
    // Conversions
    ("int", Arity::range(0, 1), builtin_int),
    ("float", Arity::range(0, 1), builtin_float),
    ("str", Arity::range(0, 1), builtin_str),
    ("bool", Arity::range(0, 1), builtin_bool),
    ("list", Arity::range(0, 1), builtin_list),
    ("tuple", Arity::range(0, 1), builtin_tuple),
    ("dict", Arity::range(0, 1), builtin_dict),
    ("type", Arity::exact(1), builtin_type),
];

/// Namespace holding every built-in function.
pub fn prelude() -> Namespace {
    BUILTINS
        .iter()
        .map(|(name, arity, func)| {
            let builtin = BuiltinFn::new(*name, *arity, *func);
            (name.to_string(), Value::Builtin(builtin))
        })
        .collect()
}

/// Names of all built-in functions.
pub fn builtin_names() -> impl Iterator<Item = &'static str> {
    BUILTINS.iter().map(|(name, _, _)| *name)
}

/// Whether `name` is a built-in function.
pub fn is_builtin(name: &str) -> bool {
    builtin_names().any(|n| n == name)
}

fn kwarg<'a>(kwargs: &'a Kwargs, name: &str) -> Option<&'a Value> {
    kwargs.iter().find(|(k, _)| k == name).map(|(_, v)| v)
}

fn builtin_error(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::Builtin {
        name: name.to_string(),
        message: message.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Built-in Function Implementations
// ═══════════════════════════════════════════════════════════════════════

fn builtin_print(_: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    let sep = kwarg(&kwargs, "sep").map_or(" ".to_string(), |v| v.to_string());
    let end = kwarg(&kwargs, "end").map_or("\n".to_string(), |v| v.to_string());
    let line: Vec<String> = args.iter().map(|v| v.to_string()).collect();
    print!("{}{}", line.join(&sep), end);
    Ok(Value::None)
}

fn builtin_repr(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::str(args[0].repr()))
}

fn builtin_len(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let len = match &args[0] {
        Value::Str(s) => s.chars().count(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        Value::Dict(map) => map.len(),
        Value::Context(ctx) => ctx.keys().len(),
        other => {
            return Err(EvalError::TypeError {
                message: format!("object of type '{}' has no len()", other.type_name()),
            })
        }
    };
    Ok(Value::from(len))
}

fn builtin_range(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let mut bounds = Vec::with_capacity(args.len());
    for arg in &args {
        bounds.push(arg.as_int().ok_or_else(|| EvalError::TypeError {
            message: format!("range() arguments must be int, not {}", arg.type_name()),
        })?);
    }
    let (start, stop, step) = match bounds.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => return Err(builtin_error("range", "expected 1 to 3 arguments")),
    };
    if step == 0 {
        return Err(builtin_error("range", "step must not be zero"));
    }
    let mut items = Vec::new();
    let mut i = start;
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        items.push(Value::Int(i));
        i += step;
    }
    Ok(Value::list(items))
}

fn builtin_zip(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let columns = args
        .iter()
        .map(iter_values)
        .collect::<Result<Vec<_>, _>>()?;
    let len = columns.iter().map(Vec::len).min().unwrap_or(0);
    let rows = (0..len)
        .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
        .collect();
    Ok(Value::list(rows))
}

fn builtin_enumerate(_: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    let start = args
        .get(1)
        .or_else(|| kwarg(&kwargs, "start"))
        .map_or(Some(0), Value::as_int)
        .ok_or_else(|| builtin_error("enumerate", "start must be an int"))?;
    let rows = iter_values(&args[0])?
        .into_iter()
        .enumerate()
        .map(|(i, v)| Value::tuple(vec![Value::Int(start + i as i64), v]))
        .collect();
    Ok(Value::list(rows))
}

fn builtin_sorted(interp: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    let key = kwarg(&kwargs, "key");
    let reverse = kwarg(&kwargs, "reverse").is_some_and(Value::truthy);
    Ok(Value::list(sort_values(
        interp,
        iter_values(&args[0])?,
        key,
        reverse,
    )?))
}

fn builtin_reversed(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let mut items = iter_values(&args[0])?;
    items.reverse();
    Ok(Value::list(items))
}

fn builtin_any(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::Bool(iter_values(&args[0])?.iter().any(Value::truthy)))
}

fn builtin_all(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::Bool(iter_values(&args[0])?.iter().all(Value::truthy)))
}

fn builtin_sum(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let mut total = args.get(1).cloned().unwrap_or(Value::Int(0));
    for item in iter_values(&args[0])? {
        total = binary_op(BinOp::Add, &total, &item)?;
    }
    Ok(total)
}

fn extremum(
    interp: &Interpreter,
    name: &str,
    args: Vec<Value>,
    kwargs: &Kwargs,
    want: std::cmp::Ordering,
) -> Result<Value, EvalError> {
    let candidates = if args.len() == 1 {
        iter_values(&args[0])?
    } else {
        args
    };
    let key = kwarg(kwargs, "key").filter(|k| !k.is_none());
    let mut best: Option<(Value, Value)> = None;
    for item in candidates {
        let k = match key {
            Some(func) => interp.call_value(func, vec![item.clone()], Vec::new())?,
            None => item.clone(),
        };
        let replace = match &best {
            None => true,
            Some((best_key, _)) => compare_values(&k, best_key)? == want,
        };
        if replace {
            best = Some((k, item));
        }
    }
    match best {
        Some((_, item)) => Ok(item),
        None => match kwarg(kwargs, "default") {
            Some(default) => Ok(default.clone()),
            None => Err(EvalError::ValueError {
                message: format!("{}() arg is an empty sequence", name),
            }),
        },
    }
}

fn builtin_min(interp: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    extremum(interp, "min", args, &kwargs, std::cmp::Ordering::Less)
}

fn builtin_max(interp: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    extremum(interp, "max", args, &kwargs, std::cmp::Ordering::Greater)
}

fn builtin_abs(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    match &args[0] {
        Value::Int(n) => n.checked_abs().map(Value::Int).ok_or(EvalError::Overflow {
            op: "abs".to_string(),
        }),
        Value::Bool(b) => Ok(Value::Int(*b as i64)),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EvalError::TypeError {
            message: format!("bad operand type for abs(): '{}'", other.type_name()),
        }),
    }
}

fn builtin_round(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    let digits = match args.get(1) {
        None | Some(Value::None) => None,
        Some(d) => Some(
            d.as_int()
                .ok_or_else(|| builtin_error("round", "ndigits must be an int"))?,
        ),
    };
    match (&args[0], digits) {
        (Value::Int(n), _) => Ok(Value::Int(*n)),
        (Value::Bool(b), _) => Ok(Value::Int(*b as i64)),
        (Value::Float(f), None) => {
            let rounded = f.round_ties_even();
            if !rounded.is_finite() {
                return Err(builtin_error("round", "cannot convert non-finite float to int"));
            }
            Ok(Value::Int(rounded as i64))
        }
        (Value::Float(f), Some(d)) => {
            let scale = 10f64.powi(d as i32);
            Ok(Value::Float((f * scale).round_ties_even() / scale))
        }
        (other, _) => Err(EvalError::TypeError {
            message: format!("type {} doesn't define __round__", other.type_name()),
        }),
    }
}

fn builtin_int(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    match args.first() {
        None => Ok(Value::Int(0)),
        Some(Value::Int(n)) => Ok(Value::Int(*n)),
        Some(Value::Bool(b)) => Ok(Value::Int(*b as i64)),
        Some(Value::Float(f)) if f.is_finite() => Ok(Value::Int(f.trunc() as i64)),
        Some(Value::Str(s)) => s
            .trim()
            .replace('_', "")
            .parse::<i64>()
            .map(Value::Int)
            .map_err(|_| EvalError::ValueError {
                message: format!("invalid literal for int(): {}", Value::Str(s.clone()).repr()),
            }),
        Some(other) => Err(EvalError::TypeError {
            message: format!("int() argument must be a string or a number, not {}", other.type_name()),
        }),
    }
}

fn builtin_float(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    match args.first() {
        None => Ok(Value::Float(0.0)),
        Some(Value::Str(s)) => {
            let text = s.trim().to_lowercase();
            let parsed = match text.as_str() {
                "nan" | "+nan" | "-nan" => Some(f64::NAN),
                "inf" | "+inf" | "infinity" | "+infinity" => Some(f64::INFINITY),
                "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
                _ => text.parse::<f64>().ok(),
            };
            parsed.map(Value::Float).ok_or_else(|| EvalError::ValueError {
                message: format!(
                    "could not convert string to float: {}",
                    Value::Str(s.clone()).repr()
                ),
            })
        }
        Some(value) => value.as_float().map(Value::Float).ok_or_else(|| EvalError::TypeError {
            message: format!("float() argument must be a string or a number, not {}", value.type_name()),
        }),
    }
}

fn builtin_str(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::str(args.first().map(|v| v.to_string()).unwrap_or_default()))
}

fn builtin_bool(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::Bool(args.first().is_some_and(Value::truthy)))
}

fn builtin_list(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    match args.first() {
        Some(value) => Ok(Value::list(iter_values(value)?)),
        None => Ok(Value::list(Vec::new())),
    }
}

fn builtin_tuple(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    match args.first() {
        Some(value) => Ok(Value::tuple(iter_values(value)?)),
        None => Ok(Value::tuple(Vec::new())),
    }
}

fn builtin_dict(_: &Interpreter, args: Vec<Value>, kwargs: Kwargs) -> Result<Value, EvalError> {
    let mut map = IndexMap::new();
    match args.first() {
        Some(Value::Dict(existing)) => map = existing.as_ref().clone(),
        Some(Value::Context(ctx)) => {
            for key in ctx.keys() {
                if let Some(value) = ctx.get(&key) {
                    map.insert(Key::from(key.as_str()), value);
                }
            }
        }
        Some(pairs) => {
            for pair in iter_values(pairs)? {
                match iter_values(&pair)?.as_slice() {
                    [k, v] => {
                        map.insert(Key::from_value(k)?, v.clone());
                    }
                    _ => {
                        return Err(builtin_error(
                            "dict",
                            "sequence elements must be key/value pairs",
                        ))
                    }
                }
            }
        }
        None => {}
    }
    for (k, v) in kwargs {
        map.insert(Key::from(k.as_str()), v);
    }
    Ok(Value::dict(map))
}

fn builtin_type(_: &Interpreter, args: Vec<Value>, _: Kwargs) -> Result<Value, EvalError> {
    Ok(Value::str(args[0].type_name()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let interp = Interpreter::default();
        let func = interp.builtin(name).unwrap();
        interp.call_value(&func, args, Vec::new())
    }

    #[test]
    fn test_builtin_names() {
        assert!(is_builtin("len"));
        assert!(is_builtin("print"));
        assert!(!is_builtin("numpy"));
        assert_eq!(builtin_names().count(), prelude().len());
    }

    #[test]
    fn test_range_and_sum() {
        let xs = call("range", vec![Value::Int(1), Value::Int(10), Value::Int(3)]).unwrap();
        assert_eq!(xs.repr(), "[1, 4, 7]");
        assert_eq!(call("sum", vec![xs]).unwrap(), Value::Int(12));
        assert!(call("range", vec![Value::Int(1), Value::Int(2), Value::Int(0)]).is_err());
    }

    #[test]
    fn test_round_is_bankers() {
        assert_eq!(call("round", vec![Value::Float(2.5)]).unwrap(), Value::Int(2));
        assert_eq!(call("round", vec![Value::Float(3.5)]).unwrap(), Value::Int(4));
    }

    #[test]
    fn test_min_max() {
        let xs = Value::list(vec![Value::Int(3), Value::Int(1), Value::Int(2)]);
        assert_eq!(call("min", vec![xs.clone()]).unwrap(), Value::Int(1));
        assert_eq!(call("max", vec![xs]).unwrap(), Value::Int(3));
        assert!(call("max", vec![Value::list(vec![])]).is_err());
    }

    #[test]
    fn test_conversions() {
        assert_eq!(call("int", vec![Value::str(" 42 ")]).unwrap(), Value::Int(42));
        assert_eq!(call("int", vec![Value::Float(-2.7)]).unwrap(), Value::Int(-2));
        assert!(call("float", vec![Value::str("nan")]).unwrap().as_float().unwrap().is_nan());
        assert_eq!(call("str", vec![Value::Int(5)]).unwrap(), Value::str("5"));
        assert!(call("int", vec![Value::str("x")]).is_err());
    }
}
