//! Operator evaluation: arithmetic, comparison and membership

use std::cmp::Ordering;
use std::rc::Rc;

use crate::ast::{BinOp, CmpOp, UnaryOp};
use crate::error::EvalError;
use crate::value::{Key, Value};

/// Numeric view of a value; bools act as integers.
#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

fn num(value: &Value) -> Option<Num> {
    match value {
        Value::Int(n) => Some(Num::Int(*n)),
        Value::Bool(b) => Some(Num::Int(*b as i64)),
        Value::Float(f) => Some(Num::Float(*f)),
        _ => None,
    }
}

fn unsupported(op: &str, left: &Value, right: &Value) -> EvalError {
    EvalError::TypeError {
        message: format!(
            "unsupported operand type(s) for {}: '{}' and '{}'",
            op,
            left.type_name(),
            right.type_name()
        ),
    }
}

fn overflow(op: BinOp) -> EvalError {
    EvalError::Overflow {
        op: op.symbol().to_string(),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Arithmetic
// ═══════════════════════════════════════════════════════════════════════

/// Apply a binary operator.
pub fn binary_op(op: BinOp, left: &Value, right: &Value) -> Result<Value, EvalError> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        return numeric_op(op, a, b);
    }
    match (op, left, right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::str(format!("{}{}", a, b))),
        (BinOp::Add, Value::List(a), Value::List(b)) => {
            Ok(Value::list(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Add, Value::Tuple(a), Value::Tuple(b)) => {
            Ok(Value::tuple(a.iter().chain(b.iter()).cloned().collect()))
        }
        (BinOp::Mul, seq, count) | (BinOp::Mul, count, seq)
            if matches!(seq, Value::Str(_) | Value::List(_) | Value::Tuple(_))
                && matches!(count, Value::Int(_) | Value::Bool(_)) =>
        {
            let times = usize::try_from(count.as_int().unwrap_or(0).max(0))
                .map_err(|_| overflow(op))?;
            repeat(seq, times).ok_or_else(|| overflow(op))
        }
        _ => Err(unsupported(op.symbol(), left, right)),
    }
}

/// Largest sequence, in elements or bytes, repetition may build.
const MAX_REPEAT_LEN: usize = 1 << 30;

/// `None` when the result would exceed [`MAX_REPEAT_LEN`].
fn repeat(seq: &Value, times: usize) -> Option<Value> {
    let len = match seq {
        Value::Str(s) => s.len(),
        Value::List(items) | Value::Tuple(items) => items.len(),
        _ => 0,
    };
    if len.checked_mul(times)? > MAX_REPEAT_LEN {
        return None;
    }
    Some(match seq {
        Value::Str(s) => Value::str(s.repeat(times)),
        Value::List(items) => Value::list(repeat_items(items, times)),
        Value::Tuple(items) => Value::tuple(repeat_items(items, times)),
        other => other.clone(),
    })
}

fn repeat_items(items: &Rc<Vec<Value>>, times: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(items.len() * times);
    for _ in 0..times {
        out.extend(items.iter().cloned());
    }
    out
}

fn numeric_op(op: BinOp, a: Num, b: Num) -> Result<Value, EvalError> {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => int_op(op, x, y),
        (x, y) => float_op(op, to_f64(x), to_f64(y)),
    }
}

fn to_f64(n: Num) -> f64 {
    match n {
        Num::Int(i) => i as f64,
        Num::Float(f) => f,
    }
}

fn int_op(op: BinOp, x: i64, y: i64) -> Result<Value, EvalError> {
    let value = match op {
        BinOp::Add => x.checked_add(y).ok_or_else(|| overflow(op))?,
        BinOp::Sub => x.checked_sub(y).ok_or_else(|| overflow(op))?,
        BinOp::Mul => x.checked_mul(y).ok_or_else(|| overflow(op))?,
        BinOp::Div => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            return Ok(Value::Float(x as f64 / y as f64));
        }
        BinOp::FloorDiv => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let q = x.checked_div(y).ok_or_else(|| overflow(op))?;
            if x % y != 0 && ((x < 0) != (y < 0)) {
                q - 1
            } else {
                q
            }
        }
        BinOp::Mod => {
            if y == 0 {
                return Err(EvalError::ZeroDivision);
            }
            let r = x.checked_rem(y).ok_or_else(|| overflow(op))?;
            if r != 0 && ((r < 0) != (y < 0)) {
                r + y
            } else {
                r
            }
        }
        BinOp::Pow => {
            if y < 0 {
                return Ok(Value::Float((x as f64).powf(y as f64)));
            }
            let exp = u32::try_from(y).map_err(|_| overflow(op))?;
            x.checked_pow(exp).ok_or_else(|| overflow(op))?
        }
    };
    Ok(Value::Int(value))
}

fn float_op(op: BinOp, x: f64, y: f64) -> Result<Value, EvalError> {
    let value = match op {
        BinOp::Add => x + y,
        BinOp::Sub => x - y,
        BinOp::Mul => x * y,
        BinOp::Div => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            x / y
        }
        BinOp::FloorDiv => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            (x / y).floor()
        }
        BinOp::Mod => {
            if y == 0.0 {
                return Err(EvalError::ZeroDivision);
            }
            x - y * (x / y).floor()
        }
        BinOp::Pow => x.powf(y),
    };
    Ok(Value::Float(value))
}

/// Apply a unary operator.
pub fn unary_op(op: UnaryOp, operand: &Value) -> Result<Value, EvalError> {
    match (op, num(operand)) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!operand.truthy())),
        (UnaryOp::Neg, Some(Num::Int(n))) => n
            .checked_neg()
            .map(Value::Int)
            .ok_or_else(|| EvalError::Overflow {
                op: "-".to_string(),
            }),
        (UnaryOp::Neg, Some(Num::Float(f))) => Ok(Value::Float(-f)),
        (UnaryOp::Pos, Some(Num::Int(n))) => Ok(Value::Int(n)),
        (UnaryOp::Pos, Some(Num::Float(f))) => Ok(Value::Float(f)),
        (op, None) => Err(EvalError::TypeError {
            message: format!(
                "bad operand type for unary {}: '{}'",
                if op == UnaryOp::Neg { "-" } else { "+" },
                operand.type_name()
            ),
        }),
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Comparison
// ═══════════════════════════════════════════════════════════════════════

/// Order two values. NaN compares as unordered (`None`).
pub fn partial_order(left: &Value, right: &Value) -> Result<Option<Ordering>, EvalError> {
    if let (Some(a), Some(b)) = (num(left), num(right)) {
        return Ok(match (a, b) {
            (Num::Int(x), Num::Int(y)) => Some(x.cmp(&y)),
            (x, y) => to_f64(x).partial_cmp(&to_f64(y)),
        });
    }
    match (left, right) {
        (Value::Str(a), Value::Str(b)) => Ok(Some(a.cmp(b))),
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => {
            for (x, y) in a.iter().zip(b.iter()) {
                if x == y {
                    continue;
                }
                return partial_order(x, y);
            }
            Ok(Some(a.len().cmp(&b.len())))
        }
        _ => Err(EvalError::TypeError {
            message: format!(
                "'<' not supported between instances of '{}' and '{}'",
                left.type_name(),
                right.type_name()
            ),
        }),
    }
}

/// Total order used by `sorted`, `min` and `max`; unordered pairs are equal.
pub fn compare_values(left: &Value, right: &Value) -> Result<Ordering, EvalError> {
    Ok(partial_order(left, right)?.unwrap_or(Ordering::Equal))
}

/// Evaluate one comparison operator.
pub fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, EvalError> {
    Ok(match op {
        CmpOp::Eq => left == right,
        CmpOp::NotEq => left != right,
        CmpOp::Lt => partial_order(left, right)? == Some(Ordering::Less),
        CmpOp::LtE => matches!(
            partial_order(left, right)?,
            Some(Ordering::Less | Ordering::Equal)
        ),
        CmpOp::Gt => partial_order(left, right)? == Some(Ordering::Greater),
        CmpOp::GtE => matches!(
            partial_order(left, right)?,
            Some(Ordering::Greater | Ordering::Equal)
        ),
        CmpOp::In => contains(right, left)?,
        CmpOp::NotIn => !contains(right, left)?,
        CmpOp::Is => is_same(left, right),
        CmpOp::IsNot => !is_same(left, right),
    })
}

/// Membership test: `item in container`.
pub fn contains(container: &Value, item: &Value) -> Result<bool, EvalError> {
    match container {
        Value::List(items) | Value::Tuple(items) => Ok(items.iter().any(|v| v == item)),
        Value::Str(s) => match item {
            Value::Str(needle) => Ok(s.contains(needle.as_ref())),
            other => Err(EvalError::TypeError {
                message: format!(
                    "'in <string>' requires string as left operand, not {}",
                    other.type_name()
                ),
            }),
        },
        Value::Dict(map) => Ok(map.contains_key(&Key::from_value(item)?)),
        Value::Context(ctx) => Ok(item.as_str().is_some_and(|k| ctx.contains_key(k))),
        other => Err(EvalError::TypeError {
            message: format!("argument of type '{}' is not iterable", other.type_name()),
        }),
    }
}

/// Identity: scalars by value, shared values by pointer.
pub fn is_same(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::None, Value::None) => true,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::Int(a), Value::Int(b)) => a == b,
        (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
        (Value::Str(a), Value::Str(b)) => Rc::ptr_eq(a, b) || a == b,
        (Value::List(a), Value::List(b)) | (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
        (Value::Dict(a), Value::Dict(b)) => Rc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Rc::ptr_eq(a, b),
        (Value::Module(a), Value::Module(b)) => Rc::ptr_eq(a, b),
        (Value::Context(a), Value::Context(b)) => a.ptr_eq(b),
        (Value::Builtin(a), Value::Builtin(b)) => Rc::ptr_eq(&a.func, &b.func),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(op: BinOp, a: impl Into<Value>, b: impl Into<Value>) -> Value {
        binary_op(op, &a.into(), &b.into()).unwrap()
    }

    #[test]
    fn test_true_division_yields_float() {
        assert!(matches!(op(BinOp::Div, 7, 2), Value::Float(f) if f == 3.5));
    }

    #[test]
    fn test_floor_semantics() {
        assert_eq!(op(BinOp::FloorDiv, -7, 2), Value::Int(-4));
        assert_eq!(op(BinOp::Mod, -7, 2), Value::Int(1));
        assert_eq!(op(BinOp::Mod, 7, -2), Value::Int(-1));
        assert_eq!(op(BinOp::FloorDiv, 7.0, 2), Value::Float(3.0));
    }

    #[test]
    fn test_errors() {
        assert!(matches!(
            binary_op(BinOp::Div, &Value::Int(1), &Value::Int(0)),
            Err(EvalError::ZeroDivision)
        ));
        assert!(matches!(
            binary_op(BinOp::Add, &Value::Int(i64::MAX), &Value::Int(1)),
            Err(EvalError::Overflow { .. })
        ));
        assert!(matches!(
            binary_op(BinOp::Add, &Value::Int(1), &Value::str("a")),
            Err(EvalError::TypeError { .. })
        ));
    }

    #[test]
    fn test_sequences() {
        assert_eq!(op(BinOp::Add, "ab", "cd"), Value::str("abcd"));
        assert_eq!(op(BinOp::Mul, "ab", 2), Value::str("abab"));
        assert_eq!(
            op(BinOp::Mul, 2, Value::list(vec![Value::Int(1)])),
            Value::list(vec![Value::Int(1), Value::Int(1)])
        );
        assert_eq!(op(BinOp::Pow, 2, -1), Value::Float(0.5));
    }

    #[test]
    fn test_oversized_repetition_is_an_error() {
        assert!(matches!(
            binary_op(BinOp::Mul, &Value::str("ab"), &Value::Int(1 << 62)),
            Err(EvalError::Overflow { ref op }) if op == "*"
        ));
        assert!(matches!(
            binary_op(BinOp::Mul, &Value::Int(i64::MAX), &Value::list(vec![Value::Int(1); 2])),
            Err(EvalError::Overflow { .. })
        ));
        assert_eq!(op(BinOp::Mul, "ab", -3), Value::str(""));
    }

    #[test]
    fn test_comparisons() {
        assert!(compare(CmpOp::Lt, &Value::Int(1), &Value::Float(1.5)).unwrap());
        assert!(compare(CmpOp::In, &Value::str("b"), &Value::str("abc")).unwrap());
        assert!(compare(CmpOp::Is, &Value::None, &Value::None).unwrap());
        assert!(!compare(CmpOp::Lt, &Value::Float(f64::NAN), &Value::Float(1.0)).unwrap());
        assert!(compare(CmpOp::Lt, &Value::str("a"), &Value::Int(1)).is_err());
    }
}
