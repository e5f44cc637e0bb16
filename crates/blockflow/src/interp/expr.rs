//! Expression evaluation

use indexmap::IndexMap;

use super::binary::{binary_op, compare, unary_op};
use super::index::{get_item, get_slice, iter_values};
use super::methods::has_method;
use super::{call, stmt, Evaluate, Frame, Interpreter, Scope};
use crate::ast::{BoolOp, Constant, Expr};
use crate::error::EvalError;
use crate::value::{BoundMethod, Key, Namespace, Value};

impl Evaluate for Expr {
    fn eval(&self, frame: &mut Frame<'_>, interp: &Interpreter) -> Result<Value, EvalError> {
        match self {
            Expr::Name(name) => interp.lookup(frame, name),
            Expr::Constant(c) => Ok(constant_value(c)),
            Expr::Tuple(items) => Ok(Value::tuple(eval_all(items, frame, interp)?)),
            Expr::List(items) => Ok(Value::list(eval_all(items, frame, interp)?)),
            Expr::Dict(entries) => {
                let mut map = IndexMap::with_capacity(entries.len());
                for (k, v) in entries {
                    let key = Key::from_value(&k.eval(frame, interp)?)?;
                    map.insert(key, v.eval(frame, interp)?);
                }
                Ok(Value::dict(map))
            }
            Expr::BinOp { left, op, right } => {
                let l = left.eval(frame, interp)?;
                let r = right.eval(frame, interp)?;
                binary_op(*op, &l, &r)
            }
            Expr::UnaryOp { op, operand } => unary_op(*op, &operand.eval(frame, interp)?),
            Expr::BoolOp { op, values } => {
                let mut last = Value::None;
                for value in values {
                    last = value.eval(frame, interp)?;
                    let done = match op {
                        BoolOp::And => !last.truthy(),
                        BoolOp::Or => last.truthy(),
                    };
                    if done {
                        break;
                    }
                }
                Ok(last)
            }
            Expr::Compare {
                left,
                ops,
                comparators,
            } => {
                let mut current = left.eval(frame, interp)?;
                for (op, comparator) in ops.iter().zip(comparators) {
                    let next = comparator.eval(frame, interp)?;
                    if !compare(*op, &current, &next)? {
                        return Ok(Value::Bool(false));
                    }
                    current = next;
                }
                Ok(Value::Bool(true))
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => call::eval_call(func, args, keywords, frame, interp),
            Expr::Attribute { value, attr } => {
                let receiver = value.eval(frame, interp)?;
                get_attribute(&receiver, attr)
            }
            Expr::Subscript { value, index } => {
                let container = value.eval(frame, interp)?;
                match index.as_ref() {
                    Expr::Slice { lower, upper, step } => {
                        let lower = slice_bound(lower.as_deref(), frame, interp)?;
                        let upper = slice_bound(upper.as_deref(), frame, interp)?;
                        let step = slice_bound(step.as_deref(), frame, interp)?;
                        get_slice(&container, lower, upper, step)
                    }
                    index => get_item(&container, &index.eval(frame, interp)?),
                }
            }
            Expr::Slice { .. } => Err(EvalError::Unsupported(
                "slice outside of a subscript".to_string(),
            )),
            Expr::IfExp { test, body, orelse } => {
                if test.eval(frame, interp)?.truthy() {
                    body.eval(frame, interp)
                } else {
                    orelse.eval(frame, interp)
                }
            }
            Expr::ListComp {
                elt,
                target,
                iter,
                conds,
            } => {
                let items = iter_values(&iter.eval(frame, interp)?)?;
                let mut overlay = Overlay {
                    vars: Namespace::new(),
                    outer: &*frame.locals,
                };
                let mut inner = Frame {
                    locals: &mut overlay,
                    globals: frame.globals.clone(),
                    module_level: false,
                };
                let mut out = Vec::new();
                'items: for item in items {
                    interp.check_interrupt()?;
                    stmt::assign_target(target, item, &mut inner, interp)?;
                    for cond in conds {
                        if !cond.eval(&mut inner, interp)?.truthy() {
                            continue 'items;
                        }
                    }
                    out.push(elt.eval(&mut inner, interp)?);
                }
                Ok(Value::list(out))
            }
        }
    }
}

/// Locals of a list comprehension: the loop variables, layered over the
/// enclosing locals so they do not leak out.
struct Overlay<'a> {
    vars: Namespace,
    outer: &'a dyn Scope,
}

impl Scope for Overlay<'_> {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.vars
            .get(name)
            .cloned()
            .or_else(|| self.outer.lookup(name))
    }

    fn assign(&mut self, name: &str, value: Value) -> Result<(), EvalError> {
        self.vars.insert(name.to_string(), value);
        Ok(())
    }
}

pub(crate) fn constant_value(c: &Constant) -> Value {
    match c {
        Constant::None => Value::None,
        Constant::Bool(b) => Value::Bool(*b),
        Constant::Int(n) => Value::Int(*n),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::str(s),
    }
}

pub(crate) fn eval_all(
    exprs: &[Expr],
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<Vec<Value>, EvalError> {
    exprs.iter().map(|e| e.eval(frame, interp)).collect()
}

/// Evaluate an optional slice bound; `None` and a missing bound are the same.
pub(crate) fn slice_bound(
    bound: Option<&Expr>,
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<Option<i64>, EvalError> {
    let Some(bound) = bound else {
        return Ok(None);
    };
    match bound.eval(frame, interp)? {
        Value::None => Ok(None),
        value => value.as_int().map(Some).ok_or_else(|| EvalError::TypeError {
            message: format!("slice indices must be integers, not {}", value.type_name()),
        }),
    }
}

/// `value.attr`
///
/// Modules expose their namespace and contexts their keys; other values
/// expose their methods.
pub fn get_attribute(value: &Value, attr: &str) -> Result<Value, EvalError> {
    let missing = || EvalError::AttributeError {
        type_name: value.type_name().to_string(),
        attr: attr.to_string(),
    };
    match value {
        Value::Module(module) => module.get(attr).ok_or_else(missing),
        Value::Context(ctx) => ctx.get(attr).ok_or_else(missing),
        Value::Function(f) if attr == "__name__" => Ok(Value::str(f.name())),
        Value::Function(f) if attr == "__doc__" => {
            Ok(f.def.docstring().map(Value::str).unwrap_or(Value::None))
        }
        Value::Builtin(b) if attr == "__name__" => Ok(Value::str(&b.name)),
        other if has_method(other, attr) => Ok(Value::BoundMethod(std::rc::Rc::new(BoundMethod {
            receiver: other.clone(),
            name: attr.to_string(),
        }))),
        _ => Err(missing()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::parse_expression;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn eval(source: &str, locals: &mut Namespace) -> Result<Value, EvalError> {
        let interp = Interpreter::default();
        let expr = parse_expression(source).unwrap();
        let mut frame = Frame::module(locals, Rc::new(RefCell::new(Namespace::new())));
        expr.eval(&mut frame, &interp)
    }

    #[test]
    fn test_short_circuit_returns_operand() {
        let mut locals = Namespace::new();
        assert_eq!(eval("0 or 'x'", &mut locals).unwrap(), Value::str("x"));
        assert_eq!(eval("[] and undefined", &mut locals).unwrap(), Value::list(vec![]));
    }

    #[test]
    fn test_chained_comparison() {
        let mut locals = Namespace::new();
        assert_eq!(eval("1 < 2 <= 2", &mut locals).unwrap(), Value::Bool(true));
        assert_eq!(eval("3 > 2 > 2", &mut locals).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_list_comprehension_does_not_leak() {
        let mut locals = Namespace::new();
        locals.insert("n".into(), Value::Int(3));
        let value = eval("[i * n for i in range(4) if i % 2 == 0]", &mut locals).unwrap();
        assert_eq!(value, Value::list(vec![Value::Int(0), Value::Int(6)]));
        assert!(!locals.contains_key("i"));
    }

    #[test]
    fn test_attribute_of_str_is_bound_method() {
        let mut locals = Namespace::new();
        assert_eq!(eval("'ab'.upper()", &mut locals).unwrap(), Value::str("AB"));
        assert!(matches!(
            eval("'ab'.nope", &mut locals),
            Err(EvalError::AttributeError { .. })
        ));
    }
}
