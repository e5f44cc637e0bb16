//! Function call evaluation

use indexmap::IndexMap;

use super::control::ControlFlow;
use super::expr::{eval_all, get_attribute};
use super::index::iter_values;
use super::methods::{call_method, has_method};
use super::{stmt, Evaluate, Frame, Interpreter};
use crate::ast::{Expr, Keyword, ParamTarget};
use crate::error::EvalError;
use crate::value::{FunctionValue, Key, Kwargs, Namespace, Value};

/// Evaluate `func(args, keywords)`.
///
/// A method call on a place (`xs.append(1)`, `d["k"].update(...)`) stores
/// the updated receiver back into that place.
pub(crate) fn eval_call(
    func: &Expr,
    args: &[Expr],
    keywords: &[Keyword],
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<Value, EvalError> {
    if let Expr::Attribute { value, attr } = func {
        let receiver = value.eval(frame, interp)?;
        if has_method(&receiver, attr) {
            let positional = eval_all(args, frame, interp)?;
            let kwargs = eval_keywords(keywords, frame, interp)?;
            let result = call_method(interp, &receiver, attr, positional, kwargs)?;
            if let Some(updated) = result.updated {
                stmt::store_place(value, updated, frame, interp)?;
            }
            return Ok(result.value);
        }
        let callee = get_attribute(&receiver, attr)?;
        let positional = eval_all(args, frame, interp)?;
        let kwargs = eval_keywords(keywords, frame, interp)?;
        return call_value(interp, &callee, positional, kwargs);
    }

    let callee = func.eval(frame, interp)?;
    let positional = eval_all(args, frame, interp)?;
    let kwargs = eval_keywords(keywords, frame, interp)?;
    call_value(interp, &callee, positional, kwargs)
}

fn eval_keywords(
    keywords: &[Keyword],
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<Kwargs, EvalError> {
    let mut kwargs = Vec::with_capacity(keywords.len());
    for kw in keywords {
        kwargs.push((kw.arg.clone(), kw.value.eval(frame, interp)?));
    }
    Ok(kwargs)
}

/// Call a value as a function.
///
/// # Errors
///
/// Returns `TypeError` if the value is not callable.
/// Returns `ArityMismatch` if the argument count doesn't match.
pub fn call_value(
    interp: &Interpreter,
    func: &Value,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, EvalError> {
    interp.check_interrupt()?;
    match func {
        Value::Function(f) => call_function(interp, f, args, kwargs),
        Value::Builtin(b) => b.call(interp, args, kwargs),
        Value::BoundMethod(m) => {
            call_method(interp, &m.receiver, &m.name, args, kwargs).map(|r| r.value)
        }
        other => Err(EvalError::TypeError {
            message: format!("'{}' object is not callable", other.type_name()),
        }),
    }
}

/// Call a user-defined function.
///
/// Parameters bind from positional arguments, then keywords, then
/// defaults. Surplus positionals go to `*args` and unknown keywords to
/// `**kwargs`.
pub fn call_function(
    interp: &Interpreter,
    func: &FunctionValue,
    args: Vec<Value>,
    kwargs: Kwargs,
) -> Result<Value, EvalError> {
    let _guard = interp.enter_call()?;
    let spec = &func.def.args;
    let name = func.name();

    let mut locals = Namespace::new();
    let mut positional = args.into_iter();
    let mut remaining: IndexMap<String, Value> = IndexMap::new();
    for (key, value) in kwargs {
        if remaining.insert(key.clone(), value).is_some() {
            return Err(EvalError::TypeError {
                message: format!("{}() got multiple values for argument '{}'", name, key),
            });
        }
    }

    for (i, param) in spec.params.iter().enumerate() {
        let keyword = match &param.target {
            ParamTarget::Name(n) => remaining.shift_remove(n),
            ParamTarget::Tuple(_) => None,
        };
        let value = match positional.next() {
            Some(value) => {
                if keyword.is_some() {
                    return Err(EvalError::TypeError {
                        message: format!(
                            "{}() got multiple values for argument '{}'",
                            name,
                            param.target.names().join(", ")
                        ),
                    });
                }
                value
            }
            None => match keyword.or_else(|| func.defaults.get(i).cloned().flatten()) {
                Some(value) => value,
                None => {
                    return Err(EvalError::TypeError {
                        message: format!(
                            "{}() missing required argument '{}'",
                            name,
                            param.target.names().join(", ")
                        ),
                    })
                }
            },
        };
        bind_param(&param.target, value, &mut locals)?;
    }

    let extra: Vec<Value> = positional.collect();
    match &spec.vararg {
        Some(vararg) => {
            locals.insert(vararg.clone(), Value::tuple(extra));
        }
        None if !extra.is_empty() => {
            return Err(EvalError::ArityMismatch {
                name: name.to_string(),
                expected: spec.params.len().to_string(),
                got: spec.params.len() + extra.len(),
            });
        }
        None => {}
    }

    match &spec.kwarg {
        Some(kwarg) => {
            let map = remaining
                .into_iter()
                .map(|(k, v)| (Key::from(k.as_str()), v))
                .collect();
            locals.insert(kwarg.clone(), Value::dict(map));
        }
        None => {
            if let Some(unexpected) = remaining.keys().next() {
                return Err(EvalError::TypeError {
                    message: format!(
                        "{}() got an unexpected keyword argument '{}'",
                        name, unexpected
                    ),
                });
            }
        }
    }

    let mut frame = Frame::function(&mut locals, func.globals.clone());
    match stmt::exec_block(&func.def.body, &mut frame, interp) {
        Ok(()) => Ok(Value::None),
        Err(EvalError::ControlFlow(ControlFlow::Return(value))) => Ok(value),
        Err(err) => Err(err),
    }
}

fn bind_param(target: &ParamTarget, value: Value, locals: &mut Namespace) -> Result<(), EvalError> {
    match target {
        ParamTarget::Name(n) => {
            locals.insert(n.clone(), value);
            Ok(())
        }
        ParamTarget::Tuple(targets) => {
            let items = iter_values(&value)?;
            if items.len() != targets.len() {
                return Err(EvalError::ValueError {
                    message: format!(
                        "expected {} values to unpack, got {}",
                        targets.len(),
                        items.len()
                    ),
                });
            }
            for (target, item) in targets.iter().zip(items) {
                bind_param(target, item, locals)?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::SharedScope;

    fn run(source: &str) -> Namespace {
        let interp = Interpreter::default();
        let mut locals = Namespace::new();
        interp.exec(source, &mut locals).unwrap();
        locals
    }

    #[test]
    fn test_keyword_and_default_binding() {
        let ns = run("def f(a, b=2, *rest, **kw):\n    return (a, b, rest, kw)\nr = f(1, c=3)\n");
        assert_eq!(ns["r"].repr(), "(1, 2, (), {'c': 3})");
    }

    #[test]
    fn test_method_call_rebinds_receiver() {
        let ns = run("xs = [1]\nxs.append(2)\nd = {'k': []}\nd['k'].append(5)\n");
        assert_eq!(ns["xs"].repr(), "[1, 2]");
        assert_eq!(ns["d"].repr(), "{'k': [5]}");
    }

    #[test]
    fn test_missing_argument() {
        let interp = Interpreter::default();
        let mut scope = SharedScope::default();
        let err = interp.exec("def f(a):\n    return a\nf()\n", &mut scope);
        assert!(err.is_err());
    }

    #[test]
    fn test_recursion_limit() {
        let interp = Interpreter::new(crate::config::EngineConfig::with_max_call_depth(20));
        let mut locals = Namespace::new();
        let err = interp
            .exec("def f(n):\n    return f(n + 1)\nf(0)\n", &mut locals)
            .unwrap_err();
        assert!(err.to_string().contains("maximum call depth"));
    }
}
