//! Statement execution

use std::rc::Rc;

use super::binary::binary_op;
use super::control::ControlFlow;
use super::expr::slice_bound;
use super::index::{iter_values, set_item, set_slice};
use super::{Evaluate, Frame, Interpreter};
use crate::ast::{Alias, Expr, FunctionDef, Stmt, StmtKind};
use crate::error::EvalError;
use crate::value::{FunctionValue, Value};

/// Execute statements in order.
pub fn exec_block(
    stmts: &[Stmt],
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<(), EvalError> {
    for stmt in stmts {
        exec_stmt(stmt, frame, interp)?;
    }
    Ok(())
}

/// Execute one statement.
///
/// `return`, `break` and `continue` surface as [`EvalError::ControlFlow`]
/// and are caught by the enclosing function or loop.
pub fn exec_stmt(stmt: &Stmt, frame: &mut Frame<'_>, interp: &Interpreter) -> Result<(), EvalError> {
    match &stmt.kind {
        StmtKind::Import(aliases) => {
            for alias in aliases {
                exec_import(alias, frame, interp)?;
            }
            Ok(())
        }
        StmtKind::ImportFrom {
            module,
            names,
            star,
        } => exec_import_from(module, names, *star, frame, interp),
        StmtKind::FunctionDef(def) => {
            let func = make_function(def, frame, interp)?;
            frame.define(&def.name, func)
        }
        StmtKind::Return(value) => {
            let value = match value {
                Some(expr) => expr.eval(frame, interp)?,
                None => Value::None,
            };
            Err(EvalError::ControlFlow(ControlFlow::Return(value)))
        }
        StmtKind::Assign { targets, value } => {
            let value = value.eval(frame, interp)?;
            for target in targets {
                assign_target(target, value.clone(), frame, interp)?;
            }
            Ok(())
        }
        StmtKind::AugAssign { target, op, value } => {
            let current = target.eval(frame, interp)?;
            let rhs = value.eval(frame, interp)?;
            let result = binary_op(*op, &current, &rhs)?;
            assign_target(target, result, frame, interp)
        }
        StmtKind::For { target, iter, body } => {
            let items = iter_values(&iter.eval(frame, interp)?)?;
            for item in items {
                interp.check_interrupt()?;
                assign_target(target, item, frame, interp)?;
                match exec_block(body, frame, interp) {
                    Ok(()) | Err(EvalError::ControlFlow(ControlFlow::Continue)) => {}
                    Err(EvalError::ControlFlow(ControlFlow::Break)) => break,
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        }
        StmtKind::While { test, body } => {
            while test.eval(frame, interp)?.truthy() {
                interp.check_interrupt()?;
                match exec_block(body, frame, interp) {
                    Ok(()) | Err(EvalError::ControlFlow(ControlFlow::Continue)) => {}
                    Err(EvalError::ControlFlow(ControlFlow::Break)) => break,
                    Err(err) => return Err(err),
                }
            }
            Ok(())
        }
        StmtKind::If { test, body, orelse } => {
            if test.eval(frame, interp)?.truthy() {
                exec_block(body, frame, interp)
            } else {
                exec_block(orelse, frame, interp)
            }
        }
        StmtKind::Expr(expr) => expr.eval(frame, interp).map(drop),
        StmtKind::Pass => Ok(()),
        StmtKind::Break => Err(EvalError::ControlFlow(ControlFlow::Break)),
        StmtKind::Continue => Err(EvalError::ControlFlow(ControlFlow::Continue)),
    }
}

fn make_function(
    def: &FunctionDef,
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<Value, EvalError> {
    let mut defaults = Vec::with_capacity(def.args.params.len());
    for param in &def.args.params {
        defaults.push(match &param.default {
            Some(expr) => Some(expr.eval(frame, interp)?),
            None => None,
        });
    }
    Ok(Value::Function(Rc::new(FunctionValue {
        def: Rc::new(def.clone()),
        defaults,
        globals: frame.globals.clone(),
    })))
}

// ═══════════════════════════════════════════════════════════════════════
// Imports
// ═══════════════════════════════════════════════════════════════════════

fn exec_import(alias: &Alias, frame: &mut Frame<'_>, interp: &Interpreter) -> Result<(), EvalError> {
    let loaded = interp.loader().load(interp, &alias.name)?;
    let bound = match &alias.asname {
        Some(_) => loaded,
        None => {
            let root = alias.name.split('.').next().unwrap_or(&alias.name);
            interp.loader().load(interp, root)?
        }
    };
    frame.define(alias.local_name(), Value::Module(bound))
}

fn exec_import_from(
    module: &str,
    names: &[Alias],
    star: bool,
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<(), EvalError> {
    let loaded = interp.loader().load(interp, module)?;
    if star {
        let public: Vec<(String, Value)> = loaded
            .namespace
            .borrow()
            .iter()
            .filter(|(name, _)| !name.starts_with('_'))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        for (name, value) in public {
            frame.define(&name, value)?;
        }
        return Ok(());
    }
    for alias in names {
        let value = match loaded.get(&alias.name) {
            Some(value) => value,
            None => {
                let submodule = format!("{}.{}", module, alias.name);
                match interp.loader().load(interp, &submodule) {
                    Ok(sub) => Value::Module(sub),
                    Err(_) => {
                        return Err(EvalError::Import {
                            module: module.to_string(),
                            message: format!("cannot import name '{}'", alias.name),
                        })
                    }
                }
            }
        };
        let local = alias.asname.as_deref().unwrap_or(&alias.name);
        frame.define(local, value)?;
    }
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
// Assignment
// ═══════════════════════════════════════════════════════════════════════

/// Bind `value` to an assignment target.
///
/// Subscript and attribute targets rebuild their container and store it
/// back into the enclosing place; contexts are written in place.
pub fn assign_target(
    target: &Expr,
    value: Value,
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<(), EvalError> {
    match target {
        Expr::Name(name) => frame.assign(name, value),
        Expr::Tuple(targets) | Expr::List(targets) => {
            let items = iter_values(&value)?;
            if items.len() != targets.len() {
                let message = if items.len() < targets.len() {
                    format!(
                        "not enough values to unpack (expected {}, got {})",
                        targets.len(),
                        items.len()
                    )
                } else {
                    format!("too many values to unpack (expected {})", targets.len())
                };
                return Err(EvalError::ValueError { message });
            }
            for (target, item) in targets.iter().zip(items) {
                assign_target(target, item, frame, interp)?;
            }
            Ok(())
        }
        Expr::Subscript {
            value: container_expr,
            index,
        } => {
            let container = container_expr.eval(frame, interp)?;
            let updated = match index.as_ref() {
                Expr::Slice { lower, upper, step } => {
                    if step.is_some() {
                        return Err(EvalError::Unsupported(
                            "extended slice assignment".to_string(),
                        ));
                    }
                    let lower = slice_bound(lower.as_deref(), frame, interp)?;
                    let upper = slice_bound(upper.as_deref(), frame, interp)?;
                    Some(set_slice(&container, lower, upper, &value)?)
                }
                index => {
                    let key = index.eval(frame, interp)?;
                    set_item(&container, &key, value)?
                }
            };
            match updated {
                Some(updated) => store_place(container_expr, updated, frame, interp),
                None => Ok(()),
            }
        }
        Expr::Attribute {
            value: receiver_expr,
            attr,
        } => match receiver_expr.eval(frame, interp)? {
            Value::Context(ctx) => Ok(ctx.set(attr, value)?),
            Value::Module(module) => {
                module.namespace.borrow_mut().insert(attr.clone(), value);
                Ok(())
            }
            other => Err(EvalError::AttributeError {
                type_name: other.type_name().to_string(),
                attr: attr.clone(),
            }),
        },
        other => Err(EvalError::TypeError {
            message: format!("cannot assign to {:?}", other),
        }),
    }
}

/// Store a rebuilt value back into the place `expr` names.
///
/// Values that did not come from a place (call results, literals) are
/// dropped.
pub(crate) fn store_place(
    expr: &Expr,
    value: Value,
    frame: &mut Frame<'_>,
    interp: &Interpreter,
) -> Result<(), EvalError> {
    match expr {
        Expr::Name(_) | Expr::Subscript { .. } | Expr::Attribute { .. } => {
            assign_target(expr, value, frame, interp)
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Namespace;

    fn run(source: &str) -> Namespace {
        let interp = Interpreter::default();
        let mut locals = Namespace::new();
        interp.exec(source, &mut locals).unwrap();
        locals
    }

    #[test]
    fn test_loops_and_control_flow() {
        let ns = run(
            "total = 0\nfor i in range(10):\n    if i == 5:\n        break\n    if i % 2:\n        continue\n    total += i\n",
        );
        assert_eq!(ns["total"], Value::Int(6));
    }

    #[test]
    fn test_while_loop() {
        let ns = run("n = 0\nwhile n < 3:\n    n += 1\n");
        assert_eq!(ns["n"], Value::Int(3));
    }

    #[test]
    fn test_unpacking() {
        let ns = run("a, (b, c) = 1, [2, 3]\n");
        assert_eq!(ns["a"], Value::Int(1));
        assert_eq!(ns["c"], Value::Int(3));
    }

    #[test]
    fn test_nested_subscript_assignment() {
        let ns = run("m = {'a': [0, 0]}\nm['a'][1] = 5\nalias = m\nm['b'] = 1\n");
        assert_eq!(ns["m"].repr(), "{'a': [0, 5], 'b': 1}");
        assert_eq!(ns["alias"].repr(), "{'a': [0, 5]}");
    }

    #[test]
    fn test_def_binds_global_not_local() {
        let ns = run("def f():\n    return 1\nx = f()\n");
        assert!(!ns.contains_key("f"));
        assert_eq!(ns["x"], Value::Int(1));
    }
}
