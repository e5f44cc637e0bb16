use std::cell::RefCell;
use std::rc::Rc;

use blockflow::value::Namespace;
use blockflow::*;
use pretty_assertions::assert_eq;

fn run(source: &str) -> Namespace {
    let mut locals = Namespace::new();
    Interpreter::default().exec(source, &mut locals).unwrap();
    locals
}

// ═══════════════════════════════════════════════════════════════════════
// Programs
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_functions_with_defaults_and_keywords() {
    let ns = run("def scale(v, k=2):\n    return v * k\na = scale(3)\nb = scale(3, k=5)\n");
    assert_eq!(ns["a"], Value::Int(6));
    assert_eq!(ns["b"], Value::Int(15));
}

#[test]
fn test_comprehension_and_builtins() {
    let ns = run("xs = [v * v for v in range(5) if v % 2 == 0]\ntotal = sum(xs)\nn = len(xs)\n");
    assert_eq!(ns["xs"].repr(), "[0, 4, 16]");
    assert_eq!(ns["total"], Value::Int(20));
    assert_eq!(ns["n"], Value::Int(3));
}

#[test]
fn test_math_module() {
    let ns = run("import math\nr = math.floor(math.sqrt(17))\nc = math.ceil(2.1)\n");
    assert_eq!(ns["r"], Value::Int(4));
    assert_eq!(ns["c"], Value::Int(3));
}

#[test]
fn test_registered_module_with_alias() {
    let interp = Interpreter::default();
    interp
        .loader()
        .register_source("geometry", "def area(w, h):\n    return w * h\n");
    let mut locals = Namespace::new();
    interp
        .exec("import geometry as g\nA = g.area(3, 4)\n", &mut locals)
        .unwrap();
    assert_eq!(locals["A"], Value::Int(12));
}

#[test]
fn test_eval_expression_reads_locals() {
    let interp = Interpreter::default();
    let mut locals = Namespace::new();
    locals.insert("x".to_string(), Value::Int(7));
    let value = interp.eval_expression("x * 2 + 1", &mut locals).unwrap();
    assert_eq!(value, Value::Int(15));
}

// ═══════════════════════════════════════════════════════════════════════
// Contexts as scopes
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_exec_into_context_emits_events() {
    let ctx = Context::with_values("root", [("x", Value::Int(2))]);
    let added = Rc::new(RefCell::new(Vec::new()));
    let sink = added.clone();
    ctx.on_items_modified(move |event| sink.borrow_mut().extend(event.added.keys().cloned()));

    let mut scope = ctx.clone();
    Interpreter::default()
        .exec("y = x + 1\nz = y * y\n", &mut scope)
        .unwrap();
    assert_eq!(ctx.get("z"), Some(Value::Int(9)));
    assert_eq!(*added.borrow(), vec!["y".to_string(), "z".to_string()]);
}

#[test]
fn test_selection_blocks_hidden_write() {
    let ctx = Context::with_values("root", [("x", Value::Int(2))]);
    ctx.push_layer(Rc::new(Selection::new(["x"])));
    let mut scope = ctx.clone();
    let err = Interpreter::default()
        .exec("y = x + 1\n", &mut scope)
        .unwrap_err();
    let BlockflowError::Execution(failure) = err else {
        panic!("expected an execution failure");
    };
    assert!(matches!(failure.error, EvalError::Context(ContextError::NotSelected { .. })));
}

// ═══════════════════════════════════════════════════════════════════════
// Failures
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_failure_reports_line() {
    let mut locals = Namespace::new();
    let err = Interpreter::default()
        .exec("a = 1\nb = a + 1\nc = missing\n", &mut locals)
        .unwrap_err();
    let BlockflowError::Execution(failure) = err else {
        panic!("expected an execution failure");
    };
    assert_eq!(failure.line, Some(3));
    assert!(matches!(failure.error, EvalError::UndefinedVariable { ref name } if name == "missing"));
    assert_eq!(locals["b"], Value::Int(2));
}

#[test]
fn test_interrupt_stops_loops() {
    let config = EngineConfig::default();
    config.interrupt();
    let interp = Interpreter::new(config.clone());
    let mut locals = Namespace::new();
    let err = interp
        .exec("n = 0\nwhile True:\n    n += 1\n", &mut locals)
        .unwrap_err();
    assert!(matches!(
        err,
        BlockflowError::Execution(ref failure) if matches!(failure.error, EvalError::Interrupted)
    ));

    config.reset_interrupt();
    assert!(!interp.config().is_interrupted());
}

#[test]
fn test_syntax_error_is_parse_error() {
    let mut locals = Namespace::new();
    let err = Interpreter::default()
        .exec("x = (1 +\n", &mut locals)
        .unwrap_err();
    assert!(matches!(err, BlockflowError::Parse(_)));
}
