use std::rc::Rc;

use blockflow::*;
use pretty_assertions::assert_eq;

const OPS: &str = "\
def add(x, y):
    return x + y

def mul(x, y):
    return x * y
";

const CHAIN: &str = "\
from ops import add, mul

c = add(a, b)
d = mul(c, b)
f = mul(d, e)
";

fn chain_session(values: &[(&str, i64)]) -> ExecutingContext {
    let loader = Rc::new(ModuleLoader::new(Vec::new()));
    loader.register_source("ops", OPS);
    let interp = Interpreter::with_loader(EngineConfig::default(), loader.clone());
    let model = ExecutionModel::from_source_with(&loader, CHAIN).unwrap();
    let ctx = Context::with_values(
        "root",
        values.iter().map(|(k, v)| (k.to_string(), Value::Int(*v))),
    );
    ExecutingContext::with_interpreter(model, ctx, interp)
}

fn block_session(codes: &[&str], values: &[(&str, i64)]) -> ExecutingContext {
    let statements = codes
        .iter()
        .map(|c| Statement::from(GeneralExpression::new(c).unwrap()))
        .collect();
    let ctx = Context::with_values(
        "root",
        values.iter().map(|(k, v)| (k.to_string(), Value::Int(*v))),
    );
    ExecutingContext::new(
        ExecutionModel::from_statements(statements),
        ctx,
        EngineConfig::default().with_auto_execute(true),
    )
}

fn get(exec: &ExecutingContext, name: &str) -> Option<Value> {
    exec.context().get(name)
}

// ═══════════════════════════════════════════════════════════════════════
// Automatic re-execution
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_change_reruns_only_downstream() {
    let exec = chain_session(&[("a", 2), ("b", 4), ("e", 5)]);
    assert!(!exec.auto_execute());
    exec.set_auto_execute(true);
    exec.execute_for_names(None).unwrap();
    assert_eq!(get(&exec, "f"), Some(Value::Int(120)));

    exec.context().set("e", Value::Int(2)).unwrap();
    assert_eq!(get(&exec, "c"), Some(Value::Int(6)));
    assert_eq!(get(&exec, "f"), Some(Value::Int(48)));
}

#[test]
fn test_added_statement_runs_immediately() {
    let exec = block_session(&["c = a + 1"], &[("a", 1)]);
    exec.execute_for_names(None).unwrap();
    exec.add_statement(GeneralExpression::new("d = c * 10").unwrap())
        .unwrap();
    assert_eq!(get(&exec, "d"), Some(Value::Int(20)));
    assert_eq!(exec.with_model(ExecutionModel::len), 2);
}

#[test]
fn test_rebinding_reruns_statement() {
    let exec = chain_session(&[("a", 2), ("b", 4), ("e", 5)]);
    exec.set_auto_execute(true);
    exec.execute_for_names(None).unwrap();

    let id = exec.with_model(|m| m.statements()[2].uuid());
    exec.assign_binding(id, Slot::Input, "y", Some("10")).unwrap();
    assert_eq!(get(&exec, "f"), Some(Value::Int(240)));
}

#[test]
fn test_error_clears_once_statement_succeeds() {
    let exec = block_session(&["c = a / b"], &[("a", 1), ("b", 0)]);
    let id = exec.with_model(|m| m.statements()[0].uuid());

    let err = exec.execute_for_names(None).unwrap_err();
    assert!(matches!(err, BlockflowError::Execution(_)));
    assert!(exec.has_error(id));

    exec.context().set("b", Value::Int(2)).unwrap();
    assert!(!exec.has_error(id));
    assert_eq!(get(&exec, "c"), Some(Value::Float(0.5)));
}

#[test]
fn test_removed_statement_stops_running() {
    let exec = block_session(&["c = a + 1", "d = a * 2"], &[("a", 1)]);
    let id = exec.with_model(|m| m.statements()[1].uuid());
    exec.remove_statement(id).unwrap();

    exec.context().set("a", Value::Int(4)).unwrap();
    assert_eq!(get(&exec, "c"), Some(Value::Int(5)));
    assert_eq!(get(&exec, "d"), None);
}

#[test]
fn test_mutating_method_runs_once_per_change() {
    let block = GeneralExpression::new("xs.append(1)").unwrap();
    assert_eq!(block.output_names().into_iter().collect::<Vec<_>>(), vec!["xs"]);

    let ctx = Context::with_values("root", [("xs", Value::list(Vec::new()))]);
    let exec = ExecutingContext::new(
        ExecutionModel::from_statements(vec![block.into()]),
        ctx,
        EngineConfig::default().with_auto_execute(true),
    );
    let runs = Rc::new(std::cell::Cell::new(0));
    let counter = runs.clone();
    exec.context().on_items_modified(move |event| {
        if event.updated_names().contains("xs") {
            counter.set(counter.get() + 1);
        }
    });

    exec.context()
        .set("xs", Value::list(vec![Value::Int(0)]))
        .unwrap();
    assert_eq!(
        get(&exec, "xs"),
        Some(Value::list(vec![Value::Int(0), Value::Int(1)]))
    );
    // the user's write and the statement's own write back
    assert_eq!(runs.get(), 2);
}

// ═══════════════════════════════════════════════════════════════════════
// Facade
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_facade_edits_active_session() {
    let exec = block_session(&["c = a + 1"], &[("a", 1)]);
    facade::activate(&exec);

    let id = facade::add_statement(GeneralExpression::new("d = a - 1").unwrap()).unwrap();
    assert_eq!(facade::current_model().unwrap().len(), 2);
    assert_eq!(get(&exec, "d"), Some(Value::Int(0)));
    assert!(facade::current_context().unwrap().ptr_eq(exec.context()));

    facade::remove_statement(id).unwrap();
    assert_eq!(exec.with_model(ExecutionModel::len), 1);

    facade::deactivate();
    assert!(facade::current().is_none());
    assert!(matches!(
        facade::execute_for_names(None),
        Err(BlockflowError::NoActiveSession)
    ));
}
