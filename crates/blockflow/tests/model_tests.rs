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

fn setup() -> (Rc<ModuleLoader>, Interpreter) {
    let loader = Rc::new(ModuleLoader::new(Vec::new()));
    loader.register_source("ops", OPS);
    let interp = Interpreter::with_loader(EngineConfig::default(), loader.clone());
    (loader, interp)
}

fn chain(loader: &ModuleLoader) -> ExecutionModel {
    ExecutionModel::from_source_with(loader, CHAIN).unwrap()
}

fn context(values: &[(&str, i64)]) -> Context {
    Context::with_values(
        "root",
        values.iter().map(|(k, v)| (k.to_string(), Value::Int(*v))),
    )
}

fn ints(ctx: &Context, keys: &[&str]) -> Vec<Option<i64>> {
    keys.iter()
        .map(|k| ctx.get(k).and_then(|v| v.as_int()))
        .collect()
}

fn names(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn signatures(model: &ExecutionModel) -> Vec<String> {
    model
        .statements()
        .iter()
        .map(Statement::call_signature)
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Building
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_chain_builds_calls() {
    let (loader, _) = setup();
    let model = chain(&loader);
    assert_eq!(
        signatures(&model),
        vec!["c = add(a, b)", "d = mul(c, b)", "f = mul(d, e)"]
    );
    assert!(model
        .statements()
        .iter()
        .all(|s| matches!(s, Statement::Call(_))));
    assert_eq!(
        model.code(),
        "from ops import add\nfrom ops import mul\n\nc = add(a, b)\nd = mul(c, b)\nf = mul(d, e)\n"
    );
}

#[test]
fn test_regenerated_code_is_normal_form() {
    let (loader, _) = setup();
    let code = chain(&loader).code();
    let again = ExecutionModel::from_source_with(&loader, &code).unwrap();
    assert_eq!(again.code(), code);

    let source = "x = 1\ny = [v * 2 for v in range(x)]\n";
    let model = ExecutionModel::from_source(source).unwrap();
    assert_eq!(model.code(), source);
    assert_eq!(ExecutionModel::from_source(&model.code()).unwrap().code(), source);
}

#[test]
fn test_dependency_graph_and_order() {
    let (loader, _) = setup();
    let model = chain(&loader);
    let ids: Vec<_> = model.statements().iter().map(Statement::uuid).collect();
    let deps = model.dependency_graph();
    assert!(deps[&ids[0]].is_empty());
    assert!(deps[&ids[1]].contains(&ids[0]));
    assert!(deps[&ids[2]].contains(&ids[1]));
    assert_eq!(model.topological_order(), ids);

    let free: Vec<String> = model.free_inputs().into_iter().collect();
    assert_eq!(free, names(&["a", "b", "e"]));
    let outputs: Vec<String> = model.all_outputs().into_iter().collect();
    assert_eq!(outputs, names(&["c", "d", "f"]));
}

// ═══════════════════════════════════════════════════════════════════════
// Execution scenarios
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_arithmetic_chain() {
    let (loader, interp) = setup();
    let ctx = context(&[("a", 2), ("b", 4), ("e", 5)]);
    let executing = ExecutingContext::with_interpreter(chain(&loader), ctx.clone(), interp);

    executing.execute_for_names(None).unwrap();
    assert_eq!(
        ints(&ctx, &["a", "b", "e", "c", "d", "f"]),
        vec![Some(2), Some(4), Some(5), Some(6), Some(24), Some(120)]
    );

    ctx.set("b", Value::Int(3)).unwrap();
    executing.execute_for_names(Some(names(&["b"]))).unwrap();
    assert_eq!(
        ints(&ctx, &["a", "b", "e", "c", "d", "f"]),
        vec![Some(2), Some(3), Some(5), Some(5), Some(15), Some(75)]
    );
}

#[test]
fn test_restriction_to_an_output() {
    let (loader, interp) = setup();
    let model = chain(&loader);
    let outputs = names(&["d"]);
    let restricted = model.restrict(None, Some(&outputs));
    assert_eq!(signatures(&restricted), vec!["c = add(a, b)", "d = mul(c, b)"]);

    let ctx = context(&[("a", 2), ("b", 4)]);
    model.execute(&ctx, None, Some(&outputs), &interp).unwrap();
    assert_eq!(ctx.keys(), names(&["a", "b", "c", "d"]));
    assert_eq!(ints(&ctx, &["c", "d"]), vec![Some(6), Some(24)]);
}

#[test]
fn test_restriction_from_an_input() {
    let (loader, interp) = setup();
    let model = chain(&loader);
    let inputs = names(&["e"]);
    let restricted = model.restrict(Some(&inputs), None);
    assert_eq!(signatures(&restricted), vec!["f = mul(d, e)"]);

    let ctx = context(&[("c", 6), ("b", 4), ("e", 5), ("d", 24)]);
    let report = model.execute(&ctx, Some(&inputs), None, &interp).unwrap();
    assert_eq!(report.executed, vec![model.statements()[2].uuid()]);
    assert_eq!(ints(&ctx, &["c", "d", "f"]), vec![Some(6), Some(24), Some(120)]);
}

#[test]
fn test_restriction_preserves_order_and_membership() {
    let (loader, _) = setup();
    let model = chain(&loader);
    let inputs = names(&["b"]);
    let outputs = names(&["d"]);
    let restricted = model.restrict(Some(&inputs), Some(&outputs));
    let ids: Vec<_> = restricted.statements().iter().map(Statement::uuid).collect();
    let original: Vec<_> = model.statements().iter().map(Statement::uuid).collect();
    assert_eq!(ids, original[..2].to_vec());
}

#[test]
fn test_missing_input_detection() {
    let (loader, interp) = setup();
    let mut model = chain(&loader);
    let ctx = context(&[("a", 2), ("e", 5)]);

    let (required, satisfied) = model.mark_unsatisfied_inputs(ctx.keys());
    assert_eq!(required.into_iter().collect::<Vec<_>>(), names(&["b"]));
    assert!(satisfied.contains("a") && satisfied.contains("c"));

    let Statement::Call(first) = &model.statements()[0] else {
        panic!("expected a call");
    };
    assert!(first.inputs()[0].satisfied());
    assert!(!first.inputs()[1].satisfied());

    let report = model.execute(&ctx, None, None, &interp).unwrap();
    assert!(report.executed.is_empty());
    assert_eq!(report.skipped.len(), 3);
    assert_eq!(ctx.keys(), names(&["a", "e"]));
}

#[test]
fn test_execution_failure_carries_source() {
    let (_, interp) = setup();
    let model = ExecutionModel::from_source("x = 1\ny = x / z\n").unwrap();
    let ctx = context(&[("z", 0)]);
    let err = model.execute(&ctx, None, None, &interp).unwrap_err();
    let BlockflowError::Execution(failure) = err else {
        panic!("expected an execution failure");
    };
    assert!(matches!(failure.error, EvalError::ZeroDivision));
    assert_eq!(failure.source_code, "x = 1\ny = x / z\n");
    assert_eq!(failure.statement, Some(model.statements()[1].uuid()));
    assert_eq!(ctx.get("x"), Some(Value::Int(1)));
}

// ═══════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_group_round_trip() {
    let (loader, _) = setup();
    let mut model = chain(&loader);
    let original: Vec<_> = model.statements().iter().map(Statement::uuid).collect();

    let spec = GroupSpec::for_single("items", "celem").unwrap();
    let group = model.merge_statements(spec, Some(&original[..2])).unwrap();
    assert_eq!(model.len(), 2);
    assert_eq!(
        model.body(),
        "for celem in items:\n    c = add(a, b)\n    d = mul(c, b)\nf = mul(d, e)"
    );
    assert!(model.find(original[1]).is_some());

    model.unmerge_statements(group).unwrap();
    let restored: Vec<_> = model.statements().iter().map(Statement::uuid).collect();
    assert_eq!(restored, original);
}

#[test]
fn test_merged_group_hides_temporaries() {
    let statements = ["t = v * 2", "acc = acc + t", "w = acc"]
        .iter()
        .map(|c| Statement::from(GeneralExpression::new(c).unwrap()))
        .collect();
    let mut model = ExecutionModel::from_statements(statements);
    let ids: Vec<_> = model.statements()[..2].iter().map(Statement::uuid).collect();
    let group = model
        .merge_statements(GroupSpec::for_single("xs", "v").unwrap(), Some(&ids))
        .unwrap();

    let outputs: Vec<String> = model.find(group).unwrap().output_names().into_iter().collect();
    assert_eq!(outputs, names(&["acc", "v"]));
    let inputs: Vec<String> = model.find(group).unwrap().input_names().into_iter().collect();
    assert_eq!(inputs, names(&["acc", "xs"]));

    let ctx = Context::with_values(
        "root",
        [
            ("acc", Value::Int(1)),
            ("xs", Value::list(vec![Value::Int(1), Value::Int(2)])),
        ],
    );
    model.execute(&ctx, None, None, &Interpreter::default()).unwrap();
    assert_eq!(ints(&ctx, &["acc", "w"]), vec![Some(7), Some(7)]);
}

#[test]
fn test_merge_all_then_unmerge_all() {
    let (loader, _) = setup();
    let mut model = chain(&loader);
    let before = signatures(&model);
    let code = model.code();

    model.merge_statements(GroupSpec::plain(), None).unwrap();
    assert_eq!(model.len(), 1);
    assert_eq!(model.code(), code);

    model.unmerge_all_groups();
    assert_eq!(signatures(&model), before);
}

#[test]
fn test_loop_source_becomes_group() {
    let (loader, interp) = setup();
    let source = "\
from ops import add

total = 0
for i in range(n):
    total = add(total, i)
";
    let model = ExecutionModel::from_source_with(&loader, source).unwrap();
    assert!(matches!(model.statements()[1], Statement::Group(_)));

    let ctx = context(&[("n", 4)]);
    model.execute(&ctx, None, None, &interp).unwrap();
    assert_eq!(ctx.get("total"), Some(Value::Int(6)));
}

// ═══════════════════════════════════════════════════════════════════════
// Editing
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_assign_binding_updates_code() {
    let (loader, _) = setup();
    let mut model = chain(&loader);
    let id = model.statements()[2].uuid();
    model.assign_binding(id, Slot::Input, "y", Some("10")).unwrap();
    model.assign_binding(id, Slot::Output, "result", Some("g")).unwrap();
    assert_eq!(model.statements()[2].call_signature(), "g = mul(d, 10)");

    let err = model
        .assign_binding(id, Slot::Output, "result", Some("not valid"))
        .unwrap_err();
    assert!(matches!(err, BlockflowError::InvalidIdentifier { .. }));
    let err = model
        .assign_binding(id, Slot::Input, "z", Some("1"))
        .unwrap_err();
    assert!(matches!(err, BlockflowError::UnknownVariable { .. }));
}

#[test]
fn test_add_and_remove_statements() {
    let (loader, _) = setup();
    let mut model = chain(&loader);
    let id = model
        .add_function(GeneralExpression::new("g = f + 1").unwrap())
        .unwrap();
    assert_eq!(model.len(), 4);
    assert!(model.code().ends_with("g = f + 1\n"));

    let copy = model.statements()[0].clone();
    assert!(matches!(
        model.add_function(copy.clone()),
        Err(BlockflowError::DuplicateUuid(dup)) if dup == copy.uuid()
    ));
    assert_eq!(model.len(), 4);

    model.remove_function(id).unwrap();
    assert_eq!(model.len(), 3);
    assert!(matches!(
        model.remove_function(id),
        Err(BlockflowError::UnknownUuid(_))
    ));
}

#[test]
fn test_update_local_source_resyncs_calls() {
    let source = "\
def scale(v):
    return v * 2

y = scale(x)
z = scale(y)
";
    let mut model = ExecutionModel::from_source(source).unwrap();
    let id = model.statements()[0].uuid();
    model
        .update_local_source(id, "def scale(v, k=3):\n    return v * k\n")
        .unwrap();
    let ctx = context(&[("x", 1)]);
    model
        .execute(&ctx, None, None, &Interpreter::default())
        .unwrap();
    assert_eq!(ctx.get("z"), Some(Value::Int(9)));
    assert!(model.code().contains("def scale(v, k=3):"));
}
