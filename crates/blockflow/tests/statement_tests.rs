use blockflow::ast::{self, StmtKind};
use blockflow::*;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

const OPS: &str = "\
def add(x, y):
    return x + y
";

fn loader() -> ModuleLoader {
    let loader = ModuleLoader::new(Vec::new());
    loader.register_source("ops", OPS);
    loader
}

fn call_from(source: &str, callables: &IndexMap<String, CallableInfo>) -> FunctionCall {
    let module = ast::parse(source).unwrap();
    match &module.body[0].kind {
        StmtKind::Assign { targets, value } => {
            FunctionCall::from_ast(value, Some(&targets[0]), callables).unwrap()
        }
        other => panic!("not an assignment: {:?}", other),
    }
}

fn expr(code: &str) -> Statement {
    GeneralExpression::new(code).unwrap().into()
}

fn list(names: indexmap::IndexSet<String>) -> Vec<String> {
    names.into_iter().collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Function calls
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_aliased_module_call() {
    let mut callables = IndexMap::new();
    callables.insert("o.add".to_string(), CallableInfo::imported(&loader(), "ops", "add"));
    let call = call_from("s = o.add(p, q)\n", &callables);

    assert_eq!(call.call_signature(), "s = o.add(p, q)");
    assert_eq!(call.label_name(), Some("o.add"));
    assert_eq!(call.import_line().as_deref(), Some("import ops as o"));
    assert_eq!(list(call.input_names()), vec!["p", "q"]);
    assert_eq!(call.outputs()[0].name(), "result");
    assert_eq!(call.outputs()[0].binding(), "s");
}

#[test]
fn test_unknown_callee_gets_placeholder_parameters() {
    let call = call_from("r = foo(a, 1)\n", &IndexMap::new());
    assert_eq!(call.call_signature(), "r = foo(a, 1)");
    assert_eq!(call.import_line(), None);
    let params: Vec<&str> = call.inputs().iter().map(InputVariable::name).collect();
    assert_eq!(params, vec!["arg0", "arg1"]);
    assert_eq!(list(call.input_names()), vec!["a"]);
}

#[test]
fn test_default_argument_is_omitted_until_changed() {
    let callable = CallableInfo::local("scale", "def scale(v, k=2):\n    return v * k\n");
    let mut call = FunctionCall::from_callable(callable);
    assert_eq!(call.call_signature(), "result = scale(v)");

    call.set_input_binding("k", Some("3")).unwrap();
    assert_eq!(call.call_signature(), "result = scale(v, k=3)");

    call.set_input_binding("k", Some("2")).unwrap();
    assert_eq!(call.call_signature(), "result = scale(v)");
    assert_eq!(list(call.input_names()), vec!["v"]);
}

#[test]
fn test_imported_callable_becomes_local() {
    let CallableInfo::Imported(imported) = CallableInfo::imported(&loader(), "ops", "add") else {
        panic!("expected an imported callable");
    };
    let local = imported.to_local("my_add");
    assert!(local.is_valid());
    assert!(local.source().starts_with("# copied from ops.add"));
    assert!(local.source().contains("def my_add(x, y):"));
}

// ═══════════════════════════════════════════════════════════════════════
// Variables
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_input_variable_rendering() {
    assert_eq!(InputVariable::new("x").call_signature(), "x");
    assert_eq!(InputVariable::with_default("k", "2").call_signature(), "");
    assert_eq!(InputVariable::keyword("k", "z").call_signature(), "k=z");

    let mut input = InputVariable::new("x");
    input.set_binding(Some("a + f(b)"));
    let deps = input.dependencies();
    assert!(deps.contains("a") && deps.contains("f") && deps.contains("b"));

    input.set_binding(None);
    assert_eq!(input.binding(), "x");
}

#[test]
fn test_output_binding_must_be_identifier() {
    assert!(OutputVariable::bound("r", "total").is_ok());
    assert!(matches!(
        OutputVariable::bound("r", "1x"),
        Err(BlockflowError::InvalidIdentifier { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Expression blocks
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_expression_hoists_imports_and_defs() {
    let block = GeneralExpression::new(
        "import math\ndef f(v):\n    return math.floor(v)\ny = f(a) + b\n",
    )
    .unwrap();
    assert_eq!(block.imports(), ["import math".to_string()]);
    assert_eq!(block.local_names(), ["f".to_string()]);
    assert_eq!(block.call_signature(), "y = f(a) + b");
    assert_eq!(list(block.input_names()), vec!["a", "b"]);
    assert_eq!(list(block.output_names()), vec!["y"]);
}

#[test]
fn test_expression_rejections() {
    assert!(matches!(
        GeneralExpression::new("return 1"),
        Err(BlockflowError::InvalidExpressionBlock { .. })
    ));
    assert!(matches!(
        GeneralExpression::new("from m import *"),
        Err(BlockflowError::StarImportRejected { .. })
    ));
    assert!(matches!(
        GeneralExpression::new("x = ("),
        Err(BlockflowError::Parse(_))
    ));
}

#[test]
fn test_set_code_keeps_old_code_on_error() {
    let mut block = GeneralExpression::new("y = x").unwrap();
    assert!(block.set_code("y = (").is_err());
    assert_eq!(block.call_signature(), "y = x");
    block.set_code("z = w * 2").unwrap();
    assert_eq!(list(block.output_names()), vec!["z"]);
}

// ═══════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_tuple_loop_group() {
    let spec = GroupSpec::for_tuple("pairs", "x", "y").unwrap();
    let group = FunctionCallGroup::new(spec, vec![expr("s = x + y")]);

    assert_eq!(group.call_signature(), "for (x,y) in pairs:\n    s = x + y");
    assert_eq!(list(group.input_names()), vec!["pairs"]);
    let outputs = group.output_names();
    assert!(outputs.contains("s") && outputs.contains("x") && outputs.contains("y"));

    let placeholder = group.current_element_statement().unwrap();
    assert_eq!(placeholder.current_element_of(), Some(group.uuid()));
    assert_eq!(list(placeholder.input_names()), vec!["x", "y"]);
}

#[test]
fn test_while_group_reads_its_condition() {
    let group = FunctionCallGroup::new(GroupSpec::while_loop("n < 3"), vec![expr("n = n + 1")]);
    assert_eq!(group.call_signature(), "while n < 3:\n    n = n + 1");
    assert_eq!(list(group.input_names()), vec!["n"]);
    assert!(group.current_element_statement().is_none());
}

#[test]
fn test_empty_loop_body_renders_pass() {
    let group = FunctionCallGroup::new(GroupSpec::for_single("xs", "v").unwrap(), Vec::new());
    assert_eq!(group.call_signature(), "for v in xs:\n    pass");
}

#[test]
fn test_group_from_ids_keeps_program_order() {
    let statements = vec![expr("a = 1"), expr("b = a + 1"), expr("c = b + 1")];
    let ids = [statements[2].uuid(), statements[0].uuid()];
    let group = FunctionCallGroup::from_ids(&statements, GroupSpec::plain(), &ids).unwrap();
    assert_eq!(group.call_signature(), "a = 1\nc = b + 1");
    assert_eq!(list(group.input_names()), vec!["b"]);

    let missing = [uuid::Uuid::new_v4()];
    assert!(matches!(
        FunctionCallGroup::from_ids(&statements, GroupSpec::plain(), &missing),
        Err(BlockflowError::UnknownUuid(_))
    ));
}

#[test]
fn test_rebinding_loop_variables() {
    let spec = GroupSpec::for_single("items", "item").unwrap();
    let mut group = FunctionCallGroup::new(spec, vec![expr("t = item * 2")]);
    group.set_header_binding("iterable", Some("range(5)")).unwrap();
    group.set_current_element("celem", Some("k")).unwrap();
    assert_eq!(group.call_signature(), "for k in range(5):\n    t = item * 2");
    assert!(group.set_current_element("celem", Some("a b")).is_err());
    assert!(matches!(
        group.set_header_binding("missing", Some("x")),
        Err(BlockflowError::UnknownVariable { .. })
    ));
}
