use std::cell::RefCell;
use std::rc::Rc;

use blockflow::*;
use pretty_assertions::assert_eq;

fn items_log(ctx: &Context) -> Rc<RefCell<Vec<ItemsModified>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    ctx.on_items_modified(move |event| sink.borrow_mut().push(event.clone()));
    log
}

fn context_log(ctx: &Context) -> Rc<RefCell<Vec<ContextModified>>> {
    let log = Rc::new(RefCell::new(Vec::new()));
    let sink = log.clone();
    ctx.on_context_modified(move |event| sink.borrow_mut().push(event.clone()));
    log
}

fn keys(map: &indexmap::IndexMap<String, Value>) -> Vec<&str> {
    map.keys().map(String::as_str).collect()
}

// ═══════════════════════════════════════════════════════════════════════
// Events
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_batched_events_coalesce() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    let log = items_log(&ctx);
    {
        let _batch = ctx.batch();
        ctx.remove("a").unwrap();
        ctx.set("a", Value::Int(2)).unwrap();
        ctx.set("b", Value::Int(3)).unwrap();
        ctx.remove("b").unwrap();
        assert!(log.borrow().is_empty());
    }
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert!(log[0].added.is_empty());
    assert!(log[0].removed.is_empty());
    assert_eq!(keys(&log[0].modified), vec!["a"]);
    assert_eq!(log[0].modified["a"], Value::Int(1));
}

#[test]
fn test_removed_then_restored_is_silent() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    let log = items_log(&ctx);
    {
        let _batch = ctx.batch();
        ctx.remove("a").unwrap();
        ctx.set("a", Value::Int(1)).unwrap();
    }
    assert!(log.borrow().is_empty());
}

#[test]
fn test_events_reconstruct_state() {
    let ctx = Context::new("root");
    let mirror: Rc<RefCell<indexmap::IndexMap<String, Value>>> = Rc::default();
    let sink = mirror.clone();
    let source = ctx.clone();
    ctx.on_items_modified(move |event| {
        let mut mirror = sink.borrow_mut();
        for key in event.removed.keys() {
            mirror.shift_remove(key);
        }
        for key in event.updated_names() {
            if let Some(value) = source.get(&key) {
                mirror.insert(key, value);
            }
        }
    });

    ctx.set("x", Value::Int(1)).unwrap();
    ctx.set("y", Value::str("two")).unwrap();
    ctx.set("x", Value::Int(3)).unwrap();
    ctx.remove("y").unwrap();
    ctx.set("z", Value::list(vec![Value::Int(1)])).unwrap();

    assert_eq!(*mirror.borrow(), ctx.snapshot());
}

#[test]
fn test_context_modified_categories() {
    let ctx = Context::with_values(
        "root",
        [
            ("n", Value::Int(1)),
            ("xs", Value::list(vec![Value::Int(1)])),
            ("gone", Value::None),
        ],
    );
    let log = context_log(&ctx);
    {
        let _batch = ctx.batch();
        ctx.set("n", Value::Int(2)).unwrap();
        ctx.set("xs", Value::list(vec![Value::Int(2)])).unwrap();
        ctx.set("new", Value::Int(0)).unwrap();
        ctx.remove("gone").unwrap();
    }
    let log = log.borrow();
    assert_eq!(log.len(), 1);
    let event = &log[0];
    assert!(event.changed.contains("n"));
    assert!(event.modified.contains("xs"));
    assert!(event.added.contains("new"));
    assert!(event.removed.contains("gone"));
    assert!(!event.reset);
}

#[test]
fn test_clear_reports_reset() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    let log = context_log(&ctx);
    ctx.clear();
    assert!(ctx.is_empty());
    assert!(log.borrow().last().is_some_and(|e| e.reset));
}

#[test]
fn test_removed_listener_is_silent() {
    let ctx = Context::new("root");
    let count = Rc::new(RefCell::new(0));
    let sink = count.clone();
    let id = ctx.on_items_modified(move |_| *sink.borrow_mut() += 1);
    ctx.set("a", Value::Int(1)).unwrap();
    assert!(ctx.remove_listener(id));
    ctx.set("a", Value::Int(2)).unwrap();
    assert_eq!(*count.borrow(), 1);
    assert!(!ctx.remove_listener(id));
}

// ═══════════════════════════════════════════════════════════════════════
// Dotted access
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_dotted_access_walks_subcontexts() {
    let ctx = Context::new("root");
    let a = ctx.create_subcontext("a").unwrap();
    let b = a.create_subcontext("b").unwrap();

    ctx.set_dotted("a.b.c", Value::Int(7)).unwrap();
    assert_eq!(b.get("c"), Some(Value::Int(7)));
    assert_eq!(ctx.get_dotted("a.b.c"), Some(Value::Int(7)));

    ctx.set_dotted("a.x.y", Value::Int(1)).unwrap();
    assert_eq!(a.get("x.y"), Some(Value::Int(1)));
    assert_eq!(ctx.get_dotted("a.x.y"), Some(Value::Int(1)));

    assert_eq!(ctx.remove_dotted("a.b.c").unwrap(), Some(Value::Int(7)));
    assert!(b.is_empty());
    assert!(ctx.subcontext("a.b").is_ok());
    assert!(matches!(
        ctx.subcontext("a.z"),
        Err(ContextError::MissingSubcontext { .. })
    ));
}

// ═══════════════════════════════════════════════════════════════════════
// Dynamic bindings
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_dynamic_binding_follows_rename() {
    let parent = Context::new("root");
    let child = Context::new("first");
    parent.bind_dynamic(&child).unwrap();
    let log = items_log(&parent);

    child.set_name("second");
    assert!(!parent.contains_key("first"));
    assert!(parent.contains_key("second"));
    assert_eq!(parent.dynamic_bindings(), vec!["second".to_string()]);

    let log = log.borrow();
    assert_eq!(log.len(), 1);
    assert_eq!(keys(&log[0].removed), vec!["first"]);
    assert_eq!(keys(&log[0].added), vec!["second"]);
}

#[test]
fn test_colliding_assignment_drops_binding() {
    let parent = Context::new("root");
    let child = Context::new("child");
    parent.bind_dynamic(&child).unwrap();
    parent.set("child", Value::Int(0)).unwrap();
    assert!(parent.dynamic_bindings().is_empty());

    child.set_name("renamed");
    assert_eq!(parent.get("child"), Some(Value::Int(0)));
    assert!(!parent.contains_key("renamed"));
}

// ═══════════════════════════════════════════════════════════════════════
// Layers
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_selection_layer_hides_names() {
    let ctx = Context::with_values("root", [("a", Value::Int(1)), ("b", Value::Int(2))]);
    ctx.push_layer(Rc::new(Selection::new(["a"])));
    assert_eq!(ctx.keys(), vec!["a".to_string()]);
    assert_eq!(ctx.get("b"), None);
    assert!(matches!(
        ctx.set("b", Value::Int(3)),
        Err(ContextError::NotSelected { .. })
    ));

    ctx.pop_layer();
    assert_eq!(ctx.layer_count(), 0);
    assert_eq!(ctx.get("b"), Some(Value::Int(2)));
}

#[test]
fn test_pass_through_layer_is_transparent() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    ctx.push_layer(Rc::new(PassThrough));
    ctx.set("b", Value::Int(2)).unwrap();
    assert_eq!(ctx.keys(), vec!["a".to_string(), "b".to_string()]);
    assert_eq!(ctx.layer_count(), 1);
}

#[test]
fn test_stacked_reductions_scatter_through_each_view() {
    let ints = |values: &[i64]| Value::list(values.iter().map(|&n| Value::Int(n)).collect());
    let ctx = Context::with_values("root", [("xs", ints(&[1, 2, 3, 4]))]);
    ctx.push_layer(Rc::new(Reduction::new(vec![true, true, false, true])));
    ctx.push_layer(Rc::new(Reduction::new(vec![false, true, true])));
    assert_eq!(ctx.get("xs"), Some(ints(&[2, 4])));

    ctx.set("xs", ints(&[20, 40])).unwrap();
    assert_eq!(ctx.get("xs"), Some(ints(&[20, 40])));
    ctx.pop_layer();
    ctx.pop_layer();
    assert_eq!(ctx.get("xs"), Some(ints(&[1, 20, 3, 40])));
}

// ═══════════════════════════════════════════════════════════════════════
// Shadows
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_shadow_stages_changes() {
    let ctx = Context::with_values("root", [("a", Value::Int(1)), ("b", Value::Int(2))]);
    let shadow = ctx.create_shadow();
    assert!(shadow.is_shadow());

    shadow.set("a", Value::Int(10)).unwrap();
    shadow.remove("b").unwrap();
    assert_eq!(shadow.get("a"), Some(Value::Int(10)));
    assert_eq!(shadow.get("b"), None);
    assert_eq!(ctx.get("a"), Some(Value::Int(1)));
    assert_eq!(ctx.get("b"), Some(Value::Int(2)));

    let log = items_log(&ctx);
    shadow.merge().unwrap();
    assert_eq!(ctx.get("a"), Some(Value::Int(10)));
    assert_eq!(ctx.get("b"), None);
    assert_eq!(log.borrow().len(), 1);
}

#[test]
fn test_rejected_merge_keeps_unapplied_changes() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    let shadow = ctx.create_shadow();
    shadow.set("a", Value::Int(10)).unwrap();
    shadow.set("b", Value::Int(20)).unwrap();

    ctx.push_layer(Rc::new(Selection::new(["a"])));
    assert!(matches!(
        shadow.merge(),
        Err(ContextError::NotSelected { ref key }) if key == "b"
    ));
    ctx.pop_layer();
    assert_eq!(ctx.get("a"), Some(Value::Int(10)));
    assert_eq!(ctx.get("b"), None);
    assert_eq!(shadow.get("b"), Some(Value::Int(20)));

    shadow.merge().unwrap();
    assert_eq!(ctx.get("b"), Some(Value::Int(20)));
}

#[test]
fn test_shadow_discard_restores_parent_view() {
    let ctx = Context::with_values("root", [("a", Value::Int(1))]);
    let shadow = ctx.create_shadow();
    shadow.set("a", Value::Int(5)).unwrap();
    shadow.discard().unwrap();
    assert_eq!(shadow.get("a"), Some(Value::Int(1)));
    assert!(matches!(ctx.merge(), Err(ContextError::NotAShadow { .. })));
}

// ═══════════════════════════════════════════════════════════════════════
// JSON
// ═══════════════════════════════════════════════════════════════════════

#[test]
fn test_json_round_trip() {
    let json = serde_json::json!({"a": 1, "b": [1.5, "x"], "c": {"d": true}});
    let ctx = Context::from_json("root", &json).unwrap();
    assert_eq!(ctx.get("a"), Some(Value::Int(1)));
    assert_eq!(ctx.to_json().unwrap(), json);
}
