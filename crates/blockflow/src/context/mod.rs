//! Listenable variable namespace
//!
//! A [`Context`] maps names to values and reports every change to its
//! listeners, either immediately or coalesced at the end of a
//! [`batch`](Context::batch). On top of the plain mapping it supports:
//!
//! - nested sub-contexts reachable through dotted names,
//! - dynamic bindings, where a sub-context's key follows its name,
//! - filter layers (selection, reduction, pass-through),
//! - copy-on-write shadows that stage changes until merged.

mod events;
mod layers;

pub use events::{ContextModified, ItemsModified};
pub use layers::{ContextLayer, PassThrough, Reduction, Selection};

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, warn};

use crate::error::{BlockflowError, ContextError, EvalError, Result};
use crate::interp::Scope;
use crate::value::Value;
use events::{Change, Coalescer};

/// Handle returned when registering a listener, used to remove it.
pub type ListenerId = u64;

type ItemsListener = Rc<dyn Fn(&ItemsModified)>;
type ContextListener = Rc<dyn Fn(&ContextModified)>;
type RenameListener = Rc<dyn Fn(&Context, &str, &str)>;

#[derive(Clone)]
enum Listener {
    Items(ItemsListener),
    Context(ContextListener),
    Rename(RenameListener),
}

struct Inner {
    name: RefCell<String>,
    data: RefCell<IndexMap<String, Value>>,
    parent: Option<Context>,
    tombstones: RefCell<IndexSet<String>>,
    layers: RefCell<Vec<Rc<dyn ContextLayer>>>,
    listeners: RefCell<Vec<(ListenerId, Listener)>>,
    next_listener: Cell<ListenerId>,
    pending: RefCell<Option<Coalescer>>,
    batch_depth: Cell<usize>,
    dynamic: RefCell<IndexMap<String, (Context, ListenerId)>>,
}

/// A shared, listenable mapping from names to values.
///
/// Cloning a `Context` clones the handle; both handles see the same data.
#[derive(Clone)]
pub struct Context {
    inner: Rc<Inner>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new("context")
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.name())
            .field("keys", &self.keys())
            .finish()
    }
}

/// Ends a batch when dropped, flushing the coalesced events.
#[must_use = "events flush when the guard is dropped"]
pub struct BatchGuard {
    ctx: Context,
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.ctx.end_batch();
    }
}

impl Context {
    /// Create an empty context.
    pub fn new(name: impl Into<String>) -> Self {
        Self::build(name.into(), None)
    }

    /// Create a context holding `values`, without emitting events.
    pub fn with_values<I, K>(name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let ctx = Self::new(name);
        ctx.inner
            .data
            .borrow_mut()
            .extend(values.into_iter().map(|(k, v)| (k.into(), v)));
        ctx
    }

    fn build(name: String, parent: Option<Context>) -> Self {
        Self {
            inner: Rc::new(Inner {
                name: RefCell::new(name),
                data: RefCell::new(IndexMap::new()),
                parent,
                tombstones: RefCell::new(IndexSet::new()),
                layers: RefCell::new(Vec::new()),
                listeners: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
                pending: RefCell::new(None),
                batch_depth: Cell::new(0),
                dynamic: RefCell::new(IndexMap::new()),
            }),
        }
    }

    /// Whether two handles refer to the same context.
    pub fn ptr_eq(&self, other: &Context) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Name used when this context is nested in a parent.
    pub fn name(&self) -> String {
        self.inner.name.borrow().clone()
    }

    /// Rename the context.
    ///
    /// Parents holding it through a dynamic binding move it to the new key.
    pub fn set_name(&self, name: impl Into<String>) {
        let new = name.into();
        let old = self.inner.name.replace(new.clone());
        if old == new {
            return;
        }
        for listener in self.listeners() {
            if let Listener::Rename(f) = listener {
                f(self, &old, &new);
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Raw storage (below the layers)
    // ═══════════════════════════════════════════════════════════════════

    fn raw_get(&self, key: &str) -> Option<Value> {
        if let Some(value) = self.inner.data.borrow().get(key) {
            return Some(value.clone());
        }
        if self.inner.tombstones.borrow().contains(key) {
            return None;
        }
        self.inner.parent.as_ref().and_then(|p| p.get(key))
    }

    fn raw_keys(&self) -> Vec<String> {
        let data = self.inner.data.borrow();
        let mut keys: Vec<String> = match &self.inner.parent {
            Some(parent) => {
                let tombstones = self.inner.tombstones.borrow();
                parent
                    .keys()
                    .into_iter()
                    .filter(|k| !tombstones.contains(k))
                    .collect()
            }
            None => Vec::new(),
        };
        let inherited: IndexSet<String> = keys.iter().cloned().collect();
        keys.extend(data.keys().filter(|k| !inherited.contains(*k)).cloned());
        keys
    }

    fn store_raw(&self, key: &str, value: Value) {
        let old = self.raw_get(key);
        self.inner
            .data
            .borrow_mut()
            .insert(key.to_string(), value.clone());
        self.inner.tombstones.borrow_mut().shift_remove(key);
        let change = match old {
            None => Change::Added(value),
            Some(old) if old == value => return,
            Some(old) => Change::Modified(old),
        };
        self.record(key, change);
    }

    fn remove_raw(&self, key: &str) -> Option<Value> {
        let old = self.raw_get(key)?;
        self.inner.data.borrow_mut().shift_remove(key);
        let inherited = self
            .inner
            .parent
            .as_ref()
            .is_some_and(|p| p.contains_key(key));
        if inherited {
            self.inner.tombstones.borrow_mut().insert(key.to_string());
        }
        self.record(key, Change::Removed(old.clone()));
        Some(old)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Mapping interface
    // ═══════════════════════════════════════════════════════════════════

    fn visible(&self, key: &str) -> bool {
        self.inner.layers.borrow().iter().all(|l| l.visible(key))
    }

    /// Look up a key through the layers.
    pub fn get(&self, key: &str) -> Option<Value> {
        if !self.visible(key) {
            return None;
        }
        let value = self.raw_get(key)?;
        let layers = self.inner.layers.borrow().clone();
        Some(layers.iter().fold(value, |v, layer| layer.read(key, v)))
    }

    /// Visible keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.raw_keys()
            .into_iter()
            .filter(|k| self.visible(k))
            .collect()
    }

    /// Visible keys and values in insertion order.
    pub fn items(&self) -> Vec<(String, Value)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.get(&k).map(|v| (k, v)))
            .collect()
    }

    /// Whether a visible key exists.
    pub fn contains_key(&self, key: &str) -> bool {
        self.visible(key) && self.raw_get(key).is_some()
    }

    /// Number of visible keys.
    pub fn len(&self) -> usize {
        self.keys().len()
    }

    /// Whether no keys are visible.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bind `key` to `value`, writing through the layers.
    ///
    /// Setting a key to a value equal to the current one emits no event.
    /// Overwriting a dynamically bound sub-context drops the binding.
    pub fn set(&self, key: &str, value: Value) -> std::result::Result<(), ContextError> {
        if key.is_empty() {
            return Err(ContextError::EmptyKey);
        }
        let layers = self.inner.layers.borrow().clone();
        let value = if layers.is_empty() {
            value
        } else {
            // views[i] is what layers[i] sees beneath it
            let mut views = vec![self.raw_get(key)];
            for layer in &layers[..layers.len() - 1] {
                let below = views.last().cloned().flatten();
                views.push(below.map(|v| layer.read(key, v)));
            }
            let mut value = value;
            for (layer, current) in layers.iter().zip(&views).rev() {
                value = layer.write(key, current.as_ref(), value)?;
            }
            value
        };
        self.drop_colliding_binding(key, &value);
        self.store_raw(key, value);
        Ok(())
    }

    /// Delete a key, returning its value.
    pub fn remove(&self, key: &str) -> std::result::Result<Option<Value>, ContextError> {
        if !self.visible(key) {
            return Err(ContextError::NotSelected {
                key: key.to_string(),
            });
        }
        self.unbind_dynamic(key);
        Ok(self.remove_raw(key))
    }

    /// Delete every visible key and report a reset.
    pub fn clear(&self) {
        let _batch = self.batch();
        for key in self.keys() {
            self.unbind_dynamic(&key);
            self.remove_raw(&key);
        }
        if let Some(pending) = self.inner.pending.borrow_mut().as_mut() {
            pending.mark_reset();
        };
    }

    /// Copy of the visible contents.
    pub fn snapshot(&self) -> IndexMap<String, Value> {
        self.items().into_iter().collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Events
    // ═══════════════════════════════════════════════════════════════════

    fn add_listener(&self, listener: Listener) -> ListenerId {
        let id = self.inner.next_listener.get();
        self.inner.next_listener.set(id + 1);
        self.inner.listeners.borrow_mut().push((id, listener));
        id
    }

    fn listeners(&self) -> Vec<Listener> {
        self.inner
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| l.clone())
            .collect()
    }

    /// Listen for low-level `(added, removed, modified)` events.
    pub fn on_items_modified(&self, f: impl Fn(&ItemsModified) + 'static) -> ListenerId {
        self.add_listener(Listener::Items(Rc::new(f)))
    }

    /// Listen for categorized change events.
    pub fn on_context_modified(&self, f: impl Fn(&ContextModified) + 'static) -> ListenerId {
        self.add_listener(Listener::Context(Rc::new(f)))
    }

    /// Listen for renames of this context; receives `(self, old, new)`.
    pub fn on_rename(&self, f: impl Fn(&Context, &str, &str) + 'static) -> ListenerId {
        self.add_listener(Listener::Rename(Rc::new(f)))
    }

    /// Remove a listener. Returns whether it was registered.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.borrow_mut();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    /// Start batching events. They are coalesced and delivered as one
    /// event when the last guard drops.
    pub fn batch(&self) -> BatchGuard {
        let depth = self.inner.batch_depth.get();
        if depth == 0 {
            *self.inner.pending.borrow_mut() = Some(Coalescer::default());
        }
        self.inner.batch_depth.set(depth + 1);
        BatchGuard { ctx: self.clone() }
    }

    /// Whether events are currently being batched.
    pub fn is_batching(&self) -> bool {
        self.inner.batch_depth.get() > 0
    }

    fn end_batch(&self) {
        let depth = self.inner.batch_depth.get().saturating_sub(1);
        self.inner.batch_depth.set(depth);
        if depth > 0 {
            return;
        }
        let pending = self.inner.pending.borrow_mut().take();
        if let Some(pending) = pending {
            self.flush(pending);
        }
    }

    fn record(&self, key: &str, change: Change) {
        let current = self.raw_get(key);
        if let Some(pending) = self.inner.pending.borrow_mut().as_mut() {
            pending.record(key, change, current.as_ref());
            return;
        }
        let mut single = Coalescer::default();
        single.record(key, change, current.as_ref());
        self.flush(single);
    }

    fn flush(&self, pending: Coalescer) {
        if pending.is_empty() {
            return;
        }
        let (items, context) = pending.finish(|key| self.raw_get(key));
        for listener in self.listeners() {
            match listener {
                Listener::Items(f) if !items.is_empty() => f(&items),
                Listener::Context(f) if !context.is_empty() => f(&context),
                _ => {}
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dotted access
    // ═══════════════════════════════════════════════════════════════════

    /// Longest dotted prefix of `path` naming a sub-context, with the
    /// remainder of the path.
    fn resolve_prefix(&self, path: &str) -> Option<(Context, String)> {
        let parts: Vec<&str> = path.split('.').collect();
        (1..parts.len()).rev().find_map(|i| {
            match self.get_dotted(&parts[..i].join(".")) {
                Some(Value::Context(sub)) => Some((sub, parts[i..].join("."))),
                _ => None,
            }
        })
    }

    /// Look up a dotted name, walking sub-contexts longest prefix first.
    /// A literal key containing dots wins over walking.
    pub fn get_dotted(&self, path: &str) -> Option<Value> {
        if let Some(value) = self.get(path) {
            return Some(value);
        }
        let (sub, rest) = self.resolve_prefix(path)?;
        sub.get(&rest)
    }

    /// Set a dotted name in the deepest existing sub-context; the rest of
    /// the path becomes a single key there.
    pub fn set_dotted(&self, path: &str, value: Value) -> std::result::Result<(), ContextError> {
        match self.resolve_prefix(path) {
            Some((sub, rest)) if !self.contains_key(path) => sub.set(&rest, value),
            _ => self.set(path, value),
        }
    }

    /// Delete a dotted name.
    pub fn remove_dotted(&self, path: &str) -> std::result::Result<Option<Value>, ContextError> {
        if self.contains_key(path) {
            return self.remove(path);
        }
        match self.resolve_prefix(path) {
            Some((sub, rest)) => sub.remove(&rest),
            None => Ok(None),
        }
    }

    /// The sub-context at a dotted path.
    pub fn subcontext(&self, path: &str) -> std::result::Result<Context, ContextError> {
        match self.get_dotted(path) {
            Some(Value::Context(sub)) => Ok(sub),
            _ => Err(ContextError::MissingSubcontext {
                path: path.to_string(),
            }),
        }
    }

    /// Create an empty sub-context under `name` and return it.
    pub fn create_subcontext(&self, name: &str) -> std::result::Result<Context, ContextError> {
        let sub = Context::new(name);
        self.set(name, Value::Context(sub.clone()))?;
        Ok(sub)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Dynamic bindings
    // ═══════════════════════════════════════════════════════════════════

    /// Store `child` under its name and keep the key in step with it: when
    /// the child is renamed, the old key is removed and the new key
    /// inserted in one batch.
    pub fn bind_dynamic(&self, child: &Context) -> std::result::Result<(), ContextError> {
        let key = child.name();
        self.set(&key, Value::Context(child.clone()))?;
        let parent: Weak<Inner> = Rc::downgrade(&self.inner);
        let id = child.on_rename(move |child, old, new| {
            if let Some(inner) = parent.upgrade() {
                Context { inner }.follow_rename(child, old, new);
            }
        });
        self.inner
            .dynamic
            .borrow_mut()
            .insert(key, (child.clone(), id));
        Ok(())
    }

    /// Keys currently held through dynamic bindings.
    pub fn dynamic_bindings(&self) -> Vec<String> {
        self.inner.dynamic.borrow().keys().cloned().collect()
    }

    fn follow_rename(&self, child: &Context, old: &str, new: &str) {
        let bound = self
            .inner
            .dynamic
            .borrow()
            .get(old)
            .is_some_and(|(c, _)| c.ptr_eq(child));
        if !bound {
            return;
        }
        let entry = self.inner.dynamic.borrow_mut().shift_remove(old);
        let _batch = self.batch();
        self.remove_raw(old);
        self.unbind_dynamic(new);
        self.store_raw(new, Value::Context(child.clone()));
        if let Some(entry) = entry {
            self.inner.dynamic.borrow_mut().insert(new.to_string(), entry);
        }
        debug!(old, new, "dynamic binding followed rename");
    }

    fn drop_colliding_binding(&self, key: &str, value: &Value) {
        let collides = match self.inner.dynamic.borrow().get(key) {
            Some((child, _)) => !matches!(value, Value::Context(c) if c.ptr_eq(child)),
            None => false,
        };
        if collides {
            warn!(key, "assignment replaced a dynamically bound context");
            self.unbind_dynamic(key);
        }
    }

    fn unbind_dynamic(&self, key: &str) {
        let entry = self.inner.dynamic.borrow_mut().shift_remove(key);
        if let Some((child, id)) = entry {
            child.remove_listener(id);
        }
    }

    // ═══════════════════════════════════════════════════════════════════
    // Layers
    // ═══════════════════════════════════════════════════════════════════

    /// Push a filter layer on top of the existing ones.
    pub fn push_layer(&self, layer: Rc<dyn ContextLayer>) {
        debug!(context = %self.name(), layer = %layer.describe(), "push layer");
        self.inner.layers.borrow_mut().push(layer);
    }

    /// Remove the most recently pushed layer.
    pub fn pop_layer(&self) -> Option<Rc<dyn ContextLayer>> {
        self.inner.layers.borrow_mut().pop()
    }

    /// Number of layers.
    pub fn layer_count(&self) -> usize {
        self.inner.layers.borrow().len()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Shadows
    // ═══════════════════════════════════════════════════════════════════

    /// Create a copy-on-write overlay: reads fall through to this context,
    /// writes and deletions stay in the shadow until merged.
    pub fn create_shadow(&self) -> Context {
        Self::build(self.name(), Some(self.clone()))
    }

    /// The context a shadow overlays.
    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// Whether this context is a shadow.
    pub fn is_shadow(&self) -> bool {
        self.inner.parent.is_some()
    }

    fn require_parent(&self) -> std::result::Result<&Context, ContextError> {
        self.inner
            .parent
            .as_ref()
            .ok_or_else(|| ContextError::NotAShadow { name: self.name() })
    }

    /// Write the shadow's changes into its parent in one batch and reset
    /// the shadow to a transparent overlay.
    ///
    /// A change the parent rejects stops the merge; it and every change not
    /// yet applied stay in the shadow.
    pub fn merge(&self) -> std::result::Result<(), ContextError> {
        let parent = self.require_parent()?;
        let local = self.inner.data.borrow().clone();
        let tombstones = self.inner.tombstones.borrow().clone();
        let _batch = parent.batch();
        for (key, value) in local {
            parent.set(&key, value)?;
            self.inner.data.borrow_mut().shift_remove(&key);
        }
        for key in tombstones {
            parent.remove(&key)?;
            self.inner.tombstones.borrow_mut().shift_remove(&key);
        }
        Ok(())
    }

    /// Throw away the shadow's changes, reporting the values it reverts to.
    pub fn discard(&self) -> std::result::Result<(), ContextError> {
        let parent = self.require_parent()?.clone();
        let local = std::mem::take(&mut *self.inner.data.borrow_mut());
        let tombstones = std::mem::take(&mut *self.inner.tombstones.borrow_mut());
        let _batch = self.batch();
        for (key, old) in local {
            match parent.get(&key) {
                None => self.record(&key, Change::Removed(old)),
                Some(now) if now != old => self.record(&key, Change::Modified(old)),
                Some(_) => {}
            }
        }
        for key in tombstones {
            if let Some(now) = parent.get(&key) {
                self.record(&key, Change::Added(now));
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Serialization
    // ═══════════════════════════════════════════════════════════════════

    /// Visible contents as a JSON object; sub-contexts nest as objects.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut map = serde_json::Map::new();
        for (key, value) in self.items() {
            map.insert(key, value.to_json()?);
        }
        Ok(serde_json::Value::Object(map))
    }

    /// Build a context from a JSON object, without emitting events.
    pub fn from_json(name: impl Into<String>, json: &serde_json::Value) -> Result<Context> {
        let serde_json::Value::Object(map) = json else {
            return Err(BlockflowError::Serialization(
                "context must be a JSON object".to_string(),
            ));
        };
        Ok(Context::with_values(
            name,
            map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))),
        ))
    }
}

impl Scope for Context {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.get(name)
    }

    fn assign(&mut self, name: &str, value: Value) -> std::result::Result<(), EvalError> {
        Ok(self.set(name, value)?)
    }
}
