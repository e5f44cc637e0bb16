//! Change events and the coalescer used while events are batched

use indexmap::{IndexMap, IndexSet};

use crate::value::Value;

/// Low-level change event: which keys were added, removed or modified.
///
/// `added` carries the new values; `removed` and `modified` carry the
/// values the keys held before the change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemsModified {
    /// Keys that did not exist before
    pub added: IndexMap<String, Value>,
    /// Keys that no longer exist
    pub removed: IndexMap<String, Value>,
    /// Keys whose value was replaced
    pub modified: IndexMap<String, Value>,
}

impl ItemsModified {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.modified.is_empty()
    }

    /// Keys that were added or modified (the names whose values are new).
    pub fn updated_names(&self) -> IndexSet<String> {
        self.added
            .keys()
            .chain(self.modified.keys())
            .cloned()
            .collect()
    }

    /// Every key mentioned by the event.
    pub fn names(&self) -> IndexSet<String> {
        self.added
            .keys()
            .chain(self.modified.keys())
            .chain(self.removed.keys())
            .cloned()
            .collect()
    }
}

/// High-level change event consumed by observers of a context.
///
/// Rebinding a container (list, tuple, dict) counts as `modified`, while
/// rebinding any other value counts as `changed`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContextModified {
    /// Names that appeared
    pub added: IndexSet<String>,
    /// Names that disappeared
    pub removed: IndexSet<String>,
    /// Containers that were replaced
    pub modified: IndexSet<String>,
    /// Scalars that were rebound
    pub changed: IndexSet<String>,
    /// The whole context was cleared
    pub reset: bool,
}

impl ContextModified {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        !self.reset
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.modified.is_empty()
            && self.changed.is_empty()
    }
}

/// One pending change of a key.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Change {
    /// Key appeared with this value
    Added(Value),
    /// Key disappeared; held this value
    Removed(Value),
    /// Key was rebound; held this value before
    Modified(Value),
}

/// Accumulates changes, folding repeated changes of a key into one.
#[derive(Debug, Default)]
pub(crate) struct Coalescer {
    changes: IndexMap<String, Change>,
    reset: bool,
}

impl Coalescer {
    pub(crate) fn mark_reset(&mut self) {
        self.reset = true;
    }

    /// Fold `change` into the pending change of `key`.
    ///
    /// `current` is the value the key holds after the change, used to
    /// decide whether a removal followed by an addition left it unchanged.
    pub(crate) fn record(&mut self, key: &str, change: Change, current: Option<&Value>) {
        let Some(existing) = self.changes.get(key) else {
            self.changes.insert(key.to_string(), change);
            return;
        };
        let folded = match (existing, change) {
            (Change::Added(_), Change::Removed(_)) => None,
            (Change::Removed(old), Change::Added(_)) => {
                if current == Some(old) {
                    None
                } else {
                    Some(Change::Modified(old.clone()))
                }
            }
            (Change::Added(first) | Change::Modified(first), Change::Modified(_)) => {
                Some(Change::Modified(first.clone()))
            }
            (Change::Modified(old), Change::Removed(_)) => Some(Change::Removed(old.clone())),
            (_, later) => Some(later),
        };
        match folded {
            Some(change) => {
                if let Some(slot) = self.changes.get_mut(key) {
                    *slot = change;
                }
            }
            None => {
                self.changes.shift_remove(key);
            }
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.changes.is_empty() && !self.reset
    }

    /// Drain into the pair of events, classifying rebinds by the value
    /// each key holds now.
    pub(crate) fn finish(
        self,
        current: impl Fn(&str) -> Option<Value>,
    ) -> (ItemsModified, ContextModified) {
        let mut items = ItemsModified::default();
        let mut context = ContextModified {
            reset: self.reset,
            ..ContextModified::default()
        };
        for (key, change) in self.changes {
            match change {
                Change::Added(value) => {
                    context.added.insert(key.clone());
                    items.added.insert(key, value);
                }
                Change::Removed(old) => {
                    context.removed.insert(key.clone());
                    items.removed.insert(key, old);
                }
                Change::Modified(old) => {
                    let array_like = current(&key).is_some_and(|v| v.is_array_like());
                    if array_like {
                        context.modified.insert(key.clone());
                    } else {
                        context.changed.insert(key.clone());
                    }
                    items.modified.insert(key, old);
                }
            }
        }
        (items, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remove_then_add_becomes_modified() {
        let mut c = Coalescer::default();
        c.record("a", Change::Removed(Value::Int(1)), None);
        c.record("a", Change::Added(Value::Int(2)), Some(&Value::Int(2)));
        let (items, ctx) = c.finish(|_| Some(Value::Int(2)));
        assert_eq!(items.modified.get("a"), Some(&Value::Int(1)));
        assert!(ctx.changed.contains("a"));
    }

    #[test]
    fn test_remove_then_add_same_value_cancels() {
        let mut c = Coalescer::default();
        c.record("a", Change::Removed(Value::Int(1)), None);
        c.record("a", Change::Added(Value::Int(1)), Some(&Value::Int(1)));
        assert!(c.is_empty());
    }

    #[test]
    fn test_add_then_remove_cancels() {
        let mut c = Coalescer::default();
        c.record("b", Change::Added(Value::Int(3)), Some(&Value::Int(3)));
        c.record("b", Change::Removed(Value::Int(3)), None);
        assert!(c.is_empty());
    }

    #[test]
    fn test_modified_then_removed_is_removed() {
        let mut c = Coalescer::default();
        c.record("x", Change::Modified(Value::Int(0)), Some(&Value::Int(1)));
        c.record("x", Change::Removed(Value::Int(1)), None);
        let (items, _) = c.finish(|_| None);
        assert_eq!(items.removed.get("x"), Some(&Value::Int(0)));
    }

    #[test]
    fn test_list_rebinding_is_modified() {
        let mut c = Coalescer::default();
        c.record("xs", Change::Modified(Value::list(vec![])), None);
        let (_, ctx) = c.finish(|_| Some(Value::list(vec![Value::Int(1)])));
        assert!(ctx.modified.contains("xs"));
        assert!(ctx.changed.is_empty());
    }
}
