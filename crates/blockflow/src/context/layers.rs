//! Filter layers stacked on a context
//!
//! A layer narrows what a context exposes: which names are visible and
//! how values are read and written through it. Layers compose, the most
//! recently pushed one sitting closest to the caller.

use std::fmt;

use indexmap::IndexSet;

use crate::error::ContextError;
use crate::value::Value;

/// A view transformation pushed onto a context.
pub trait ContextLayer: fmt::Debug {
    /// Short description used in logs
    fn describe(&self) -> String;

    /// Whether `key` is visible through this layer.
    fn visible(&self, _key: &str) -> bool {
        true
    }

    /// Transform a value read through this layer.
    fn read(&self, _key: &str, value: Value) -> Value {
        value
    }

    /// Transform a value written through this layer into the value to
    /// store, given what is currently stored below.
    fn write(&self, _key: &str, _current: Option<&Value>, value: Value) -> Result<Value, ContextError> {
        Ok(value)
    }
}

/// Identity layer; a placeholder that lets filters be pushed and popped
/// without re-parenting.
#[derive(Debug, Clone, Default)]
pub struct PassThrough;

impl ContextLayer for PassThrough {
    fn describe(&self) -> String {
        "pass-through".to_string()
    }
}

/// Exposes only a subset of names.
#[derive(Debug, Clone)]
pub struct Selection {
    names: IndexSet<String>,
}

impl Selection {
    /// Select the given names.
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
        }
    }
}

impl ContextLayer for Selection {
    fn describe(&self) -> String {
        format!(
            "selection of {}",
            self.names.iter().cloned().collect::<Vec<_>>().join(", ")
        )
    }

    fn visible(&self, key: &str) -> bool {
        self.names.contains(key)
    }

    fn write(&self, key: &str, _current: Option<&Value>, value: Value) -> Result<Value, ContextError> {
        if self.names.contains(key) {
            Ok(value)
        } else {
            Err(ContextError::NotSelected {
                key: key.to_string(),
            })
        }
    }
}

/// Exposes only the rows of array values that satisfy a mask.
///
/// Lists and tuples whose length equals the mask length are filtered;
/// everything else passes through unchanged. Writing a filtered array
/// scatters its rows back into the stored one.
#[derive(Debug, Clone)]
pub struct Reduction {
    mask: Vec<bool>,
}

impl Reduction {
    /// Reduce by a boolean mask.
    pub fn new(mask: Vec<bool>) -> Self {
        Self { mask }
    }

    /// Number of rows the mask keeps.
    pub fn selected(&self) -> usize {
        self.mask.iter().filter(|keep| **keep).count()
    }

    fn masked_rows<'a>(&self, value: &'a Value) -> Option<&'a [Value]> {
        value.as_slice().filter(|rows| rows.len() == self.mask.len())
    }
}

impl ContextLayer for Reduction {
    fn describe(&self) -> String {
        format!("reduction to {} of {} rows", self.selected(), self.mask.len())
    }

    fn read(&self, _key: &str, value: Value) -> Value {
        let Some(rows) = self.masked_rows(&value) else {
            return value;
        };
        let kept: Vec<Value> = rows
            .iter()
            .zip(&self.mask)
            .filter(|(_, keep)| **keep)
            .map(|(row, _)| row.clone())
            .collect();
        match value {
            Value::Tuple(_) => Value::tuple(kept),
            _ => Value::list(kept),
        }
    }

    fn write(&self, key: &str, current: Option<&Value>, value: Value) -> Result<Value, ContextError> {
        let Some(stored) = current.and_then(|c| self.masked_rows(c)) else {
            return Ok(value);
        };
        let Some(rows) = value.as_slice() else {
            return Ok(value);
        };
        if rows.len() != self.selected() {
            return Err(ContextError::MaskMismatch {
                key: key.to_string(),
                expected: self.selected(),
                got: rows.len(),
            });
        }
        let mut incoming = rows.iter();
        let merged: Vec<Value> = stored
            .iter()
            .zip(&self.mask)
            .map(|(old, keep)| match keep {
                true => incoming.next().unwrap_or(old).clone(),
                false => old.clone(),
            })
            .collect();
        Ok(match current {
            Some(Value::Tuple(_)) => Value::tuple(merged),
            _ => Value::list(merged),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ints(values: &[i64]) -> Value {
        Value::list(values.iter().map(|&n| Value::Int(n)).collect())
    }

    #[test]
    fn test_reduction_reads_masked_rows() {
        let layer = Reduction::new(vec![true, false, true]);
        assert_eq!(layer.read("x", ints(&[1, 2, 3])), ints(&[1, 3]));
        assert_eq!(layer.read("x", ints(&[1, 2])), ints(&[1, 2]));
        assert_eq!(layer.read("s", Value::Int(5)), Value::Int(5));
    }

    #[test]
    fn test_reduction_scatters_writes() {
        let layer = Reduction::new(vec![true, false, true]);
        let stored = ints(&[1, 2, 3]);
        assert_eq!(
            layer.write("x", Some(&stored), ints(&[7, 9])).unwrap(),
            ints(&[7, 2, 9])
        );
        assert!(matches!(
            layer.write("x", Some(&stored), ints(&[7])),
            Err(ContextError::MaskMismatch { expected: 2, got: 1, .. })
        ));
    }

    #[test]
    fn test_selection_rejects_hidden_writes() {
        let layer = Selection::new(["a"]);
        assert!(layer.visible("a"));
        assert!(!layer.visible("b"));
        assert!(layer.write("b", None, Value::Int(1)).is_err());
    }
}
