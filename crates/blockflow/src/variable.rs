//! Input and output slots of a statement
//!
//! A variable pairs a fixed formal `name` (a parameter or return name)
//! with a user-editable `binding`: the text that occupies the slot at the
//! call site.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::ast::{self, is_identifier};
use crate::error::{BlockflowError, Result};

/// Which side of a statement a variable sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Slot {
    /// Argument
    Input,
    /// Result
    Output,
}

impl Slot {
    /// `input` or `output`
    pub fn as_str(self) -> &'static str {
        match self {
            Slot::Input => "input",
            Slot::Output => "output",
        }
    }
}

/// An argument slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InputVariable {
    name: String,
    binding: String,
    default: Option<String>,
    keyword: bool,
    explicit: bool,
    #[serde(default)]
    satisfied: bool,
}

impl InputVariable {
    /// A positional argument bound to its own name.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            binding: name.clone(),
            name,
            default: None,
            keyword: false,
            explicit: false,
            satisfied: false,
        }
    }

    /// A keyword argument with a declared default.
    ///
    /// Until a binding is set explicitly the call site omits it.
    pub fn with_default(name: impl Into<String>, default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            name: name.into(),
            binding: default.clone(),
            default: Some(default),
            keyword: true,
            explicit: false,
            satisfied: false,
        }
    }

    /// A keyword argument without a declared default, e.g. one absorbed by
    /// `**kwargs`, bound at the call site.
    pub fn keyword(name: impl Into<String>, binding: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            binding: binding.into(),
            default: None,
            keyword: true,
            explicit: true,
            satisfied: false,
        }
    }

    /// Formal parameter name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Source text occupying the slot
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Declared default, as source text
    pub fn default(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Whether the slot is passed by keyword
    pub fn is_keyword(&self) -> bool {
        self.keyword
    }

    /// Whether the binding was set by the user
    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    /// Whether every name the binding reads has a provider
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    pub(crate) fn set_satisfied(&mut self, satisfied: bool) {
        self.satisfied = satisfied;
    }

    /// Set the binding; `None` reverts to the formal name.
    pub fn set_binding(&mut self, binding: Option<&str>) {
        match binding {
            Some(binding) => {
                self.binding = binding.to_string();
                self.explicit = true;
            }
            None => {
                self.binding = self.name.clone();
                self.explicit = false;
            }
        }
    }

    /// Whether the call site passes this argument at all.
    pub fn is_passed(&self) -> bool {
        !self.keyword || (self.explicit && self.default.as_deref() != Some(self.binding.as_str()))
    }

    /// The argument as written at the call site: the binding for
    /// positional arguments, `name=binding` for keyword arguments, or the
    /// empty string when the default applies.
    pub fn call_signature(&self) -> String {
        if !self.keyword {
            self.binding.clone()
        } else if self.is_passed() {
            format!("{}={}", self.name, self.binding)
        } else {
            String::new()
        }
    }

    /// Names the binding reads. Empty when the argument is not passed or
    /// the binding does not parse.
    pub fn dependencies(&self) -> IndexSet<String> {
        if !self.is_passed() {
            return IndexSet::new();
        }
        if is_identifier(&self.binding) {
            return IndexSet::from([self.binding.clone()]);
        }
        match ast::parse_expression(&self.binding) {
            Ok(expr) => ast::expr_free_names(&expr),
            Err(_) => IndexSet::new(),
        }
    }
}

/// A return slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputVariable {
    name: String,
    binding: String,
    #[serde(default)]
    satisfied: bool,
}

impl OutputVariable {
    /// An output bound to its own name.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        Self::bound(name.clone(), name)
    }

    /// An output bound to `binding`.
    pub fn bound(name: impl Into<String>, binding: impl Into<String>) -> Result<Self> {
        let binding = binding.into();
        if !is_identifier(&binding) {
            return Err(BlockflowError::InvalidIdentifier { binding });
        }
        Ok(Self {
            name: name.into(),
            binding,
            satisfied: true,
        })
    }

    /// Formal return name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Variable the result is stored in
    pub fn binding(&self) -> &str {
        &self.binding
    }

    /// Whether the output is produced
    pub fn satisfied(&self) -> bool {
        self.satisfied
    }

    /// Rebind the output. The binding must be an identifier; `None` is
    /// rejected.
    pub fn set_binding(&mut self, binding: Option<&str>) -> Result<()> {
        match binding {
            Some(binding) if is_identifier(binding) => {
                self.binding = binding.to_string();
                Ok(())
            }
            other => Err(BlockflowError::InvalidIdentifier {
                binding: other.unwrap_or_default().to_string(),
            }),
        }
    }
}
