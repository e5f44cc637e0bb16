//! Saving and restoring models as JSON
//!
//! A statement is stored as its uuid, its kind, the callable or source it
//! runs, its variables and, for groups, the header and inner statements.
//! Restored statements regenerate the same call signature.

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::callable::{CallableInfo, ImportedCallable, BUILTINS_MODULE};
use crate::error::{BlockflowError, Result};
use crate::interp::ModuleLoader;
use crate::model::ExecutionModel;
use crate::statement::{FunctionCall, FunctionCallGroup, GeneralExpression, GroupSpec, Statement};
use crate::variable::{InputVariable, OutputVariable};

/// Current format version
pub const FORMAT_VERSION: u32 = 1;

/// Statement variant tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    /// [`FunctionCall`]
    Call,
    /// [`GeneralExpression`]
    Expression,
    /// [`FunctionCallGroup`]
    Group,
}

/// Where a call's function comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallableRecord {
    /// `module.name`, loaded again on restore
    Imported {
        /// Module
        module: String,
        /// Function name
        name: String,
    },
    /// A function defined in the model
    Local {
        /// Function name
        name: String,
        /// Full source, imports included
        source: String,
    },
}

impl CallableRecord {
    fn of(callable: &CallableInfo) -> Self {
        match callable {
            CallableInfo::Imported(imported) => CallableRecord::Imported {
                module: imported.module().to_string(),
                name: callable.name().to_string(),
            },
            CallableInfo::Local(local) => CallableRecord::Local {
                name: callable.name().to_string(),
                source: local.source().to_string(),
            },
        }
    }

    fn restore(&self, loader: &ModuleLoader) -> CallableInfo {
        match self {
            CallableRecord::Imported { module, name } if module == BUILTINS_MODULE => {
                CallableInfo::Imported(ImportedCallable::unresolved(name))
            }
            CallableRecord::Imported { module, name } => CallableInfo::imported(loader, module, name),
            CallableRecord::Local { name, source } => CallableInfo::local(name, source.as_str()),
        }
    }
}

/// One stored statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatementRecord {
    /// Identity
    pub uuid: Uuid,
    /// Variant
    pub kind: StatementKind,
    /// Function of a call
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callable: Option<CallableRecord>,
    /// Code of an expression block
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Label of a call, when it differs from the function name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// Input variables of a call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inputs: Vec<InputVariable>,
    /// Output variables of a call
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outputs: Vec<OutputVariable>,
    /// Header of a group
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupSpec>,
    /// Statements of a group
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inner: Vec<StatementRecord>,
}

impl StatementRecord {
    fn empty(uuid: Uuid, kind: StatementKind) -> Self {
        Self {
            uuid,
            kind,
            callable: None,
            source: None,
            label: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            group: None,
            inner: Vec::new(),
        }
    }

    /// Record a statement.
    pub fn of(statement: &Statement) -> Self {
        match statement {
            Statement::Call(call) => Self {
                callable: Some(CallableRecord::of(call.callable())),
                label: call.label_name().map(str::to_string),
                inputs: call.inputs().to_vec(),
                outputs: call.outputs().to_vec(),
                ..Self::empty(call.uuid(), StatementKind::Call)
            },
            Statement::Expression(expr) => Self {
                source: Some(expr.code().to_string()),
                ..Self::empty(expr.uuid(), StatementKind::Expression)
            },
            Statement::Group(group) => Self {
                group: Some(group.spec().clone()),
                inner: group.statements().iter().map(Self::of).collect(),
                ..Self::empty(group.uuid(), StatementKind::Group)
            },
        }
    }

    /// Rebuild the statement, loading imported functions through `loader`.
    pub fn restore(&self, loader: &ModuleLoader) -> Result<Statement> {
        match self.kind {
            StatementKind::Call => {
                let callable = self
                    .callable
                    .as_ref()
                    .ok_or_else(|| missing(self.uuid, "callable"))?
                    .restore(loader);
                Ok(FunctionCall::from_parts(
                    self.uuid,
                    callable,
                    self.inputs.clone(),
                    self.outputs.clone(),
                    self.label.clone(),
                )
                .into())
            }
            StatementKind::Expression => {
                let source = self.source.as_deref().ok_or_else(|| missing(self.uuid, "source"))?;
                Ok(GeneralExpression::new(source)?.with_uuid(self.uuid).into())
            }
            StatementKind::Group => {
                let spec = self.group.clone().ok_or_else(|| missing(self.uuid, "group"))?;
                let inner = self
                    .inner
                    .iter()
                    .map(|record| record.restore(loader))
                    .collect::<Result<Vec<_>>>()?;
                Ok(FunctionCallGroup::new(spec, inner).with_uuid(self.uuid).into())
            }
        }
    }
}

fn missing(uuid: Uuid, field: &str) -> BlockflowError {
    BlockflowError::Serialization(format!("statement {} has no {}", uuid, field))
}

/// A stored model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRecord {
    /// Format version
    pub version: u32,
    /// Top-level statements
    pub statements: Vec<StatementRecord>,
}

impl ExecutionModel {
    /// Record of the model
    pub fn to_record(&self) -> ModelRecord {
        ModelRecord {
            version: FORMAT_VERSION,
            statements: self.statements().iter().map(StatementRecord::of).collect(),
        }
    }

    /// Pretty-printed JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_record())?)
    }

    /// Restore from JSON; imported functions resolve against an empty
    /// module path.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::from_json_with(&ModuleLoader::new(Vec::new()), json)
    }

    /// Restore from JSON, loading imported functions through `loader`.
    pub fn from_json_with(loader: &ModuleLoader, json: &str) -> Result<Self> {
        let record: ModelRecord = serde_json::from_str(json)?;
        if record.version > FORMAT_VERSION {
            return Err(BlockflowError::Serialization(format!(
                "unsupported format version {}",
                record.version
            )));
        }
        let statements = record
            .statements
            .iter()
            .map(|s| s.restore(loader))
            .collect::<Result<Vec<_>>>()?;
        let mut seen: IndexSet<Uuid> = IndexSet::new();
        if let Some(dup) = statements
            .iter()
            .flat_map(Statement::uuids)
            .find(|u| !seen.insert(*u))
        {
            return Err(BlockflowError::DuplicateUuid(dup));
        }
        Ok(Self::from_statements(statements))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "\
import ops

def scale(v, k=2):
    return v * k

x = 1
y = ops.add(x, 2)
z = scale(y, k=3)
for i in range(z):
    w = scale(i)
";

    fn loader() -> ModuleLoader {
        let loader = ModuleLoader::new(Vec::new());
        loader.register_source("ops", "def add(a, b):\n    c = a + b\n    return c\n");
        loader
    }

    #[test]
    fn test_signatures_survive() {
        let loader = loader();
        let model = ExecutionModel::from_source_with(&loader, SOURCE).unwrap();
        let restored = ExecutionModel::from_json_with(&loader, &model.to_json().unwrap()).unwrap();
        assert_eq!(restored.code(), model.code());
        for (a, b) in model.statements().iter().zip(restored.statements()) {
            assert_eq!(a.uuid(), b.uuid());
            assert_eq!(a.call_signature(), b.call_signature());
        }
    }

    #[test]
    fn test_missing_loader_keeps_signature() {
        let model = ExecutionModel::from_source_with(&loader(), SOURCE).unwrap();
        let restored = ExecutionModel::from_json(&model.to_json().unwrap()).unwrap();
        assert_eq!(restored.code(), model.code());
    }

    #[test]
    fn test_rejects_newer_version() {
        let json = r#"{"version": 99, "statements": []}"#;
        assert!(ExecutionModel::from_json(json).is_err());
    }
}
