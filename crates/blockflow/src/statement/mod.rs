//! Statements: the units a model is made of
//!
//! Every statement has a uuid, input and output variables, and a call
//! signature: the source text it contributes to the regenerated program.
//! Imports and function definitions a statement needs are reported
//! separately so the model can hoist and deduplicate them.

mod expression;
mod function_call;
mod group;

pub use expression::GeneralExpression;
pub use function_call::FunctionCall;
pub use group::{FunctionCallGroup, GroupKind, GroupSpec};

use indexmap::IndexSet;
use uuid::Uuid;

use crate::callable::CallableInfo;
use crate::variable::{InputVariable, OutputVariable};

/// One unit of user code
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// A function call
    Call(FunctionCall),
    /// A free-form block
    Expression(GeneralExpression),
    /// A loop or grouping
    Group(FunctionCallGroup),
}

impl From<FunctionCall> for Statement {
    fn from(call: FunctionCall) -> Self {
        Statement::Call(call)
    }
}

impl From<GeneralExpression> for Statement {
    fn from(expression: GeneralExpression) -> Self {
        Statement::Expression(expression)
    }
}

impl From<FunctionCallGroup> for Statement {
    fn from(group: FunctionCallGroup) -> Self {
        Statement::Group(group)
    }
}

impl Statement {
    /// Identity
    pub fn uuid(&self) -> Uuid {
        match self {
            Statement::Call(s) => s.uuid(),
            Statement::Expression(s) => s.uuid(),
            Statement::Group(s) => s.uuid(),
        }
    }

    /// Short kind name
    pub fn kind_name(&self) -> &'static str {
        match self {
            Statement::Call(_) => "call",
            Statement::Expression(_) => "expression",
            Statement::Group(_) => "group",
        }
    }

    /// Source text the statement contributes to the program body
    pub fn call_signature(&self) -> String {
        match self {
            Statement::Call(s) => s.call_signature(),
            Statement::Expression(s) => s.call_signature(),
            Statement::Group(s) => s.call_signature(),
        }
    }

    /// Input variables; for groups, those reading from outside the group
    pub fn inputs(&self) -> Vec<&InputVariable> {
        match self {
            Statement::Call(s) => s.inputs().iter().collect(),
            Statement::Expression(s) => s.inputs().iter().collect(),
            Statement::Group(s) => s.inputs(),
        }
    }

    /// Output variables, including those of nested statements
    pub fn outputs(&self) -> Vec<&OutputVariable> {
        match self {
            Statement::Call(s) => s.outputs().iter().collect(),
            Statement::Expression(s) => s.outputs().iter().collect(),
            Statement::Group(s) => s
                .statements()
                .iter()
                .flat_map(Statement::outputs)
                .chain(s.spec().current_elements())
                .collect(),
        }
    }

    /// Names the statement reads from outside itself
    pub fn input_names(&self) -> IndexSet<String> {
        match self {
            Statement::Call(s) => s.input_names(),
            Statement::Expression(s) => s.input_names(),
            Statement::Group(s) => s.input_names(),
        }
    }

    /// Names the statement binds
    pub fn output_names(&self) -> IndexSet<String> {
        match self {
            Statement::Call(s) => s.output_names(),
            Statement::Expression(s) => s.output_names(),
            Statement::Group(s) => s.output_names(),
        }
    }

    /// Loop variables bound by this statement and any group inside it
    pub fn current_elements(&self) -> IndexSet<String> {
        match self {
            Statement::Group(g) => g
                .spec()
                .current_elements()
                .iter()
                .map(|c| c.binding().to_string())
                .chain(g.statements().iter().flat_map(Statement::current_elements))
                .collect(),
            _ => IndexSet::new(),
        }
    }

    /// Import lines the statement needs
    pub fn imports(&self) -> Vec<String> {
        match self {
            Statement::Call(s) => match s.callable() {
                CallableInfo::Local(local) if local.is_valid() => local.imports().to_vec(),
                _ => s.import_line().into_iter().collect(),
            },
            Statement::Expression(s) => s.imports().to_vec(),
            Statement::Group(s) => s.imports(),
        }
    }

    /// Function definitions the statement needs
    pub fn locals(&self) -> Vec<String> {
        match self {
            Statement::Call(s) => match s.callable() {
                CallableInfo::Local(local) if local.is_valid() && !local.definition().is_empty() => {
                    vec![local.definition().to_string()]
                }
                _ => Vec::new(),
            },
            Statement::Expression(s) => s.locals().to_vec(),
            Statement::Group(s) => s.locals(),
        }
    }

    /// Names of the local functions the statement defines or calls
    pub fn local_function_names(&self) -> Vec<String> {
        match self {
            Statement::Call(s) if s.callable().is_local() => vec![s.callable().name().to_string()],
            Statement::Call(_) => Vec::new(),
            Statement::Expression(s) => s.local_names().to_vec(),
            Statement::Group(g) => g
                .statements()
                .iter()
                .flat_map(Statement::local_function_names)
                .collect(),
        }
    }

    /// Every function name the statement defines, imports or calls by.
    ///
    /// Dotted labels contribute their first segment.
    pub fn function_names(&self) -> Vec<String> {
        let root = |label: &str| label.split('.').next().unwrap_or(label).to_string();
        match self {
            Statement::Call(s) => {
                let mut names = vec![s.callable().name().to_string(), root(s.label())];
                names.dedup();
                names
            }
            Statement::Expression(s) => {
                let mut names = s.local_names().to_vec();
                for line in s.imports() {
                    if let Ok(module) = crate::ast::parse(line) {
                        if let Ok(imports) = crate::ast::walk::imports_in(&module.body) {
                            names.extend(imports.into_keys());
                        }
                    }
                }
                names
            }
            Statement::Group(g) => g
                .spec()
                .func()
                .map(root)
                .into_iter()
                .chain(g.statements().iter().flat_map(Statement::function_names))
                .collect(),
        }
    }

    /// Visit every input variable, descending into groups and headers.
    pub(crate) fn for_each_input_mut(&mut self, f: &mut dyn FnMut(&mut InputVariable)) {
        match self {
            Statement::Call(s) => s.inputs_mut().iter_mut().for_each(|i| f(i)),
            Statement::Expression(s) => s.inputs_mut().iter_mut().for_each(|i| f(i)),
            Statement::Group(g) => {
                g.header_inputs_mut().iter_mut().for_each(|i| f(i));
                for inner in g.statements_mut() {
                    inner.for_each_input_mut(f);
                }
            }
        }
    }

    /// Find a statement by uuid, this one or one nested in it.
    pub fn find(&self, uuid: Uuid) -> Option<&Statement> {
        if self.uuid() == uuid {
            return Some(self);
        }
        match self {
            Statement::Group(g) => g.statements().iter().find_map(|s| s.find(uuid)),
            _ => None,
        }
    }

    /// Mutable [`find`](Self::find).
    pub fn find_mut(&mut self, uuid: Uuid) -> Option<&mut Statement> {
        if self.uuid() == uuid {
            return Some(self);
        }
        match self {
            Statement::Group(g) => g
                .statements_mut()
                .iter_mut()
                .find_map(|s| s.find_mut(uuid)),
            _ => None,
        }
    }

    /// This statement's uuid followed by those of every nested statement.
    pub fn uuids(&self) -> Vec<Uuid> {
        let mut uuids = vec![self.uuid()];
        if let Statement::Group(g) = self {
            uuids.extend(g.statements().iter().flat_map(Statement::uuids));
        }
        uuids
    }

    /// Visit this statement and every nested one, mutably.
    pub(crate) fn for_each_mut(&mut self, f: &mut dyn FnMut(&mut Statement)) {
        f(self);
        if let Statement::Group(g) = self {
            for inner in g.statements_mut() {
                inner.for_each_mut(f);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_descends_into_groups() {
        let inner = Statement::from(GeneralExpression::new("y = x").unwrap());
        let id = inner.uuid();
        let group = Statement::from(FunctionCallGroup::new(
            GroupSpec::for_single("xs", "x").unwrap(),
            vec![inner],
        ));
        assert!(group.find(id).is_some());
        assert!(group.find(Uuid::new_v4()).is_none());
        assert_eq!(group.current_elements().len(), 1);
    }

    #[test]
    fn test_local_call_contributes_definition() {
        let callable = CallableInfo::local("f", "import math\ndef f(x):\n    return math.sqrt(x)\n");
        let call = Statement::from(FunctionCall::from_callable(callable));
        assert_eq!(call.imports(), vec!["import math".to_string()]);
        assert_eq!(
            call.locals(),
            vec!["def f(x):\n    return math.sqrt(x)\n".to_string()]
        );
        assert_eq!(call.local_function_names(), vec!["f".to_string()]);
    }
}
