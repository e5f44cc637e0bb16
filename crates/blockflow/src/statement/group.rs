//! Loops and visual groupings of statements

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{GeneralExpression, Statement};
use crate::ast;
use crate::error::{BlockflowError, Result};
use crate::interp::is_builtin;
use crate::variable::{InputVariable, OutputVariable, Slot};

/// Shape of a group header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKind {
    /// `for celem in iterable:`
    ForSingle,
    /// `for (tuple_x,tuple_y) in iterable:`
    ForTuple,
    /// `for celems in fn(args):`
    ForFunc,
    /// `while condition:`
    While,
    /// No header; the statements run once
    Plain,
}

/// A group header: its kind, the inputs and loop variables it binds, and
/// whatever imports or definitions the header itself needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupSpec {
    kind: GroupKind,
    header_inputs: Vec<InputVariable>,
    current_elements: Vec<OutputVariable>,
    #[serde(default)]
    func: Option<String>,
    indent_width: usize,
    #[serde(default)]
    imports: Vec<String>,
    #[serde(default)]
    locals: Vec<String>,
    #[serde(default)]
    resolved: IndexSet<String>,
}

impl GroupSpec {
    fn build(
        kind: GroupKind,
        header_inputs: Vec<InputVariable>,
        current_elements: Vec<OutputVariable>,
        func: Option<String>,
    ) -> Self {
        let indent_width = if kind == GroupKind::Plain { 0 } else { 4 };
        Self {
            kind,
            header_inputs,
            current_elements,
            func,
            indent_width,
            imports: Vec::new(),
            locals: Vec::new(),
            resolved: IndexSet::new(),
        }
    }

    fn bound_input(name: &str, binding: &str) -> InputVariable {
        let mut input = InputVariable::new(name);
        input.set_binding(Some(binding));
        input
    }

    /// `for celem in iterable:`
    pub fn for_single(iterable: &str, celem: &str) -> Result<Self> {
        Ok(Self::build(
            GroupKind::ForSingle,
            vec![Self::bound_input("iterable", iterable)],
            vec![OutputVariable::bound("celem", celem)?],
            None,
        ))
    }

    /// `for (x,y) in iterable:`
    pub fn for_tuple(iterable: &str, x: &str, y: &str) -> Result<Self> {
        Ok(Self::build(
            GroupKind::ForTuple,
            vec![Self::bound_input("iterable", iterable)],
            vec![
                OutputVariable::bound("tuple_x", x)?,
                OutputVariable::bound("tuple_y", y)?,
            ],
            None,
        ))
    }

    /// `for celems in func(args):` with one or two loop variables.
    pub fn for_func(func: &str, args: &[&str], celems: &[&str]) -> Result<Self> {
        let current_elements = match celems {
            [celem] => vec![OutputVariable::bound("celem", *celem)?],
            [x, y] => vec![
                OutputVariable::bound("tuple_x", *x)?,
                OutputVariable::bound("tuple_y", *y)?,
            ],
            _ => {
                return Err(BlockflowError::InvalidExpressionBlock {
                    reason: format!("a loop binds one or two names, not {}", celems.len()),
                })
            }
        };
        let header_inputs = args
            .iter()
            .enumerate()
            .map(|(i, arg)| Self::bound_input(&format!("arg{}", i), arg))
            .collect();
        Ok(Self::build(
            GroupKind::ForFunc,
            header_inputs,
            current_elements,
            Some(func.to_string()),
        ))
    }

    /// `while condition:`
    pub fn while_loop(condition: &str) -> Self {
        Self::build(
            GroupKind::While,
            vec![Self::bound_input("condition", condition)],
            Vec::new(),
            None,
        )
    }

    /// A grouping without a header.
    pub fn plain() -> Self {
        Self::build(GroupKind::Plain, Vec::new(), Vec::new(), None)
    }

    /// Attach an import line the header needs, binding `name`.
    pub fn require_import(&mut self, name: &str, line: String) {
        self.resolved.insert(name.to_string());
        if !self.imports.contains(&line) {
            self.imports.push(line);
        }
    }

    /// Attach a definition the header needs, binding `name`.
    pub fn require_local(&mut self, name: &str, source: String) {
        self.resolved.insert(name.to_string());
        if !self.locals.contains(&source) {
            self.locals.push(source);
        }
    }

    /// Header kind
    pub fn kind(&self) -> GroupKind {
        self.kind
    }

    /// Inputs the header reads
    pub fn header_inputs(&self) -> &[InputVariable] {
        &self.header_inputs
    }

    /// Loop variables
    pub fn current_elements(&self) -> &[OutputVariable] {
        &self.current_elements
    }

    /// Function producing the iterable of a `for_func` loop
    pub fn func(&self) -> Option<&str> {
        self.func.as_deref()
    }

    /// Indentation of the body
    pub fn indent_width(&self) -> usize {
        self.indent_width
    }

    fn celems(&self) -> String {
        match self.current_elements.as_slice() {
            [single] => single.binding().to_string(),
            many => format!(
                "({})",
                many.iter()
                    .map(OutputVariable::binding)
                    .collect::<Vec<_>>()
                    .join(",")
            ),
        }
    }

    fn header_binding<'a>(&'a self, name: &'a str) -> &'a str {
        self.header_inputs
            .iter()
            .find(|i| i.name() == name)
            .map(InputVariable::binding)
            .unwrap_or(name)
    }

    /// The header line, `None` for plain groups.
    pub fn header(&self) -> Option<String> {
        match self.kind {
            GroupKind::ForSingle | GroupKind::ForTuple => Some(format!(
                "for {} in {}:",
                self.celems(),
                self.header_binding("iterable")
            )),
            GroupKind::ForFunc => {
                let args: Vec<String> = self
                    .header_inputs
                    .iter()
                    .map(InputVariable::call_signature)
                    .filter(|a| !a.is_empty())
                    .collect();
                Some(format!(
                    "for {} in {}({}):",
                    self.celems(),
                    self.func.as_deref().unwrap_or_default(),
                    args.join(", ")
                ))
            }
            GroupKind::While => Some(format!("while {}:", self.header_binding("condition"))),
            GroupKind::Plain => None,
        }
    }

    /// Names the header reads from outside the group.
    fn input_names(&self) -> IndexSet<String> {
        let celems: IndexSet<&str> = self.current_elements.iter().map(|c| c.binding()).collect();
        let mut names: IndexSet<String> = self
            .header_inputs
            .iter()
            .flat_map(InputVariable::dependencies)
            .collect();
        if let Some(root) = self.func.as_deref().and_then(|f| f.split('.').next()) {
            names.insert(root.to_string());
        }
        names.retain(|n| {
            !celems.contains(n.as_str()) && !self.resolved.contains(n) && !is_builtin(n)
        });
        names
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Groups
// ═══════════════════════════════════════════════════════════════════════

/// A header wrapping an ordered list of statements.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCallGroup {
    uuid: Uuid,
    spec: GroupSpec,
    statements: Vec<Statement>,
}

impl FunctionCallGroup {
    /// Wrap `statements` under `spec`.
    pub fn new(spec: GroupSpec, statements: Vec<Statement>) -> Self {
        let mut group = Self {
            uuid: Uuid::new_v4(),
            spec,
            statements: Vec::new(),
        };
        group.extend(statements);
        group
    }

    pub(crate) fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// Pick statements from `statements` by uuid and wrap them, keeping
    /// the order they have in `statements`.
    pub fn from_ids(statements: &[Statement], spec: GroupSpec, uuids: &[Uuid]) -> Result<Self> {
        if let Some(missing) = uuids
            .iter()
            .find(|id| !statements.iter().any(|s| s.uuid() == **id))
        {
            return Err(BlockflowError::UnknownUuid(*missing));
        }
        let picked = statements
            .iter()
            .filter(|s| uuids.contains(&s.uuid()))
            .cloned()
            .collect();
        Ok(Self::new(spec, picked))
    }

    /// Identity
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Header
    pub fn spec(&self) -> &GroupSpec {
        &self.spec
    }

    /// Inner statements
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    pub(crate) fn statements_mut(&mut self) -> &mut Vec<Statement> {
        &mut self.statements
    }

    pub(crate) fn into_statements(self) -> Vec<Statement> {
        self.statements
    }

    pub(crate) fn header_inputs_mut(&mut self) -> &mut [InputVariable] {
        &mut self.spec.header_inputs
    }

    /// Rebind a header input (`iterable`, `condition`, `arg0`, ...).
    pub fn set_header_binding(&mut self, name: &str, binding: Option<&str>) -> Result<()> {
        let uuid = self.uuid;
        let input = self
            .spec
            .header_inputs
            .iter_mut()
            .find(|i| i.name() == name)
            .ok_or_else(|| BlockflowError::UnknownVariable {
                uuid,
                slot: Slot::Input.as_str(),
                name: name.to_string(),
            })?;
        input.set_binding(binding);
        Ok(())
    }

    /// Rename a loop variable (`celem`, `tuple_x`, `tuple_y`).
    pub fn set_current_element(&mut self, name: &str, binding: Option<&str>) -> Result<()> {
        let uuid = self.uuid;
        let celem = self
            .spec
            .current_elements
            .iter_mut()
            .find(|c| c.name() == name)
            .ok_or_else(|| BlockflowError::UnknownVariable {
                uuid,
                slot: Slot::Output.as_str(),
                name: name.to_string(),
            })?;
        celem.set_binding(binding)
    }

    /// Append statements, dropping loop-variable placeholders.
    pub fn extend(&mut self, statements: impl IntoIterator<Item = Statement>) {
        self.statements.extend(
            statements
                .into_iter()
                .filter(|s| !matches!(s, Statement::Expression(e) if e.current_element_of().is_some())),
        );
    }

    /// Append one statement, dropping it when it is a loop-variable
    /// placeholder.
    pub fn push(&mut self, statement: Statement) {
        self.extend([statement]);
    }

    /// A placeholder block showing the loop variables while the group is
    /// edited. It is never stored in the group.
    pub fn current_element_statement(&self) -> Option<GeneralExpression> {
        let names: Vec<&str> = self
            .spec
            .current_elements
            .iter()
            .map(OutputVariable::binding)
            .collect();
        if names.is_empty() {
            return None;
        }
        GeneralExpression::new(&names.join(", "))
            .ok()
            .map(|e| e.for_current_element(self.uuid))
    }

    /// Header followed by the inner signatures, indented.
    pub fn call_signature(&self) -> String {
        let body: Vec<String> = self
            .statements
            .iter()
            .map(Statement::call_signature)
            .filter(|s| !s.is_empty())
            .collect();
        let mut body = body.join("\n");
        match self.spec.header() {
            Some(header) => {
                if body.is_empty() {
                    body = "pass".to_string();
                }
                let indented = ast::indent(&body, self.spec.indent_width);
                format!("{}\n{}", header, indented.trim_end_matches('\n'))
            }
            None => body,
        }
    }

    /// Names read from outside the group: inner reads not produced by an
    /// earlier inner statement or a loop variable, then header reads.
    pub fn input_names(&self) -> IndexSet<String> {
        let mut bound: IndexSet<String> = self
            .spec
            .current_elements
            .iter()
            .map(|c| c.binding().to_string())
            .collect();
        let mut names = IndexSet::new();
        for stmt in &self.statements {
            for name in stmt.input_names() {
                if !bound.contains(&name) {
                    names.insert(name);
                }
            }
            bound.extend(stmt.output_names());
        }
        names.extend(self.spec.input_names());
        names
    }

    /// Names visible outside the group: inner outputs, then loop variables.
    ///
    /// Temporaries are left out. A temporary is written by one inner
    /// statement and read by a later one without being written again or
    /// read from outside the group.
    pub fn output_names(&self) -> IndexSet<String> {
        let external = self.input_names();
        let mut bound: IndexSet<String> = IndexSet::new();
        let mut consumed: IndexSet<String> = IndexSet::new();
        for stmt in &self.statements {
            for name in stmt.input_names() {
                if bound.contains(&name) {
                    consumed.insert(name);
                }
            }
            for name in stmt.output_names() {
                consumed.shift_remove(&name);
                bound.insert(name);
            }
        }
        let mut names: IndexSet<String> = bound
            .into_iter()
            .filter(|name| !consumed.contains(name) || external.contains(name))
            .collect();
        names.extend(
            self.spec
                .current_elements
                .iter()
                .map(|c| c.binding().to_string()),
        );
        names
    }

    /// The inner and header input variables whose reads reach outside the
    /// group.
    pub fn inputs(&self) -> Vec<&InputVariable> {
        let external = self.input_names();
        let mut inputs: Vec<&InputVariable> = self
            .statements
            .iter()
            .flat_map(Statement::inputs)
            .filter(|i| i.dependencies().iter().any(|d| external.contains(d)))
            .collect();
        inputs.extend(
            self.spec
                .header_inputs
                .iter()
                .filter(|i| i.dependencies().iter().any(|d| external.contains(d))),
        );
        inputs
    }

    /// Import lines of the header and the inner statements
    pub fn imports(&self) -> Vec<String> {
        let mut lines = self.spec.imports.clone();
        lines.extend(self.statements.iter().flat_map(Statement::imports));
        lines
    }

    /// Definitions of the header and the inner statements
    pub fn locals(&self) -> Vec<String> {
        let mut defs = self.spec.locals.clone();
        defs.extend(self.statements.iter().flat_map(Statement::locals));
        defs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(code: &str) -> Statement {
        Statement::Expression(GeneralExpression::new(code).unwrap())
    }

    #[test]
    fn test_for_single_signature() {
        let spec = GroupSpec::for_single("items", "celem").unwrap();
        let group = FunctionCallGroup::new(spec, vec![expr("c = a + celem"), expr("d = c * b")]);
        assert_eq!(
            group.call_signature(),
            "for celem in items:\n    c = a + celem\n    d = c * b"
        );
        let inputs: Vec<_> = group.input_names().into_iter().collect();
        assert_eq!(inputs, vec!["a", "b", "items"]);
        let outputs: Vec<_> = group.output_names().into_iter().collect();
        assert_eq!(outputs, vec!["d", "celem"]);
    }

    #[test]
    fn test_headers() {
        let tuple = GroupSpec::for_tuple("pairs", "k", "v").unwrap();
        assert_eq!(tuple.header().as_deref(), Some("for (k,v) in pairs:"));
        let func = GroupSpec::for_func("range", &["n"], &["i"]).unwrap();
        assert_eq!(func.header().as_deref(), Some("for i in range(n):"));
        let wh = GroupSpec::while_loop("x < 10");
        assert_eq!(wh.header().as_deref(), Some("while x < 10:"));
        assert_eq!(GroupSpec::plain().header(), None);
        assert_eq!(GroupSpec::plain().indent_width(), 0);
    }

    #[test]
    fn test_rebinding_header() {
        let spec = GroupSpec::for_single("items", "celem").unwrap();
        let mut group = FunctionCallGroup::new(spec, vec![expr("y = celem")]);
        group.set_header_binding("iterable", Some("rows")).unwrap();
        group.set_current_element("celem", Some("row")).unwrap();
        assert!(group.call_signature().starts_with("for row in rows:"));
        assert!(group.set_current_element("celem", Some("1x")).is_err());
        assert!(group.set_header_binding("nothing", None).is_err());
    }

    #[test]
    fn test_empty_loop_body_passes() {
        let group = FunctionCallGroup::new(GroupSpec::while_loop("go"), Vec::new());
        assert_eq!(group.call_signature(), "while go:\n    pass");
    }

    #[test]
    fn test_loop_carried_name_is_input() {
        let spec = GroupSpec::for_single("xs", "x").unwrap();
        let group = FunctionCallGroup::new(spec, vec![expr("total = total + x")]);
        assert!(group.input_names().contains("total"));
        assert!(!group.input_names().contains("x"));
    }

    #[test]
    fn test_placeholder_is_not_stored() {
        let spec = GroupSpec::for_single("xs", "x").unwrap();
        let mut group = FunctionCallGroup::new(spec, Vec::new());
        let placeholder = group.current_element_statement().unwrap();
        assert_eq!(placeholder.current_element_of(), Some(group.uuid()));
        group.push(Statement::Expression(placeholder));
        group.push(expr("y = x"));
        assert_eq!(group.statements().len(), 1);
    }

    #[test]
    fn test_from_ids_unknown_uuid() {
        let stmts = vec![expr("a = 1")];
        let missing = Uuid::new_v4();
        assert!(matches!(
            FunctionCallGroup::from_ids(&stmts, GroupSpec::plain(), &[missing]),
            Err(BlockflowError::UnknownUuid(id)) if id == missing
        ));
    }

    #[test]
    fn test_nested_groups_accumulate_indent() {
        let inner = FunctionCallGroup::new(
            GroupSpec::for_single("row", "v").unwrap(),
            vec![expr("s = s + v")],
        );
        let outer = FunctionCallGroup::new(
            GroupSpec::for_single("rows", "row").unwrap(),
            vec![Statement::Group(inner)],
        );
        assert_eq!(
            outer.call_signature(),
            "for row in rows:\n    for v in row:\n        s = s + v"
        );
    }
}
