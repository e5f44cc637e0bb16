//! Execution model: an ordered list of statements and what can be derived
//! from it
//!
//! The model regenerates program source from its statements, tracks which
//! statement produces each name, and runs minimal sub-programs
//! (restrictions) against a [`Context`]. Derived products are cached and
//! invalidated on every structural edit.

mod builder;
mod codegen;
mod graph;

pub use builder::ModelBuilder;
pub use codegen::{generate, GeneratedCode};
pub use graph::DependencyGraph;

use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::rc::Rc;

use indexmap::{IndexMap, IndexSet};
use tracing::{debug, error, warn};
use uuid::Uuid;

use crate::ast::{self, Module};
use crate::callable::CallableInfo;
use crate::context::Context;
use crate::error::{BlockflowError, ExecutionFailure, Result};
use crate::interp::{is_builtin, Interpreter, ModuleLoader};
use crate::statement::{FunctionCallGroup, GroupSpec, Statement};
use crate::variable::Slot;

type RestrictionKey = (Option<BTreeSet<String>>, Option<BTreeSet<String>>);

#[derive(Default)]
struct Cache {
    graph: Option<Rc<DependencyGraph>>,
    restrictions: HashMap<RestrictionKey, Rc<ExecutionModel>>,
}

/// What [`ExecutionModel::execute`] ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Statements that were part of the executed program
    pub executed: Vec<Uuid>,
    /// Statements dropped because an input was unavailable
    pub skipped: Vec<Uuid>,
}

/// An ordered list of statements.
pub struct ExecutionModel {
    statements: Vec<Statement>,
    allow_execute: bool,
    cache: RefCell<Cache>,
}

impl Default for ExecutionModel {
    fn default() -> Self {
        Self::from_statements(Vec::new())
    }
}

impl Clone for ExecutionModel {
    fn clone(&self) -> Self {
        Self {
            statements: self.statements.clone(),
            allow_execute: self.allow_execute,
            cache: RefCell::new(Cache::default()),
        }
    }
}

impl fmt::Debug for ExecutionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionModel")
            .field("statements", &self.statements)
            .field("allow_execute", &self.allow_execute)
            .finish()
    }
}

impl ExecutionModel {
    // ═══════════════════════════════════════════════════════════════════
    // Construction
    // ═══════════════════════════════════════════════════════════════════

    /// An empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// A model over the given statements.
    pub fn from_statements(statements: Vec<Statement>) -> Self {
        Self {
            statements,
            allow_execute: true,
            cache: RefCell::new(Cache::default()),
        }
    }

    /// Parse source text; imported callables resolve against an empty
    /// module path.
    pub fn from_source(source: &str) -> Result<Self> {
        let loader = ModuleLoader::new(Vec::new());
        Self::from_source_with(&loader, source)
    }

    /// Parse source text, resolving imported callables through `loader`.
    pub fn from_source_with(loader: &ModuleLoader, source: &str) -> Result<Self> {
        let statements = ModelBuilder::new(loader).build_source(source)?;
        Ok(Self::from_statements(statements))
    }

    /// Build from an already parsed module.
    pub fn from_ast(loader: &ModuleLoader, module: &Module) -> Result<Self> {
        let statements = ModelBuilder::new(loader).build(module)?;
        Ok(Self::from_statements(statements))
    }

    // ═══════════════════════════════════════════════════════════════════
    // Statements
    // ═══════════════════════════════════════════════════════════════════

    /// Top-level statements in insertion order
    pub fn statements(&self) -> &[Statement] {
        &self.statements
    }

    /// Number of top-level statements
    pub fn len(&self) -> usize {
        self.statements.len()
    }

    /// No statements
    pub fn is_empty(&self) -> bool {
        self.statements.is_empty()
    }

    /// Find a statement, descending into groups.
    pub fn find(&self, uuid: Uuid) -> Option<&Statement> {
        self.statements.iter().find_map(|s| s.find(uuid))
    }

    fn find_mut(&mut self, uuid: Uuid) -> Result<&mut Statement> {
        self.statements
            .iter_mut()
            .find_map(|s| s.find_mut(uuid))
            .ok_or(BlockflowError::UnknownUuid(uuid))
    }

    fn invalidate(&self) {
        let mut cache = self.cache.borrow_mut();
        cache.graph = None;
        cache.restrictions.clear();
    }

    /// Append a statement.
    ///
    /// Fails with [`DuplicateUuid`](BlockflowError::DuplicateUuid) when the
    /// statement, or one nested in it, shares a uuid with the model.
    pub fn add_function(&mut self, statement: impl Into<Statement>) -> Result<Uuid> {
        let statement = statement.into();
        let mut seen: IndexSet<Uuid> = self.statements.iter().flat_map(Statement::uuids).collect();
        if let Some(dup) = statement.uuids().into_iter().find(|u| !seen.insert(*u)) {
            return Err(BlockflowError::DuplicateUuid(dup));
        }
        let uuid = statement.uuid();
        debug!(statement = %uuid, kind = statement.kind_name(), "adding statement");
        self.statements.push(statement);
        self.invalidate();
        Ok(uuid)
    }

    /// Remove a top-level statement.
    pub fn remove_function(&mut self, uuid: Uuid) -> Result<Statement> {
        let pos = self
            .statements
            .iter()
            .position(|s| s.uuid() == uuid)
            .ok_or(BlockflowError::UnknownUuid(uuid))?;
        self.invalidate();
        Ok(self.statements.remove(pos))
    }

    /// Whether [`execute`](Self::execute) runs anything
    pub fn allow_execute(&self) -> bool {
        self.allow_execute
    }

    /// Gate execution.
    pub fn set_allow_execute(&mut self, allow: bool) {
        self.allow_execute = allow;
    }

    /// `base` followed by the smallest positive integer not already used as
    /// a function name: local definitions, imported callables, call labels
    /// and loop header functions all count.
    pub fn generate_unique_function_name(&self, base: &str) -> String {
        let taken: IndexSet<String> = self
            .statements
            .iter()
            .flat_map(Statement::function_names)
            .collect();
        (1..)
            .map(|i| format!("{}{}", base, i))
            .find(|name| !taken.contains(name))
            .unwrap_or_else(|| base.to_string())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Groups
    // ═══════════════════════════════════════════════════════════════════

    /// Wrap statements in a group.
    ///
    /// With `uuids` of `None` every top-level statement that is not itself a
    /// group is wrapped. The group takes the place of the first wrapped
    /// statement.
    pub fn merge_statements(&mut self, spec: GroupSpec, uuids: Option<&[Uuid]>) -> Result<Uuid> {
        let uuids: Vec<Uuid> = match uuids {
            Some(uuids) => uuids.to_vec(),
            None => self
                .statements
                .iter()
                .filter(|s| !matches!(s, Statement::Group(_)))
                .map(Statement::uuid)
                .collect(),
        };
        let group = FunctionCallGroup::from_ids(&self.statements, spec, &uuids)?;
        let at = self
            .statements
            .iter()
            .position(|s| uuids.contains(&s.uuid()))
            .unwrap_or(self.statements.len());
        let before = self.statements[..at]
            .iter()
            .filter(|s| uuids.contains(&s.uuid()))
            .count();
        self.statements.retain(|s| !uuids.contains(&s.uuid()));

        let uuid = group.uuid();
        debug!(group = %uuid, members = uuids.len(), "merged statements");
        self.statements.insert(at - before, group.into());
        self.invalidate();
        Ok(uuid)
    }

    /// Splice the statements of a group back in place of the group.
    pub fn unmerge_statements(&mut self, uuid: Uuid) -> Result<()> {
        if !unmerge_in(&mut self.statements, uuid) {
            return Err(BlockflowError::UnknownUuid(uuid));
        }
        self.invalidate();
        Ok(())
    }

    /// Flatten every group.
    pub fn unmerge_all_groups(&mut self) {
        while let Some(uuid) = self
            .statements
            .iter()
            .find(|s| matches!(s, Statement::Group(_)))
            .map(Statement::uuid)
        {
            unmerge_in(&mut self.statements, uuid);
        }
        self.invalidate();
    }

    // ═══════════════════════════════════════════════════════════════════
    // Editing
    // ═══════════════════════════════════════════════════════════════════

    /// Rebind a variable of a statement.
    ///
    /// For groups, inputs are header inputs and outputs are loop variables.
    /// Expression blocks derive their variables from their code and have no
    /// rebindable slots.
    pub fn assign_binding(
        &mut self,
        uuid: Uuid,
        slot: Slot,
        name: &str,
        binding: Option<&str>,
    ) -> Result<()> {
        let statement = self.find_mut(uuid)?;
        match (statement, slot) {
            (Statement::Call(call), Slot::Input) => call.set_input_binding(name, binding)?,
            (Statement::Call(call), Slot::Output) => call.set_output_binding(name, binding)?,
            (Statement::Group(group), Slot::Input) => group.set_header_binding(name, binding)?,
            (Statement::Group(group), Slot::Output) => group.set_current_element(name, binding)?,
            (Statement::Expression(_), slot) => {
                return Err(BlockflowError::UnknownVariable {
                    uuid,
                    slot: slot.as_str(),
                    name: name.to_string(),
                })
            }
        }
        self.invalidate();
        Ok(())
    }

    /// Replace the source of a local function, or the code of an expression
    /// block.
    ///
    /// Every call to the same local function is re-synchronised with the new
    /// signature.
    pub fn update_local_source(&mut self, uuid: Uuid, source: &str) -> Result<()> {
        let name = match self.find_mut(uuid)? {
            Statement::Expression(expr) => {
                expr.set_code(source)?;
                self.invalidate();
                return Ok(());
            }
            Statement::Call(call) if call.callable().is_local() => call.callable().name().to_string(),
            _ => {
                return Err(BlockflowError::InvalidExpressionBlock {
                    reason: "statement does not call a local function".to_string(),
                })
            }
        };
        let callable = CallableInfo::local(&name, source);
        if let Some(err) = callable.load_error() {
            warn!(function = %name, error = %err, "local function source is invalid");
        }
        for statement in &mut self.statements {
            statement.for_each_mut(&mut |s| {
                if let Statement::Call(call) = s {
                    if call.callable().is_local() && call.callable().name() == name {
                        call.update_from_callable(callable.clone());
                    }
                }
            });
        }
        self.invalidate();
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════
    // Derived products
    // ═══════════════════════════════════════════════════════════════════

    /// Dependency graph of the top-level statements.
    pub fn graph(&self) -> Rc<DependencyGraph> {
        if let Some(graph) = &self.cache.borrow().graph {
            return graph.clone();
        }
        let graph = Rc::new(DependencyGraph::build(&self.statements));
        self.cache.borrow_mut().graph = Some(graph.clone());
        graph
    }

    /// Statement uuids, producers before consumers.
    pub fn topological_order(&self) -> Vec<Uuid> {
        self.graph()
            .order()
            .iter()
            .map(|&pos| self.statements[pos].uuid())
            .collect()
    }

    /// Each statement's uuid mapped to the statements it reads from.
    pub fn dependency_graph(&self) -> IndexMap<Uuid, IndexSet<Uuid>> {
        self.graph().dependencies()
    }

    /// Regenerated program with its line map.
    pub fn generated(&self) -> GeneratedCode {
        generate(&self.statements, self.graph().order())
    }

    /// Regenerated program text.
    pub fn code(&self) -> String {
        self.generated().source
    }

    /// Import and definition sections of the program.
    pub fn imports_and_locals(&self) -> String {
        self.generated().imports_and_locals()
    }

    /// Body of the program.
    pub fn body(&self) -> String {
        self.generated().body
    }

    /// Names bound by the program's imports and local definitions.
    pub fn provided_names(&self) -> IndexSet<String> {
        let mut names: IndexSet<String> = self
            .statements
            .iter()
            .flat_map(Statement::local_function_names)
            .collect();
        let imports: IndexSet<String> = self.statements.iter().flat_map(Statement::imports).collect();
        let text = imports.into_iter().collect::<Vec<_>>().join("\n");
        let sites = ast::parse(&text)
            .map_err(BlockflowError::from)
            .and_then(|module| ast::find_imports(&module));
        match sites {
            Ok(sites) => names.extend(sites.into_keys()),
            Err(err) => warn!(error = %err, "import lines do not parse"),
        }
        names
    }

    /// Names the program reads before producing them, in execution order.
    pub fn free_inputs(&self) -> IndexSet<String> {
        let provided = self.provided_names();
        let mut produced: IndexSet<String> = IndexSet::new();
        let mut free = IndexSet::new();
        for &pos in self.graph().order() {
            let statement = &self.statements[pos];
            for name in statement.input_names() {
                if !produced.contains(&name) && !provided.contains(&name) && !is_builtin(&name) {
                    free.insert(name);
                }
            }
            produced.extend(statement.output_names());
        }
        free
    }

    /// Every name some statement writes.
    pub fn all_outputs(&self) -> IndexSet<String> {
        self.statements.iter().flat_map(Statement::output_names).collect()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Restriction
    // ═══════════════════════════════════════════════════════════════════

    /// The sub-model reading only `inputs` (plus what it produces itself)
    /// and computing `outputs`.
    ///
    /// `None` leaves a side unconstrained. Statement order is preserved and
    /// results are cached per pair of name sets.
    pub fn restrict(&self, inputs: Option<&[String]>, outputs: Option<&[String]>) -> Rc<ExecutionModel> {
        let key: RestrictionKey = (
            inputs.map(|names| names.iter().cloned().collect()),
            outputs.map(|names| names.iter().cloned().collect()),
        );
        if let Some(hit) = self.cache.borrow().restrictions.get(&key) {
            debug!(inputs = ?key.0, outputs = ?key.1, "restriction cache hit");
            return hit.clone();
        }
        debug!(inputs = ?key.0, outputs = ?key.1, "restriction cache miss");

        let graph = self.graph();
        let forward = key.0.as_ref().map(|names| {
            graph.downstream(
                names
                    .iter()
                    .flat_map(|n| graph.consumers_of(n).iter().copied())
                    .collect::<Vec<_>>(),
            )
        });
        let backward = key
            .1
            .as_ref()
            .map(|names| graph.upstream(names.iter().filter_map(|n| graph.producer_of(n))));
        let keep = |pos: usize| {
            forward.as_ref().map_or(true, |f| f.contains(&pos))
                && backward.as_ref().map_or(true, |b| b.contains(&pos))
        };

        let statements = self
            .statements
            .iter()
            .enumerate()
            .filter(|(pos, _)| keep(*pos))
            .map(|(_, s)| s.clone())
            .collect();
        let mut restricted = ExecutionModel::from_statements(statements);
        restricted.allow_execute = self.allow_execute;
        let restricted = Rc::new(restricted);
        self.cache
            .borrow_mut()
            .restrictions
            .insert(key, restricted.clone());
        restricted
    }

    // ═══════════════════════════════════════════════════════════════════
    // Satisfaction
    // ═══════════════════════════════════════════════════════════════════

    /// Flag every input whose binding reads a name nothing provides.
    ///
    /// Outputs, loop variables, builtins, imported and defined names and
    /// `available` all count as provided. Returns the names still required
    /// and the names found satisfied.
    pub fn mark_unsatisfied_inputs(
        &mut self,
        available: impl IntoIterator<Item = String>,
    ) -> (IndexSet<String>, IndexSet<String>) {
        let mut provided = self.all_outputs();
        provided.extend(self.provided_names());
        for statement in &self.statements {
            provided.extend(statement.current_elements());
        }
        provided.extend(available);

        let mut required = IndexSet::new();
        let mut satisfied = IndexSet::new();
        for statement in &mut self.statements {
            statement.for_each_input_mut(&mut |input| {
                let mut ok = true;
                for name in input.dependencies() {
                    if provided.contains(&name) || is_builtin(&name) {
                        satisfied.insert(name);
                    } else {
                        ok = false;
                        required.insert(name);
                    }
                }
                input.set_satisfied(ok);
            });
        }
        (required, satisfied)
    }

    // ═══════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════

    /// Run the restriction for `inputs` and `outputs` against `context`.
    ///
    /// Statements whose inputs are neither in the context nor produced by
    /// an earlier retained statement are skipped. Every name the retained
    /// program writes is removed from the context first, except names it
    /// also reads before writing.
    pub fn execute(
        &self,
        context: &Context,
        inputs: Option<&[String]>,
        outputs: Option<&[String]>,
        interp: &Interpreter,
    ) -> Result<ExecutionReport> {
        let mut report = ExecutionReport::default();
        if !self.allow_execute {
            debug!("execution disabled");
            return Ok(report);
        }

        let restricted = self.restrict(inputs, outputs);
        let provided = restricted.provided_names();
        let mut available: IndexSet<String> = context.keys().into_iter().collect();
        let mut retained = Vec::new();
        for &pos in restricted.graph().order() {
            let statement = &restricted.statements[pos];
            let missing: Vec<String> = statement
                .input_names()
                .into_iter()
                .filter(|n| !available.contains(n) && !provided.contains(n) && !is_builtin(n))
                .collect();
            if missing.is_empty() {
                available.extend(statement.output_names());
                report.executed.push(statement.uuid());
                retained.push(statement.clone());
            } else {
                debug!(statement = %statement.uuid(), missing = ?missing, "skipping statement");
                report.skipped.push(statement.uuid());
            }
        }
        if retained.is_empty() {
            return Ok(report);
        }

        let program = ExecutionModel::from_statements(retained);
        let generated = program.generated();
        let free = program.free_inputs();
        {
            let _batch = context.batch();
            for name in program.all_outputs() {
                if free.contains(&name) {
                    continue;
                }
                if let Err(err) = context.remove(&name) {
                    warn!(name = %name, error = %err, "could not clear stale value");
                }
            }
        }

        debug!(statements = report.executed.len(), "executing");
        let module = ast::parse(&generated.source)?;
        let mut locals = context.clone();
        if let Err(err) = interp.exec_module(&module, &generated.source, &mut locals) {
            let statement = generated.statement_at(err.line);
            error!(
                line = err.line,
                statement = ?statement,
                names = ?inputs,
                error = %err.error,
                source = %generated.source,
                "execution failed"
            );
            return Err(BlockflowError::Execution(Box::new(ExecutionFailure {
                error: err.error,
                line: Some(err.line),
                statement,
                source_code: generated.source,
                names: inputs.map(<[String]>::to_vec),
            })));
        }
        Ok(report)
    }
}

/// Replace the group `uuid` within `statements` (or a nested group) by its
/// members.
fn unmerge_in(statements: &mut Vec<Statement>, uuid: Uuid) -> bool {
    if let Some(pos) = statements
        .iter()
        .position(|s| matches!(s, Statement::Group(g) if g.uuid() == uuid))
    {
        if let Statement::Group(group) = statements.remove(pos) {
            let members = group.into_statements();
            statements.splice(pos..pos, members);
        }
        return true;
    }
    statements.iter_mut().any(|s| match s {
        Statement::Group(g) => unmerge_in(g.statements_mut(), uuid),
        _ => false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::GeneralExpression;
    use crate::value::Value;

    fn expr(code: &str) -> Statement {
        GeneralExpression::new(code).unwrap().into()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_code_follows_dependencies() {
        let model = ExecutionModel::from_statements(vec![expr("d = c * 2"), expr("c = a + 1")]);
        assert_eq!(model.code(), "c = a + 1\nd = c * 2\n");
        assert_eq!(model.free_inputs().into_iter().collect::<Vec<_>>(), vec!["a"]);
    }

    #[test]
    fn test_restriction_is_cached_and_invalidated() {
        let mut model = ExecutionModel::from_statements(vec![expr("c = a + 1"), expr("d = c * 2")]);
        let outputs = names(&["c"]);
        let first = model.restrict(None, Some(&outputs));
        let second = model.restrict(None, Some(&outputs));
        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(first.len(), 1);

        model.add_function(expr("e = c")).unwrap();
        let third = model.restrict(None, Some(&outputs));
        assert!(!Rc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_unique_function_name() {
        let model = ExecutionModel::from_statements(vec![expr(
            "def new_function1(x):\n    return x\ny = new_function1(2)",
        )]);
        assert_eq!(model.generate_unique_function_name("new_function"), "new_function2");
        assert_eq!(model.generate_unique_function_name("other"), "other1");
    }

    #[test]
    fn test_unique_function_name_skips_imports_and_loop_functions() {
        let looped = FunctionCallGroup::new(
            GroupSpec::for_func("helper2", &["n"], &["i"]).unwrap(),
            vec![expr("t = i")],
        );
        let model = ExecutionModel::from_statements(vec![
            expr("from m import helper1\ny = helper1(2)"),
            looped.into(),
        ]);
        assert_eq!(model.generate_unique_function_name("helper"), "helper3");
    }

    #[test]
    fn test_merge_places_group_at_first_member() {
        let mut model = ExecutionModel::from_statements(vec![
            expr("a = 1"),
            expr("b = a"),
            expr("c = b"),
        ]);
        let ids: Vec<Uuid> = model.statements()[1..].iter().map(Statement::uuid).collect();
        let group = model.merge_statements(GroupSpec::plain(), Some(&ids)).unwrap();
        assert_eq!(model.len(), 2);
        assert_eq!(model.statements()[1].uuid(), group);
        assert_eq!(model.code(), "a = 1\nb = a\nc = b\n");

        model.unmerge_statements(group).unwrap();
        assert_eq!(model.len(), 3);
        assert!(model.unmerge_statements(group).is_err());
    }

    #[test]
    fn test_expression_has_no_bindings() {
        let mut model = ExecutionModel::from_statements(vec![expr("a = 1")]);
        let uuid = model.statements()[0].uuid();
        let err = model
            .assign_binding(uuid, Slot::Output, "a", Some("b"))
            .unwrap_err();
        assert!(matches!(err, BlockflowError::UnknownVariable { .. }));
    }

    #[test]
    fn test_execute_skips_missing_inputs() {
        let model = ExecutionModel::from_statements(vec![expr("c = a + 1"), expr("d = b + 1")]);
        let context = Context::with_values("ctx", [("a", Value::Int(1))]);
        let report = model
            .execute(&context, None, None, &Interpreter::default())
            .unwrap();
        assert_eq!(report.executed.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(context.get("c"), Some(Value::Int(2)));
        assert_eq!(context.get("d"), None);
    }

    #[test]
    fn test_execute_disabled() {
        let mut model = ExecutionModel::from_statements(vec![expr("c = 1")]);
        model.set_allow_execute(false);
        let context = Context::new("ctx");
        model
            .execute(&context, None, None, &Interpreter::default())
            .unwrap();
        assert!(context.is_empty());
    }

    #[test]
    fn test_execute_failure_names_statement() {
        let model = ExecutionModel::from_statements(vec![expr("c = a + 1"), expr("d = c / 0")]);
        let context = Context::with_values("ctx", [("a", Value::Int(1))]);
        let err = model
            .execute(&context, None, None, &Interpreter::default())
            .unwrap_err();
        let BlockflowError::Execution(failure) = err else {
            panic!("expected an execution failure");
        };
        assert_eq!(failure.line, Some(2));
        assert_eq!(failure.statement, Some(model.statements()[1].uuid()));
        assert_eq!(context.get("c"), Some(Value::Int(2)));
    }
}
