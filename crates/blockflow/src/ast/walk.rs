//! Tree walkers used when turning source into statements.

use indexmap::{IndexMap, IndexSet};

use super::node::*;
use super::unparse::unparse_expr;
use crate::error::BlockflowError;

// ═══════════════════════════════════════════════════════════════════════
// Definitions and imports
// ═══════════════════════════════════════════════════════════════════════

/// A top-level `def` together with the span of its statement.
#[derive(Debug, Clone, Copy)]
pub struct DefSite<'a> {
    /// The definition
    pub def: &'a FunctionDef,
    /// Span of the whole `def` statement
    pub span: Span,
}

/// Top-level function definitions by name. Nested `def`s are ignored; a
/// later definition of the same name replaces an earlier one.
pub fn find_top_level_defs(module: &Module) -> IndexMap<String, DefSite<'_>> {
    let mut defs = IndexMap::new();
    for stmt in &module.body {
        if let StmtKind::FunctionDef(def) = &stmt.kind {
            defs.insert(
                def.name.clone(),
                DefSite {
                    def,
                    span: stmt.span,
                },
            );
        }
    }
    defs
}

/// One name bound by an import statement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportSite {
    /// Module path (`a.b` in `import a.b` or `from a.b import c`)
    pub module: String,
    /// Imported member for `from` imports
    pub member: Option<String>,
    /// Name the import binds locally
    pub local_name: String,
}

impl ImportSite {
    /// The single-name import line that binds exactly this name.
    pub fn line(&self) -> String {
        match &self.member {
            Some(member) if *member == self.local_name => {
                format!("from {} import {}", self.module, member)
            }
            Some(member) => format!(
                "from {} import {} as {}",
                self.module, member, self.local_name
            ),
            None if self.module == self.local_name => format!("import {}", self.module),
            None if self.module.split('.').next() == Some(self.local_name.as_str()) => {
                format!("import {}", self.module)
            }
            None => format!("import {} as {}", self.module, self.local_name),
        }
    }
}

/// Names bound by the top-level imports of `module`.
///
/// Star imports are rejected because the names they bind are unknowable.
pub fn find_imports(module: &Module) -> Result<IndexMap<String, ImportSite>, BlockflowError> {
    imports_in(&module.body)
}

/// [`find_imports`] over a statement list.
pub fn imports_in(stmts: &[Stmt]) -> Result<IndexMap<String, ImportSite>, BlockflowError> {
    let mut imports = IndexMap::new();
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for alias in names {
                    let local_name = alias.local_name().to_string();
                    imports.insert(
                        local_name.clone(),
                        ImportSite {
                            module: alias.name.clone(),
                            member: None,
                            local_name,
                        },
                    );
                }
            }
            StmtKind::ImportFrom { module, star, .. } if *star => {
                return Err(BlockflowError::StarImportRejected {
                    module: module.clone(),
                });
            }
            StmtKind::ImportFrom { module, names, .. } => {
                for alias in names {
                    let local_name = alias.local_name().to_string();
                    imports.insert(
                        local_name.clone(),
                        ImportSite {
                            module: module.clone(),
                            member: Some(alias.name.clone()),
                            local_name,
                        },
                    );
                }
            }
            _ => {}
        }
    }
    Ok(imports)
}

// ═══════════════════════════════════════════════════════════════════════
// Signatures
// ═══════════════════════════════════════════════════════════════════════

/// A function signature reduced to names and default source text.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Signature {
    /// `(name, default)` for every positional parameter, tuples flattened
    pub args: Vec<(String, Option<String>)>,
    /// `*args` name
    pub vararg: Option<String>,
    /// `**kwargs` name
    pub kwarg: Option<String>,
}

/// Extract the parameter list of a function.
///
/// Tuple parameters are flattened; a default on a tuple parameter belongs
/// to none of its names.
pub fn extract_signature(def: &FunctionDef) -> Signature {
    let mut args = Vec::new();
    for param in &def.args.params {
        match &param.target {
            ParamTarget::Name(name) => {
                args.push((name.clone(), param.default.as_ref().map(unparse_expr)));
            }
            tuple => args.extend(tuple.names().into_iter().map(|n| (n, None))),
        }
    }
    Signature {
        args,
        vararg: def.args.vararg.clone(),
        kwarg: def.args.kwarg.clone(),
    }
}

/// Output names of a function, read off its last `return`.
///
/// A single name gives `[name]`, a tuple of names gives the names, a bare
/// `return` (or none at all) gives `[]` and anything else gives
/// `["result"]`.
pub fn extract_returns(def: &FunctionDef) -> Vec<String> {
    let Some(last) = last_return(&def.body) else {
        return Vec::new();
    };
    match last {
        None => Vec::new(),
        Some(Expr::Name(name)) => vec![name.clone()],
        Some(Expr::Tuple(items)) if items.iter().all(|i| matches!(i, Expr::Name(_))) => {
            items.iter().filter_map(Expr::target_names).flatten().collect()
        }
        Some(_) => vec!["result".to_string()],
    }
}

fn last_return(stmts: &[Stmt]) -> Option<Option<&Expr>> {
    let mut found = None;
    for stmt in stmts {
        let nested = match &stmt.kind {
            StmtKind::Return(value) => Some(value.as_ref()),
            StmtKind::For { body, .. } | StmtKind::While { body, .. } => last_return(body),
            StmtKind::If { body, orelse, .. } => last_return(orelse).or(last_return(body)),
            _ => None,
        };
        if nested.is_some() {
            found = nested;
        }
    }
    found
}

/// The dotted name a call targets: `f(x)` gives `f`, `np.linalg.norm(x)`
/// gives `np.linalg.norm`.
pub fn call_target(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Call { func, .. } => dotted_name(func),
        _ => None,
    }
}

/// Render a chain of attribute accesses on a name.
pub fn dotted_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Name(name) => Some(name.clone()),
        Expr::Attribute { value, attr } => Some(format!("{}.{}", dotted_name(value)?, attr)),
        _ => None,
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Free and assigned names
// ═══════════════════════════════════════════════════════════════════════

/// Walks statements in execution order, recording names read while
/// unbound.
#[derive(Default)]
struct NameCollector {
    bound: IndexSet<String>,
    free: IndexSet<String>,
    /// Free names of nested function bodies; resolved against the final
    /// bound set since the function may run after later assignments.
    deferred: IndexSet<String>,
    /// Roots of receivers of mutating method calls
    mutated: IndexSet<String>,
}

impl NameCollector {
    fn with_bound(bound: IndexSet<String>) -> Self {
        Self {
            bound,
            ..Default::default()
        }
    }

    fn finish(mut self) -> IndexSet<String> {
        for name in self.deferred {
            if !self.bound.contains(&name) {
                self.free.insert(name);
            }
        }
        self.free
    }

    fn read(&mut self, name: &str) {
        if !self.bound.contains(name) {
            self.free.insert(name.to_string());
        }
    }

    fn bind(&mut self, name: &str) {
        self.bound.insert(name.to_string());
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match &stmt.kind {
            StmtKind::Import(names) => {
                for alias in names {
                    self.bind(alias.local_name());
                }
            }
            StmtKind::ImportFrom { names, .. } => {
                for alias in names {
                    self.bind(alias.local_name());
                }
            }
            StmtKind::FunctionDef(def) => {
                for param in &def.args.params {
                    if let Some(default) = &param.default {
                        self.expr(default);
                    }
                }
                self.bind(&def.name);
                self.deferred.extend(function_free_names(def));
            }
            StmtKind::Return(value) => {
                if let Some(value) = value {
                    self.expr(value);
                }
            }
            StmtKind::Assign { targets, value } => {
                self.expr(value);
                for target in targets {
                    self.target(target);
                }
            }
            StmtKind::AugAssign { target, value, .. } => {
                self.expr(value);
                self.expr(target);
                self.target(target);
            }
            StmtKind::For { target, iter, body } => {
                self.expr(iter);
                self.target(target);
                self.stmts(body);
            }
            StmtKind::While { test, body } => {
                self.expr(test);
                self.stmts(body);
            }
            StmtKind::If { test, body, orelse } => {
                self.expr(test);
                self.stmts(body);
                self.stmts(orelse);
            }
            StmtKind::Expr(expr) => self.expr(expr),
            StmtKind::Pass | StmtKind::Break | StmtKind::Continue => {}
        }
    }

    fn target(&mut self, target: &Expr) {
        match target {
            Expr::Name(name) => self.bind(name),
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.target(item);
                }
            }
            // `a[i] = v` reads `a` and rebinds it
            Expr::Subscript { value, index } => {
                self.expr(index);
                match subscript_root(value) {
                    Some(root) => {
                        self.expr(value);
                        self.bind(root);
                    }
                    None => self.expr(value),
                }
            }
            Expr::Attribute { value, .. } => self.expr(value),
            other => self.expr(other),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Name(name) => self.read(name),
            Expr::Constant(_) => {}
            Expr::Tuple(items) | Expr::List(items) => {
                for item in items {
                    self.expr(item);
                }
            }
            Expr::Dict(entries) => {
                for (key, value) in entries {
                    self.expr(key);
                    self.expr(value);
                }
            }
            Expr::BinOp { left, right, .. } => {
                self.expr(left);
                self.expr(right);
            }
            Expr::UnaryOp { operand, .. } => self.expr(operand),
            Expr::BoolOp { values, .. } => {
                for value in values {
                    self.expr(value);
                }
            }
            Expr::Compare {
                left, comparators, ..
            } => {
                self.expr(left);
                for right in comparators {
                    self.expr(right);
                }
            }
            Expr::Call {
                func,
                args,
                keywords,
            } => {
                self.expr(func);
                for arg in args {
                    self.expr(arg);
                }
                for keyword in keywords {
                    self.expr(&keyword.value);
                }
                // `xs.append(v)` reads `xs` and rebinds it
                if let Some(root) = mutated_receiver(func) {
                    self.bind(root);
                    self.mutated.insert(root.to_string());
                }
            }
            Expr::Attribute { value, .. } => self.expr(value),
            Expr::Subscript { value, index } => {
                self.expr(value);
                self.expr(index);
            }
            Expr::Slice { lower, upper, step } => {
                for part in [lower, upper, step].into_iter().flatten() {
                    self.expr(part);
                }
            }
            Expr::IfExp { test, body, orelse } => {
                self.expr(test);
                self.expr(body);
                self.expr(orelse);
            }
            Expr::ListComp {
                elt,
                target,
                iter,
                conds,
            } => {
                self.expr(iter);
                // The loop variable does not leak out of the comprehension
                let mut inner = NameCollector::with_bound(self.bound.clone());
                inner.target(target);
                inner.expr(elt);
                for cond in conds {
                    inner.expr(cond);
                }
                self.free.extend(inner.free);
                self.deferred.extend(inner.deferred);
                self.mutated.extend(inner.mutated);
            }
        }
    }
}

/// The name at the bottom of a chain of subscripts, if any.
pub fn subscript_root(expr: &Expr) -> Option<&str> {
    match expr {
        Expr::Name(name) => Some(name),
        Expr::Subscript { value, .. } => subscript_root(value),
        _ => None,
    }
}

/// Methods that update their receiver in place.
pub const MUTATING_METHODS: &[&str] = &[
    "append",
    "extend",
    "insert",
    "pop",
    "remove",
    "clear",
    "sort",
    "reverse",
    "update",
    "setdefault",
];

/// Root name of the receiver a mutating method call writes back to.
fn mutated_receiver(func: &Expr) -> Option<&str> {
    match func {
        Expr::Attribute { value, attr } if MUTATING_METHODS.contains(&attr.as_str()) => {
            subscript_root(value)
        }
        _ => None,
    }
}

/// Names a statement list rebinds through mutating method calls, such as
/// `xs` in `xs.append(1)` or `grid[0].sort()`.
///
/// Nested function bodies are not searched.
pub fn mutated_names(stmts: &[Stmt]) -> IndexSet<String> {
    let mut collector = NameCollector::default();
    collector.stmts(stmts);
    collector.mutated
}

/// Names a statement list reads before binding them, in first-use order.
pub fn free_names(stmts: &[Stmt]) -> IndexSet<String> {
    let mut collector = NameCollector::default();
    collector.stmts(stmts);
    collector.finish()
}

/// Names an expression reads.
pub fn expr_free_names(expr: &Expr) -> IndexSet<String> {
    let mut collector = NameCollector::default();
    collector.expr(expr);
    collector.finish()
}

/// Names a function body reads from its enclosing scope.
///
/// Every name bound anywhere in the body is local to it.
pub fn function_free_names(def: &FunctionDef) -> IndexSet<String> {
    let mut bound: IndexSet<String> = def
        .args
        .params
        .iter()
        .flat_map(|p| p.target.names())
        .collect();
    bound.extend(def.args.vararg.iter().cloned());
    bound.extend(def.args.kwarg.iter().cloned());
    bound.extend(bound_names(&def.body));
    let mut collector = NameCollector::with_bound(bound);
    collector.stmts(&def.body);
    collector.finish()
}

/// Every name bound anywhere in a statement list (without descending into
/// nested function bodies).
pub fn bound_names(stmts: &[Stmt]) -> IndexSet<String> {
    let assigned = assigned_names(stmts);
    let mut names = assigned.unconditional;
    names.extend(assigned.conditional);
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Import(aliases) | StmtKind::ImportFrom { names: aliases, .. } => {
                names.extend(aliases.iter().map(|a| a.local_name().to_string()));
            }
            StmtKind::FunctionDef(def) => {
                names.insert(def.name.clone());
            }
            _ => {}
        }
    }
    names
}

/// Names assigned by a statement list, split by whether every path through
/// the top level assigns them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignedNames {
    /// Assigned by top-level statements
    pub unconditional: IndexSet<String>,
    /// Assigned only inside loop or branch bodies
    pub conditional: IndexSet<String>,
}

impl AssignedNames {
    /// All assigned names, unconditional first.
    pub fn all(&self) -> IndexSet<String> {
        let mut names = self.unconditional.clone();
        names.extend(self.conditional.iter().cloned());
        names
    }
}

/// Names assigned by `=`, augmented assignment or loop targets.
///
/// Imports and `def`s are not assignments.
pub fn assigned_names(stmts: &[Stmt]) -> AssignedNames {
    let mut names = AssignedNames::default();
    collect_assigned(stmts, false, &mut names);
    // A name assigned unconditionally anywhere is not conditional
    let unconditional = names.unconditional.clone();
    names.conditional.retain(|n| !unconditional.contains(n));
    names
}

fn collect_assigned(stmts: &[Stmt], conditional: bool, out: &mut AssignedNames) {
    let add = |name: &str, out: &mut AssignedNames| {
        if conditional {
            out.conditional.insert(name.to_string());
        } else {
            out.unconditional.insert(name.to_string());
        }
    };
    for stmt in stmts {
        match &stmt.kind {
            StmtKind::Assign { targets, .. } => {
                for target in targets {
                    for name in assigned_target_names(target) {
                        add(&name, out);
                    }
                }
            }
            StmtKind::AugAssign { target, .. } => {
                for name in assigned_target_names(target) {
                    add(&name, out);
                }
            }
            StmtKind::For { target, body, .. } => {
                for name in assigned_target_names(target) {
                    out.conditional.insert(name);
                }
                collect_assigned(body, true, out);
            }
            StmtKind::While { body, .. } => collect_assigned(body, true, out),
            StmtKind::If { body, orelse, .. } => {
                collect_assigned(body, true, out);
                collect_assigned(orelse, true, out);
            }
            _ => {}
        }
    }
}

fn assigned_target_names(target: &Expr) -> Vec<String> {
    match target {
        Expr::Name(name) => vec![name.clone()],
        Expr::Tuple(items) | Expr::List(items) => {
            items.iter().flat_map(assigned_target_names).collect()
        }
        Expr::Subscript { value, .. } => subscript_root(value)
            .map(|root| vec![root.to_string()])
            .unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// Control flow that is illegal at the top level of a block: `return`
/// outside a function, `break`/`continue` outside a loop.
pub fn stray_control_flow(stmts: &[Stmt]) -> Option<&'static str> {
    fn scan(stmts: &[Stmt], in_loop: bool) -> Option<&'static str> {
        for stmt in stmts {
            let found = match &stmt.kind {
                StmtKind::Return(_) => Some("return"),
                StmtKind::Break if !in_loop => Some("break"),
                StmtKind::Continue if !in_loop => Some("continue"),
                StmtKind::For { body, .. } | StmtKind::While { body, .. } => scan(body, true),
                StmtKind::If { body, orelse, .. } => {
                    scan(body, in_loop).or_else(|| scan(orelse, in_loop))
                }
                _ => None,
            };
            if found.is_some() {
                return found;
            }
        }
        None
    }
    scan(stmts, false)
}

/// Remove the common leading whitespace of every non-blank line.
pub fn dedent(text: &str) -> String {
    let margin = text
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start().len())
        .min()
        .unwrap_or(0);
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if line.trim().is_empty() {
            out.push('\n');
        } else {
            out.push_str(line.get(margin..).unwrap_or(line.trim_start()));
            out.push('\n');
        }
    }
    out
}

/// Prefix every non-blank line with `width` spaces.
pub fn indent(text: &str, width: usize) -> String {
    let pad = " ".repeat(width);
    let mut out = String::with_capacity(text.len());
    for line in text.lines() {
        if !line.trim().is_empty() {
            out.push_str(&pad);
            out.push_str(line);
        }
        out.push('\n');
    }
    out
}
