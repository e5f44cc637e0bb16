//! Turn parsed source into statements
//!
//! Top-level imports and definitions are collected first and attached to
//! the statements that use them. Literal assignments are gathered into a
//! single block at the front; calls become [`FunctionCall`]s, loops become
//! [`FunctionCallGroup`]s when their shape allows, and everything else is
//! kept as a [`GeneralExpression`].

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::ast::{self, walk, Expr, ImportSite, Module, Stmt, StmtKind};
use crate::callable::CallableInfo;
use crate::error::{BlockflowError, Result};
use crate::interp::ModuleLoader;
use crate::statement::{FunctionCall, FunctionCallGroup, GeneralExpression, GroupSpec, Statement};

/// A top-level definition and what it reads from the module.
#[derive(Debug, Clone)]
struct LocalDef {
    text: String,
    imports: IndexSet<String>,
    calls: IndexSet<String>,
}

/// Builds the statements of a model from a module.
#[derive(Debug)]
pub struct ModelBuilder<'a> {
    loader: &'a ModuleLoader,
    imports: IndexMap<String, ImportSite>,
    defs: IndexMap<String, LocalDef>,
    callables: IndexMap<String, CallableInfo>,
}

impl<'a> ModelBuilder<'a> {
    /// A builder resolving imported callables through `loader`.
    pub fn new(loader: &'a ModuleLoader) -> Self {
        Self {
            loader,
            imports: IndexMap::new(),
            defs: IndexMap::new(),
            callables: IndexMap::new(),
        }
    }

    /// Parse and build.
    pub fn build_source(self, source: &str) -> Result<Vec<Statement>> {
        let module = ast::parse(source)?;
        self.build(&module)
    }

    /// Build the statements of `module`.
    pub fn build(mut self, module: &Module) -> Result<Vec<Statement>> {
        self.imports = ast::find_imports(module)?;
        self.collect_defs(module);
        for site in self.imports.values() {
            if let Some(member) = &site.member {
                self.callables.insert(
                    site.local_name.clone(),
                    CallableInfo::imported(self.loader, &site.module, member),
                );
            }
        }

        let mut constants = Vec::new();
        let mut statements = Vec::new();
        for stmt in &module.body {
            match &stmt.kind {
                StmtKind::Import(_) | StmtKind::ImportFrom { .. } | StmtKind::FunctionDef(_) => {}
                StmtKind::Assign { targets, value }
                    if value.is_literal() && targets.iter().all(|t| t.target_names().is_some()) =>
                {
                    constants.push(ast::unparse_stmt(stmt));
                }
                _ => statements.push(self.classify(stmt)?),
            }
        }
        if !constants.is_empty() {
            let block = GeneralExpression::new(&constants.join("\n"))?;
            statements.insert(0, Statement::from(block));
        }

        // Definitions nothing calls still belong to the program
        let mut used: IndexSet<String> = statements
            .iter()
            .flat_map(Statement::local_function_names)
            .collect();
        used = self.with_helpers(used);
        let unused: Vec<String> = self
            .defs
            .keys()
            .filter(|name| !used.contains(*name))
            .cloned()
            .collect();
        for name in unused {
            debug!(function = %name, "keeping uncalled definition");
            let code = self.support_code(&IndexSet::from([name]));
            statements.push(Statement::from(GeneralExpression::new(&code)?));
        }
        Ok(statements)
    }

    fn collect_defs(&mut self, module: &Module) {
        let names: IndexSet<String> = ast::find_top_level_defs(module).into_keys().collect();
        for stmt in &module.body {
            let StmtKind::FunctionDef(def) = &stmt.kind else {
                continue;
            };
            let free = walk::function_free_names(def);
            let imports = free
                .iter()
                .filter(|n| self.imports.contains_key(*n))
                .cloned()
                .collect();
            let calls = free
                .iter()
                .filter(|n| names.contains(*n) && **n != def.name)
                .cloned()
                .collect();
            self.defs.insert(
                def.name.clone(),
                LocalDef {
                    text: ast::unparse_stmt(stmt),
                    imports,
                    calls,
                },
            );
        }
        let defined: Vec<String> = self.defs.keys().cloned().collect();
        for name in defined {
            let mut closure = self.with_helpers(IndexSet::from([name.clone()]));
            // The called function's own definition comes first
            closure.shift_remove(&name);
            let mut source = self.import_lines(&self.imports_of(&name, &closure));
            if !source.is_empty() {
                source.push('\n');
            }
            for def in std::iter::once(&name).chain(closure.iter()) {
                if let Some(local) = self.defs.get(def) {
                    source.push_str(&local.text);
                    source.push_str("\n\n");
                }
            }
            self.callables
                .insert(name.clone(), CallableInfo::local(&name, source));
        }
    }

    /// `names` plus every definition they transitively call.
    fn with_helpers(&self, names: IndexSet<String>) -> IndexSet<String> {
        let mut all = names;
        let mut stack: Vec<String> = all.iter().cloned().collect();
        while let Some(name) = stack.pop() {
            if let Some(def) = self.defs.get(&name) {
                for call in &def.calls {
                    if all.insert(call.clone()) {
                        stack.push(call.clone());
                    }
                }
            }
        }
        all
    }

    fn imports_of(&self, name: &str, helpers: &IndexSet<String>) -> IndexSet<String> {
        std::iter::once(name)
            .chain(helpers.iter().map(String::as_str))
            .filter_map(|n| self.defs.get(n))
            .flat_map(|d| d.imports.iter().cloned())
            .collect()
    }

    fn import_lines(&self, names: &IndexSet<String>) -> String {
        names
            .iter()
            .filter_map(|n| self.imports.get(n))
            .map(|site| site.line() + "\n")
            .collect()
    }

    /// Import lines and definitions providing `names`, as source text.
    fn support_code(&self, names: &IndexSet<String>) -> String {
        let defs = self.with_helpers(
            names
                .iter()
                .filter(|n| self.defs.contains_key(*n))
                .cloned()
                .collect(),
        );
        let mut imported: IndexSet<String> = names
            .iter()
            .filter(|n| self.imports.contains_key(*n))
            .cloned()
            .collect();
        for def in &defs {
            if let Some(local) = self.defs.get(def) {
                imported.extend(local.imports.iter().cloned());
            }
        }
        let mut code = self.import_lines(&imported);
        for def in &defs {
            if let Some(local) = self.defs.get(def) {
                code.push_str(&local.text);
                code.push('\n');
            }
        }
        code
    }

    // ═══════════════════════════════════════════════════════════════════
    // Classification
    // ═══════════════════════════════════════════════════════════════════

    fn classify(&mut self, stmt: &Stmt) -> Result<Statement> {
        match &stmt.kind {
            StmtKind::Assign { targets, value } if targets.len() == 1 && self.is_plain_call(value) => {
                if targets[0].target_names().is_some() {
                    return Ok(FunctionCall::from_ast(value, Some(&targets[0]), &self.callables)?.into());
                }
            }
            StmtKind::Expr(value) if self.is_plain_call(value) => {
                return Ok(FunctionCall::from_ast(value, None, &self.callables)?.into());
            }
            StmtKind::For { target, iter, body } => {
                match self.for_group(target, iter, body) {
                    Ok(group) => return Ok(group.into()),
                    Err(err) => debug!(error = %err, "loop kept as a block"),
                }
            }
            StmtKind::While { test, body } => match self.while_group(test, body) {
                Ok(group) => return Ok(group.into()),
                Err(err) => debug!(error = %err, "loop kept as a block"),
            },
            _ => {}
        }
        self.expression(stmt)
    }

    fn expression(&self, stmt: &Stmt) -> Result<Statement> {
        let reads = ast::free_names(std::slice::from_ref(stmt));
        let mut code = self.support_code(&reads);
        code.push_str(&ast::unparse_stmt(stmt));
        code.push('\n');
        Ok(GeneralExpression::new(&code)?.into())
    }

    /// A call of a named function whose arguments contain no calls.
    ///
    /// Dotted callees must go through an imported module; otherwise the
    /// call is a method call on a value.
    fn is_plain_call(&mut self, expr: &Expr) -> bool {
        let Expr::Call { func, args, keywords } = expr else {
            return false;
        };
        let Some(label) = walk::dotted_name(func) else {
            return false;
        };
        if args.iter().chain(keywords.iter().map(|k| &k.value)).any(has_call) {
            return false;
        }
        match label.rsplit_once('.') {
            None => true,
            Some((qualifier, name)) => self.resolve_dotted(&label, qualifier, name),
        }
    }

    fn resolve_dotted(&mut self, label: &str, qualifier: &str, name: &str) -> bool {
        if self.callables.contains_key(label) {
            return true;
        }
        let (root, rest) = match qualifier.split_once('.') {
            Some((root, rest)) => (root, Some(rest)),
            None => (qualifier, None),
        };
        let Some(site) = self.imports.get(root) else {
            return false;
        };
        let base = match &site.member {
            Some(member) => format!("{}.{}", site.module, member),
            None if site.module.split('.').next() == Some(root) => root.to_string(),
            None => site.module.clone(),
        };
        let module = match rest {
            Some(rest) => format!("{}.{}", base, rest),
            None => base,
        };
        self.callables.insert(
            label.to_string(),
            CallableInfo::imported(self.loader, &module, name),
        );
        true
    }

    fn for_group(&mut self, target: &Expr, iter: &Expr, body: &[Stmt]) -> Result<FunctionCallGroup> {
        let celems: Vec<String> = match target {
            Expr::Name(name) => vec![name.clone()],
            Expr::Tuple(items) if items.len() == 2 => items
                .iter()
                .map(|item| match item {
                    Expr::Name(name) => Ok(name.clone()),
                    _ => Err(unsupported_loop("nested loop target")),
                })
                .collect::<Result<_>>()?,
            _ => return Err(unsupported_loop("loop target")),
        };
        let celem_refs: Vec<&str> = celems.iter().map(String::as_str).collect();

        let mut spec = match iter {
            Expr::Call { func, args, keywords } if keywords.is_empty() => {
                let func = walk::dotted_name(func).ok_or_else(|| unsupported_loop("iterable"))?;
                let args: Vec<String> = args.iter().map(ast::unparse_expr).collect();
                let arg_refs: Vec<&str> = args.iter().map(String::as_str).collect();
                GroupSpec::for_func(&func, &arg_refs, &celem_refs)?
            }
            _ => {
                let iterable = ast::unparse_expr(iter);
                match celem_refs.as_slice() {
                    [celem] => GroupSpec::for_single(&iterable, celem)?,
                    [x, y] => GroupSpec::for_tuple(&iterable, x, y)?,
                    _ => return Err(unsupported_loop("loop target")),
                }
            }
        };
        self.attach_support(&mut spec, &ast::expr_free_names(iter));
        let inner = body
            .iter()
            .map(|stmt| self.classify(stmt))
            .collect::<Result<Vec<_>>>()?;
        Ok(FunctionCallGroup::new(spec, inner))
    }

    fn while_group(&mut self, test: &Expr, body: &[Stmt]) -> Result<FunctionCallGroup> {
        let mut spec = GroupSpec::while_loop(&ast::unparse_expr(test));
        self.attach_support(&mut spec, &ast::expr_free_names(test));
        let inner = body
            .iter()
            .map(|stmt| self.classify(stmt))
            .collect::<Result<Vec<_>>>()?;
        Ok(FunctionCallGroup::new(spec, inner))
    }

    /// Give a header the imports and definitions for the names it reads.
    fn attach_support(&self, spec: &mut GroupSpec, reads: &IndexSet<String>) {
        for name in reads {
            if let Some(site) = self.imports.get(name) {
                spec.require_import(name, site.line());
            } else if let Some(CallableInfo::Local(local)) = self.callables.get(name) {
                for line in local.imports() {
                    spec.require_import(name, line.clone());
                }
                spec.require_local(name, local.definition().to_string());
            }
        }
    }
}

fn unsupported_loop(what: &str) -> BlockflowError {
    BlockflowError::InvalidExpressionBlock {
        reason: format!("unsupported {} for a group", what),
    }
}

/// Whether an expression contains a call anywhere.
fn has_call(expr: &Expr) -> bool {
    match expr {
        Expr::Call { .. } => true,
        Expr::Name(_) | Expr::Constant(_) => false,
        Expr::Tuple(items) | Expr::List(items) => items.iter().any(has_call),
        Expr::Dict(pairs) => pairs.iter().any(|(k, v)| has_call(k) || has_call(v)),
        Expr::BinOp { left, right, .. } => has_call(left) || has_call(right),
        Expr::UnaryOp { operand, .. } => has_call(operand),
        Expr::BoolOp { values, .. } => values.iter().any(has_call),
        Expr::Compare {
            left, comparators, ..
        } => has_call(left) || comparators.iter().any(has_call),
        Expr::Attribute { value, .. } => has_call(value),
        Expr::Subscript { value, index } => has_call(value) || has_call(index),
        Expr::Slice { lower, upper, step } => [lower, upper, step]
            .into_iter()
            .flatten()
            .any(|e| has_call(e)),
        Expr::IfExp { test, body, orelse } => has_call(test) || has_call(body) || has_call(orelse),
        Expr::ListComp { .. } => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(source: &str) -> Vec<Statement> {
        let loader = ModuleLoader::new(Vec::new());
        loader.register_source("ops", "def add(x, y):\n    return x + y\n");
        ModelBuilder::new(&loader).build_source(source).unwrap()
    }

    #[test]
    fn test_constants_collapse_to_front() {
        let stmts = build("a = 1\nc = add(a, b)\nb = 2\n");
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].call_signature(), "a = 1\nb = 2");
        assert_eq!(stmts[1].kind_name(), "call");
    }

    #[test]
    fn test_nested_call_is_expression() {
        let stmts = build("from ops import add\nc = add(add(a, b), b)\n");
        assert_eq!(stmts[0].kind_name(), "expression");
        assert_eq!(stmts[0].imports(), vec!["from ops import add".to_string()]);
    }

    #[test]
    fn test_method_call_is_expression() {
        let stmts = build("xs.append(1)\n");
        assert_eq!(stmts[0].kind_name(), "expression");
    }

    #[test]
    fn test_module_call_resolves() {
        let stmts = build("import ops\nc = ops.add(a, b)\n");
        let Statement::Call(call) = &stmts[0] else {
            panic!("expected a call");
        };
        assert_eq!(call.callable().module(), Some("ops"));
        assert!(call.callable().load_error().is_none());
        assert_eq!(call.import_line().as_deref(), Some("import ops"));
    }

    #[test]
    fn test_loop_with_break_stays_expression() {
        let stmts = build("for x in xs:\n    if x:\n        break\n    y = x\n");
        assert_eq!(stmts[0].kind_name(), "expression");
    }

    #[test]
    fn test_for_loop_becomes_group() {
        let stmts = build("for i in range(n):\n    total = add(total, i)\n");
        let Statement::Group(group) = &stmts[0] else {
            panic!("expected a group");
        };
        assert_eq!(group.statements().len(), 1);
        assert_eq!(
            group.call_signature(),
            "for i in range(n):\n    total = add(total, i)"
        );
    }

    #[test]
    fn test_uncalled_definition_is_kept() {
        let stmts = build("def helper(v):\n    return v\n");
        assert_eq!(stmts.len(), 1);
        assert_eq!(stmts[0].locals(), vec!["def helper(v):\n    return v\n".to_string()]);
    }

    #[test]
    fn test_local_def_call() {
        let stmts = build("def sq(v):\n    w = v * v\n    return w\ny = sq(x)\n");
        let Statement::Call(call) = &stmts[0] else {
            panic!("expected a call");
        };
        assert!(call.callable().is_local());
        assert_eq!(call.outputs()[0].name(), "w");
        assert_eq!(call.call_signature(), "y = sq(x)");
    }
}
