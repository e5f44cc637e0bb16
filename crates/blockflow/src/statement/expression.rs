//! Free-form blocks of code

use indexmap::IndexSet;
use uuid::Uuid;

use crate::ast::{self, walk, StmtKind};
use crate::error::{BlockflowError, Result};
use crate::interp::is_builtin;
use crate::variable::{InputVariable, OutputVariable};

/// A block of statements kept as written.
///
/// Inputs are the names the block reads before assigning them, excluding
/// builtins and names its own imports and `def`s bind. Outputs are the
/// names it assigns.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneralExpression {
    uuid: Uuid,
    code: String,
    imports: Vec<String>,
    locals: Vec<String>,
    local_names: Vec<String>,
    body: String,
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    current_element_of: Option<Uuid>,
}

impl GeneralExpression {
    /// Parse a block.
    pub fn new(code: &str) -> Result<Self> {
        let mut expression = Self {
            uuid: Uuid::new_v4(),
            code: String::new(),
            imports: Vec::new(),
            locals: Vec::new(),
            local_names: Vec::new(),
            body: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            current_element_of: None,
        };
        expression.set_code(code)?;
        Ok(expression)
    }

    pub(crate) fn with_uuid(mut self, uuid: Uuid) -> Self {
        self.uuid = uuid;
        self
    }

    /// Mark the block as the placeholder showing a group's loop variable.
    pub(crate) fn for_current_element(mut self, group: Uuid) -> Self {
        self.current_element_of = Some(group);
        self
    }

    /// Replace the code and re-derive imports and variables.
    ///
    /// On error the block keeps its previous code.
    pub fn set_code(&mut self, code: &str) -> Result<()> {
        let code = ast::dedent(code);
        let module = ast::parse(&code)?;
        if let Some(keyword) = walk::stray_control_flow(&module.body) {
            return Err(BlockflowError::InvalidExpressionBlock {
                reason: format!("'{}' outside of a loop or function", keyword),
            });
        }
        let imports = walk::imports_in(&module.body)?;

        let mut locals = Vec::new();
        let mut local_names = Vec::new();
        let mut body = Vec::new();
        let mut body_at = Vec::new();
        for (i, stmt) in module.body.iter().enumerate() {
            match &stmt.kind {
                StmtKind::Import(_) | StmtKind::ImportFrom { .. } => {}
                StmtKind::FunctionDef(def) => {
                    local_names.push(def.name.clone());
                    locals.push(ast::dedent(stmt.span.text(&code)));
                }
                _ => {
                    body.push(stmt.clone());
                    body_at.push(i);
                }
            }
        }

        let hoisted: IndexSet<&str> = imports
            .keys()
            .map(String::as_str)
            .chain(local_names.iter().map(String::as_str))
            .collect();
        let mut assigned = ast::assigned_names(&body).all();
        assigned.extend(ast::mutated_names(&body));
        let outputs = assigned
            .into_iter()
            .filter(|name| !hoisted.contains(name.as_str()))
            .map(OutputVariable::new)
            .collect::<Result<Vec<_>>>()?;
        let mut reads = ast::free_names(&body);
        for def in module.body.iter().filter_map(|s| match &s.kind {
            StmtKind::FunctionDef(def) => Some(def),
            _ => None,
        }) {
            reads.extend(walk::function_free_names(def));
        }
        let inputs = reads
            .into_iter()
            .filter(|name| !hoisted.contains(name.as_str()) && !is_builtin(name))
            .map(InputVariable::new)
            .collect();

        let rendered = normal_form(&body);
        let written = match (body_at.first(), body_at.last()) {
            // Only when no hoisted import or def sits between body statements
            (Some(&first), Some(&last)) if last - first + 1 == body_at.len() => {
                let span = module.body[first].span.merge(module.body[last].span);
                Some(span.text(&code).trim_end().to_string())
            }
            _ => None,
        };
        let rendered = written
            .filter(|text| ast::parse(text).is_ok_and(|m| normal_form(&m.body) == rendered))
            .unwrap_or(rendered);

        self.imports = imports.values().map(|site| site.line()).collect();
        self.locals = locals;
        self.local_names = local_names;
        self.body = rendered;
        self.inputs = inputs;
        self.outputs = outputs;
        self.code = code;
        Ok(())
    }

    /// Identity
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Code as last set, dedented
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Import lines the block carries
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// Function definitions the block carries
    pub fn locals(&self) -> &[String] {
        &self.locals
    }

    /// Names of the functions the block defines
    pub fn local_names(&self) -> &[String] {
        &self.local_names
    }

    /// Names read from outside
    pub fn inputs(&self) -> &[InputVariable] {
        &self.inputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [InputVariable] {
        &mut self.inputs
    }

    /// Names assigned
    pub fn outputs(&self) -> &[OutputVariable] {
        &self.outputs
    }

    /// Group whose loop variable this placeholder shows
    pub fn current_element_of(&self) -> Option<Uuid> {
        self.current_element_of
    }

    /// The block without imports and definitions, as written.
    ///
    /// Falls back to the normal form when hoisting left gaps in the text.
    pub fn call_signature(&self) -> String {
        self.body.clone()
    }

    /// Names read from outside
    pub fn input_names(&self) -> IndexSet<String> {
        self.inputs.iter().map(|i| i.name().to_string()).collect()
    }

    /// Names assigned
    pub fn output_names(&self) -> IndexSet<String> {
        self.outputs.iter().map(|o| o.binding().to_string()).collect()
    }
}

fn normal_form(body: &[ast::Stmt]) -> String {
    let mut rendered = ast::unparse_block(body, 0);
    rendered.truncate(rendered.trim_end().len());
    rendered
}
