//! Signature metadata of the functions a statement calls
//!
//! An imported callable is read once from its module source through the
//! [`ModuleLoader`]. A local callable owns its source and re-derives
//! everything whenever that source changes.

use tracing::debug;

use crate::ast::{self, DefSite, FunctionDef};
use crate::error::LoadError;
use crate::interp::ModuleLoader;
use crate::variable::{InputVariable, OutputVariable};

/// Pseudo module name for callables resolved at run time (builtins and
/// names the model cannot locate).
pub const BUILTINS_MODULE: &str = "builtins";

/// Module name recorded on load errors of local callables.
const LOCAL_MODULE: &str = "<local>";

/// Metadata extracted from a `def`.
#[derive(Debug, Clone, Default, PartialEq)]
struct DefInfo {
    doc: Option<String>,
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    vararg: Option<String>,
    kwarg: Option<String>,
}

impl DefInfo {
    fn from_def(def: &FunctionDef) -> Self {
        let signature = ast::extract_signature(def);
        let inputs = signature
            .args
            .into_iter()
            .map(|(name, default)| match default {
                Some(default) => InputVariable::with_default(name, default),
                None => InputVariable::new(name),
            })
            .collect();
        let outputs = ast::extract_returns(def)
            .into_iter()
            .filter_map(|name| OutputVariable::new(name).ok())
            .collect();
        Self {
            doc: def.docstring().map(str::to_string),
            inputs,
            outputs,
            vararg: signature.vararg,
            kwarg: signature.kwarg,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Imported callables
// ═══════════════════════════════════════════════════════════════════════

/// A function defined in an importable module.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportedCallable {
    module: String,
    name: String,
    info: DefInfo,
    code: String,
    requires: Vec<String>,
    load_error: Option<LoadError>,
}

impl ImportedCallable {
    /// Locate `module.name` through `loader` and read its signature.
    ///
    /// Failures are recorded in [`load_error`](Self::load_error); the
    /// metadata is then empty.
    pub fn load(loader: &ModuleLoader, module: &str, name: &str) -> Self {
        let mut callable = Self {
            module: module.to_string(),
            name: name.to_string(),
            info: DefInfo::default(),
            code: String::new(),
            requires: Vec::new(),
            load_error: None,
        };
        if module == BUILTINS_MODULE {
            callable.fail("resolved at run time");
            return callable;
        }
        let Some(source) = loader.source(module) else {
            let reason = if ModuleLoader::is_native(module) {
                "native module has no source"
            } else {
                "module not found"
            };
            callable.fail(reason);
            return callable;
        };
        let parsed = match ast::parse(&source) {
            Ok(parsed) => parsed,
            Err(err) => {
                callable.fail(&err.to_string());
                return callable;
            }
        };
        let defs = ast::find_top_level_defs(&parsed);
        match defs.get(name) {
            Some(DefSite { def, span }) => {
                callable.info = DefInfo::from_def(def);
                callable.code = ast::dedent(span.text(&source));
                // Module imports the body reads travel with the code
                let free = ast::walk::function_free_names(def);
                if let Ok(imports) = ast::find_imports(&parsed) {
                    callable.requires = imports
                        .values()
                        .filter(|site| free.contains(&site.local_name))
                        .map(|site| site.line())
                        .collect();
                }
            }
            None => callable.fail("no top-level definition with this name"),
        }
        callable
    }

    /// A callable resolved only when the program runs.
    pub fn unresolved(name: &str) -> Self {
        let mut callable = Self {
            module: BUILTINS_MODULE.to_string(),
            name: name.to_string(),
            info: DefInfo::default(),
            code: String::new(),
            requires: Vec::new(),
            load_error: None,
        };
        callable.fail("resolved at run time");
        callable
    }

    fn fail(&mut self, message: &str) {
        debug!(module = %self.module, name = %self.name, message, "callable not loaded");
        self.load_error = Some(LoadError {
            module: self.module.clone(),
            name: self.name.clone(),
            message: message.to_string(),
        });
    }

    /// Module path
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Source of the `def`, dedented
    pub fn code(&self) -> &str {
        &self.code
    }

    /// Convert into a local callable named `new_name`.
    ///
    /// The definition is renamed and prefixed with a comment recording
    /// where it came from.
    pub fn to_local(&self, new_name: &str) -> LocalCallable {
        let renamed = self.code.replacen(
            &format!("def {}(", self.name),
            &format!("def {}(", new_name),
            1,
        );
        let mut source = format!("# copied from {}.{}\n", self.module, self.name);
        for line in &self.requires {
            source.push_str(line);
            source.push('\n');
        }
        source.push_str(&renamed);
        LocalCallable::new(new_name, source)
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Local callables
// ═══════════════════════════════════════════════════════════════════════

/// A function whose definition lives in the model.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalCallable {
    name: String,
    source: String,
    info: DefInfo,
    imports: Vec<String>,
    definition: String,
    is_valid: bool,
    load_error: Option<LoadError>,
}

impl LocalCallable {
    /// Create a local callable from its source.
    pub fn new(name: &str, source: impl Into<String>) -> Self {
        let mut callable = Self {
            name: name.to_string(),
            source: String::new(),
            info: DefInfo::default(),
            imports: Vec::new(),
            definition: String::new(),
            is_valid: true,
            load_error: None,
        };
        callable.set_source(source);
        callable
    }

    /// Source of the definition
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Whether the source parsed into a definition
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Replace the source and re-derive the signature.
    ///
    /// The name follows the first top-level `def`. Empty source is valid
    /// and defines nothing; unparseable source is recorded, not raised.
    pub fn set_source(&mut self, source: impl Into<String>) {
        self.source = ast::dedent(&source.into());
        self.info = DefInfo::default();
        self.imports.clear();
        self.definition.clear();
        self.load_error = None;
        self.is_valid = true;
        if self.source.trim().is_empty() {
            return;
        }
        let parsed = match ast::parse(&self.source) {
            Ok(parsed) => parsed,
            Err(err) => {
                self.invalidate(err.to_string());
                return;
            }
        };
        let imports = match ast::find_imports(&parsed) {
            Ok(imports) => imports,
            Err(err) => {
                self.invalidate(err.to_string());
                return;
            }
        };
        let defs = ast::find_top_level_defs(&parsed);
        let Some(site) = defs.values().next() else {
            self.invalidate("no function definition".to_string());
            return;
        };
        self.name = site.def.name.clone();
        self.info = DefInfo::from_def(site.def);
        self.imports = imports.values().map(|site| site.line()).collect();
        self.definition = strip_imports(&self.source, &parsed.body);
    }

    /// Import lines the source carries alongside its definition
    pub fn imports(&self) -> &[String] {
        &self.imports
    }

    /// The source without its import lines
    pub fn definition(&self) -> &str {
        &self.definition
    }

    fn invalidate(&mut self, message: String) {
        debug!(name = %self.name, %message, "local callable invalid");
        self.is_valid = false;
        self.load_error = Some(LoadError {
            module: LOCAL_MODULE.to_string(),
            name: self.name.clone(),
            message,
        });
    }
}

/// Cut the top-level import statements out of `source`, dropping the
/// blank lines they leave at the start.
fn strip_imports(source: &str, body: &[ast::Stmt]) -> String {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for stmt in body {
        if matches!(
            stmt.kind,
            ast::StmtKind::Import(_) | ast::StmtKind::ImportFrom { .. }
        ) {
            out.push_str(source.get(cursor..stmt.span.start).unwrap_or(""));
            cursor = stmt.span.end;
        }
    }
    out.push_str(source.get(cursor..).unwrap_or(""));
    let kept: Vec<&str> = out
        .lines()
        .skip_while(|line| line.trim().is_empty())
        .collect();
    let mut text = kept.join("\n");
    text.truncate(text.trim_end().len());
    text.push('\n');
    text
}

// ═══════════════════════════════════════════════════════════════════════
// Either kind
// ═══════════════════════════════════════════════════════════════════════

/// The function a [`FunctionCall`](crate::statement::FunctionCall) invokes.
#[derive(Debug, Clone, PartialEq)]
pub enum CallableInfo {
    /// Defined in a module
    Imported(ImportedCallable),
    /// Defined in the model
    Local(LocalCallable),
}

impl CallableInfo {
    /// Load an imported callable.
    pub fn imported(loader: &ModuleLoader, module: &str, name: &str) -> Self {
        CallableInfo::Imported(ImportedCallable::load(loader, module, name))
    }

    /// Create a local callable from source.
    pub fn local(name: &str, source: impl Into<String>) -> Self {
        CallableInfo::Local(LocalCallable::new(name, source))
    }

    fn info(&self) -> &DefInfo {
        match self {
            CallableInfo::Imported(c) => &c.info,
            CallableInfo::Local(c) => &c.info,
        }
    }

    /// Function name
    pub fn name(&self) -> &str {
        match self {
            CallableInfo::Imported(c) => &c.name,
            CallableInfo::Local(c) => &c.name,
        }
    }

    /// Module path; `None` for local callables.
    pub fn module(&self) -> Option<&str> {
        match self {
            CallableInfo::Imported(c) => Some(&c.module),
            CallableInfo::Local(_) => None,
        }
    }

    /// Whether the callable is defined in the model
    pub fn is_local(&self) -> bool {
        matches!(self, CallableInfo::Local(_))
    }

    /// Docstring
    pub fn doc(&self) -> Option<&str> {
        self.info().doc.as_deref()
    }

    /// Parameters, in declaration order
    pub fn inputs(&self) -> &[InputVariable] {
        &self.info().inputs
    }

    /// Return names
    pub fn outputs(&self) -> &[OutputVariable] {
        &self.info().outputs
    }

    /// `*args` name
    pub fn vararg(&self) -> Option<&str> {
        self.info().vararg.as_deref()
    }

    /// `**kwargs` name
    pub fn kwarg(&self) -> Option<&str> {
        self.info().kwarg.as_deref()
    }

    /// Source of the definition
    pub fn code(&self) -> &str {
        match self {
            CallableInfo::Imported(c) => &c.code,
            CallableInfo::Local(c) => &c.source,
        }
    }

    /// Why the signature could not be read
    pub fn load_error(&self) -> Option<&LoadError> {
        match self {
            CallableInfo::Imported(c) => c.load_error.as_ref(),
            CallableInfo::Local(c) => c.load_error.as_ref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STATS: &str = "\
def scale(x, factor=2.0):
    \"\"\"Scale a value.\"\"\"
    y = x * factor
    return y

def split(xs):
    return xs[0], xs[1:]
";

    fn loader() -> ModuleLoader {
        let loader = ModuleLoader::new(Vec::new());
        loader.register_source("stats", STATS);
        loader
    }

    #[test]
    fn test_imported_signature() {
        let callable = CallableInfo::imported(&loader(), "stats", "scale");
        assert!(callable.load_error().is_none());
        assert_eq!(callable.doc(), Some("Scale a value."));
        let inputs: Vec<_> = callable.inputs().iter().map(|i| i.name()).collect();
        assert_eq!(inputs, vec!["x", "factor"]);
        assert_eq!(callable.inputs()[1].default(), Some("2.0"));
        assert_eq!(callable.outputs()[0].name(), "y");
        assert!(callable.code().starts_with("def scale(x, factor=2.0):"));
    }

    #[test]
    fn test_complex_return_is_result() {
        let callable = CallableInfo::imported(&loader(), "stats", "split");
        assert_eq!(callable.outputs()[0].name(), "result");
    }

    #[test]
    fn test_missing_module_and_def_record_errors() {
        let missing = CallableInfo::imported(&loader(), "nowhere", "f");
        assert!(missing.load_error().is_some());
        assert!(missing.inputs().is_empty());
        let no_def = CallableInfo::imported(&loader(), "stats", "nothing");
        assert!(no_def.load_error().is_some());
        let native = CallableInfo::imported(&loader(), "math", "sqrt");
        assert!(native.load_error().unwrap().message.contains("native"));
    }

    #[test]
    fn test_local_source_changes() {
        let mut local = LocalCallable::new("f", "def f(a, b):\n    return a\n");
        assert!(local.is_valid());
        assert_eq!(local.info.inputs.len(), 2);
        local.set_source("def f(a:\n");
        assert!(!local.is_valid());
        assert!(local.load_error.is_some());
        assert!(local.info.inputs.is_empty());
        local.set_source("");
        assert!(local.is_valid());
        assert!(local.load_error.is_none());
        local.set_source("def g(z):\n    return z\n");
        assert_eq!(local.name, "g");
    }

    #[test]
    fn test_imported_to_local() {
        let imported = ImportedCallable::load(&loader(), "stats", "scale");
        let local = imported.to_local("my_scale");
        assert!(local.is_valid());
        assert_eq!(local.name, "my_scale");
        assert!(local.source().starts_with("# copied from stats.scale\n"));
        assert_eq!(local.info.inputs.len(), 2);
    }
}
