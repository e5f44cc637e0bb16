//! Module resolution and loading
//!
//! Modules come from three places, tried in order: sources registered at
//! runtime, native modules implemented in Rust, and `.py` files found on
//! the search path.

use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use dashmap::DashMap;
use indexmap::IndexMap;
use tracing::debug;

use super::{Interpreter, SharedScope};
use crate::ast;
use crate::error::EvalError;
use crate::value::{Arity, BuiltinFn, ModuleValue, Namespace, Value};

const NATIVE_MODULES: &[&str] = &["math"];

/// Finds module sources and caches loaded modules.
#[derive(Debug, Default)]
pub struct ModuleLoader {
    paths: Vec<PathBuf>,
    sources: DashMap<String, Rc<str>>,
    modules: RefCell<IndexMap<String, Rc<ModuleValue>>>,
}

impl ModuleLoader {
    /// Create a loader searching `paths` for module files.
    pub fn new(paths: Vec<PathBuf>) -> Self {
        Self {
            paths,
            ..Self::default()
        }
    }

    /// Search path
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Register in-memory source for a module, replacing any loaded copy.
    pub fn register_source(&self, module: impl Into<String>, source: impl AsRef<str>) {
        let module = module.into();
        self.modules.borrow_mut().shift_remove(&module);
        self.sources.insert(module, Rc::from(source.as_ref()));
    }

    /// Drop every loaded module so the next import re-executes its source.
    pub fn invalidate(&self) {
        self.modules.borrow_mut().clear();
    }

    /// Whether a module is native.
    pub fn is_native(module: &str) -> bool {
        NATIVE_MODULES.contains(&module)
    }

    /// File backing a module on the search path.
    pub fn locate(&self, module: &str) -> Option<PathBuf> {
        let relative: PathBuf = module.split('.').collect();
        self.paths.iter().find_map(|root| {
            let file = root.join(&relative).with_extension("py");
            if file.is_file() {
                return Some(file);
            }
            let package = root.join(&relative).join("__init__.py");
            package.is_file().then_some(package)
        })
    }

    /// Source text of a module, registered or read from the search path.
    ///
    /// File contents are cached after the first read.
    pub fn source(&self, module: &str) -> Option<Rc<str>> {
        if let Some(source) = self.sources.get(module) {
            return Some(source.clone());
        }
        let path = self.locate(module)?;
        let text = read_source(&path)?;
        let text: Rc<str> = Rc::from(text);
        self.sources.insert(module.to_string(), text.clone());
        Some(text)
    }

    /// Whether `module` can be imported.
    pub fn exists(&self, module: &str) -> bool {
        Self::is_native(module) || self.modules.borrow().contains_key(module) || self.source(module).is_some()
    }

    /// Import a module, loading its parents first and attaching it to them.
    ///
    /// A module is cached before its body runs, so a circular import sees
    /// the partially initialized module instead of recursing.
    pub fn load(&self, interp: &Interpreter, module: &str) -> Result<Rc<ModuleValue>, EvalError> {
        if let Some(loaded) = self.modules.borrow().get(module) {
            return Ok(loaded.clone());
        }

        let parent = match module.rsplit_once('.') {
            Some((parent, _)) => Some(self.load_package(interp, parent)?),
            None => None,
        };

        let loaded = if Self::is_native(module) {
            let loaded = Rc::new(native_module(module));
            self.modules
                .borrow_mut()
                .insert(module.to_string(), loaded.clone());
            loaded
        } else {
            let source = self.source(module).ok_or_else(|| EvalError::Import {
                module: module.to_string(),
                message: "no module with this name".to_string(),
            })?;
            self.exec_source(interp, module, &source)?
        };

        if let (Some(parent), Some((_, child))) = (parent, module.rsplit_once('.')) {
            parent
                .namespace
                .borrow_mut()
                .insert(child.to_string(), Value::Module(loaded.clone()));
        }
        Ok(loaded)
    }

    /// Load a package, synthesizing an empty one when it has no source.
    fn load_package(&self, interp: &Interpreter, module: &str) -> Result<Rc<ModuleValue>, EvalError> {
        if self.exists(module) {
            return self.load(interp, module);
        }
        let parent = match module.rsplit_once('.') {
            Some((parent, _)) => Some(self.load_package(interp, parent)?),
            None => None,
        };
        let package = Rc::new(ModuleValue::new(module, Rc::new(RefCell::new(Namespace::new()))));
        self.modules
            .borrow_mut()
            .insert(module.to_string(), package.clone());
        if let (Some(parent), Some((_, child))) = (parent, module.rsplit_once('.')) {
            parent
                .namespace
                .borrow_mut()
                .insert(child.to_string(), Value::Module(package.clone()));
        }
        Ok(package)
    }

    fn exec_source(
        &self,
        interp: &Interpreter,
        module: &str,
        source: &str,
    ) -> Result<Rc<ModuleValue>, EvalError> {
        debug!(module, "loading module");
        let parsed = ast::parse(source).map_err(|err| EvalError::Import {
            module: module.to_string(),
            message: err.to_string(),
        })?;
        let namespace = Rc::new(RefCell::new(Namespace::new()));
        namespace
            .borrow_mut()
            .insert("__name__".to_string(), Value::str(module));
        let loaded = Rc::new(ModuleValue::new(module, namespace.clone()));
        self.modules
            .borrow_mut()
            .insert(module.to_string(), loaded.clone());

        let mut scope = SharedScope(namespace.clone());
        if let Err(err) = interp.exec_module_in(&parsed, source, &mut scope, namespace) {
            self.modules.borrow_mut().shift_remove(module);
            return Err(EvalError::Import {
                module: module.to_string(),
                message: err.to_string(),
            });
        }
        Ok(loaded)
    }
}

fn read_source(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(text) => Some(text),
        Err(err) => {
            debug!(path = %path.display(), error = %err, "cannot read module source");
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════
// Native modules
// ═══════════════════════════════════════════════════════════════════════

fn float_arg(name: &str, value: &Value) -> Result<f64, EvalError> {
    value.as_float().ok_or_else(|| EvalError::TypeError {
        message: format!("{}() argument must be a number, not {}", name, value.type_name()),
    })
}

fn unary_math(name: &'static str, f: fn(f64) -> f64) -> (String, Value) {
    let builtin = BuiltinFn::new(name, Arity::exact(1), move |_, args, _| {
        Ok(Value::Float(f(float_arg(name, &args[0])?)))
    });
    (name.to_string(), Value::Builtin(builtin))
}

fn native_module(module: &str) -> ModuleValue {
    let mut ns = Namespace::new();
    ns.insert("__name__".to_string(), Value::str(module));
    if module == "math" {
        ns.insert("pi".to_string(), Value::Float(std::f64::consts::PI));
        ns.insert("e".to_string(), Value::Float(std::f64::consts::E));
        ns.insert("inf".to_string(), Value::Float(f64::INFINITY));
        ns.insert("nan".to_string(), Value::Float(f64::NAN));
        ns.extend([
            unary_math("sqrt", f64::sqrt),
            unary_math("exp", f64::exp),
            unary_math("sin", f64::sin),
            unary_math("cos", f64::cos),
            unary_math("tan", f64::tan),
            unary_math("fabs", f64::abs),
        ]);
        let floor = BuiltinFn::new("floor", Arity::exact(1), |_, args, _| {
            Ok(Value::Int(float_arg("floor", &args[0])?.floor() as i64))
        });
        let ceil = BuiltinFn::new("ceil", Arity::exact(1), |_, args, _| {
            Ok(Value::Int(float_arg("ceil", &args[0])?.ceil() as i64))
        });
        let log = BuiltinFn::new("log", Arity::range(1, 2), |_, args, _| {
            let x = float_arg("log", &args[0])?;
            if x <= 0.0 {
                return Err(EvalError::ValueError {
                    message: "math domain error".to_string(),
                });
            }
            match args.get(1) {
                Some(base) => Ok(Value::Float(x.ln() / float_arg("log", base)?.ln())),
                None => Ok(Value::Float(x.ln())),
            }
        });
        let isnan = BuiltinFn::new("isnan", Arity::exact(1), |_, args, _| {
            Ok(Value::Bool(float_arg("isnan", &args[0])?.is_nan()))
        });
        let pow = BuiltinFn::new("pow", Arity::exact(2), |_, args, _| {
            Ok(Value::Float(float_arg("pow", &args[0])?.powf(float_arg("pow", &args[1])?)))
        });
        for builtin in [floor, ceil, log, isnan, pow] {
            ns.insert(builtin.name.clone(), Value::Builtin(builtin));
        }
    }
    ModuleValue::new(module, Rc::new(RefCell::new(ns)))
}
