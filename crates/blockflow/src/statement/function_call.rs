//! A call of an imported or local function

use indexmap::{IndexMap, IndexSet};
use uuid::Uuid;

use crate::ast::{self, is_identifier, Expr};
use crate::callable::{CallableInfo, ImportedCallable, BUILTINS_MODULE};
use crate::error::{BlockflowError, Result};
use crate::variable::{InputVariable, OutputVariable, Slot};

/// `o1, o2 = label(in1, kw=in2)`
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    uuid: Uuid,
    callable: CallableInfo,
    inputs: Vec<InputVariable>,
    outputs: Vec<OutputVariable>,
    label_name: Option<String>,
}

impl FunctionCall {
    /// A call whose variables default from the callable's signature.
    pub fn from_callable(callable: CallableInfo) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            inputs: callable.inputs().to_vec(),
            outputs: callable.outputs().to_vec(),
            callable,
            label_name: None,
        }
    }

    /// Rebuild a call from stored parts.
    pub(crate) fn from_parts(
        uuid: Uuid,
        callable: CallableInfo,
        inputs: Vec<InputVariable>,
        outputs: Vec<OutputVariable>,
        label_name: Option<String>,
    ) -> Self {
        Self {
            uuid,
            callable,
            inputs,
            outputs,
            label_name,
        }
    }

    /// Derive a call from a call expression and its assignment target.
    ///
    /// The callee's dotted name is looked up in `callables`; an unknown
    /// callee becomes a callable resolved at run time. When the signature
    /// is known the arguments bind to its parameters, otherwise each
    /// positional argument gets a placeholder parameter `arg0`, `arg1`, ...
    pub fn from_ast(
        call: &Expr,
        target: Option<&Expr>,
        callables: &IndexMap<String, CallableInfo>,
    ) -> Result<Self> {
        let Expr::Call { args, keywords, .. } = call else {
            return Err(BlockflowError::InvalidExpressionBlock {
                reason: "not a call".to_string(),
            });
        };
        let label = ast::call_target(call).ok_or_else(|| BlockflowError::InvalidExpressionBlock {
            reason: "call target is not a name".to_string(),
        })?;
        let callable = callables
            .get(&label)
            .cloned()
            .unwrap_or_else(|| CallableInfo::Imported(ImportedCallable::unresolved(&label)));

        let known = callable.load_error().is_none();
        let mut inputs: Vec<InputVariable> = if known {
            callable.inputs().to_vec()
        } else {
            Vec::new()
        };

        for (i, arg) in args.iter().enumerate() {
            let binding = ast::unparse_expr(arg);
            match inputs.get_mut(i) {
                Some(slot) if known => slot.set_binding(Some(&binding)),
                _ => {
                    let mut slot = InputVariable::new(format!("arg{}", i));
                    slot.set_binding(Some(&binding));
                    let at = inputs
                        .iter()
                        .position(InputVariable::is_keyword)
                        .unwrap_or(inputs.len());
                    inputs.insert(at, slot);
                }
            }
        }
        for keyword in keywords {
            let binding = ast::unparse_expr(&keyword.value);
            match inputs.iter_mut().find(|slot| slot.name() == keyword.arg) {
                Some(slot) => slot.set_binding(Some(&binding)),
                None => inputs.push(InputVariable::keyword(&keyword.arg, binding)),
            }
        }

        let outputs = match target {
            Some(target) => {
                let names = target.target_names().ok_or_else(|| {
                    BlockflowError::InvalidIdentifier {
                        binding: ast::unparse_expr(target),
                    }
                })?;
                let declared = callable.outputs();
                if declared.len() == names.len() {
                    declared
                        .iter()
                        .zip(&names)
                        .map(|(out, binding)| OutputVariable::bound(out.name(), binding.as_str()))
                        .collect::<Result<Vec<_>>>()?
                } else {
                    names
                        .iter()
                        .map(|name| OutputVariable::new(name.as_str()))
                        .collect::<Result<Vec<_>>>()?
                }
            }
            None => Vec::new(),
        };

        let label_name = (label != callable.name()).then_some(label);
        Ok(Self {
            uuid: Uuid::new_v4(),
            callable,
            inputs,
            outputs,
            label_name,
        })
    }

    /// Identity
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// The function called
    pub fn callable(&self) -> &CallableInfo {
        &self.callable
    }

    /// Arguments
    pub fn inputs(&self) -> &[InputVariable] {
        &self.inputs
    }

    pub(crate) fn inputs_mut(&mut self) -> &mut [InputVariable] {
        &mut self.inputs
    }

    /// Results
    pub fn outputs(&self) -> &[OutputVariable] {
        &self.outputs
    }

    /// Name the call is written with
    pub fn label(&self) -> &str {
        self.label_name.as_deref().unwrap_or(self.callable.name())
    }

    /// Explicit label, when it differs from the callable's name
    pub fn label_name(&self) -> Option<&str> {
        self.label_name.as_deref()
    }

    /// Call the function under another name.
    pub fn set_label(&mut self, label: Option<&str>) {
        self.label_name = label.map(str::to_string);
    }

    /// Rebind the input named `name`.
    pub fn set_input_binding(&mut self, name: &str, binding: Option<&str>) -> Result<()> {
        let uuid = self.uuid;
        let slot = self
            .inputs
            .iter_mut()
            .find(|i| i.name() == name)
            .ok_or_else(|| BlockflowError::UnknownVariable {
                uuid,
                slot: Slot::Input.as_str(),
                name: name.to_string(),
            })?;
        slot.set_binding(binding);
        Ok(())
    }

    /// Rebind the output named `name`.
    pub fn set_output_binding(&mut self, name: &str, binding: Option<&str>) -> Result<()> {
        let uuid = self.uuid;
        let slot = self
            .outputs
            .iter_mut()
            .find(|o| o.name() == name)
            .ok_or_else(|| BlockflowError::UnknownVariable {
                uuid,
                slot: Slot::Output.as_str(),
                name: name.to_string(),
            })?;
        slot.set_binding(binding)
    }

    /// Replace the callable and re-synchronise the variables with its
    /// signature, keeping the bindings of slots whose names survive.
    pub fn update_from_callable(&mut self, callable: CallableInfo) {
        let old_inputs = std::mem::take(&mut self.inputs);
        let old_outputs = std::mem::take(&mut self.outputs);
        self.inputs = callable
            .inputs()
            .iter()
            .map(|fresh| {
                match old_inputs.iter().find(|old| old.name() == fresh.name()) {
                    Some(old) if old.is_explicit() => {
                        let mut kept = fresh.clone();
                        kept.set_binding(Some(old.binding()));
                        kept
                    }
                    _ => fresh.clone(),
                }
            })
            .collect();
        self.outputs = callable
            .outputs()
            .iter()
            .map(|fresh| {
                old_outputs
                    .iter()
                    .find(|old| old.name() == fresh.name())
                    .cloned()
                    .unwrap_or_else(|| fresh.clone())
            })
            .collect();
        self.callable = callable;
    }

    /// `o1, o2 = label(args)`
    pub fn call_signature(&self) -> String {
        let args: Vec<String> = self
            .inputs
            .iter()
            .map(InputVariable::call_signature)
            .filter(|arg| !arg.is_empty())
            .collect();
        let call = format!("{}({})", self.label(), args.join(", "));
        if self.outputs.is_empty() {
            call
        } else {
            let outs: Vec<&str> = self.outputs.iter().map(OutputVariable::binding).collect();
            format!("{} = {}", outs.join(", "), call)
        }
    }

    /// Import line that makes the label callable, if one is needed.
    pub fn import_line(&self) -> Option<String> {
        let CallableInfo::Imported(imported) = &self.callable else {
            return None;
        };
        let module = imported.module();
        if module == BUILTINS_MODULE {
            return None;
        }
        let label = self.label();
        let line = match label.rsplit_once('.') {
            Some((qualifier, _)) if qualifier == module => format!("import {}", module),
            Some((qualifier, _)) if is_identifier(qualifier) => {
                format!("import {} as {}", module, qualifier)
            }
            Some((qualifier, _)) => {
                // `np.linalg.norm` from `numpy.linalg`: alias the root package
                let (root, rest) = qualifier.split_once('.').unwrap_or((qualifier, ""));
                match module.strip_suffix(rest).and_then(|m| m.strip_suffix('.')) {
                    Some(package) if !rest.is_empty() && package != root => {
                        format!("import {} as {}", package, root)
                    }
                    _ => format!("import {}", module),
                }
            }
            None if label == self.callable.name() => {
                format!("from {} import {}", module, label)
            }
            None => format!("from {} import {} as {}", module, self.callable.name(), label),
        };
        Some(line)
    }

    /// Names the arguments read
    pub fn input_names(&self) -> IndexSet<String> {
        self.inputs
            .iter()
            .flat_map(InputVariable::dependencies)
            .collect()
    }

    /// Names the call binds
    pub fn output_names(&self) -> IndexSet<String> {
        self.outputs
            .iter()
            .map(|o| o.binding().to_string())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interp::ModuleLoader;

    fn callables() -> IndexMap<String, CallableInfo> {
        let loader = ModuleLoader::new(Vec::new());
        loader.register_source(
            "ops",
            "def add(x, y):\n    return x + y\n\ndef scale(x, by=2):\n    z = x * by\n    return z\n",
        );
        let mut map = IndexMap::new();
        map.insert("add".to_string(), CallableInfo::imported(&loader, "ops", "add"));
        map.insert("times".to_string(), CallableInfo::imported(&loader, "ops", "scale"));
        map
    }

    fn parse_assign(src: &str) -> (Expr, Expr) {
        let module = ast::parse(src).unwrap();
        match &module.body[0].kind {
            ast::StmtKind::Assign { targets, value } => (targets[0].clone(), value.clone()),
            other => panic!("not an assignment: {:?}", other),
        }
    }

    #[test]
    fn test_from_ast_binds_known_signature() {
        let (target, call) = parse_assign("c = add(a, b + 1)\n");
        let stmt = FunctionCall::from_ast(&call, Some(&target), &callables()).unwrap();
        assert_eq!(stmt.inputs()[0].binding(), "a");
        assert_eq!(stmt.inputs()[1].binding(), "b + 1");
        assert_eq!(stmt.outputs()[0].binding(), "c");
        assert_eq!(stmt.call_signature(), "c = add(a, b + 1)");
        assert_eq!(stmt.import_line().as_deref(), Some("from ops import add"));
        let names: Vec<_> = stmt.input_names().into_iter().collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_keyword_default_omitted_until_set() {
        let (target, call) = parse_assign("w = times(v)\n");
        let mut stmt = FunctionCall::from_ast(&call, Some(&target), &callables()).unwrap();
        assert_eq!(stmt.call_signature(), "w = times(v)");
        assert_eq!(
            stmt.import_line().as_deref(),
            Some("from ops import scale as times")
        );
        stmt.set_input_binding("by", Some("3")).unwrap();
        assert_eq!(stmt.call_signature(), "w = times(v, by=3)");
        assert!(stmt.set_input_binding("nope", Some("1")).is_err());
    }

    #[test]
    fn test_unknown_callee_gets_placeholders() {
        let (target, call) = parse_assign("n = len(xs)\n");
        let stmt = FunctionCall::from_ast(&call, Some(&target), &callables()).unwrap();
        assert_eq!(stmt.inputs()[0].name(), "arg0");
        assert_eq!(stmt.call_signature(), "n = len(xs)");
        assert_eq!(stmt.import_line(), None);
    }

    #[test]
    fn test_output_binding_rejects_non_identifier() {
        let (target, call) = parse_assign("c = add(a, b)\n");
        let mut stmt = FunctionCall::from_ast(&call, Some(&target), &callables()).unwrap();
        assert!(stmt.set_output_binding("result", Some("c d")).is_err());
        stmt.set_output_binding("result", Some("total")).unwrap();
        assert_eq!(stmt.call_signature(), "total = add(a, b)");
    }

    #[test]
    fn test_update_from_callable_keeps_bindings() {
        let (target, call) = parse_assign("c = f(a, b)\n");
        let mut map = IndexMap::new();
        map.insert(
            "f".to_string(),
            CallableInfo::local("f", "def f(x, y):\n    return x\n"),
        );
        let mut stmt = FunctionCall::from_ast(&call, Some(&target), &map).unwrap();
        stmt.update_from_callable(CallableInfo::local("f", "def f(x, z=1):\n    return x\n"));
        assert_eq!(stmt.call_signature(), "c = f(a)");
    }
}
