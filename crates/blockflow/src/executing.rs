//! An execution model bound to a root context
//!
//! [`ExecutingContext`] runs restrictions of its model whenever names in
//! the context change (when auto-execution is on) and serialises those
//! runs: a change arriving while a run is in flight, or while execution is
//! deferred, is queued and folded into a single follow-up run.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::IndexSet;
use tracing::{debug, error};
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::context::{Context, ItemsModified, ListenerId};
use crate::error::{BlockflowError, ExecutionFailure, Result};
use crate::interp::Interpreter;
use crate::model::{ExecutionModel, ExecutionReport};
use crate::statement::Statement;
use crate::variable::Slot;

/// Work waiting for the current run to finish.
#[derive(Debug, Clone, Default)]
enum Pending {
    #[default]
    Nothing,
    Names(IndexSet<String>),
    Everything,
}

impl Pending {
    fn add(&mut self, names: Option<Vec<String>>) {
        *self = match (std::mem::take(self), names) {
            (Pending::Everything, _) | (_, None) => Pending::Everything,
            (Pending::Nothing, Some(names)) => Pending::Names(names.into_iter().collect()),
            (Pending::Names(mut queued), Some(names)) => {
                queued.extend(names);
                Pending::Names(queued)
            }
        };
    }

    fn into_request(self) -> Option<Option<Vec<String>>> {
        match self {
            Pending::Nothing => None,
            Pending::Names(names) => Some(Some(names.into_iter().collect())),
            Pending::Everything => Some(None),
        }
    }
}

pub(crate) struct Inner {
    model: RefCell<ExecutionModel>,
    context: Context,
    interp: Interpreter,
    auto_execute: Cell<bool>,
    running: Cell<bool>,
    in_flight: RefCell<IndexSet<String>>,
    deferred: Cell<usize>,
    pending: RefCell<Pending>,
    errors: RefCell<IndexSet<Uuid>>,
    last_error: RefCell<Option<ExecutionFailure>>,
    listener: Cell<Option<ListenerId>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(id) = self.listener.take() {
            self.context.remove_listener(id);
        }
    }
}

impl Inner {
    fn busy(&self) -> bool {
        self.running.get() || self.deferred.get() > 0
    }

    fn on_items_modified(&self, event: &ItemsModified) {
        if !self.auto_execute.get() {
            return;
        }
        let names: Vec<String> = {
            let in_flight = self.in_flight.borrow();
            event
                .updated_names()
                .into_iter()
                .filter(|n| !in_flight.contains(n))
                .collect()
        };
        if names.is_empty() {
            return;
        }
        if let Err(err) = self.execute_for_names(Some(names)) {
            debug!(error = %err, "triggered execution failed");
        }
    }

    fn execute_for_names(&self, names: Option<Vec<String>>) -> Result<ExecutionReport> {
        if self.busy() {
            debug!(names = ?names, "execution queued");
            self.pending.borrow_mut().add(names);
            return Ok(ExecutionReport::default());
        }
        let mut report = self.run_once(names)?;
        while let Some(next) = self.pending.take().into_request() {
            let more = self.run_once(next)?;
            report.executed.extend(more.executed);
            report.skipped.extend(more.skipped);
        }
        Ok(report)
    }

    fn run_once(&self, names: Option<Vec<String>>) -> Result<ExecutionReport> {
        let model = self.model.borrow();
        let inputs = names.as_deref();
        *self.in_flight.borrow_mut() = model.restrict(inputs, None).all_outputs();
        self.running.set(true);
        debug!(names = ?names, "executing");
        let result = model.execute(&self.context, inputs, None, &self.interp);
        self.running.set(false);
        self.in_flight.borrow_mut().clear();

        match result {
            Ok(report) => {
                let mut errors = self.errors.borrow_mut();
                for uuid in &report.executed {
                    errors.shift_remove(uuid);
                }
                Ok(report)
            }
            Err(BlockflowError::Execution(failure)) => {
                if let Some(uuid) = failure.statement {
                    self.errors.borrow_mut().insert(uuid);
                }
                *self.last_error.borrow_mut() = Some((*failure).clone());
                Err(BlockflowError::Execution(failure))
            }
            Err(err) => Err(err),
        }
    }
}

/// An execution model bound to a root context.
///
/// Cloning clones the handle.
#[derive(Clone)]
pub struct ExecutingContext {
    inner: Rc<Inner>,
}

impl fmt::Debug for ExecutingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutingContext")
            .field("context", &self.inner.context)
            .field("auto_execute", &self.inner.auto_execute.get())
            .field("running", &self.inner.running.get())
            .finish()
    }
}

/// Keeps execution deferred while alive. See
/// [`ExecutingContext::defer_execution`].
pub struct DeferGuard {
    inner: Rc<Inner>,
}

impl Drop for DeferGuard {
    fn drop(&mut self) {
        let depth = self.inner.deferred.get().saturating_sub(1);
        self.inner.deferred.set(depth);
        if depth > 0 || self.inner.running.get() {
            return;
        }
        if let Some(request) = self.inner.pending.take().into_request() {
            if let Err(err) = self.inner.execute_for_names(request) {
                error!(error = %err, "deferred execution failed");
            }
        }
    }
}

impl ExecutingContext {
    /// Bind `model` to `context`, with an interpreter built from `config`.
    pub fn new(model: ExecutionModel, context: Context, config: EngineConfig) -> Self {
        Self::with_interpreter(model, context, Interpreter::new(config))
    }

    /// Bind `model` to `context`, running it with `interp`.
    pub fn with_interpreter(model: ExecutionModel, context: Context, interp: Interpreter) -> Self {
        let auto_execute = interp.config().auto_execute;
        let inner = Rc::new(Inner {
            model: RefCell::new(model),
            context,
            interp,
            auto_execute: Cell::new(auto_execute),
            running: Cell::new(false),
            in_flight: RefCell::new(IndexSet::new()),
            deferred: Cell::new(0),
            pending: RefCell::new(Pending::Nothing),
            errors: RefCell::new(IndexSet::new()),
            last_error: RefCell::new(None),
            listener: Cell::new(None),
        });
        let weak: Weak<Inner> = Rc::downgrade(&inner);
        let id = inner.context.on_items_modified(move |event| {
            if let Some(inner) = weak.upgrade() {
                inner.on_items_modified(event);
            }
        });
        inner.listener.set(Some(id));
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<Inner> {
        Rc::downgrade(&self.inner)
    }

    pub(crate) fn from_inner(inner: Rc<Inner>) -> Self {
        Self { inner }
    }

    /// The root context
    pub fn context(&self) -> &Context {
        &self.inner.context
    }

    /// The interpreter running the model
    pub fn interpreter(&self) -> &Interpreter {
        &self.inner.interp
    }

    /// Read access to the model.
    pub fn with_model<R>(&self, f: impl FnOnce(&ExecutionModel) -> R) -> R {
        f(&self.inner.model.borrow())
    }

    /// Edit the model. Fails while the model is executing.
    pub fn with_model_mut<R>(&self, f: impl FnOnce(&mut ExecutionModel) -> R) -> Result<R> {
        let mut model = self
            .inner
            .model
            .try_borrow_mut()
            .map_err(|_| BlockflowError::ExecutionInProgress)?;
        Ok(f(&mut model))
    }

    /// A copy of the model
    pub fn model(&self) -> ExecutionModel {
        self.inner.model.borrow().clone()
    }

    /// Whether context changes trigger execution
    pub fn auto_execute(&self) -> bool {
        self.inner.auto_execute.get()
    }

    /// Turn automatic execution on or off.
    pub fn set_auto_execute(&self, enabled: bool) {
        self.inner.auto_execute.set(enabled);
    }

    /// Run the statements affected by `names`, or the whole program for
    /// `None`.
    ///
    /// While another run is in flight or execution is deferred, the request
    /// is queued and the returned report is empty.
    pub fn execute_for_names(&self, names: Option<Vec<String>>) -> Result<ExecutionReport> {
        self.inner.execute_for_names(names)
    }

    /// Defer execution until the returned guard drops; the queued requests
    /// then run once, merged.
    pub fn defer_execution(&self) -> DeferGuard {
        self.inner.deferred.set(self.inner.deferred.get() + 1);
        DeferGuard {
            inner: self.inner.clone(),
        }
    }

    /// Whether execution is currently deferred
    pub fn is_deferred(&self) -> bool {
        self.inner.deferred.get() > 0
    }

    /// Whether the statement raised during its last run
    pub fn has_error(&self, uuid: Uuid) -> bool {
        self.inner.errors.borrow().contains(&uuid)
    }

    /// Most recent execution failure
    pub fn last_error(&self) -> Option<ExecutionFailure> {
        self.inner.last_error.borrow().clone()
    }

    // ═══════════════════════════════════════════════════════════════════
    // Model edits
    // ═══════════════════════════════════════════════════════════════════

    /// Append a statement and, with auto-execution on, run it and whatever
    /// depends on it.
    pub fn add_statement(&self, statement: impl Into<Statement>) -> Result<Uuid> {
        let statement = statement.into();
        let names = statement.input_names();
        let uuid = self.with_model_mut(|model| model.add_function(statement))??;
        self.after_edit(names)?;
        Ok(uuid)
    }

    /// Remove a top-level statement.
    pub fn remove_statement(&self, uuid: Uuid) -> Result<Statement> {
        let removed = self.with_model_mut(|model| model.remove_function(uuid))??;
        self.inner.errors.borrow_mut().shift_remove(&uuid);
        Ok(removed)
    }

    /// Rebind a variable and, with auto-execution on, re-run the statement
    /// and its consumers.
    pub fn assign_binding(
        &self,
        uuid: Uuid,
        slot: Slot,
        name: &str,
        binding: Option<&str>,
    ) -> Result<()> {
        let names = self.with_model_mut(|model| -> Result<IndexSet<String>> {
            model.assign_binding(uuid, slot, name, binding)?;
            Ok(model
                .find(uuid)
                .map(Statement::input_names)
                .unwrap_or_default())
        })??;
        self.after_edit(names)
    }

    fn after_edit(&self, names: IndexSet<String>) -> Result<()> {
        if !self.auto_execute() {
            return Ok(());
        }
        let request = if names.is_empty() {
            None
        } else {
            Some(names.into_iter().collect())
        };
        self.execute_for_names(request).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::GeneralExpression;
    use crate::value::Value;

    fn executing(codes: &[&str], values: &[(&str, i64)], auto: bool) -> ExecutingContext {
        let statements = codes
            .iter()
            .map(|c| Statement::from(GeneralExpression::new(c).unwrap()))
            .collect();
        let context = Context::with_values(
            "root",
            values.iter().map(|(k, v)| (k.to_string(), Value::Int(*v))),
        );
        ExecutingContext::new(
            ExecutionModel::from_statements(statements),
            context,
            EngineConfig::default().with_auto_execute(auto),
        )
    }

    #[test]
    fn test_auto_execute_on_change() {
        let exec = executing(&["c = a + 1", "d = c * 2"], &[("a", 1)], true);
        exec.execute_for_names(None).unwrap();
        assert_eq!(exec.context().get("d"), Some(Value::Int(4)));

        exec.context().set("a", Value::Int(5)).unwrap();
        assert_eq!(exec.context().get("c"), Some(Value::Int(6)));
        assert_eq!(exec.context().get("d"), Some(Value::Int(12)));
    }

    #[test]
    fn test_changes_ignored_without_auto_execute() {
        let exec = executing(&["c = a + 1"], &[("a", 1)], false);
        exec.context().set("a", Value::Int(5)).unwrap();
        assert_eq!(exec.context().get("c"), None);
    }

    #[test]
    fn test_deferred_requests_run_once() {
        let exec = executing(&["c = a + b"], &[("a", 1), ("b", 1)], true);
        {
            let _guard = exec.defer_execution();
            exec.context().set("a", Value::Int(2)).unwrap();
            exec.context().set("b", Value::Int(3)).unwrap();
            assert_eq!(exec.context().get("c"), None);
        }
        assert_eq!(exec.context().get("c"), Some(Value::Int(5)));
    }

    #[test]
    fn test_failure_is_recorded() {
        let exec = executing(&["c = a / 0"], &[("a", 1)], false);
        let uuid = exec.with_model(|m| m.statements()[0].uuid());
        assert!(exec.execute_for_names(None).is_err());
        assert!(exec.has_error(uuid));
        assert_eq!(exec.last_error().and_then(|f| f.line), Some(1));
    }
}
