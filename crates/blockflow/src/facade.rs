//! Thread-wide handle on the active executing context
//!
//! Code that cannot be handed an [`ExecutingContext`] (statement editors,
//! scripts run by a host) reaches the active one through these functions.
//! Only a weak reference is held; dropping the executing context
//! deactivates it.

use std::cell::RefCell;
use std::rc::Weak;

use uuid::Uuid;

use crate::context::Context;
use crate::error::{BlockflowError, Result};
use crate::executing::{ExecutingContext, Inner};
use crate::model::{ExecutionModel, ExecutionReport};
use crate::statement::Statement;
use crate::variable::Slot;

thread_local! {
    static ACTIVE: RefCell<Weak<Inner>> = RefCell::new(Weak::new());
}

/// Make `executing` the active executing context of this thread.
pub fn activate(executing: &ExecutingContext) {
    ACTIVE.with(|active| *active.borrow_mut() = executing.downgrade());
}

/// Forget the active executing context.
pub fn deactivate() {
    ACTIVE.with(|active| *active.borrow_mut() = Weak::new());
}

/// The active executing context, if one is bound and still alive.
pub fn current() -> Option<ExecutingContext> {
    ACTIVE
        .with(|active| active.borrow().upgrade())
        .map(ExecutingContext::from_inner)
}

fn session() -> Result<ExecutingContext> {
    current().ok_or(BlockflowError::NoActiveSession)
}

/// A copy of the active model
pub fn current_model() -> Result<ExecutionModel> {
    Ok(session()?.model())
}

/// The active root context
pub fn current_context() -> Result<Context> {
    Ok(session()?.context().clone())
}

/// Add a statement to the active model.
pub fn add_statement(statement: impl Into<Statement>) -> Result<Uuid> {
    session()?.add_statement(statement)
}

/// Remove a statement from the active model.
pub fn remove_statement(uuid: Uuid) -> Result<Statement> {
    session()?.remove_statement(uuid)
}

/// Rebind a variable in the active model.
pub fn assign_binding(uuid: Uuid, slot: Slot, name: &str, binding: Option<&str>) -> Result<()> {
    session()?.assign_binding(uuid, slot, name, binding)
}

/// Execute the active model for `names`, or entirely for `None`.
pub fn execute_for_names(names: Option<Vec<String>>) -> Result<ExecutionReport> {
    session()?.execute_for_names(names)
}
