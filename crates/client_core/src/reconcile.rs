use shared::domain::{CallId, CallRecord};
use tracing::debug;

use crate::view::ViewState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Inserted,
    Duplicate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Removed,
    NotMaterialized,
}

/// The list is allowed to grow past `limit`; the next page fetch trims it.
pub fn apply_create(view: &mut ViewState, record: CallRecord) -> CreateOutcome {
    if view.contains(&record.id) {
        debug!(call_id = %record.id, "ignoring duplicate new_call");
        return CreateOutcome::Duplicate;
    }

    view.calls.insert(0, record);
    view.pagination.increment_total();
    CreateOutcome::Inserted
}

pub fn apply_delete(view: &mut ViewState, id: &CallId) -> DeleteOutcome {
    let before = view.calls.len();
    view.calls.retain(|call| &call.id != id);
    view.pagination.decrement_total();

    if view.calls.len() < before {
        DeleteOutcome::Removed
    } else {
        DeleteOutcome::NotMaterialized
    }
}

#[cfg(test)]
#[path = "tests/reconcile_tests.rs"]
mod tests;
