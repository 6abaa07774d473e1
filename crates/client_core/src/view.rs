use shared::domain::{CallId, CallRecord, PaginationMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorOrigin {
    Fetch,
    Delete,
    Connectivity,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransientError {
    pub origin: ErrorOrigin,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct ViewState {
    pub calls: Vec<CallRecord>,
    pub pagination: PaginationMeta,
    pub search: String,
    pub error: Option<TransientError>,
    pub loading: bool,
    error_generation: u64,
    // Fetch error hidden behind a connectivity error; restored once the
    // channel recovers unless a fetch settled it first.
    stashed_fetch: Option<TransientError>,
}

impl ViewState {
    pub fn new(limit: u32) -> Self {
        Self {
            calls: Vec::new(),
            pagination: PaginationMeta::empty(limit),
            search: String::new(),
            error: None,
            loading: false,
            error_generation: 0,
            stashed_fetch: None,
        }
    }

    pub fn limit(&self) -> u32 {
        self.pagination.limit
    }

    pub fn current_page(&self) -> u32 {
        self.pagination.current_page
    }

    pub fn contains(&self, id: &CallId) -> bool {
        self.calls.iter().any(|call| &call.id == id)
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|error| error.message.as_str())
    }

    /// Replaces the current error and returns a generation token that
    /// [`ViewState::clear_error_if_current`] accepts.
    pub(crate) fn set_error(&mut self, origin: ErrorOrigin, message: impl Into<String>) -> u64 {
        self.stashed_fetch = None;
        self.error_generation += 1;
        self.error = Some(TransientError {
            origin,
            message: message.into(),
        });
        self.error_generation
    }

    pub(crate) fn clear_error(&mut self) {
        self.stashed_fetch = None;
        self.error_generation += 1;
        self.error = None;
    }

    pub(crate) fn clear_error_if_current(&mut self, generation: u64) -> bool {
        if self.error.is_none() || self.error_generation != generation {
            return false;
        }
        self.clear_error();
        true
    }

    pub(crate) fn clear_error_from(&mut self, origin: ErrorOrigin) -> bool {
        if self.stashed_fetch.as_ref().map(|error| error.origin) == Some(origin) {
            self.stashed_fetch = None;
        }
        if self.error.as_ref().map(|error| error.origin) != Some(origin) {
            return false;
        }
        self.clear_error();
        true
    }

    pub(crate) fn set_connectivity_error(&mut self, message: impl Into<String>) {
        let stash = match self.error.take() {
            Some(error) if error.origin == ErrorOrigin::Fetch => Some(error),
            Some(error) if error.origin == ErrorOrigin::Connectivity => self.stashed_fetch.take(),
            _ => None,
        };
        self.set_error(ErrorOrigin::Connectivity, message);
        self.stashed_fetch = stash;
    }

    pub(crate) fn clear_connectivity_error(&mut self) -> bool {
        if self.error.as_ref().map(|error| error.origin) != Some(ErrorOrigin::Connectivity) {
            return false;
        }
        let stash = self.stashed_fetch.take();
        self.clear_error();
        if stash.is_some() {
            self.error = stash;
        }
        true
    }
}

#[cfg(test)]
#[path = "tests/view_tests.rs"]
mod tests;
