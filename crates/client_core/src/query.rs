use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use shared::{
    domain::PaginationMeta,
    protocol::{CallsPageResponse, ListCallsQuery},
};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    error::ClientResult,
    remote::RemoteStore,
    view::{ErrorOrigin, ViewState},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchOutcome {
    Applied,
    Superseded,
}

pub struct QueryController {
    remote: Arc<dyn RemoteStore>,
    limit: u32,
    issued: AtomicU64,
}

impl QueryController {
    pub fn new(remote: Arc<dyn RemoteStore>, limit: u32) -> Self {
        Self {
            remote,
            limit: limit.max(1),
            issued: AtomicU64::new(0),
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    pub fn latest_issued(&self) -> u64 {
        self.issued.load(Ordering::SeqCst)
    }

    pub async fn fetch_page(
        &self,
        view: &Mutex<ViewState>,
        page: u32,
        search: &str,
    ) -> ClientResult<FetchOutcome> {
        let (seq, query) = {
            let mut guard = view.lock().await;
            let page = if guard.search != search {
                guard.search = search.to_string();
                guard.pagination.current_page = 1;
                1
            } else {
                page.max(1)
            };
            guard.loading = true;
            let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
            (
                seq,
                ListCallsQuery {
                    page,
                    limit: self.limit,
                    search: search.to_string(),
                },
            )
        };

        let result = self.remote.fetch_calls(&query).await;

        let mut guard = view.lock().await;
        let latest = self.latest_issued();
        if seq != latest {
            debug!(seq, latest, page = query.page, "discarding superseded calls response");
            return Ok(FetchOutcome::Superseded);
        }
        guard.loading = false;

        match result {
            Ok(response) => {
                self.apply_page(&mut guard, &query, response);
                Ok(FetchOutcome::Applied)
            }
            Err(err) => {
                warn!(seq, page = query.page, %err, "failed to fetch calls");
                guard.set_error(ErrorOrigin::Fetch, err.user_message());
                Err(err)
            }
        }
    }

    fn apply_page(&self, view: &mut ViewState, query: &ListCallsQuery, response: CallsPageResponse) {
        let mut seen = HashSet::new();
        view.calls = response
            .calls
            .into_iter()
            .filter(|call| seen.insert(call.id.clone()))
            .collect();

        let current_page = match response.pagination.current_page {
            0 => query.page,
            page => page,
        };
        view.pagination = PaginationMeta::new(response.pagination.total, self.limit, current_page);
        view.clear_error_from(ErrorOrigin::Fetch);
    }
}

#[cfg(test)]
#[path = "tests/query_tests.rs"]
mod tests;
