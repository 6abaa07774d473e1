use std::sync::Arc;

use async_trait::async_trait;
use shared::domain::{CallId, CallRecord};
use tokio::{
    sync::{broadcast, Mutex},
    task::JoinHandle,
};
use tracing::{info, warn};
use url::Url;

pub mod config;
pub mod error;
pub mod live;
pub mod query;
pub mod reconcile;
pub mod remote;
pub mod view;

pub use config::{load_settings, ClientSettings};
pub use error::{ClientError, ClientResult};
pub use live::{ChannelState, LiveUpdateChannel, LiveUpdateSink, RetryPolicy};
pub use query::{FetchOutcome, QueryController};
pub use remote::{HttpRemoteStore, RemoteStore};
pub use view::{ErrorOrigin, TransientError, ViewState};

use reconcile::{apply_create, apply_delete, CreateOutcome, DeleteOutcome};

#[derive(Debug, Clone)]
pub enum ClientEvent {
    ViewUpdated(ViewState),
    ChannelStateChanged(ChannelState),
    Error(ClientError),
}

pub struct CallsClient {
    settings: ClientSettings,
    push_url: Url,
    remote: Arc<dyn RemoteStore>,
    queries: QueryController,
    view: Arc<Mutex<ViewState>>,
    live: Mutex<Option<LiveUpdateChannel>>,
    error_reset: Mutex<Option<JoinHandle<()>>>,
    events: broadcast::Sender<ClientEvent>,
}

impl CallsClient {
    pub fn new(settings: ClientSettings) -> anyhow::Result<Arc<Self>> {
        let endpoints = settings.endpoints()?;
        let remote = Arc::new(HttpRemoteStore::new(endpoints.calls));
        Ok(Self::from_parts(settings, endpoints.push, remote))
    }

    pub fn new_with_remote(
        settings: ClientSettings,
        remote: Arc<dyn RemoteStore>,
    ) -> anyhow::Result<Arc<Self>> {
        let push_url = settings.push_url()?;
        Ok(Self::from_parts(settings, push_url, remote))
    }

    fn from_parts(settings: ClientSettings, push_url: Url, remote: Arc<dyn RemoteStore>) -> Arc<Self> {
        let (events, _) = broadcast::channel(256);
        Arc::new(Self {
            queries: QueryController::new(Arc::clone(&remote), settings.page_size),
            view: Arc::new(Mutex::new(ViewState::new(settings.page_size))),
            settings,
            push_url,
            remote,
            live: Mutex::new(None),
            error_reset: Mutex::new(None),
            events,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<ClientEvent> {
        self.events.subscribe()
    }

    pub async fn snapshot(&self) -> ViewState {
        self.view.lock().await.clone()
    }

    pub async fn fetch_page(&self, page: u32, search: &str) -> ClientResult<FetchOutcome> {
        let result = self.queries.fetch_page(&self.view, page, search).await;
        match &result {
            Ok(FetchOutcome::Applied) => self.emit_view().await,
            Ok(FetchOutcome::Superseded) => {}
            Err(err) => {
                let _ = self.events.send(ClientEvent::Error(err.clone()));
                self.emit_view().await;
            }
        }
        result
    }

    pub async fn set_page(&self, page: u32) -> ClientResult<FetchOutcome> {
        let search = self.view.lock().await.search.clone();
        self.fetch_page(page, &search).await
    }

    pub async fn set_search(&self, term: &str) -> ClientResult<FetchOutcome> {
        self.fetch_page(1, term).await
    }

    pub async fn next_page(&self) -> ClientResult<FetchOutcome> {
        let (page, search) = {
            let view = self.view.lock().await;
            let meta = view.pagination;
            (meta.current_page.saturating_add(1).min(meta.pages), view.search.clone())
        };
        self.fetch_page(page, &search).await
    }

    pub async fn previous_page(&self) -> ClientResult<FetchOutcome> {
        let (page, search) = {
            let view = self.view.lock().await;
            (view.current_page().saturating_sub(1).max(1), view.search.clone())
        };
        self.fetch_page(page, &search).await
    }

    pub async fn refresh(&self) -> ClientResult<FetchOutcome> {
        let (page, search) = {
            let view = self.view.lock().await;
            (view.current_page(), view.search.clone())
        };
        self.fetch_page(page, &search).await
    }

    pub async fn delete_call(&self, id: &CallId) -> ClientResult<()> {
        match self.remote.delete_call(id).await {
            Ok(()) => {
                let snapshot = {
                    let mut view = self.view.lock().await;
                    let outcome = apply_delete(&mut view, id);
                    info!(
                        call_id = %id,
                        shown = outcome == DeleteOutcome::Removed,
                        total = view.pagination.total,
                        "call deleted"
                    );
                    view.clone()
                };
                let _ = self.events.send(ClientEvent::ViewUpdated(snapshot));
                Ok(())
            }
            Err(err) => {
                warn!(call_id = %id, %err, "failed to delete call");
                let generation = self
                    .view
                    .lock()
                    .await
                    .set_error(ErrorOrigin::Delete, err.user_message());
                self.schedule_error_reset(generation).await;
                let _ = self.events.send(ClientEvent::Error(err.clone()));
                self.emit_view().await;
                Err(err)
            }
        }
    }

    pub async fn start_live_updates(&self) {
        let mut live = self.live.lock().await;
        if live.is_some() {
            return;
        }
        let sink = Arc::new(ReconcilingSink {
            view: Arc::clone(&self.view),
            events: self.events.clone(),
        });
        *live = Some(LiveUpdateChannel::start(
            self.push_url.clone(),
            self.settings.retry,
            sink,
        ));
    }

    pub async fn stop_live_updates(&self) {
        let channel = self.live.lock().await.take();
        if let Some(mut channel) = channel {
            channel.stop().await;
        }
    }

    pub async fn channel_state(&self) -> Option<ChannelState> {
        self.live.lock().await.as_ref().map(LiveUpdateChannel::state)
    }

    pub async fn shutdown(&self) {
        self.stop_live_updates().await;
        if let Some(task) = self.error_reset.lock().await.take() {
            task.abort();
        }
    }

    async fn schedule_error_reset(&self, generation: u64) {
        let view = Arc::clone(&self.view);
        let events = self.events.clone();
        let ttl = self.settings.delete_error_ttl;
        let task = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let snapshot = {
                let mut view = view.lock().await;
                view.clear_error_if_current(generation)
                    .then(|| view.clone())
            };
            if let Some(snapshot) = snapshot {
                let _ = events.send(ClientEvent::ViewUpdated(snapshot));
            }
        });
        if let Some(previous) = self.error_reset.lock().await.replace(task) {
            previous.abort();
        }
    }

    async fn emit_view(&self) {
        let snapshot = self.view.lock().await.clone();
        let _ = self.events.send(ClientEvent::ViewUpdated(snapshot));
    }
}

struct ReconcilingSink {
    view: Arc<Mutex<ViewState>>,
    events: broadcast::Sender<ClientEvent>,
}

#[async_trait]
impl LiveUpdateSink for ReconcilingSink {
    async fn new_call(&self, call: CallRecord) {
        let snapshot = {
            let mut view = self.view.lock().await;
            match apply_create(&mut view, call) {
                CreateOutcome::Inserted => Some(view.clone()),
                CreateOutcome::Duplicate => None,
            }
        };
        if let Some(snapshot) = snapshot {
            let _ = self.events.send(ClientEvent::ViewUpdated(snapshot));
        }
    }

    async fn channel_state_changed(&self, state: ChannelState, error: Option<ClientError>) {
        let snapshot = {
            let mut view = self.view.lock().await;
            let changed = match state {
                ChannelState::RetryWait => {
                    let message = error
                        .as_ref()
                        .map(ClientError::user_message)
                        .unwrap_or_else(|| {
                            ClientError::ChannelClosed(String::new()).user_message()
                        });
                    view.set_connectivity_error(message);
                    true
                }
                ChannelState::Open | ChannelState::Stopped => {
                    view.clear_connectivity_error()
                }
                ChannelState::Connecting => false,
            };
            changed.then(|| view.clone())
        };

        let _ = self.events.send(ClientEvent::ChannelStateChanged(state));
        if let Some(err) = error {
            let _ = self.events.send(ClientEvent::Error(err));
        }
        if let Some(snapshot) = snapshot {
            let _ = self.events.send(ClientEvent::ViewUpdated(snapshot));
        }
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
