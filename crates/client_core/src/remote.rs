use async_trait::async_trait;
use reqwest::{Client, Response};
use shared::{
    domain::CallId,
    error::ApiErrorBody,
    protocol::{CallsPageResponse, ListCallsQuery},
};
use tracing::debug;
use url::Url;

use crate::error::{ClientError, ClientResult};

#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn fetch_calls(&self, query: &ListCallsQuery) -> ClientResult<CallsPageResponse>;
    async fn delete_call(&self, id: &CallId) -> ClientResult<()>;
}

pub struct HttpRemoteStore {
    http: Client,
    calls_url: Url,
}

impl HttpRemoteStore {
    pub fn new(calls_url: Url) -> Self {
        Self::with_client(Client::new(), calls_url)
    }

    pub fn with_client(http: Client, calls_url: Url) -> Self {
        Self { http, calls_url }
    }

    fn call_url(&self, id: &CallId) -> ClientResult<Url> {
        let mut url = self.calls_url.clone();
        let base = self.calls_url.as_str();
        url.path_segments_mut()
            .map_err(|_| ClientError::Protocol(format!("cannot address calls under {base}")))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn fetch_calls(&self, query: &ListCallsQuery) -> ClientResult<CallsPageResponse> {
        debug!(page = query.page, limit = query.limit, search = %query.search, "fetching calls");
        let res = self
            .http
            .get(self.calls_url.clone())
            .query(query)
            .send()
            .await?;
        let res = ensure_success(res).await?;
        Ok(res.json().await?)
    }

    async fn delete_call(&self, id: &CallId) -> ClientResult<()> {
        debug!(call_id = %id, "deleting call");
        let res = self.http.delete(self.call_url(id)?).send().await?;
        ensure_success(res).await?;
        Ok(())
    }
}

async fn ensure_success(res: Response) -> ClientResult<Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }

    let body = match res.text().await {
        Ok(body) => body,
        Err(err) => {
            debug!(%err, status = status.as_u16(), "could not read error body");
            String::new()
        }
    };
    let details = serde_json::from_str::<ApiErrorBody>(&body)
        .ok()
        .and_then(|body| body.message().map(str::to_string))
        .unwrap_or_else(|| {
            format!(
                "request failed with status {}",
                status
                    .canonical_reason()
                    .map(|reason| format!("{} {reason}", status.as_u16()))
                    .unwrap_or_else(|| status.as_u16().to_string())
            )
        });
    Err(ClientError::server(status.as_u16(), details))
}

#[cfg(test)]
#[path = "tests/remote_tests.rs"]
mod tests;
