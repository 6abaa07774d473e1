use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};
use chrono::{TimeZone, Utc};
use serde_json::json;
use shared::domain::{CallRecord, PaginationMeta};
use tokio::{net::TcpListener, sync::Mutex};

use super::*;

#[derive(Clone, Default)]
struct StoreState {
    seen_queries: Arc<Mutex<Vec<ListCallsQuery>>>,
    deleted: Arc<Mutex<Vec<String>>>,
}

fn call(id: &str) -> CallRecord {
    CallRecord {
        id: CallId::from(id),
        caller_name: "Margaret".into(),
        caller_number: "+15550160".into(),
        callee_name: "Sales".into(),
        callee_number: "+15550161".into(),
        duration: "12:00".into(),
        recording_url: Some("https://store.test/raw.wav".into()),
        redacted_recording_url: Some("https://store.test/redacted.wav".into()),
        created_at: Utc.with_ymd_and_hms(2024, 9, 9, 8, 0, 0).unwrap(),
        transcript: Vec::new(),
    }
}

async fn list_calls(
    State(state): State<StoreState>,
    Query(query): Query<ListCallsQuery>,
) -> Result<Json<CallsPageResponse>, (StatusCode, Json<serde_json::Value>)> {
    state.seen_queries.lock().await.push(query.clone());
    if query.search == "explode" {
        return Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "details": "search index offline" })),
        ));
    }
    Ok(Json(CallsPageResponse {
        calls: vec![call("r-1"), call("r-2")],
        pagination: PaginationMeta {
            total: 12,
            pages: 2,
            current_page: query.page,
            limit: query.limit,
        },
    }))
}

async fn delete_call(
    State(state): State<StoreState>,
    Path(id): Path<String>,
) -> Result<StatusCode, (StatusCode, Json<serde_json::Value>)> {
    if id == "locked" {
        return Err((
            StatusCode::CONFLICT,
            Json(json!({ "details": "call is under legal hold" })),
        ));
    }
    if id == "missing" {
        return Err((StatusCode::NOT_FOUND, Json(json!({}))));
    }
    state.deleted.lock().await.push(id);
    Ok(StatusCode::OK)
}

async fn spawn_store() -> (Url, StoreState) {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let state = StoreState::default();
    let app = Router::new()
        .route("/api/calls", get(list_calls))
        .route("/api/calls/:id", delete(delete_call))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    let url = Url::parse(&format!("http://{addr}/api/calls")).expect("url");
    (url, state)
}

#[tokio::test]
async fn fetch_sends_page_limit_and_search() {
    let (url, state) = spawn_store().await;
    let store = HttpRemoteStore::new(url);

    let page = store
        .fetch_calls(&ListCallsQuery {
            page: 2,
            limit: 10,
            search: "smith".into(),
        })
        .await
        .expect("fetch");

    assert_eq!(page.calls.len(), 2);
    assert_eq!(page.pagination.total, 12);
    assert_eq!(page.pagination.current_page, 2);
    assert_eq!(
        state.seen_queries.lock().await.as_slice(),
        &[ListCallsQuery {
            page: 2,
            limit: 10,
            search: "smith".into()
        }]
    );
}

#[tokio::test]
async fn fetch_failure_carries_store_details() {
    let (url, _state) = spawn_store().await;
    let store = HttpRemoteStore::new(url);

    let err = store
        .fetch_calls(&ListCallsQuery {
            page: 1,
            limit: 10,
            search: "explode".into(),
        })
        .await
        .expect_err("must fail");
    assert_eq!(err, ClientError::server(500, "search index offline"));
}

#[tokio::test]
async fn delete_hits_call_path() {
    let (url, state) = spawn_store().await;
    let store = HttpRemoteStore::new(url);

    store
        .delete_call(&CallId::from("abc 123"))
        .await
        .expect("delete");
    assert_eq!(state.deleted.lock().await.as_slice(), &["abc 123".to_string()]);
}

#[tokio::test]
async fn delete_failure_uses_details_or_status() {
    let (url, _state) = spawn_store().await;
    let store = HttpRemoteStore::new(url);

    let err = store
        .delete_call(&CallId::from("locked"))
        .await
        .expect_err("must fail");
    assert_eq!(err, ClientError::server(409, "call is under legal hold"));

    let err = store
        .delete_call(&CallId::from("missing"))
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        ClientError::server(404, "request failed with status 404 Not Found")
    );
}

#[tokio::test]
async fn unreachable_store_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);
    let store = HttpRemoteStore::new(
        Url::parse(&format!("http://{addr}/api/calls")).expect("url"),
    );

    let err = store
        .fetch_calls(&ListCallsQuery {
            page: 1,
            limit: 10,
            search: String::new(),
        })
        .await
        .expect_err("must fail");
    assert!(matches!(err, ClientError::Network(_)), "unexpected: {err:?}");
}

#[tokio::test]
async fn truncated_error_body_falls_back_to_status() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await;
        let _ = socket
            .write_all(
                b"HTTP/1.1 500 Internal Server Error\r\ncontent-type: application/json\r\ncontent-length: 200\r\n\r\n{\"details\":",
            )
            .await;
        let _ = socket.shutdown().await;
    });

    let store = HttpRemoteStore::new(Url::parse(&format!("http://{addr}/api/calls")).expect("url"));
    let err = store
        .delete_call(&CallId::from("c-1"))
        .await
        .expect_err("must fail");
    assert_eq!(
        err,
        ClientError::server(500, "request failed with status 500 Internal Server Error")
    );
}
