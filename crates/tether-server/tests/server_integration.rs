//! Integration tests for the MCP HTTP endpoint.
//!
//! Each test drives the router directly with `oneshot`. "Instances" share one
//! in-memory durable store to stand in for several servers behind a load
//! balancer sharing Redis.

use std::sync::Arc;

use anyhow::Result;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
    response::Response,
};
use serde_json::{Value, json};
use tether_server::protocol::SESSION_HEADER;
use tether_server::{AppState, Server, ServerConfig, SharedStore, session_server};
use tether_session::{KvStore, MemoryStore, SessionCache, StoreConfig};
use tower::ServiceExt;

struct Instance {
    router: Router,
    state: AppState,
}

async fn instance(store: &Arc<MemoryStore>) -> Instance {
    let owner = Arc::new(session_server());
    let shared: SharedStore = store.clone();
    let sessions = SessionCache::builder(StoreConfig::new())
        .owner(&owner)
        .with_store(shared)
        .await
        .expect("failed to build session cache");
    let state = AppState::new(owner, sessions, ServerConfig::new());
    Instance {
        router: Server::new(state.clone()).router(),
        state,
    }
}

async fn post(router: &Router, session: Option<&str>, body: Value) -> Result<Response> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/mcp")
        .header("content-type", "application/json");
    if let Some(id) = session {
        builder = builder.header(SESSION_HEADER, id);
    }
    let request = builder.body(Body::from(serde_json::to_vec(&body)?))?;
    Ok(router.clone().oneshot(request).await?)
}

async fn delete(router: &Router, session: &str) -> Result<Response> {
    let request = Request::builder()
        .method("DELETE")
        .uri("/mcp")
        .header(SESSION_HEADER, session)
        .body(Body::empty())?;
    Ok(router.clone().oneshot(request).await?)
}

async fn json_body(response: Response) -> Result<Value> {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&bytes)?)
}

async fn open_session(router: &Router) -> Result<String> {
    let response = post(
        router,
        None,
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": {
                "protocolVersion": "2025-03-26",
                "capabilities": {},
                "clientInfo": {"name": "itest", "version": "1.0"}
            }
        }),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let id = response
        .headers()
        .get(SESSION_HEADER)
        .expect("initialize should return a session id")
        .to_str()?
        .to_string();
    Ok(id)
}

#[tokio::test]
async fn test_initialize_opens_and_persists_session() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;

    let response = post(
        &a.router,
        None,
        json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {
            "protocolVersion": "2024-11-05",
            "clientInfo": {"name": "itest", "version": "1.0"}
        }}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session_id = response
        .headers()
        .get(SESSION_HEADER)
        .unwrap()
        .to_str()?
        .to_string();

    let body = json_body(response).await?;
    assert_eq!(body["id"], 1);
    assert_eq!(body["result"]["protocolVersion"], "2024-11-05");
    assert_eq!(body["result"]["serverInfo"]["name"], "tether");

    assert!(store.exists(&format!("mcp:session:{session_id}")).await?);
    assert!(a.state.sessions.is_cached(&session_id));
    assert_eq!(a.state.server.active_sessions(), 1);
    Ok(())
}

#[tokio::test]
async fn test_full_session_flow() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;
    let session = open_session(&a.router).await?;

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
    )
    .await?;
    let body = json_body(response).await?;
    assert_eq!(body["result"]["tools"][0]["name"], "hello_world");

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": "call-1", "method": "tools/call",
               "params": {"name": "hello_world", "arguments": {}}}),
    )
    .await?;
    let body = json_body(response).await?;
    assert_eq!(body["id"], "call-1");
    assert_eq!(body["result"]["content"][0]["text"], "Hello world!");

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
    )
    .await?;
    assert_eq!(json_body(response).await?["result"], json!({}));
    Ok(())
}

#[tokio::test]
async fn test_session_survives_restart() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;
    let session = open_session(&a.router).await?;
    post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await?;
    post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 2, "method": "logging/setLevel", "params": {"level": "debug"}}),
    )
    .await?;

    // A fresh instance knows nothing in memory but shares the store
    let b = instance(&store).await;
    assert!(!b.state.sessions.is_cached(&session));

    let response = post(
        &b.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 3, "method": "tools/list"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let restored = b.state.server.session(&session).expect("session reattached");
    assert!(restored.is_initialized());
    assert_eq!(restored.log_level(), Some("debug"));
    assert_eq!(restored.protocol_version(), Some("2025-03-26"));
    Ok(())
}

#[tokio::test]
async fn test_delete_ends_session_everywhere() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;
    let session = open_session(&a.router).await?;

    let response = delete(&a.router, &session).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(a.state.server.active_sessions(), 0);

    // Deleting again is not an error
    let response = delete(&a.router, &session).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let b = instance(&store).await;
    for router in [&a.router, &b.router] {
        let response = post(
            router,
            Some(&session),
            json!({"jsonrpc": "2.0", "id": 5, "method": "ping"}),
        )
        .await?;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = json_body(response).await?;
        assert_eq!(body["code"], "session_not_found");
    }
    Ok(())
}

#[tokio::test]
async fn test_request_errors() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;

    // Missing session header
    let response = post(&a.router, None, json!({"jsonrpc": "2.0", "id": 1, "method": "ping"})).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    // Unknown session
    let response = post(
        &a.router,
        Some("no-such-session"),
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Unparseable body
    let request = Request::builder()
        .method("POST")
        .uri("/mcp")
        .body(Body::from("{not json"))?;
    let response = a.router.clone().oneshot(request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await?["error"]["code"], -32700);

    // Unknown method on a live session
    let session = open_session(&a.router).await?;
    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 9, "method": "resources/list"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["error"]["code"], -32601);

    // Bad tool params
    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 10, "method": "tools/call", "params": {"name": "nope"}}),
    )
    .await?;
    assert_eq!(json_body(response).await?["error"]["code"], -32602);
    Ok(())
}

#[tokio::test]
async fn test_readiness_tracks_store() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;

    let ready = |router: Router| async move {
        let request = Request::builder().uri("/healthz").body(Body::empty())?;
        anyhow::Ok(router.oneshot(request).await?)
    };

    let response = ready(a.router.clone()).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await?["status"], "ready");

    store.close().await?;
    let response = ready(a.router.clone()).await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    // Session requests against an unreachable store fail instead of hanging
    let response = post(
        &a.router,
        Some("abc"),
        json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn test_failed_write_leaves_session_unchanged() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;
    let session = open_session(&a.router).await?;

    // Hot-tier hits keep serving while the durable tier refuses writes
    store.close().await?;

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 2, "method": "logging/setLevel", "params": {"level": "debug"}}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let response = post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
    )
    .await?;
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    let served = a.state.sessions.load(&session).await?;
    assert_eq!(served.log_level(), None);
    assert!(!served.is_initialized());

    let registered = a.state.server.session(&session).expect("session registered");
    assert_eq!(registered.log_level(), None);
    assert!(!registered.is_initialized());
    Ok(())
}

#[tokio::test]
async fn test_updates_replace_served_session() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let a = instance(&store).await;
    let session = open_session(&a.router).await?;

    post(
        &a.router,
        Some(&session),
        json!({"jsonrpc": "2.0", "id": 2, "method": "logging/setLevel", "params": {"level": "warning"}}),
    )
    .await?;

    let served = a.state.sessions.load(&session).await?;
    assert_eq!(served.log_level(), Some("warning"));
    assert_eq!(
        a.state.server.session(&session).and_then(|s| s.log_level().map(str::to_string)),
        Some("warning".to_string())
    );
    Ok(())
}
