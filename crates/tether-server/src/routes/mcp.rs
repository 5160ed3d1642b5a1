//! Streamable-HTTP MCP endpoint.
//!
//! - `POST /mcp` with `initialize` and no session header opens a session and
//!   returns its id in `Mcp-Session-Id`.
//! - Every other `POST /mcp` must name its session; the session is loaded
//!   through the cache, so it may have been created by another instance.
//! - `DELETE /mcp` ends the session.

use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use tether_session::{LiveSession, SessionRecord};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, ServerError};
use crate::owner::McpSession;
use crate::protocol::{
    CallToolParams, InitializeParams, JsonRpcError, JsonRpcRequest, JsonRpcResponse,
    ListToolsResult, SESSION_HEADER, SetLevelParams,
};
use crate::state::AppState;

/// Handle one JSON-RPC message.
pub async fn mcp_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response> {
    let request: JsonRpcRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            let error = JsonRpcError::parse_error(e.to_string());
            return Ok((
                StatusCode::BAD_REQUEST,
                Json(JsonRpcResponse::failure(Value::Null, error)),
            )
                .into_response());
        }
    };

    let session_id = session_header(&headers)?;

    if request.method == "initialize" {
        if session_id.is_some() {
            return Err(ServerError::BadRequest(
                "initialize must not carry a session id".to_string(),
            ));
        }
        return initialize(&state, request).await;
    }

    let session_id = session_id.ok_or_else(|| {
        ServerError::BadRequest(format!("missing {SESSION_HEADER} header"))
    })?;
    let session = state.sessions.load(&session_id).await?;

    let Some(id) = request.id.clone() else {
        notification(&state, &session, &request).await?;
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    let response = match dispatch(&state, &session, &request).await? {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(error) => JsonRpcResponse::failure(id, error),
    };
    Ok(Json(response).into_response())
}

/// End a session on both tiers and detach it from this process.
pub async fn delete_session_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<StatusCode> {
    let session_id = session_header(&headers)?
        .ok_or_else(|| ServerError::BadRequest(format!("missing {SESSION_HEADER} header")))?;

    state.sessions.delete(&session_id).await?;

    info!(session_id = %session_id, "Session ended");
    Ok(StatusCode::NO_CONTENT)
}

async fn initialize(state: &AppState, request: JsonRpcRequest) -> Result<Response> {
    let Some(id) = request.id.clone() else {
        return Err(ServerError::BadRequest(
            "initialize must be a request, not a notification".to_string(),
        ));
    };

    let params = match request.params {
        None => InitializeParams::default(),
        Some(_) => match request.parse_params::<InitializeParams>() {
            Ok(params) => params,
            Err(error) => return Ok(Json(JsonRpcResponse::failure(id, error)).into_response()),
        },
    };

    let session_id = Uuid::new_v4().to_string();
    let session = state.server.open_session(&session_id, &params);
    state.sessions.store(&session_id, &session).await?;

    info!(
        session_id = %session_id,
        client = %params.client_info.name,
        protocol_version = %params.protocol_version,
        "Session opened"
    );

    let result = serde_json::to_value(state.server.initialize_result(&params.protocol_version))?;
    let mut response = Json(JsonRpcResponse::success(id, result)).into_response();
    let header_value = HeaderValue::from_str(&session_id)
        .map_err(|e| ServerError::Internal(format!("invalid session id header: {e}")))?;
    response.headers_mut().insert(SESSION_HEADER, header_value);
    response
        .headers_mut()
        .insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    Ok(response)
}

/// Run a request. The outer error is a transport failure; the inner one is
/// a JSON-RPC error returned to the client in the response body.
async fn dispatch(
    state: &AppState,
    session: &McpSession,
    request: &JsonRpcRequest,
) -> Result<std::result::Result<Value, JsonRpcError>> {
    debug!(session_id = %session.id(), method = %request.method, "Dispatching request");

    let result = match request.method.as_str() {
        "ping" => Ok(json!({})),
        "tools/list" => Ok(serde_json::to_value(ListToolsResult {
            tools: state.server.list_tools(),
        })?),
        "tools/call" => match request.parse_params::<CallToolParams>() {
            Ok(params) => match state.server.call_tool(session, params) {
                Ok(result) => Ok(serde_json::to_value(result)?),
                Err(error) => Err(error),
            },
            Err(error) => Err(error),
        },
        "logging/setLevel" => match request.parse_params::<SetLevelParams>() {
            Ok(params) => {
                update_session(state, session, |record| record.log_level = Some(params.level))
                    .await?;
                Ok(json!({}))
            }
            Err(error) => Err(error),
        },
        other => Err(JsonRpcError::method_not_found(other)),
    };
    Ok(result)
}

async fn notification(state: &AppState, session: &McpSession, request: &JsonRpcRequest) -> Result<()> {
    match request.method.as_str() {
        "notifications/initialized" => {
            update_session(state, session, |record| record.initialized = true).await?;
            debug!(session_id = %session.id(), "Session initialized");
        }
        other => {
            debug!(session_id = %session.id(), method = %other, "Ignoring notification");
        }
    }
    Ok(())
}

/// Persist a changed copy of `session`. The cache installs the copy only
/// once the durable write succeeded; on failure the served session is
/// left as it was.
async fn update_session(
    state: &AppState,
    session: &McpSession,
    change: impl FnOnce(&mut SessionRecord),
) -> Result<()> {
    let next = session.updated(change);
    state.sessions.store(next.id(), &next).await?;
    Ok(())
}

fn session_header(headers: &HeaderMap) -> Result<Option<String>> {
    match headers.get(SESSION_HEADER) {
        None => Ok(None),
        Some(value) => {
            let id = value.to_str().map_err(|_| {
                ServerError::BadRequest(format!("{SESSION_HEADER} header is not valid ASCII"))
            })?;
            if id.is_empty() {
                return Err(ServerError::BadRequest(format!(
                    "{SESSION_HEADER} header is empty"
                )));
            }
            Ok(Some(id.to_string()))
        }
    }
}
