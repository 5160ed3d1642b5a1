//! The MCP server that owns live sessions.
//!
//! [`McpServer`] keeps the registry of sessions attached to this process and
//! the tools they can call. It is the [`SessionOwner`] the session cache
//! hands decoded records to.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::{Value, json};
use tether_session::{BoxError, LiveSession, SessionOwner, SessionRecord};
use tracing::debug;

use crate::protocol::{
    CallToolParams, CallToolResult, InitializeParams, InitializeResult, JsonRpcError,
    ServerCapabilities, ServerInfo, ToolInfo, ToolsCapability, negotiate_version,
};

/// Handler invoked for `tools/call`.
pub type ToolHandler = Arc<dyn Fn(&McpSession, Option<Value>) -> CallToolResult + Send + Sync>;

/// A registered tool.
#[derive(Clone)]
pub struct Tool {
    /// Advertised definition.
    pub info: ToolInfo,
    handler: ToolHandler,
}

/// A session attached to an [`McpServer`].
///
/// A handle is an immutable snapshot. Changes are made on a copy from
/// [`updated`](Self::updated), persisted, and only then installed, so a
/// failed write never alters the session other requests are served from.
#[derive(Clone)]
pub struct McpSession {
    record: Arc<SessionRecord>,
}

impl std::fmt::Debug for McpSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpSession")
            .field("id", &self.record.id)
            .field("initialized", &self.record.initialized)
            .finish()
    }
}

impl McpSession {
    fn from_record(record: SessionRecord) -> Self {
        Self {
            record: Arc::new(record),
        }
    }

    /// Whether the client has sent `notifications/initialized`.
    pub fn is_initialized(&self) -> bool {
        self.record.initialized
    }

    /// Minimum log level requested by the client.
    pub fn log_level(&self) -> Option<&str> {
        self.record.log_level.as_deref()
    }

    /// Protocol version negotiated for this session.
    pub fn protocol_version(&self) -> Option<&str> {
        self.record.protocol_version.as_deref()
    }

    /// A copy of this session with `change` applied. `self` is unchanged.
    pub fn updated(&self, change: impl FnOnce(&mut SessionRecord)) -> Self {
        let mut record = (*self.record).clone();
        change(&mut record);
        record.id = self.record.id.clone();
        Self::from_record(record)
    }
}

impl LiveSession for McpSession {
    fn id(&self) -> &str {
        &self.record.id
    }

    fn record(&self) -> SessionRecord {
        (*self.record).clone()
    }
}

/// MCP server: implementation info, tools, and the active-session registry.
pub struct McpServer {
    info: ServerInfo,
    tools: Vec<Tool>,
    sessions: RwLock<HashMap<String, McpSession>>,
}

impl McpServer {
    /// Create a server with no tools.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: ServerInfo {
                name: name.into(),
                version: version.into(),
            },
            tools: Vec::new(),
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a tool.
    pub fn with_tool<F>(mut self, info: ToolInfo, handler: F) -> Self
    where
        F: Fn(&McpSession, Option<Value>) -> CallToolResult + Send + Sync + 'static,
    {
        self.tools.retain(|t| t.info.name != info.name);
        self.tools.push(Tool {
            info,
            handler: Arc::new(handler),
        });
        self
    }

    /// Implementation info.
    pub fn info(&self) -> &ServerInfo {
        &self.info
    }

    /// Create a session for a fresh `initialize`.
    ///
    /// The session is registered once the cache has stored it.
    pub fn open_session(&self, session_id: &str, params: &InitializeParams) -> McpSession {
        let record = SessionRecord::new(session_id)
            .with_protocol_version(negotiate_version(&params.protocol_version))
            .with_client_info(&params.client_info.name, &params.client_info.version)
            .with_client_capabilities(params.capabilities.clone());
        McpSession::from_record(record)
    }

    /// Answer for `initialize`.
    pub fn initialize_result(&self, requested_version: &str) -> InitializeResult {
        InitializeResult {
            protocol_version: negotiate_version(requested_version).to_string(),
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: Some(false),
                }),
                logging: Some(json!({})),
            },
            server_info: self.info.clone(),
        }
    }

    /// Registered session, if attached to this process.
    ///
    /// The registry mirrors the session cache's hot tier: entries come and go
    /// through [`SessionOwner::attached`] and [`SessionOwner::released`].
    pub fn session(&self, session_id: &str) -> Option<McpSession> {
        self.sessions.read().get(session_id).cloned()
    }

    /// Detach a session. Returns whether it was registered.
    fn unregister(&self, session_id: &str) -> bool {
        let removed = self.sessions.write().remove(session_id).is_some();
        if removed {
            debug!(session_id = %session_id, "Session unregistered");
        }
        removed
    }

    /// Number of sessions attached to this process.
    pub fn active_sessions(&self) -> usize {
        self.sessions.read().len()
    }

    /// Advertised tools.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools.iter().map(|t| t.info.clone()).collect()
    }

    /// Run a tool for a session.
    pub fn call_tool(
        &self,
        session: &McpSession,
        params: CallToolParams,
    ) -> Result<CallToolResult, JsonRpcError> {
        let tool = self
            .tools
            .iter()
            .find(|t| t.info.name == params.name)
            .ok_or_else(|| JsonRpcError::invalid_params(format!("unknown tool: {}", params.name)))?;
        debug!(session_id = %session.id(), tool = %params.name, "Calling tool");
        Ok((tool.handler)(session, params.arguments))
    }

    fn register(&self, session: &McpSession) {
        // Replacing an existing entry keeps registration idempotent per id.
        self.sessions
            .write()
            .insert(session.id().to_string(), session.clone());
    }
}

impl SessionOwner for McpServer {
    type Session = McpSession;

    fn reattach(&self, record: SessionRecord) -> Result<McpSession, BoxError> {
        if record.id.is_empty() {
            return Err("session record has an empty id".into());
        }
        debug!(session_id = %record.id, "Reattaching session");
        Ok(McpSession::from_record(record))
    }

    fn attached(&self, session: &McpSession) {
        self.register(session);
    }

    fn released(&self, session_id: &str) {
        self.unregister(session_id);
    }
}

/// The server this binary runs: one `hello_world` tool.
pub fn session_server() -> McpServer {
    McpServer::new("tether", env!("CARGO_PKG_VERSION")).with_tool(
        ToolInfo {
            name: "hello_world".to_string(),
            description: Some("A simple tool that outputs 'Hello world!'".to_string()),
            input_schema: json!({"type": "object", "properties": {}}),
        },
        |_session, _args| CallToolResult::text("Hello world!"),
    )
}
