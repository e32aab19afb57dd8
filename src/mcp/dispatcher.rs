//! Per-call protocol state machine.
//!
//! Every inbound message goes through the same steps:
//!
//! 1. **Envelope**: the message must be a JSON-RPC 2.0 object. A missing id
//!    is answered as `null`.
//! 2. **Version**: `initialize` negotiates; every other call uses the
//!    protocol-version header, or [`PROTOCOL_VERSION_LEGACY_DEFAULT`] when
//!    there is none.
//! 3. **Session**: with a [`SessionManager`] installed, every call except
//!    `initialize` must present a valid session id.
//! 4. **Method**: `initialize`, `ping`, `tools/list` or `tools/call`.
//!
//! Any failure short-circuits into an error envelope. Requests are always
//! answered; only notifications get no reply.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::error::{SessionError, ToolError};
use crate::mcp::federation::Federation;
use crate::mcp::protocol::{
    is_supported_version, parse_message, ErrorCode, IncomingMessage, JsonRpcError,
    JsonRpcErrorData, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, RequestId,
    PROTOCOL_VERSION_EARLIEST, PROTOCOL_VERSION_LATEST, PROTOCOL_VERSION_LEGACY_DEFAULT,
    SERVER_NAME, SUPPORTED_PROTOCOL_VERSIONS,
};
use crate::mcp::registry::{Arguments, CallScope};
use crate::mcp::session::SessionManager;

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    pub tools: ToolCapabilities,
    /// Resource-related capabilities.
    pub resources: ResourceCapabilities,
}

impl ServerCapabilities {
    /// Capabilities for a negotiated version.
    ///
    /// The earliest revision gets empty capability objects. Later ones carry
    /// the change-notification and subscription flags, always `false`: no
    /// delivery mechanism exists for either.
    #[must_use]
    pub fn for_version(version: &str) -> Self {
        if version == PROTOCOL_VERSION_EARLIEST {
            return Self {
                tools: ToolCapabilities::default(),
                resources: ResourceCapabilities::default(),
            };
        }
        Self {
            tools: ToolCapabilities {
                list_changed: Some(false),
            },
            resources: ResourceCapabilities {
                subscribe: Some(false),
                list_changed: Some(false),
            },
        }
    }
}

/// Tool-specific capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ToolCapabilities {
    /// Whether the tool list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Resource-specific capabilities.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResourceCapabilities {
    /// Whether clients may subscribe to resource updates.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subscribe: Option<bool>,
    /// Whether the resource list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "Option::is_none")]
    pub list_changed: Option<bool>,
}

/// Server information for initialisation response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    #[serde(default)]
    pub protocol_version: Option<String>,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Option<Value>,
}

/// Transport-level metadata accompanying a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    /// Value of the protocol-version header.
    pub protocol_version: Option<String>,
    /// Value of the session-id header.
    pub session_id: Option<String>,
}

/// What the transport should send back.
#[derive(Debug, Clone, Default)]
pub struct DispatchOutcome {
    /// The reply; `None` for notifications.
    pub response: Option<OutgoingMessage>,
    /// Session issued by a successful `initialize`, for the session header.
    pub session_id: Option<String>,
    /// Version negotiated by a successful `initialize`.
    pub protocol_version: Option<String>,
}

impl DispatchOutcome {
    fn reply(message: impl Into<OutgoingMessage>) -> Self {
        Self {
            response: Some(message.into()),
            ..Self::default()
        }
    }
}

/// Routes protocol calls to the federation.
pub struct Dispatcher {
    federation: Arc<Federation>,
    sessions: Option<Arc<dyn SessionManager>>,
    server_info: ServerInfo,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("sessions", &self.sessions.is_some())
            .field("server_info", &self.server_info)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    /// Creates a dispatcher without session management.
    #[must_use]
    pub fn new(federation: Arc<Federation>) -> Self {
        Self {
            federation,
            sessions: None,
            server_info: ServerInfo::default(),
        }
    }

    /// Installs a session manager; every non-handshake call then needs a
    /// valid session.
    #[must_use]
    pub fn with_sessions(mut self, sessions: Arc<dyn SessionManager>) -> Self {
        self.sessions = Some(sessions);
        self
    }

    /// Overrides the advertised server info.
    #[must_use]
    pub fn with_server_info(mut self, server_info: ServerInfo) -> Self {
        self.server_info = server_info;
        self
    }

    /// The federation calls are routed to.
    #[must_use]
    pub const fn federation(&self) -> &Arc<Federation> {
        &self.federation
    }

    /// Ends a session on the client's request.
    ///
    /// # Errors
    ///
    /// Whatever the session manager reports.
    pub async fn end_session(&self, id: &str) -> Result<(), SessionError> {
        match &self.sessions {
            Some(sessions) => sessions.delete_session(id).await,
            None => Ok(()),
        }
    }

    /// Parses and handles one raw message.
    pub async fn handle_raw(&self, body: &str, ctx: &CallContext, scope: CallScope) -> DispatchOutcome {
        match parse_message(body) {
            Ok(message) => self.handle(message, ctx, scope).await,
            Err(error) => DispatchOutcome::reply(error),
        }
    }

    /// Handles one parsed message.
    pub async fn handle(
        &self,
        message: IncomingMessage,
        ctx: &CallContext,
        scope: CallScope,
    ) -> DispatchOutcome {
        let req = match message {
            IncomingMessage::Request(req) => req,
            IncomingMessage::Notification(notif) => {
                debug!(method = %notif.method, "Notification received");
                return DispatchOutcome::default();
            }
        };

        if req.method == "initialize" {
            return match self.handle_initialize(&req).await {
                Ok(outcome) => outcome,
                Err(error) => DispatchOutcome::reply(error),
            };
        }

        if let Err(error) = Self::check_version(&req, ctx) {
            return DispatchOutcome::reply(error);
        }
        if let Err(error) = self.check_session(&req.id, ctx).await {
            return DispatchOutcome::reply(error);
        }

        let response = match req.method.as_str() {
            "ping" => Ok(Self::handle_ping(&req)),
            "tools/list" => Ok(self.handle_tools_list(&req).await),
            "tools/call" => self.handle_tools_call(&req, scope).await,
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => DispatchOutcome::reply(resp),
            Err(error) => DispatchOutcome::reply(error),
        }
    }

    /// Resolves the version a non-handshake call speaks.
    fn check_version(req: &JsonRpcRequest, ctx: &CallContext) -> Result<String, JsonRpcError> {
        let version = ctx
            .protocol_version
            .as_deref()
            .unwrap_or(PROTOCOL_VERSION_LEGACY_DEFAULT);
        if is_supported_version(version) {
            return Ok(version.to_string());
        }
        Err(JsonRpcError::new(
            req.id.clone(),
            JsonRpcErrorData::with_message(
                ErrorCode::InvalidRequest,
                format!("Unsupported protocol version: {version}"),
            )
            .with_data(json!({ "supported": SUPPORTED_PROTOCOL_VERSIONS })),
        ))
    }

    async fn check_session(&self, id: &RequestId, ctx: &CallContext) -> Result<(), JsonRpcError> {
        let Some(sessions) = &self.sessions else {
            return Ok(());
        };
        let Some(session_id) = ctx.session_id.as_deref().filter(|s| !s.is_empty()) else {
            return Err(JsonRpcError::invalid_request(
                id.clone(),
                "Missing session id",
            ));
        };

        match sessions.validate_session(session_id).await {
            Ok(true) => Ok(()),
            Ok(false) => {
                warn!("Rejected call with unknown or expired session");
                Err(JsonRpcError::session_not_found(id.clone()))
            }
            Err(e) => {
                error!(error = %e, "Session validation failed");
                Err(JsonRpcError::internal_error(
                    id.clone(),
                    format!("Session validation failed: {e}"),
                ))
            }
        }
    }

    /// Handles the initialize request.
    async fn handle_initialize(&self, req: &JsonRpcRequest) -> Result<DispatchOutcome, JsonRpcError> {
        // Params are optional; without them the latest version is offered.
        let params = match &req.params {
            Some(value @ Value::Object(_)) => value.clone(),
            None | Some(Value::Null) => json!({}),
            Some(_) => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "initialize params must be an object",
                ))
            }
        };
        let params: InitializeParams = serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Invalid initialize params: {e}"))
        })?;

        let negotiated = match params.protocol_version.as_deref() {
            None => PROTOCOL_VERSION_LATEST.to_string(),
            Some(requested) if is_supported_version(requested) => requested.to_string(),
            Some(requested) => {
                warn!(requested, "Client requested unsupported protocol version");
                return Err(JsonRpcError::new(
                    req.id.clone(),
                    JsonRpcErrorData::with_message(
                        ErrorCode::InvalidParams,
                        format!("Unsupported protocol version: {requested}"),
                    )
                    .with_data(json!({
                        "supported": SUPPORTED_PROTOCOL_VERSIONS,
                        "requested": requested,
                    })),
                ));
            }
        };

        let session_id = match &self.sessions {
            Some(sessions) => Some(sessions.create_session(&negotiated).await.map_err(|e| {
                error!(error = %e, "Failed to create session");
                JsonRpcError::internal_error(req.id.clone(), format!("Failed to create session: {e}"))
            })?),
            None => None,
        };

        debug!(
            version = %negotiated,
            client = params.client_info.as_ref().map_or("unknown", |c| c.name.as_str()),
            "Client initialised"
        );

        let result = json!({
            "protocolVersion": negotiated,
            "capabilities": ServerCapabilities::for_version(&negotiated),
            "serverInfo": self.server_info,
        });

        Ok(DispatchOutcome {
            response: Some(JsonRpcResponse::success(req.id.clone(), result).into()),
            session_id,
            protocol_version: Some(negotiated),
        })
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Handles the tools/list request.
    async fn handle_tools_list(&self, req: &JsonRpcRequest) -> JsonRpcResponse {
        let tools = self.federation.list_tools().await;
        JsonRpcResponse::success(req.id.clone(), json!({ "tools": &*tools }))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(
        &self,
        req: &JsonRpcRequest,
        scope: CallScope,
    ) -> Result<JsonRpcResponse, JsonRpcError> {
        let params = match &req.params {
            Some(value @ Value::Object(_)) => value.clone(),
            Some(_) => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "tools/call params must be an object",
                ))
            }
            None => {
                return Err(JsonRpcError::invalid_params(
                    req.id.clone(),
                    "Missing tool call params",
                ))
            }
        };
        let params: ToolCallParams = serde_json::from_value(params).map_err(|e| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Invalid tool call params: {e}"))
        })?;

        let outcome = match Arguments::from_value(params.arguments) {
            Ok(args) => self.federation.call_tool(&params.name, args, scope).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(result) => {
                let value = serde_json::to_value(&result).map_err(|e| {
                    error!(error = %e, "Failed to serialise tool call result");
                    JsonRpcError::internal_error(req.id.clone(), "Failed to serialise result")
                })?;
                Ok(JsonRpcResponse::success(req.id.clone(), value))
            }
            Err(e) => {
                match &e {
                    ToolError::Internal(_) | ToolError::Remote(_) => {
                        warn!(tool = %params.name, error = %e, "Tool call failed");
                    }
                    _ => debug!(tool = %params.name, error = %e, "Tool call rejected"),
                }
                Err(JsonRpcError::new(req.id.clone(), e.to_error_data()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::mcp::registry::{ToolCallResult, ToolHandler};
    use crate::mcp::schema::{Param, ParamTree};
    use crate::mcp::session::StatelessSessionManager;

    async fn dispatcher_with_upper() -> Dispatcher {
        let federation = Arc::new(Federation::new());
        let upper: Arc<dyn ToolHandler> = Arc::new(|args: Arguments, _scope: CallScope| async move {
            Ok::<_, ToolError>(ToolCallResult::text(
                args.str("s").unwrap_or_default().to_uppercase(),
            ))
        });
        federation
            .register_tool(
                "upper",
                "Uppercase a string",
                ParamTree::new().input(Param::string("s").required()),
                upper,
            )
            .await;
        Dispatcher::new(federation)
    }

    async fn call(dispatcher: &Dispatcher, body: Value, ctx: &CallContext) -> DispatchOutcome {
        dispatcher
            .handle_raw(&body.to_string(), ctx, CallScope::new())
            .await
    }

    #[test]
    fn capabilities_by_version() {
        let earliest = serde_json::to_value(ServerCapabilities::for_version("2024-11-05")).unwrap();
        assert_eq!(earliest, json!({"tools": {}, "resources": {}}));

        let latest = serde_json::to_value(ServerCapabilities::for_version("2025-06-18")).unwrap();
        assert_eq!(latest["tools"]["listChanged"], false);
        assert_eq!(latest["resources"]["subscribe"], false);
        assert_eq!(latest["resources"]["listChanged"], false);
    }

    #[tokio::test]
    async fn initialize_negotiates_version() {
        let dispatcher = dispatcher_with_upper().await;
        let ctx = CallContext::default();

        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "2024-11-05"}}),
            &ctx,
        )
        .await;
        let result = outcome.response.unwrap().result().cloned().unwrap();
        assert_eq!(result["protocolVersion"], "2024-11-05");
        assert_eq!(result["serverInfo"]["name"], "toolmesh");
        assert_eq!(outcome.protocol_version.as_deref(), Some("2024-11-05"));
        assert!(outcome.session_id.is_none());

        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": {}}),
            &ctx,
        )
        .await;
        let result = outcome.response.unwrap().result().cloned().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION_LATEST);
    }

    #[tokio::test]
    async fn initialize_without_params_offers_latest() {
        let sessions = Arc::new(StatelessSessionManager::with_random_key(Duration::from_secs(60)));
        let dispatcher = dispatcher_with_upper().await.with_sessions(sessions);
        for (id, body) in [
            (1, json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})),
            (2, json!({"jsonrpc": "2.0", "id": 2, "method": "initialize", "params": null})),
        ] {
            let outcome = call(&dispatcher, body, &CallContext::default()).await;
            assert!(outcome.session_id.is_some());
            let response = outcome.response.unwrap();
            assert_eq!(response.id(), &RequestId::Number(id));
            let result = response.result().cloned().unwrap();
            assert_eq!(result["protocolVersion"], PROTOCOL_VERSION_LATEST);
        }
    }

    #[tokio::test]
    async fn initialize_rejects_unsupported_version_with_list() {
        let dispatcher = dispatcher_with_upper().await;
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                   "params": {"protocolVersion": "1999-01-01"}}),
            &CallContext::default(),
        )
        .await;
        let response = outcome.response.unwrap();
        let error = response.error().unwrap();
        assert_eq!(error.code, -32602);
        let supported = error.data.as_ref().unwrap()["supported"].as_array().unwrap();
        assert_eq!(supported.len(), SUPPORTED_PROTOCOL_VERSIONS.len());
    }

    #[tokio::test]
    async fn non_object_params_are_invalid_params() {
        let dispatcher = dispatcher_with_upper().await;
        let ctx = CallContext::default();
        for method in ["initialize", "tools/call"] {
            let outcome = call(
                &dispatcher,
                json!({"jsonrpc": "2.0", "id": 7, "method": method, "params": "upper"}),
                &ctx,
            )
            .await;
            let response = outcome.response.unwrap();
            assert_eq!(response.error().unwrap().code, -32602, "{method}");
            assert_eq!(response.id(), &RequestId::Number(7));
        }
    }

    #[tokio::test]
    async fn missing_protocol_marker_is_invalid_request() {
        let dispatcher = dispatcher_with_upper().await;
        let outcome = call(
            &dispatcher,
            json!({"id": 3, "method": "ping"}),
            &CallContext::default(),
        )
        .await;
        let response = outcome.response.unwrap();
        assert_eq!(response.error().unwrap().code, -32600);
        assert_eq!(response.id(), &RequestId::Number(3));
    }

    #[tokio::test]
    async fn missing_id_is_answered_with_null() {
        let dispatcher = dispatcher_with_upper().await;
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "method": "ping"}),
            &CallContext::default(),
        )
        .await;
        let value = serde_json::to_value(outcome.response.unwrap()).unwrap();
        assert_eq!(value["id"], Value::Null);
        assert!(value.as_object().unwrap().contains_key("id"));
        assert_eq!(value["result"], json!({}));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let dispatcher = dispatcher_with_upper().await;
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            &CallContext::default(),
        )
        .await;
        assert!(outcome.response.is_none());
    }

    #[tokio::test]
    async fn unknown_method_and_bad_header_version() {
        let dispatcher = dispatcher_with_upper().await;
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "resources/list"}),
            &CallContext::default(),
        )
        .await;
        assert_eq!(outcome.response.unwrap().error().unwrap().code, -32601);

        let ctx = CallContext {
            protocol_version: Some("2000-01-01".to_string()),
            session_id: None,
        };
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
            &ctx,
        )
        .await;
        assert_eq!(outcome.response.unwrap().error().unwrap().code, -32600);
    }

    #[tokio::test]
    async fn upper_scenario() {
        let dispatcher = dispatcher_with_upper().await;
        let ctx = CallContext::default();

        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}),
            &ctx,
        )
        .await;
        let result = outcome.response.unwrap().result().cloned().unwrap();
        let tools = result["tools"].as_array().unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0]["name"], "upper");
        assert_eq!(tools[0]["inputSchema"]["required"], json!(["s"]));
        assert!(tools[0].get("outputSchema").is_none());

        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "upper", "arguments": {"s": "abc"}}}),
            &ctx,
        )
        .await;
        let result = outcome.response.unwrap().result().cloned().unwrap();
        assert_eq!(result["content"], json!([{"type": "text", "text": "ABC"}]));
    }

    #[tokio::test]
    async fn validation_failures_name_the_parameter() {
        let dispatcher = dispatcher_with_upper().await;
        let ctx = CallContext::default();
        for args in [json!({}), json!({"s": ""})] {
            let outcome = call(
                &dispatcher,
                json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                       "params": {"name": "upper", "arguments": args}}),
                &ctx,
            )
            .await;
            let response = outcome.response.unwrap();
            let error = response.error().unwrap();
            assert_eq!(error.code, -32602);
            assert_eq!(error.data.as_ref().unwrap()["param"], "s");
        }
    }

    #[tokio::test]
    async fn business_errors_are_forwarded_verbatim() {
        let federation = Arc::new(Federation::new());
        let failing: Arc<dyn ToolHandler> = Arc::new(|_args: Arguments, _scope: CallScope| async move {
            Err::<ToolCallResult, _>(ToolError::rpc(-32050, "quota exceeded", Some(json!({"retry": 30}))))
        });
        federation
            .register_tool("limited", "", ParamTree::new(), failing)
            .await;
        let dispatcher = Dispatcher::new(federation);
        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "tools/call",
                   "params": {"name": "limited"}}),
            &CallContext::default(),
        )
        .await;
        let response = outcome.response.unwrap();
        let error = response.error().unwrap();
        assert_eq!(error.code, -32050);
        assert_eq!(error.message, "quota exceeded");
        assert_eq!(error.data, Some(json!({"retry": 30})));
    }

    #[tokio::test]
    async fn sessions_are_enforced() {
        let sessions = Arc::new(StatelessSessionManager::with_random_key(Duration::from_secs(60)));
        let dispatcher = dispatcher_with_upper().await.with_sessions(sessions);

        let outcome = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            &CallContext::default(),
        )
        .await;
        let session_id = outcome.session_id.unwrap();

        let missing = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
            &CallContext::default(),
        )
        .await;
        assert_eq!(missing.response.unwrap().error().unwrap().code, -32600);

        let forged = CallContext {
            protocol_version: None,
            session_id: Some(format!("{session_id}x")),
        };
        let rejected = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
            &forged,
        )
        .await;
        assert_eq!(
            rejected.response.unwrap().error().unwrap().code,
            ErrorCode::SessionNotFound.code()
        );

        let valid = CallContext {
            protocol_version: Some(PROTOCOL_VERSION_LATEST.to_string()),
            session_id: Some(session_id),
        };
        let ok = call(
            &dispatcher,
            json!({"jsonrpc": "2.0", "id": 4, "method": "ping"}),
            &valid,
        )
        .await;
        assert!(ok.response.unwrap().result().is_some());
    }
}
