//! Client side of the protocol, speaking to one remote endpoint over HTTP.
//!
//! The handshake happens lazily on first use and is remembered; every later
//! call carries the session id the endpoint handed out (from the
//! `Mcp-Session-Id` response header, or a `sessionId` field in the handshake
//! result when the header is missing). The tool list is cached after the
//! first successful fetch until [`RemoteClient::clear_tool_cache`].
//!
//! Responses may arrive either as a plain JSON body or as an event stream;
//! see [`parse_event_stream`].

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::error::{RemoteError, ToolError};
use crate::mcp::auth::{refresh_bounded, AuthProvider};
use crate::mcp::protocol::{
    IncomingResponse, OutgoingNotification, OutgoingRequest, RequestId, HEADER_PROTOCOL_VERSION,
    HEADER_SESSION_ID, PROTOCOL_VERSION_LATEST, SERVER_NAME,
};
use crate::mcp::registry::{CallScope, ToolCallResult, ToolDefinition};

/// Upper bound on pages followed while listing remote tools.
const MAX_LIST_PAGES: usize = 64;

/// Connection settings for one remote endpoint.
#[derive(Debug, Clone)]
pub struct RemoteClientOptions {
    /// Endpoint URL.
    pub url: Url,
    /// Per-request transport timeout.
    pub timeout: Duration,
    /// Protocol version requested in the handshake.
    pub protocol_version: String,
    /// Client name announced in the handshake.
    pub client_name: String,
}

impl RemoteClientOptions {
    /// Default options for `url`.
    #[must_use]
    pub fn new(url: Url) -> Self {
        Self {
            url,
            timeout: Duration::from_secs(30),
            protocol_version: PROTOCOL_VERSION_LATEST.to_string(),
            client_name: SERVER_NAME.to_string(),
        }
    }

    /// Overrides the transport timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a completed handshake.
#[derive(Debug, Clone, PartialEq)]
pub struct Handshake {
    /// Version the endpoint agreed to.
    pub protocol_version: String,
    /// Session id to present on later calls.
    pub session_id: Option<String>,
    /// The endpoint's `serverInfo`.
    pub server_info: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListToolsResult {
    #[serde(default)]
    tools: Vec<ToolDefinition>,
    #[serde(default)]
    next_cursor: Option<String>,
}

/// A client bound to one remote endpoint.
pub struct RemoteClient {
    http: reqwest::Client,
    options: RemoteClientOptions,
    auth: Arc<dyn AuthProvider>,
    handshake: Mutex<Option<Handshake>>,
    tools: RwLock<Option<Vec<ToolDefinition>>>,
    next_id: AtomicI64,
}

impl std::fmt::Debug for RemoteClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteClient")
            .field("url", &self.options.url.as_str())
            .finish_non_exhaustive()
    }
}

impl RemoteClient {
    /// Creates a client. No network traffic happens until first use.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Http`] if the HTTP client cannot be built.
    pub fn new(options: RemoteClientOptions, auth: Arc<dyn AuthProvider>) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(options.timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            http,
            options,
            auth,
            handshake: Mutex::new(None),
            tools: RwLock::new(None),
            next_id: AtomicI64::new(1),
        })
    }

    /// The endpoint URL.
    #[must_use]
    pub const fn url(&self) -> &Url {
        &self.options.url
    }

    /// The cached handshake, if one completed.
    pub async fn handshake(&self) -> Option<Handshake> {
        self.handshake.lock().await.clone()
    }

    /// Performs the handshake unless it already happened.
    ///
    /// # Errors
    ///
    /// Transport failures, protocol errors, or cancellation.
    pub async fn initialize(&self, scope: &CallScope) -> Result<Handshake, ToolError> {
        let mut guard = self.handshake.lock().await;
        if let Some(done) = guard.as_ref() {
            return Ok(done.clone());
        }

        let params = json!({
            "protocolVersion": self.options.protocol_version,
            "capabilities": {},
            "clientInfo": {
                "name": self.options.client_name,
                "version": env!("CARGO_PKG_VERSION"),
            },
        });
        let (result, header_session) = scope
            .run(self.send("initialize", Some(params), None))
            .await?;

        let session_id = header_session.or_else(|| {
            result
                .get("sessionId")
                .and_then(Value::as_str)
                .map(str::to_string)
        });
        let handshake = Handshake {
            protocol_version: result
                .get("protocolVersion")
                .and_then(Value::as_str)
                .unwrap_or(&self.options.protocol_version)
                .to_string(),
            session_id,
            server_info: result.get("serverInfo").cloned().unwrap_or(Value::Null),
        };

        debug!(
            endpoint = %self.options.url,
            version = %handshake.protocol_version,
            has_session = handshake.session_id.is_some(),
            "Remote handshake complete"
        );

        if let Err(e) = scope.run(self.notify_initialized(&handshake)).await {
            warn!(endpoint = %self.options.url, error = %e, "initialized notification failed");
        }

        *guard = Some(handshake.clone());
        Ok(handshake)
    }

    /// Returns the endpoint's tools, fetching them on first use.
    ///
    /// # Errors
    ///
    /// Transport failures, protocol errors, or cancellation.
    pub async fn list_tools(&self, scope: &CallScope) -> Result<Vec<ToolDefinition>, ToolError> {
        if let Some(cached) = self.tools.read().await.as_ref() {
            return Ok(cached.clone());
        }

        let handshake = self.initialize(scope).await?;
        let mut tools = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_LIST_PAGES {
            let params = cursor.as_ref().map(|c| json!({ "cursor": c }));
            let (result, _) = scope
                .run(self.send("tools/list", params, Some(&handshake)))
                .await?;
            let page: ListToolsResult = serde_json::from_value(result)
                .map_err(|e| RemoteError::Decode(format!("tools/list result: {e}")))?;
            tools.extend(page.tools);
            cursor = page.next_cursor.filter(|c| !c.is_empty());
            if cursor.is_none() {
                break;
            }
        }

        *self.tools.write().await = Some(tools.clone());
        Ok(tools)
    }

    /// Forgets the cached tool list; the next [`RemoteClient::list_tools`]
    /// fetches again.
    pub async fn clear_tool_cache(&self) {
        *self.tools.write().await = None;
    }

    /// Invokes `name` on the endpoint.
    ///
    /// # Errors
    ///
    /// Protocol error envelopes come back as [`ToolError::Rpc`] with their
    /// code, message and data intact; everything else as
    /// [`ToolError::Remote`] or [`ToolError::Cancelled`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
        scope: &CallScope,
    ) -> Result<ToolCallResult, ToolError> {
        let handshake = self.initialize(scope).await?;
        let params = json!({ "name": name, "arguments": arguments });
        let (result, _) = scope
            .run(self.send("tools/call", Some(params), Some(&handshake)))
            .await?;
        serde_json::from_value(result)
            .map_err(|e| RemoteError::Decode(format!("tools/call result: {e}")).into())
    }

    /// Liveness check.
    ///
    /// # Errors
    ///
    /// Transport failures, protocol errors, or cancellation.
    pub async fn ping(&self, scope: &CallScope) -> Result<(), ToolError> {
        let handshake = self.initialize(scope).await?;
        scope
            .run(self.send("ping", None, Some(&handshake)))
            .await
            .map(|_| ())
    }

    async fn notify_initialized(&self, handshake: &Handshake) -> Result<(), ToolError> {
        let body = serde_json::to_value(OutgoingNotification::initialized())
            .map_err(|e| RemoteError::Decode(e.to_string()))?;
        let response = self.post(&body, Some(handshake)).await?;
        if !response.status().is_success() {
            return Err(RemoteError::Status {
                status: response.status().as_u16(),
            }
            .into());
        }
        Ok(())
    }

    /// Sends one request and returns its `result` plus any session header.
    ///
    /// `handshake` is `None` only for the handshake itself, which therefore
    /// never carries a session id.
    async fn send(
        &self,
        method: &str,
        params: Option<Value>,
        handshake: Option<&Handshake>,
    ) -> Result<(Value, Option<String>), ToolError> {
        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::Relaxed));
        let body = serde_json::to_value(OutgoingRequest::new(id, method, params))
            .map_err(|e| RemoteError::Decode(e.to_string()))?;

        debug!(endpoint = %self.options.url, method, "Remote request");

        let mut response = self.post(&body, handshake).await?;
        if response.status() == StatusCode::UNAUTHORIZED {
            debug!(endpoint = %self.options.url, "Remote rejected credentials, refreshing");
            refresh_bounded(self.auth.as_ref())
                .await
                .map_err(RemoteError::from)?;
            response = self.post(&body, handshake).await?;
        }

        let status = response.status();
        if status == StatusCode::NOT_FOUND && handshake.is_some_and(|h| h.session_id.is_some()) {
            // The endpoint forgot our session: handshake again next time.
            self.handshake.lock().await.take();
        }
        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
            }
            .into());
        }

        let session_header = response
            .headers()
            .get(HEADER_SESSION_ID)
            .and_then(|h| h.to_str().ok())
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .unwrap_or("")
            .to_ascii_lowercase();
        let text = response.text().await.map_err(RemoteError::from)?;

        let payload = decode_body(&content_type, &text)?;
        let reply: IncomingResponse = serde_json::from_value(payload)
            .map_err(|e| RemoteError::Decode(format!("not a JSON-RPC response: {e}")))?;

        if let Some(err) = reply.error {
            return Err(ToolError::Rpc {
                code: err.code,
                message: err.message,
                data: err.data,
            });
        }
        let result = reply
            .result
            .ok_or_else(|| RemoteError::Decode("response has neither result nor error".into()))?;
        Ok((result, session_header))
    }

    async fn post(
        &self,
        body: &Value,
        handshake: Option<&Handshake>,
    ) -> Result<reqwest::Response, RemoteError> {
        let version = handshake.map_or(self.options.protocol_version.as_str(), |h| {
            h.protocol_version.as_str()
        });
        let mut request = self
            .http
            .post(self.options.url.clone())
            .header(ACCEPT, "application/json, text/event-stream")
            .header(CONTENT_TYPE, "application/json")
            .header(HEADER_PROTOCOL_VERSION, version)
            .json(body);

        if let Some(session) = handshake.and_then(|h| h.session_id.as_deref()) {
            request = request.header(HEADER_SESSION_ID, session);
        }
        if let Some(auth) = self.auth.get_auth_header().await? {
            request = request.header(AUTHORIZATION, auth);
        }

        Ok(request.send().await?)
    }
}

/// Decodes a response body according to its content type.
fn decode_body(content_type: &str, body: &str) -> Result<Value, RemoteError> {
    if content_type.starts_with("text/event-stream") {
        parse_event_stream(body)
    } else {
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(format!("invalid JSON body: {e}")))
    }
}

/// Extracts the first well-formed JSON payload from an event-stream body.
///
/// Blank lines, comment lines (`:`), non-data fields and empty or unparsable
/// `data:` lines are skipped.
///
/// # Errors
///
/// Returns [`RemoteError::Stream`] when no line carries a JSON payload.
pub fn parse_event_stream(body: &str) -> Result<Value, RemoteError> {
    body.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with(':'))
        .filter_map(|line| line.strip_prefix("data:"))
        .map(str::trim)
        .filter(|data| !data.is_empty())
        .find_map(|data| serde_json::from_str::<Value>(data).ok())
        .ok_or(RemoteError::Stream)
}
