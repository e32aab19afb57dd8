//! stdio transport.
//!
//! - Messages are UTF-8 encoded JSON-RPC
//! - Messages are delimited by newlines
//! - Messages must not contain embedded newlines
//! - stdin: receives messages from client
//! - stdout: sends messages to client
//! - stderr: may be used for logging (not MCP messages)
//!
//! A stdio connection has no headers, so it remembers the version and
//! session handed out by its own `initialize` and presents them on every
//! later call. The handshake is handled in line; all other requests run
//! concurrently and their replies are funnelled through one writer task.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io;
use std::sync::Arc;

use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::mcp::dispatcher::{CallContext, Dispatcher};
use crate::mcp::protocol::{parse_message, IncomingMessage, OutgoingMessage, RequestId};
use crate::mcp::registry::CallScope;

type InFlight = Arc<Mutex<HashMap<String, CallScope>>>;

/// Newline-delimited JSON-RPC over a reader/writer pair, stdin/stdout by
/// default.
pub struct StdioTransport<R = tokio::io::Stdin, W = tokio::io::Stdout> {
    reader: BufReader<R>,
    writer: W,
}

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_io(tokio::io::stdin(), tokio::io::stdout())
    }
}

impl Default for StdioTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl<R, W> StdioTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    /// Creates a transport over arbitrary streams.
    pub fn with_io(reader: R, writer: W) -> Self {
        Self {
            reader: BufReader::new(reader),
            writer,
        }
    }

    /// Serves until the input closes or `shutdown` fires.
    ///
    /// At end of input, calls still running are allowed to finish. On
    /// shutdown they are cancelled. Either way every reply produced is
    /// flushed before returning.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing fails.
    pub async fn serve(self, dispatcher: Arc<Dispatcher>, shutdown: CancellationToken) -> io::Result<()> {
        let Self { mut reader, writer } = self;
        let (tx, rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_loop(writer, rx));

        let ctx = Arc::new(Mutex::new(CallContext::default()));
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let mut tasks = JoinSet::new();

        info!("stdio transport ready");
        let result = loop {
            while tasks.try_join_next().is_some() {}

            let line = tokio::select! {
                biased;
                () = shutdown.cancelled() => break Ok(()),
                line = read_line(&mut reader) => line,
            };
            match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    handle_line(&line, &dispatcher, &ctx, &in_flight, &tx, &mut tasks).await;
                }
                Ok(None) => break Ok(()),
                Err(e) => break Err(e),
            }
        };

        if shutdown.is_cancelled() || result.is_err() {
            for scope in in_flight.lock().await.values() {
                scope.cancel();
            }
        }
        while tasks.join_next().await.is_some() {}

        drop(tx);
        let flushed = writer_task.await.map_err(io::Error::other)?;
        info!("stdio transport stopped");
        result.and(flushed)
    }
}

/// Reads the next message line, without its terminator.
///
/// Returns `None` at EOF.
async fn read_line<R: AsyncRead + Unpin>(reader: &mut BufReader<R>) -> io::Result<Option<String>> {
    let mut line = String::new();
    let bytes_read = reader.read_line(&mut line).await?;

    if bytes_read == 0 {
        return Ok(None);
    }

    if line.ends_with('\n') {
        line.pop();
        if line.ends_with('\r') {
            line.pop();
        }
    }

    Ok(Some(line))
}

async fn write_loop<W: AsyncWrite + Unpin>(
    mut writer: W,
    mut rx: mpsc::UnboundedReceiver<String>,
) -> io::Result<()> {
    while let Some(json) = rx.recv().await {
        // Messages must not contain embedded newlines
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );
        writer.write_all(json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    writer.shutdown().await
}

fn send(tx: &mpsc::UnboundedSender<String>, message: &OutgoingMessage) {
    match serde_json::to_string(message) {
        Ok(json) => {
            // The writer only goes away during shutdown.
            let _ = tx.send(json);
        }
        Err(e) => error!(error = %e, "Failed to serialise response"),
    }
}

async fn handle_line(
    line: &str,
    dispatcher: &Arc<Dispatcher>,
    ctx: &Arc<Mutex<CallContext>>,
    in_flight: &InFlight,
    tx: &mpsc::UnboundedSender<String>,
    tasks: &mut JoinSet<()>,
) {
    let message = match parse_message(line) {
        Ok(message) => message,
        Err(error) => {
            send(tx, &error.into());
            return;
        }
    };

    match &message {
        IncomingMessage::Notification(notif) => {
            if notif.method == "notifications/cancelled" {
                cancel_request(notif.params.as_ref(), in_flight).await;
            }
            let snapshot = ctx.lock().await.clone();
            dispatcher
                .handle(message, &snapshot, CallScope::new())
                .await;
        }
        IncomingMessage::Request(req) if req.method == "initialize" => {
            let snapshot = ctx.lock().await.clone();
            let outcome = dispatcher
                .handle(message, &snapshot, CallScope::new())
                .await;
            if outcome.protocol_version.is_some() {
                *ctx.lock().await = CallContext {
                    protocol_version: outcome.protocol_version,
                    session_id: outcome.session_id,
                };
            }
            if let Some(response) = &outcome.response {
                send(tx, response);
            }
        }
        IncomingMessage::Request(req) => {
            let scope = CallScope::new();
            let tracked = track(in_flight, &req.id, &scope).await;

            let snapshot = ctx.lock().await.clone();
            let dispatcher = Arc::clone(dispatcher);
            let in_flight = Arc::clone(in_flight);
            let tx = tx.clone();
            tasks.spawn(async move {
                let outcome = dispatcher.handle(message, &snapshot, scope).await;
                if let Some(key) = tracked {
                    in_flight.lock().await.remove(&key);
                }
                if let Some(response) = &outcome.response {
                    send(&tx, response);
                }
            });
        }
    }
}

/// Records a running request so a later cancellation can find it.
///
/// A `null` id cannot be named by a cancellation, and a reused id keeps
/// pointing at the request that claimed it first; neither is recorded.
async fn track(in_flight: &InFlight, id: &RequestId, scope: &CallScope) -> Option<String> {
    if matches!(id, RequestId::Null) {
        return None;
    }
    let key = id.to_string();
    match in_flight.lock().await.entry(key) {
        Entry::Occupied(entry) => {
            debug!(request = %entry.key(), "Request id already in flight, not tracked");
            None
        }
        Entry::Vacant(entry) => {
            let key = entry.key().clone();
            entry.insert(scope.clone());
            Some(key)
        }
    }
}

async fn cancel_request(params: Option<&Value>, in_flight: &InFlight) {
    let Some(id) = params.and_then(|p| p.get("requestId")) else {
        return;
    };
    let key = match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if let Some(scope) = in_flight.lock().await.get(&key) {
        debug!(request = %key, "Cancelling request");
        scope.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::error::ToolError;
    use crate::mcp::federation::Federation;
    use crate::mcp::registry::{Arguments, ToolCallResult, ToolHandler};
    use crate::mcp::schema::{Param, ParamTree};
    use crate::mcp::session::StatelessSessionManager;

    async fn run(dispatcher: Dispatcher, input: &str) -> Vec<Value> {
        let (out_writer, mut out_reader) = tokio::io::duplex(64 * 1024);
        let transport = StdioTransport::with_io(std::io::Cursor::new(input.as_bytes().to_vec()), out_writer);
        transport
            .serve(Arc::new(dispatcher), CancellationToken::new())
            .await
            .unwrap();

        let mut output = String::new();
        out_reader.read_to_string(&mut output).await.unwrap();
        output
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    fn by_id(replies: &[Value], id: i64) -> &Value {
        replies.iter().find(|r| r["id"] == id).unwrap()
    }

    async fn upper_federation() -> Arc<Federation> {
        let federation = Arc::new(Federation::new());
        let upper: Arc<dyn ToolHandler> = Arc::new(|args: Arguments, _scope: CallScope| async move {
            Ok::<_, ToolError>(ToolCallResult::text(
                args.str("s").unwrap_or_default().to_uppercase(),
            ))
        });
        federation
            .register_tool(
                "upper",
                "",
                ParamTree::new().input(Param::string("s").required()),
                upper,
            )
            .await;
        federation
    }

    #[tokio::test]
    async fn session_is_remembered_across_calls() {
        let sessions = Arc::new(StatelessSessionManager::with_random_key(Duration::from_secs(60)));
        let dispatcher = Dispatcher::new(upper_federation().await).with_sessions(sessions);

        let input = [
            json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
            json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
            json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call",
                   "params": {"name": "upper", "arguments": {"s": "abc"}}}),
        ]
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");

        let replies = run(dispatcher, &input).await;
        assert_eq!(replies.len(), 2);
        assert!(by_id(&replies, 1)["result"]["protocolVersion"].is_string());
        assert_eq!(
            by_id(&replies, 2)["result"]["content"][0]["text"],
            "ABC"
        );
    }

    #[tokio::test]
    async fn null_and_reused_ids_are_not_tracked() {
        let in_flight: InFlight = Arc::new(Mutex::new(HashMap::new()));
        let first = CallScope::new();
        let second = CallScope::new();

        assert_eq!(track(&in_flight, &RequestId::Null, &first).await, None);
        assert!(in_flight.lock().await.is_empty());

        let id = RequestId::Number(7);
        assert_eq!(track(&in_flight, &id, &first).await, Some("7".to_owned()));
        assert_eq!(track(&in_flight, &id, &second).await, None);

        cancel_request(Some(&json!({"requestId": 7})), &in_flight).await;
        assert!(first.is_cancelled());
        assert!(!second.is_cancelled());
    }

    #[tokio::test]
    async fn requests_with_null_id_are_still_answered() {
        let dispatcher = Dispatcher::new(upper_federation().await);
        let input = [
            json!({"jsonrpc": "2.0", "id": null, "method": "ping"}),
            json!({"jsonrpc": "2.0", "id": 3, "method": "ping"}),
        ]
        .iter()
        .map(Value::to_string)
        .collect::<Vec<_>>()
        .join("\n");

        let replies = run(dispatcher, &input).await;
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().any(|r| r["id"] == Value::Null));
        assert_eq!(by_id(&replies, 3)["result"], json!({}));
    }

    #[tokio::test]
    async fn malformed_lines_get_parse_errors() {
        let dispatcher = Dispatcher::new(Arc::new(Federation::new()));
        let replies = run(dispatcher, "{not json\n\n").await;
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0]["error"]["code"], -32700);
        assert_eq!(replies[0]["id"], Value::Null);
    }
}
