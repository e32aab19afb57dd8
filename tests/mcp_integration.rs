//! Integration tests for MCP protocol handling.
//!
//! These tests verify the JSON-RPC 2.0 message parsing and the streamable
//! HTTP transport end to end: pre-envelope HTTP errors, session headers,
//! and the `upper` tool scenario.

use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use toolmesh::error::ToolError;
use toolmesh::mcp::federation::Federation;
use toolmesh::mcp::protocol::{parse_message, IncomingMessage, RequestId, HEADER_SESSION_ID};
use toolmesh::mcp::registry::{Arguments, CallScope, ToolCallResult, ToolHandler};
use toolmesh::mcp::schema::{Param, ParamTree};
use toolmesh::mcp::session::{InMemorySessionManager, SessionManager, StatelessSessionManager};
use toolmesh::mcp::transport::http;
use toolmesh::mcp::Dispatcher;

// =============================================================================
// Protocol Parsing Tests
// =============================================================================

#[test]
fn test_parse_initialize_request() {
    let json = r#"{
        "jsonrpc": "2.0",
        "id": 1,
        "method": "initialize",
        "params": {
            "protocolVersion": "2024-11-05",
            "capabilities": {},
            "clientInfo": {
                "name": "test-client",
                "version": "1.0.0"
            }
        }
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Request(req) = result.unwrap() {
        assert_eq!(req.method, "initialize");
        assert_eq!(req.id, RequestId::Number(1));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_string_id() {
    let json = r#"{"jsonrpc": "2.0", "id": "abc", "method": "tools/list", "params": {}}"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.method, "tools/list");
        assert_eq!(req.id, RequestId::String("abc".to_string()));
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_notification() {
    let json = r#"{
        "jsonrpc": "2.0",
        "method": "notifications/initialized"
    }"#;

    let result = parse_message(json);
    assert!(result.is_ok());

    if let IncomingMessage::Notification(notif) = result.unwrap() {
        assert_eq!(notif.method, "notifications/initialized");
    } else {
        panic!("Expected Notification");
    }
}

#[test]
fn test_idless_request_is_answered_with_null() {
    let json = r#"{"jsonrpc": "2.0", "method": "ping"}"#;

    if let IncomingMessage::Request(req) = parse_message(json).unwrap() {
        assert_eq!(req.id, RequestId::Null);
    } else {
        panic!("Expected Request");
    }
}

#[test]
fn test_parse_invalid_json() {
    let err = parse_message("not valid json").unwrap_err();
    assert_eq!(err.error.code, -32700);
    assert_eq!(err.id, RequestId::Null);
}

#[test]
fn test_parse_missing_jsonrpc_version() {
    let json = r#"{
        "id": 1,
        "method": "test"
    }"#;

    let err = parse_message(json).unwrap_err();
    assert_eq!(err.error.code, -32600);
    assert_eq!(err.id, RequestId::Number(1));
}

// =============================================================================
// HTTP Transport Tests
// =============================================================================

async fn upper_dispatcher(sessions: Option<Arc<dyn SessionManager>>) -> Arc<Dispatcher> {
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

    let mut dispatcher = Dispatcher::new(federation);
    if let Some(sessions) = sessions {
        dispatcher = dispatcher.with_sessions(sessions);
    }
    Arc::new(dispatcher)
}

async fn serve(dispatcher: Arc<Dispatcher>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = http::router(dispatcher, "/mcp");
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}/mcp")
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

async fn post(
    url: &str,
    body: &Value,
    session: Option<&str>,
) -> reqwest::Response {
    let mut request = client()
        .post(url)
        .header("accept", "application/json, text/event-stream")
        .json(body);
    if let Some(session) = session {
        request = request.header(HEADER_SESSION_ID, session);
    }
    request.send().await.unwrap()
}

#[tokio::test]
async fn test_upper_scenario_over_http() {
    let sessions: Arc<dyn SessionManager> =
        Arc::new(StatelessSessionManager::with_random_key(Duration::from_secs(300)));
    let url = serve(upper_dispatcher(Some(sessions)).await).await;

    let response = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize",
                "params": {"protocolVersion": "2025-06-18", "capabilities": {},
                           "clientInfo": {"name": "test", "version": "1"}}}),
        None,
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let session = response
        .headers()
        .get(HEADER_SESSION_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["result"]["protocolVersion"], "2025-06-18");
    assert!(body["result"].get("sessionId").is_none());

    let response = post(
        &url,
        &json!({"jsonrpc": "2.0", "method": "notifications/initialized"}),
        Some(&session),
    )
    .await;
    assert_eq!(response.status(), StatusCode::ACCEPTED);

    let body: Value = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "tools/list"}),
        Some(&session),
    )
    .await
    .json()
    .await
    .unwrap();
    let tools = body["result"]["tools"].as_array().unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0]["name"], "upper");

    let body: Value = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "upper", "arguments": {"s": "abc"}}}),
        Some(&session),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(
        body["result"]["content"],
        json!([{"type": "text", "text": "ABC"}])
    );
}

#[tokio::test]
async fn test_protocol_errors_are_http_200() {
    let sessions: Arc<dyn SessionManager> =
        Arc::new(StatelessSessionManager::with_random_key(Duration::from_secs(300)));
    let url = serve(upper_dispatcher(Some(sessions)).await).await;

    let response = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 9, "method": "tools/list"}),
        Some("forged.token"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32001);
    assert_eq!(body["id"], 9);

    let response = client()
        .post(&url)
        .header("content-type", "application/json")
        .body("{broken")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"]["code"], -32700);
    assert_eq!(body["id"], Value::Null);
}

#[tokio::test]
async fn test_pre_envelope_http_errors() {
    let url = serve(upper_dispatcher(None).await).await;
    let ping = json!({"jsonrpc": "2.0", "id": 1, "method": "ping"}).to_string();

    let response = client().get(&url).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);

    let response = client()
        .post(&url)
        .header("content-type", "text/plain")
        .body(ping.clone())
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);

    let response = client()
        .post(&url)
        .header("content-type", "application/json")
        .header("accept", "text/html")
        .body(ping)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_ACCEPTABLE);
}

#[tokio::test]
async fn test_delete_ends_memory_session() {
    let sessions = Arc::new(InMemorySessionManager::new());
    let url = serve(upper_dispatcher(Some(Arc::clone(&sessions) as Arc<dyn SessionManager>)).await).await;

    let response = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 1, "method": "initialize", "params": {}}),
        None,
    )
    .await;
    let session = response
        .headers()
        .get(HEADER_SESSION_ID)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert_eq!(sessions.len().await, 1);

    let response = client()
        .delete(&url)
        .header(HEADER_SESSION_ID, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(sessions.is_empty().await);

    let body: Value = post(
        &url,
        &json!({"jsonrpc": "2.0", "id": 2, "method": "ping"}),
        Some(&session),
    )
    .await
    .json()
    .await
    .unwrap();
    assert_eq!(body["error"]["code"], -32001);

    let response = client()
        .delete(&url)
        .header(HEADER_SESSION_ID, &session)
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
