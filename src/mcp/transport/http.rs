//! Streamable HTTP transport.
//!
//! `POST <path>` carries one JSON-RPC message and answers with one JSON
//! body. Problems found before the envelope is read are plain HTTP errors:
//!
//! | Condition                                      | Status |
//! |------------------------------------------------|--------|
//! | Method other than `POST`/`DELETE`              | 405    |
//! | `Content-Type` is not `application/json`       | 415    |
//! | `Accept` admits neither JSON nor event streams | 406    |
//!
//! Everything after that is a 200 with a JSON-RPC body, or 202 for a
//! notification. `DELETE <path>` ends the session named by the session
//! header.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::header::{ACCEPT, CONTENT_TYPE};
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::error::SessionError;
use crate::mcp::dispatcher::{CallContext, Dispatcher};
use crate::mcp::protocol::{HEADER_PROTOCOL_VERSION, HEADER_SESSION_ID};
use crate::mcp::registry::CallScope;

/// Default route for the protocol endpoint.
pub const DEFAULT_HTTP_PATH: &str = "/mcp";

/// Cancels the call's scope when the request future is dropped, which is
/// what happens when the client disconnects mid-call.
struct CancelOnDrop(CallScope);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}

/// Builds the router serving the protocol at `path`.
pub fn router(dispatcher: Arc<Dispatcher>, path: &str) -> Router {
    Router::new()
        .route(path, post(handle_post).delete(handle_delete))
        .layer(TraceLayer::new_for_http())
        .with_state(dispatcher)
}

/// Serves `router` on `listener` until `shutdown` fires.
///
/// # Errors
///
/// Returns an error if the server fails.
pub async fn serve(
    listener: TcpListener,
    dispatcher: Arc<Dispatcher>,
    path: &str,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let addr: Option<SocketAddr> = listener.local_addr().ok();
    info!(addr = ?addr, path, "HTTP transport listening");
    axum::serve(listener, router(dispatcher, path))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("HTTP transport stopped");
    Ok(())
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Pre-envelope checks on content declaration and accepted media types.
fn check_headers(headers: &HeaderMap) -> Result<(), StatusCode> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let media = content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();
    if media != "application/json" {
        return Err(StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    if let Some(accept) = headers.get(ACCEPT).and_then(|v| v.to_str().ok()) {
        let acceptable = accept.split(',').any(|item| {
            let media = item.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
            matches!(
                media.as_str(),
                "application/json" | "text/event-stream" | "application/*" | "text/*" | "*/*"
            )
        });
        if !acceptable {
            return Err(StatusCode::NOT_ACCEPTABLE);
        }
    }

    Ok(())
}

async fn handle_post(
    State(dispatcher): State<Arc<Dispatcher>>,
    headers: HeaderMap,
    body: String,
) -> Response {
    if let Err(status) = check_headers(&headers) {
        return status.into_response();
    }

    let ctx = CallContext {
        protocol_version: header_str(&headers, HEADER_PROTOCOL_VERSION),
        session_id: header_str(&headers, HEADER_SESSION_ID),
    };
    let scope = CallScope::new();
    let _guard = CancelOnDrop(scope.clone());

    let outcome = dispatcher.handle_raw(&body, &ctx, scope).await;

    let Some(message) = outcome.response else {
        return StatusCode::ACCEPTED.into_response();
    };

    let mut response = (StatusCode::OK, Json(message)).into_response();
    if let Some(session_id) = outcome.session_id {
        match HeaderValue::from_str(&session_id) {
            Ok(value) => {
                response
                    .headers_mut()
                    .insert(HeaderName::from_static(HEADER_SESSION_ID), value);
            }
            Err(e) => warn!(error = %e, "Session id is not a valid header value"),
        }
    }
    response
}

async fn handle_delete(State(dispatcher): State<Arc<Dispatcher>>, headers: HeaderMap) -> StatusCode {
    let Some(session_id) = header_str(&headers, HEADER_SESSION_ID) else {
        return StatusCode::BAD_REQUEST;
    };
    match dispatcher.end_session(&session_id).await {
        Ok(()) => StatusCode::NO_CONTENT,
        Err(SessionError::Unknown) => StatusCode::NOT_FOUND,
        Err(e) => {
            warn!(error = %e, "Failed to end session");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}
