//! HTTP surface: the single upgrade endpoint.
//!
//! Every request, regardless of method and path, lands in [`endpoint`]:
//! during shutdown it answers 503, `OPTIONS` is delegated to the embedder
//! (CORS preflight), the custom `WEBWIRE` method answers the protocol
//! metadata, and anything else attempts the WebSocket upgrade.

use std::sync::Arc;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{FromRequestParts, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use serde_json::json;
use tracing::error;

use super::ServerInner;
use crate::transport::WsSocket;

/// Version of the wire protocol spoken by this server.
pub const PROTOCOL_VERSION: &str = "1.2";

pub(crate) fn router(inner: Arc<ServerInner>) -> Router {
    Router::new().fallback(endpoint).with_state(inner)
}

async fn endpoint(State(inner): State<Arc<ServerInner>>, request: Request) -> Response {
    // Pretend the server is temporarily unavailable during shutdown.
    if inner.shutdown.is_shutdown() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Server shutting down").into_response();
    }

    match request.method().as_str() {
        "OPTIONS" => {
            let (parts, _) = request.into_parts();
            inner.implementation.on_options(parts).await
        }
        "WEBWIRE" => metadata_response(),
        _ => upgrade(inner, request).await,
    }
}

/// `WEBWIRE <any path>`: protocol metadata for endpoint discovery.
fn metadata_response() -> Response {
    (
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
        ],
        json!({ "protocol-version": PROTOCOL_VERSION }).to_string(),
    )
        .into_response()
}

async fn upgrade(inner: Arc<ServerInner>, request: Request) -> Response {
    let (mut parts, _body) = request.into_parts();

    if !inner.implementation.before_upgrade(&parts) {
        return StatusCode::FORBIDDEN.into_response();
    }

    let user_agent = parts
        .headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_owned();

    match WebSocketUpgrade::from_request_parts(&mut parts, &()).await {
        Ok(ws) => ws.on_upgrade(move |socket| async move {
            inner.serve_socket(WsSocket::new(socket), user_agent).await;
        }),
        Err(rejection) => {
            error!("connection upgrade failed: {rejection}");
            rejection.into_response()
        }
    }
}
