//! Embedder-facing callback bundle.
//!
//! A [`ServerImplementation`] is the application behind a server: it decides
//! upgrades, observes connection lifecycle, and handles signals and
//! requests. Request handlers run concurrently, each in its own task; replies
//! are correlated by identifier, so ordering between concurrent handlers is
//! not guaranteed.

use std::sync::Arc;

use async_trait::async_trait;
use axum::http::request::Parts;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::client::Client;
use crate::error::HandlerError;
use crate::message::Message;
use crate::payload::Payload;

/// Callback bundle supplied by the embedder.
///
/// Only [`on_request`](Self::on_request) is mandatory; every other hook has
/// a neutral default.
#[async_trait]
pub trait ServerImplementation: Send + Sync {
    /// Answer a CORS preflight (`OPTIONS <any path>`). Defaults to an empty
    /// 200 response.
    async fn on_options(&self, request: Parts) -> Response {
        let _ = request;
        StatusCode::OK.into_response()
    }

    /// Inspect an incoming connection before the WebSocket upgrade.
    /// Returning `false` refuses the connection with 403.
    fn before_upgrade(&self, request: &Parts) -> bool {
        let _ = request;
        true
    }

    /// A connection was upgraded and the agent joined the roster.
    async fn on_client_connected(&self, client: Arc<Client>) {
        let _ = client;
    }

    /// The agent's transport died and it left the roster.
    async fn on_client_disconnected(&self, client: Arc<Client>) {
        let _ = client;
    }

    /// A fire-and-forget signal arrived. No reply is possible.
    async fn on_signal(&self, client: Arc<Client>, message: Message) {
        let _ = (client, message);
    }

    /// A correlated request arrived. The returned payload is sent as the
    /// success reply; a [`HandlerError::Request`] is encoded as a
    /// peer-visible error reply, while any [`HandlerError::Internal`] is
    /// logged server-side and answered with an anonymous internal-error
    /// reply so embedder diagnostics never leak to the peer.
    async fn on_request(
        &self,
        client: Arc<Client>,
        message: Message,
    ) -> Result<Payload, HandlerError>;
}
