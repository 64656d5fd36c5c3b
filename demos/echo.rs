//! Echo server - simple request/reply example.
//!
//! This example demonstrates:
//! - Implementing `ServerImplementation` for an application
//! - Serving the upgrade endpoint over a TCP listener
//! - Replying to requests and pushing a server-side signal
//!
//! Probe the endpoint metadata with:
//!
//! ```text
//! curl -X WEBWIRE http://127.0.0.1:8081/
//! ```

use std::sync::Arc;

use webwire::{
    Client, HandlerError, Message, Payload, Server, ServerImplementation, ServerOptions,
};

struct EchoServer;

#[async_trait::async_trait]
impl ServerImplementation for EchoServer {
    async fn on_client_connected(&self, client: Arc<Client>) {
        // Greet every connecting peer with a server-side signal.
        let _ = client
            .signal("greeting", Payload::utf8(&b"welcome"[..]))
            .await;
    }

    async fn on_request(
        &self,
        _client: Arc<Client>,
        message: Message,
    ) -> Result<Payload, HandlerError> {
        // Echo the request payload back as the reply.
        Ok(message.payload().clone())
    }
}

#[tokio::main]
async fn main() -> webwire::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let server = Server::new(
        EchoServer,
        ServerOptions {
            sessions_enabled: true,
            ..ServerOptions::default()
        },
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8081").await?;
    tracing::info!("webwire echo server listening on 127.0.0.1:8081");
    server.serve(listener).await
}
