//! # webwire
//!
//! Duplex asynchronous messaging over WebSocket: correlated request/reply,
//! fire-and-forget signals in both directions, and authenticated sessions
//! synchronized between peer and host.
//!
//! ## Architecture
//!
//! - **Wire codec**: compact binary framing, one message per WebSocket frame
//! - **Client agents**: per-connection read loop and serialized writes
//! - **Dispatcher**: spawns one handler task per signal/request
//! - **Session registry**: session key → connected agents, with a
//!   per-session connection cap
//! - **Graceful shutdown**: in-flight operation draining
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use webwire::{
//!     Client, HandlerError, Message, Payload, Server, ServerImplementation, ServerOptions,
//! };
//!
//! struct Echo;
//!
//! #[async_trait::async_trait]
//! impl ServerImplementation for Echo {
//!     async fn on_request(
//!         &self,
//!         _client: Arc<Client>,
//!         message: Message,
//!     ) -> Result<Payload, HandlerError> {
//!         Ok(message.payload().clone())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> webwire::Result<()> {
//!     let server = Server::new(Echo, ServerOptions::default());
//!     let listener = tokio::net::TcpListener::bind("127.0.0.1:8081").await?;
//!     server.serve(listener).await
//! }
//! ```

pub mod error;
pub mod message;
pub mod session;
pub mod transport;

mod client;
mod handler;
mod payload;
mod server;

pub use client::Client;
pub use error::{Error, HandlerError, ParseError, RequestError, Result};
pub use handler::ServerImplementation;
pub use message::{Message, MessageId, MessageType};
pub use payload::{Payload, PayloadEncoding};
pub use server::{Server, ServerOptions, PROTOCOL_VERSION};
pub use session::{
    generate_session_key, FileSessionManager, RandomKeyGenerator, Session, SessionKeyGenerator,
    SessionManager, SessionRegistry,
};
