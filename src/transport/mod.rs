//! Transport module - framed byte-stream abstraction.
//!
//! The core never talks to a WebSocket directly: it sees a bidirectional
//! stream of complete frames, one frame per message. The default
//! implementation adapts an axum WebSocket ([`ws::WsSocket`]); tests drive
//! the server through an in-memory channel pair.

mod ws;

pub use ws::WsSocket;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

/// Transport failure observed by the read loop or a writer.
#[derive(Debug, Error)]
pub enum SocketError {
    /// The peer closed the connection (or the stream ended cleanly).
    #[error("connection closed")]
    Closed,

    /// The transport failed abnormally.
    #[error("transport failure: {0}")]
    Failed(String),
}

/// Read half of a framed socket. Reads are serial by nature: there is
/// exactly one read loop per connection.
#[async_trait]
pub trait SocketReader: Send + 'static {
    /// Await the next complete inbound frame.
    async fn read_frame(&mut self) -> Result<Bytes, SocketError>;
}

/// Write half of a framed socket.
///
/// Implementations need not be safe for concurrent writes; the owning client
/// agent serializes all outbound sends behind its write lock.
#[async_trait]
pub trait SocketWriter: Send + 'static {
    /// Write one complete frame.
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), SocketError>;

    /// Close the connection. Best effort; errors are ignored.
    async fn close(&mut self);
}

/// A connected framed socket, splittable into independent halves.
pub trait Socket: Send + 'static {
    /// Read half type.
    type Reader: SocketReader;
    /// Write half type.
    type Writer: SocketWriter;

    /// Split into read and write halves.
    fn split(self) -> (Self::Reader, Self::Writer);
}
