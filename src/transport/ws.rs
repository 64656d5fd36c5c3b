//! WebSocket adapter for the framed socket traits.
//!
//! Wraps an axum WebSocket after a successful upgrade. WebSocket messages
//! already arrive as complete frames, so no re-framing is needed: binary and
//! text messages map 1:1 to protocol frames, ping/pong are handled by the
//! stack and skipped here.

use async_trait::async_trait;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use bytes::Bytes;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};

use super::{Socket, SocketError, SocketReader, SocketWriter};

/// A framed socket backed by an axum WebSocket.
pub struct WsSocket {
    inner: WebSocket,
}

impl WsSocket {
    /// Wrap an upgraded WebSocket.
    pub fn new(socket: WebSocket) -> Self {
        Self { inner: socket }
    }
}

impl Socket for WsSocket {
    type Reader = WsReader;
    type Writer = WsWriter;

    fn split(self) -> (WsReader, WsWriter) {
        let (sink, stream) = self.inner.split();
        (WsReader { stream }, WsWriter { sink })
    }
}

/// Read half of a [`WsSocket`].
pub struct WsReader {
    stream: SplitStream<WebSocket>,
}

#[async_trait]
impl SocketReader for WsReader {
    async fn read_frame(&mut self) -> Result<Bytes, SocketError> {
        loop {
            match self.stream.next().await {
                Some(Ok(WsMessage::Binary(data))) => return Ok(data),
                Some(Ok(WsMessage::Text(text))) => return Ok(Bytes::from(text)),
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(_))) | None => return Err(SocketError::Closed),
                Some(Err(err)) => return Err(SocketError::Failed(err.to_string())),
            }
        }
    }
}

/// Write half of a [`WsSocket`].
pub struct WsWriter {
    sink: SplitSink<WebSocket, WsMessage>,
}

#[async_trait]
impl SocketWriter for WsWriter {
    async fn write_frame(&mut self, frame: Bytes) -> Result<(), SocketError> {
        self.sink
            .send(WsMessage::Binary(frame))
            .await
            .map_err(|err| SocketError::Failed(err.to_string()))
    }

    async fn close(&mut self) {
        let _ = self.sink.close().await;
    }
}
