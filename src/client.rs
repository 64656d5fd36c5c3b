//! Connected client agent.
//!
//! A [`Client`] is the server-side representation of one connected peer. It
//! is created on a successful upgrade and lives until the transport read
//! loop observes an error, at which point it is unlinked from the client
//! roster and the session registry.
//!
//! Outbound sends are serialized by the agent's write lock; the underlying
//! transport is not assumed to be safe for concurrent writes. This lock is
//! also what guarantees per-agent ordering of replies and signals.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::error::{Error, Result};
use crate::message::build;
use crate::payload::Payload;
use crate::session::{Session, SessionContext};
use crate::transport::SocketWriter;

/// A connected client agent.
pub struct Client {
    user_agent: String,
    connected: AtomicBool,
    disconnect: CancellationToken,
    /// Session pointer, shared with the registry.
    session: parking_lot::Mutex<Option<Arc<Session>>>,
    /// Write-serialization lock over the transport's write half.
    writer: tokio::sync::Mutex<Box<dyn SocketWriter>>,
    sessions: Arc<SessionContext>,
}

impl Client {
    pub(crate) fn new(
        sessions: Arc<SessionContext>,
        writer: Box<dyn SocketWriter>,
        user_agent: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            user_agent,
            connected: AtomicBool::new(true),
            disconnect: CancellationToken::new(),
            session: parking_lot::Mutex::new(None),
            writer: tokio::sync::Mutex::new(writer),
            sessions,
        })
    }

    /// The User-Agent header the peer connected with.
    #[inline]
    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }

    /// Whether the agent is still connected.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Token cancelled when the underlying connection dies. Long-running
    /// handlers are expected to observe it; the server never interrupts
    /// blocked calls itself.
    pub fn disconnected(&self) -> CancellationToken {
        self.disconnect.clone()
    }

    /// Send a named signal to the peer (fire-and-forget).
    ///
    /// Fails only if the agent is disconnected.
    pub async fn signal(&self, name: &str, payload: Payload) -> Result<()> {
        self.send(build::signal_message(name, &payload)).await
    }

    /// Create a new session and attach it to this agent.
    ///
    /// Composes: key generation, attachment, registry insertion, persistence
    /// through the session manager, and a `SessionCreated` notification to
    /// the peer carrying the JSON-encoded session. A persistence failure
    /// rolls the attachment and registration back.
    pub async fn create_session(self: &Arc<Self>, info: Option<Value>) -> Result<()> {
        if !self.sessions.enabled {
            return Err(Error::SessionsDisabled);
        }
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }

        let key = self.sessions.key_generator.generate();
        let session = Arc::new(Session::new(key, info));
        let encoded = serde_json::to_vec(&*session)?;

        {
            let mut slot = self.session.lock();
            if slot.is_some() {
                return Err(Error::SessionActive);
            }
            *slot = Some(session.clone());
        }
        if !self.sessions.registry.register(&session.key, self.clone()) {
            self.session.lock().take();
            return Err(Error::MaxSessConnsReached);
        }

        if let Err(err) = self.sessions.manager.on_session_created(self).await {
            self.sessions.registry.deregister(&session.key, self);
            self.session.lock().take();
            return Err(err);
        }

        // Synchronize the new session to the peer. The session is persisted
        // at this point; if the peer is already gone the disconnect cleanup
        // deregisters it and the stored session stays restorable.
        self.send(build::session_created_message(&encoded)).await
    }

    /// Close the currently active session: deregister it, discard it through
    /// the session manager, notify the peer, and clear the agent's session
    /// pointer. A no-op if no session is active.
    pub async fn close_session(self: &Arc<Self>) -> Result<()> {
        if !self.sessions.enabled {
            return Err(Error::SessionsDisabled);
        }
        let Some(session) = self.session.lock().clone() else {
            return Ok(());
        };

        self.sessions.registry.deregister(&session.key, self);
        if let Err(err) = self.sessions.manager.on_session_closed(self).await {
            error!("session closure hook failed: {err}");
        }

        // Synchronize the destruction to the peer before resetting the
        // agent, so the manager hook above still saw the session.
        self.send(build::session_closed_message()).await?;
        self.session.lock().take();
        Ok(())
    }

    /// Whether a session is currently attached.
    pub fn has_session(&self) -> bool {
        self.session.lock().is_some()
    }

    /// The currently attached session.
    pub fn session(&self) -> Option<Arc<Session>> {
        self.session.lock().clone()
    }

    /// Key of the currently attached session.
    pub fn session_key(&self) -> Option<String> {
        self.session.lock().as_ref().map(|s| s.key.clone())
    }

    /// Creation time of the currently attached session.
    pub fn session_creation(&self) -> Option<DateTime<Utc>> {
        self.session.lock().as_ref().map(|s| s.creation)
    }

    /// Field of the attached session's info attachment, by name.
    pub fn session_info(&self, field: &str) -> Option<Value> {
        self.session.lock().as_ref()?.info_field(field)
    }

    /// Serialized outbound send of one encoded frame.
    pub(crate) async fn send(&self, frame: Bytes) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Disconnected);
        }
        let mut writer = self.writer.lock().await;
        writer
            .write_frame(frame)
            .await
            .map_err(|_| Error::Disconnected)
    }

    pub(crate) fn set_session(&self, session: Option<Arc<Session>>) {
        *self.session.lock() = session;
    }

    /// Mark the agent disconnected, clear its session pointer, cancel the
    /// disconnect token and close the transport. The caller deregisters the
    /// session from the registry first (it needs the key).
    pub(crate) async fn unlink(&self) {
        self.connected.store(false, Ordering::Release);
        self.session.lock().take();
        self.disconnect.cancel();
        self.writer.lock().await.close().await;
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("user_agent", &self.user_agent)
            .field("connected", &self.is_connected())
            .field("session_key", &self.session_key())
            .finish()
    }
}
