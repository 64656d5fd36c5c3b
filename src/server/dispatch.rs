//! Message dispatch.
//!
//! Routes parsed inbound messages by tag: signals and requests run in their
//! own task (optionally bounded by the handler semaphore) and pair an
//! ops-counter increment with a decrement; session restoration and closure
//! are handled by the server itself on the connection's read loop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, warn};

use super::ServerInner;
use crate::client::Client;
use crate::error::{Error, RequestError, Result};
use crate::message::{build, Message, MessageId, MessageType};
use crate::payload::Payload;

/// How a request is failed on the wire.
#[derive(Debug)]
pub(crate) enum Failure {
    /// Peer-visible error reply with code and message.
    Request(RequestError),
    /// Anonymous internal-error reply; details stay server-side.
    Internal,
    /// The request arrived during shutdown.
    Shutdown,
    /// Session restoration failed: unknown key.
    SessionNotFound,
    /// Session operations are disabled.
    SessionsDisabled,
    /// The per-session connection cap was reached.
    MaxSessConnsReached,
}

/// One-shot reply slot for an in-flight request.
///
/// `fulfill` and `fail` share a single completion bit: the first to fire
/// encodes and enqueues the reply on the originating agent, a second
/// invocation is a bug in the library and panics.
pub(crate) struct PendingReply {
    client: Arc<Client>,
    id: MessageId,
    completed: AtomicBool,
}

impl PendingReply {
    pub(crate) fn new(client: Arc<Client>, id: MessageId) -> Self {
        Self {
            client,
            id,
            completed: AtomicBool::new(false),
        }
    }

    fn complete_once(&self) {
        assert!(
            !self.completed.swap(true, Ordering::AcqRel),
            "request {:?} was already replied to",
            self.id
        );
    }

    /// Send the success reply, correlated to the request.
    pub(crate) async fn fulfill(&self, payload: Payload) -> Result<()> {
        self.complete_once();
        self.client.send(build::reply_message(self.id, &payload)).await
    }

    /// Send a failure reply, correlated to the request.
    pub(crate) async fn fail(&self, failure: Failure) -> Result<()> {
        self.complete_once();
        let frame = match failure {
            Failure::Request(err) => build::error_reply_message(self.id, &err.code, &err.message),
            Failure::Internal => {
                build::special_reply_message(MessageType::InternalError, self.id)
            }
            Failure::Shutdown => {
                build::special_reply_message(MessageType::ReplyShutdown, self.id)
            }
            Failure::SessionNotFound => {
                build::special_reply_message(MessageType::SessionNotFound, self.id)
            }
            Failure::SessionsDisabled => {
                build::special_reply_message(MessageType::SessionsDisabled, self.id)
            }
            Failure::MaxSessConnsReached => {
                build::special_reply_message(MessageType::MaxSessConnsReached, self.id)
            }
        };
        self.client.send(frame).await
    }
}

impl ServerInner {
    /// Route one parsed message. An `Err` is a critical failure: the caller
    /// logs it and tears the connection down.
    pub(crate) async fn dispatch(
        self: &Arc<Self>,
        client: &Arc<Client>,
        message: Message,
    ) -> Result<()> {
        let message_type = message.message_type();
        if message_type.is_signal() || message_type.is_request() {
            self.spawn_handler(client, message);
            return Ok(());
        }
        match message_type {
            MessageType::RestoreSession => self.handle_session_restore(client, message).await,
            MessageType::CloseSession => self.handle_session_closure(client, message).await,
            other => {
                warn!("ignoring unexpected {} from peer", other.name());
                Ok(())
            }
        }
    }

    /// Run a signal or request handler in its own task so that many
    /// messages from the same agent may be processed in parallel. With a
    /// concurrency bound configured, excess handlers queue on the semaphore
    /// and are never dropped.
    fn spawn_handler(self: &Arc<Self>, client: &Arc<Client>, message: Message) {
        let inner = self.clone();
        let client = client.clone();
        tokio::spawn(async move {
            let _permit = match &inner.handler_slots {
                Some(slots) => match slots.clone().acquire_owned().await {
                    Ok(permit) => Some(permit),
                    // The semaphore is never closed while the server lives.
                    Err(_) => return,
                },
                None => None,
            };
            if message.message_type().is_signal() {
                inner.handle_signal(client, message).await;
            } else {
                inner.handle_request(client, message).await;
            }
        });
    }

    async fn handle_signal(&self, client: Arc<Client>, message: Message) {
        // Signals arriving during shutdown are dropped silently.
        if !self.shutdown.begin_op() {
            return;
        }
        self.implementation.on_signal(client, message).await;
        self.shutdown.end_op();
    }

    async fn handle_request(&self, client: Arc<Client>, message: Message) {
        let reply = PendingReply::new(client.clone(), message.id());
        if !self.shutdown.begin_op() {
            if let Err(err) = reply.fail(Failure::Shutdown).await {
                debug!("shutdown reply not delivered: {err}");
            }
            return;
        }

        let outcome = match self.implementation.on_request(client, message).await {
            Ok(payload) => reply.fulfill(payload).await,
            Err(crate::error::HandlerError::Request(err)) => {
                reply.fail(Failure::Request(err)).await
            }
            Err(crate::error::HandlerError::Internal(err)) => {
                error!("internal error during request handling: {err}");
                reply.fail(Failure::Internal).await
            }
        };
        if let Err(err) = outcome {
            debug!("reply not delivered: {err}");
        }

        self.shutdown.end_op();
    }

    /// Handle a session restoration request (peer → server).
    async fn handle_session_restore(
        self: &Arc<Self>,
        client: &Arc<Client>,
        message: Message,
    ) -> Result<()> {
        let reply = PendingReply::new(client.clone(), message.id());
        if !self.sessions.enabled {
            return self.noncritical(reply.fail(Failure::SessionsDisabled).await);
        }

        let key = String::from_utf8_lossy(&message.payload().data).into_owned();

        // Advisory pre-check; the registry's own mutex is the tie-break for
        // racing restorations.
        let max_conns = self.sessions.registry.max_conns();
        if max_conns > 0 && self.sessions.registry.session_connections(&key) + 1 > max_conns {
            return self.noncritical(reply.fail(Failure::MaxSessConnsReached).await);
        }

        let session = match self.sessions.manager.on_session_lookup(&key).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                return self.noncritical(reply.fail(Failure::SessionNotFound).await);
            }
            Err(err) => {
                // Hide the lookup failure from the peer.
                let _ = reply.fail(Failure::Internal).await;
                return Err(Error::SessionManager(format!(
                    "session lookup failed: {err}"
                )));
            }
        };

        let encoded = match serde_json::to_vec(&session) {
            Ok(encoded) => encoded,
            Err(err) => {
                let _ = reply.fail(Failure::Internal).await;
                return Err(err.into());
            }
        };

        // Replacing an existing session must not leave a stale registry
        // entry behind.
        if let Some(old_key) = client.session_key() {
            self.sessions.registry.deregister(&old_key, client);
        }
        let session = Arc::new(session);
        client.set_session(Some(session.clone()));
        if !self.sessions.registry.register(&session.key, client.clone()) {
            client.set_session(None);
            return self.noncritical(reply.fail(Failure::MaxSessConnsReached).await);
        }

        self.noncritical(reply.fulfill(Payload::utf8(encoded)).await)
    }

    /// Handle a session destruction request (peer → server).
    async fn handle_session_closure(
        self: &Arc<Self>,
        client: &Arc<Client>,
        message: Message,
    ) -> Result<()> {
        let reply = PendingReply::new(client.clone(), message.id());
        if !self.sessions.enabled {
            return self.noncritical(reply.fail(Failure::SessionsDisabled).await);
        }
        if !client.has_session() {
            // Confirm even though no session was closed.
            return self.noncritical(reply.fulfill(Payload::default()).await);
        }

        match client.close_session().await {
            Ok(()) => self.noncritical(reply.fulfill(Payload::default()).await),
            Err(err) => {
                // The peer could not be notified about the destruction.
                let _ = reply.fail(Failure::Internal).await;
                Err(err)
            }
        }
    }

    /// A failed reply delivery to a dying connection is not critical; the
    /// read loop will observe the disconnect on its own.
    fn noncritical(&self, outcome: Result<()>) -> Result<()> {
        if let Err(err) = outcome {
            debug!("reply not delivered: {err}");
        }
        Ok(())
    }
}
