//! Server module - connection lifecycle, dispatch, HTTP surface, shutdown.
//!
//! The [`Server`] owns the client roster, the session registry, and the
//! shutdown coordinator. Each upgraded connection runs its own read loop;
//! each inbound signal or request runs in its own task.

mod dispatch;
mod http;
mod shutdown;

pub use http::PROTOCOL_VERSION;

use std::sync::Arc;

use axum::Router;
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::Semaphore;
use tracing::{debug, error, warn};

use crate::client::Client;
use crate::error::Result;
use crate::handler::ServerImplementation;
use crate::message::Message;
use crate::session::{
    FileSessionManager, RandomKeyGenerator, SessionContext, SessionKeyGenerator, SessionManager,
    SessionRegistry,
};
use crate::transport::{Socket, SocketError, SocketReader, SocketWriter};

use shutdown::ShutdownCoordinator;

/// Server configuration. All options are optional; the implementation is
/// passed separately to [`Server::new`].
#[derive(Default)]
pub struct ServerOptions {
    /// Gates all session operations. When `false`, session creation,
    /// restoration and closure all fail with a sessions-disabled error.
    pub sessions_enabled: bool,
    /// Cap on concurrent connections per session; 0 means unlimited.
    pub max_session_connections: usize,
    /// Bound on concurrently running signal/request handlers across all
    /// connections; 0 means unlimited. Excess messages queue, none are
    /// dropped.
    pub max_concurrent_handlers: usize,
    /// Pluggable session persistence. Defaults to a [`FileSessionManager`]
    /// writing one `.wwrsess` file per session into the working directory.
    pub session_manager: Option<Arc<dyn SessionManager>>,
    /// Pluggable session key minter. Defaults to a random printable key.
    pub session_key_generator: Option<Arc<dyn SessionKeyGenerator>>,
}

pub(crate) struct ServerInner {
    pub(crate) implementation: Arc<dyn ServerImplementation>,
    pub(crate) sessions: Arc<SessionContext>,
    pub(crate) clients: Mutex<Vec<Arc<Client>>>,
    pub(crate) shutdown: ShutdownCoordinator,
    pub(crate) handler_slots: Option<Arc<Semaphore>>,
}

/// A WebWire server instance.
///
/// Cheap to clone; all clones share the same state.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    /// Create a new server around the given implementation.
    pub fn new(implementation: impl ServerImplementation + 'static, options: ServerOptions) -> Self {
        let sessions = Arc::new(SessionContext {
            enabled: options.sessions_enabled,
            registry: SessionRegistry::new(options.max_session_connections),
            manager: options
                .session_manager
                .unwrap_or_else(|| Arc::new(FileSessionManager::default())),
            key_generator: options
                .session_key_generator
                .unwrap_or_else(|| Arc::new(RandomKeyGenerator)),
        });
        Self {
            inner: Arc::new(ServerInner {
                implementation: Arc::new(implementation),
                sessions,
                clients: Mutex::new(Vec::new()),
                shutdown: ShutdownCoordinator::new(),
                handler_slots: match options.max_concurrent_handlers {
                    0 => None,
                    bound => Some(Arc::new(Semaphore::new(bound))),
                },
            }),
        }
    }

    /// The axum router exposing the single upgrade endpoint: 503 during
    /// shutdown, `OPTIONS` delegated to the implementation, the `WEBWIRE`
    /// metadata method, and the WebSocket upgrade for everything else.
    pub fn router(&self) -> Router {
        http::router(self.inner.clone())
    }

    /// Bind-and-serve convenience over [`Server::router`].
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        axum::serve(listener, self.router()).await?;
        Ok(())
    }

    /// Attach an already established framed socket as a client connection
    /// and run its read loop to completion. This is the seam between the
    /// transport and the core; the HTTP endpoint calls it after a
    /// successful upgrade.
    pub async fn serve_socket<S: Socket>(&self, socket: S, user_agent: impl Into<String>) {
        self.inner
            .clone()
            .serve_socket(socket, user_agent.into())
            .await;
    }

    /// Appoint a graceful shutdown and block until all in-flight signal and
    /// request handlers return. New connections are refused with 503,
    /// incoming requests are rejected with a shutdown reply, incoming
    /// signals are ignored.
    pub async fn shutdown(&self) {
        self.inner.shutdown.shutdown().await;
    }

    /// The session registry (active session and connection accounting).
    pub fn session_registry(&self) -> &SessionRegistry {
        &self.inner.sessions.registry
    }

    /// Number of currently connected clients.
    pub fn client_count(&self) -> usize {
        self.inner.clients.lock().len()
    }
}

impl ServerInner {
    async fn serve_socket<S: Socket>(self: Arc<Self>, socket: S, user_agent: String) {
        let (mut reader, writer) = socket.split();
        let writer: Box<dyn SocketWriter> = Box::new(writer);
        let client = Client::new(self.sessions.clone(), writer, user_agent);

        self.clients.lock().push(client.clone());
        self.implementation.on_client_connected(client.clone()).await;

        loop {
            let frame = match reader.read_frame().await {
                Ok(frame) => frame,
                Err(SocketError::Closed) => {
                    debug!("connection closed by peer");
                    break;
                }
                Err(SocketError::Failed(err)) => {
                    warn!("abnormal closure: {err}");
                    break;
                }
            };

            let message = match Message::parse(frame) {
                Ok(message) => message,
                Err(err) => {
                    // Protocol fault: close the connection.
                    error!("failed parsing message: {err}");
                    break;
                }
            };

            if let Err(err) = self.dispatch(&client, message).await {
                error!("critical failure: {err}");
                break;
            }
        }

        self.drop_client(&client).await;
    }

    /// Tear a dead connection down: deregister its session, unlink it from
    /// the roster, and fire the disconnect hook.
    async fn drop_client(&self, client: &Arc<Client>) {
        if let Some(key) = client.session_key() {
            self.sessions.registry.deregister(&key, client);
        }
        client.unlink().await;
        self.clients.lock().retain(|held| !Arc::ptr_eq(held, client));
        self.implementation
            .on_client_disconnected(client.clone())
            .await;
    }
}
