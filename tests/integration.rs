//! Integration tests for webwire.
//!
//! These drive a full server through an in-memory framed socket (the same
//! seam the WebSocket adapter uses) and, for the HTTP surface, through a
//! real TCP listener.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::json;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{mpsc, Notify};

use webwire::message::{build, MessageId, NO_ID};
use webwire::transport::{Socket, SocketError, SocketReader, SocketWriter};
use webwire::{
    Client, HandlerError, Message, MessageType, Payload, PayloadEncoding, RequestError, Result,
    Server, ServerImplementation, ServerOptions, Session, SessionManager,
};

/// In-memory framed socket over a pair of channels.
struct ChanSocket {
    rx: mpsc::Receiver<Bytes>,
    tx: mpsc::Sender<Bytes>,
}

struct ChanReader(mpsc::Receiver<Bytes>);
struct ChanWriter(mpsc::Sender<Bytes>);

impl Socket for ChanSocket {
    type Reader = ChanReader;
    type Writer = ChanWriter;

    fn split(self) -> (ChanReader, ChanWriter) {
        (ChanReader(self.rx), ChanWriter(self.tx))
    }
}

#[async_trait]
impl SocketReader for ChanReader {
    async fn read_frame(&mut self) -> std::result::Result<Bytes, SocketError> {
        self.0.recv().await.ok_or(SocketError::Closed)
    }
}

#[async_trait]
impl SocketWriter for ChanWriter {
    async fn write_frame(&mut self, frame: Bytes) -> std::result::Result<(), SocketError> {
        self.0.send(frame).await.map_err(|_| SocketError::Closed)
    }

    async fn close(&mut self) {}
}

/// Test-side end of an in-memory connection.
struct TestPeer {
    to_server: mpsc::Sender<Bytes>,
    from_server: mpsc::Receiver<Bytes>,
}

static TRACING: std::sync::Once = std::sync::Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

impl TestPeer {
    /// Attach a new in-memory connection to the server.
    fn connect(server: &Server) -> Self {
        init_tracing();
        let (to_server, server_rx) = mpsc::channel(64);
        let (server_tx, from_server) = mpsc::channel(64);
        let socket = ChanSocket {
            rx: server_rx,
            tx: server_tx,
        };
        let server = server.clone();
        tokio::spawn(async move {
            server.serve_socket(socket, "integration-test").await;
        });
        Self {
            to_server,
            from_server,
        }
    }

    async fn send(&self, frame: Bytes) {
        self.to_server.send(frame).await.expect("server hung up");
    }

    /// Await and parse the next outbound frame from the server.
    async fn recv(&mut self) -> Message {
        let frame = tokio::time::timeout(Duration::from_secs(2), self.from_server.recv())
            .await
            .expect("timed out awaiting a server frame")
            .expect("server hung up");
        Message::parse(frame).expect("server sent an unparseable frame")
    }

    /// Assert that the server stays silent for the given duration. A closed
    /// connection also counts as silence.
    async fn expect_silence(&mut self, duration: Duration) {
        match tokio::time::timeout(duration, self.from_server.recv()).await {
            Ok(Some(frame)) => panic!("expected no server frame, got {frame:?}"),
            Ok(None) | Err(_) => {}
        }
    }

    /// Send a binary request and await the correlated response.
    async fn request(&mut self, id: MessageId, name: &str, payload: &[u8]) -> Message {
        self.send(build::request_message(id, name, &Payload::binary(payload.to_vec())))
            .await;
        let response = self.recv().await;
        assert_eq!(response.id(), id, "response correlation mismatch");
        response
    }
}

fn msg_id(n: u8) -> MessageId {
    [n; 8]
}

type RequestFn = dyn Fn(Arc<Client>, Message) -> Pin<Box<dyn Future<Output = std::result::Result<Payload, HandlerError>> + Send>>
    + Send
    + Sync;
type SignalFn = dyn Fn(Arc<Client>, Message) + Send + Sync;
type ConnectedFn = dyn Fn(Arc<Client>) + Send + Sync;

/// Closure-driven server implementation for tests.
#[derive(Default)]
struct TestImpl {
    request: Option<Box<RequestFn>>,
    signal: Option<Box<SignalFn>>,
    connected: Option<Box<ConnectedFn>>,
    disconnected: Option<mpsc::Sender<()>>,
}

impl TestImpl {
    fn echo() -> Self {
        Self::default().on_request(|_, message| async move { Ok(message.payload().clone()) })
    }

    fn on_request<F, Fut>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Client>, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<Payload, HandlerError>> + Send + 'static,
    {
        self.request = Some(Box::new(move |client, message| {
            Box::pin(handler(client, message))
        }));
        self
    }

    fn on_signal<F>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Client>, Message) + Send + Sync + 'static,
    {
        self.signal = Some(Box::new(handler));
        self
    }

    fn on_connected<F>(mut self, handler: F) -> Self
    where
        F: Fn(Arc<Client>) + Send + Sync + 'static,
    {
        self.connected = Some(Box::new(handler));
        self
    }

    fn notify_disconnected(mut self, tx: mpsc::Sender<()>) -> Self {
        self.disconnected = Some(tx);
        self
    }
}

#[async_trait]
impl ServerImplementation for TestImpl {
    async fn on_client_connected(&self, client: Arc<Client>) {
        if let Some(handler) = &self.connected {
            handler(client);
        }
    }

    async fn on_client_disconnected(&self, _client: Arc<Client>) {
        if let Some(tx) = &self.disconnected {
            let _ = tx.send(()).await;
        }
    }

    async fn on_signal(&self, client: Arc<Client>, message: Message) {
        if let Some(handler) = &self.signal {
            handler(client, message);
        }
    }

    async fn on_request(
        &self,
        client: Arc<Client>,
        message: Message,
    ) -> std::result::Result<Payload, HandlerError> {
        match &self.request {
            Some(handler) => handler(client, message).await,
            None => Ok(Payload::default()),
        }
    }
}

/// In-memory session manager for restoration tests.
#[derive(Default)]
struct MapManager {
    sessions: parking_lot::Mutex<HashMap<String, Session>>,
}

impl MapManager {
    fn with_session(session: Session) -> Arc<Self> {
        let manager = Self::default();
        manager
            .sessions
            .lock()
            .insert(session.key.clone(), session);
        Arc::new(manager)
    }
}

#[async_trait]
impl SessionManager for MapManager {
    async fn on_session_created(&self, client: &Arc<Client>) -> Result<()> {
        let session = client.session().expect("no session attached");
        self.sessions
            .lock()
            .insert(session.key.clone(), (*session).clone());
        Ok(())
    }

    async fn on_session_lookup(&self, key: &str) -> Result<Option<Session>> {
        Ok(self.sessions.lock().get(key).cloned())
    }

    async fn on_session_closed(&self, client: &Arc<Client>) -> Result<()> {
        if let Some(key) = client.session_key() {
            self.sessions.lock().remove(&key);
        }
        Ok(())
    }
}

fn session_options(manager: Arc<dyn SessionManager>, max_conns: usize) -> ServerOptions {
    ServerOptions {
        sessions_enabled: true,
        max_session_connections: max_conns,
        session_manager: Some(manager),
        ..ServerOptions::default()
    }
}

// ── Request/reply ────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_request_reply_correlation() {
    let server = Server::new(TestImpl::echo(), ServerOptions::default());
    let mut peer = TestPeer::connect(&server);

    let response = peer.request(msg_id(1), "echo", b"testdata").await;
    assert_eq!(response.message_type(), MessageType::ReplyBinary);
    assert_eq!(&response.payload().data[..], b"testdata");
}

#[tokio::test]
async fn test_reply_encoding_follows_handler_payload() {
    let server = Server::new(
        TestImpl::default().on_request(|_, _| async {
            Ok(Payload::utf16(Bytes::from_static(b"r\0a\0")))
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    let response = peer.request(msg_id(2), "q", b"").await;
    assert_eq!(response.message_type(), MessageType::ReplyUtf16);
    assert_eq!(response.payload().encoding, PayloadEncoding::Utf16);
    assert_eq!(&response.payload().data[..], b"r\0a\0");
}

#[tokio::test]
async fn test_request_error_reply_carries_code_and_message() {
    let server = Server::new(
        TestImpl::default().on_request(|_, _| async {
            Err(HandlerError::from(RequestError::new(
                "CUSTOM_ER",
                "sample error message",
            )))
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    let response = peer.request(msg_id(3), "q", b"x").await;
    assert_eq!(response.message_type(), MessageType::ErrorReply);
    assert_eq!(response.name(), "CUSTOM_ER");
    assert_eq!(&response.payload().data[..], b"sample error message");
}

#[tokio::test]
async fn test_internal_error_never_leaks_details() {
    let server = Server::new(
        TestImpl::default()
            .on_request(|_, _| async { Err(HandlerError::internal("secret database failure")) }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    let response = peer.request(msg_id(4), "q", b"x").await;
    assert_eq!(response.message_type(), MessageType::InternalError);
    assert!(response.payload().is_empty());
}

#[tokio::test]
async fn test_concurrent_requests_from_one_peer() {
    // Handlers run in parallel: the second request is answered while the
    // first one is still blocked.
    let release = Arc::new(Notify::new());
    let server = Server::new(
        TestImpl::default().on_request({
            let release = release.clone();
            move |_, message| {
                let release = release.clone();
                async move {
                    if message.name() == "slow" {
                        release.notified().await;
                    }
                    Ok(message.payload().clone())
                }
            }
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::request_message(
        msg_id(1),
        "slow",
        &Payload::binary(&b"first"[..]),
    ))
    .await;
    peer.send(build::request_message(
        msg_id(2),
        "fast",
        &Payload::binary(&b"second"[..]),
    ))
    .await;

    let first = peer.recv().await;
    assert_eq!(first.id(), msg_id(2), "fast request must finish first");

    release.notify_one();
    let second = peer.recv().await;
    assert_eq!(second.id(), msg_id(1));
    assert_eq!(&second.payload().data[..], b"first");
}

// ── Signals ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_signal_invokes_handler_without_reply() {
    let (tx, mut rx) = mpsc::channel(1);
    let server = Server::new(
        TestImpl::default().on_signal(move |_, message| {
            let _ = tx.try_send((message.name().to_owned(), message.payload().clone()));
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::signal_message(
        "tick",
        &Payload::utf8(&b"signal payload"[..]),
    ))
    .await;

    let (name, payload) = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(name, "tick");
    assert_eq!(&payload.data[..], b"signal payload");

    peer.expect_silence(Duration::from_millis(100)).await;
}

#[tokio::test]
async fn test_server_originated_signal() {
    let expected = b"webwire_test_SERVER_SIGNAL_payload";
    let server = Server::new(
        TestImpl::default().on_connected(|client| {
            let payload = Payload::binary(&b"webwire_test_SERVER_SIGNAL_payload"[..]);
            tokio::spawn(async move {
                client.signal("greeting", payload).await.unwrap();
            });
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    let signal = peer.recv().await;
    assert_eq!(signal.message_type(), MessageType::SignalBinary);
    assert_eq!(signal.id(), NO_ID);
    assert_eq!(signal.name(), "greeting");
    assert_eq!(&signal.payload().data[..], expected);
}

// ── Sessions ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_session_create_and_close_updates_registry() {
    let manager = Arc::new(MapManager::default());
    let server = Server::new(
        TestImpl::default().on_request(|client, message| async move {
            match message.name() {
                "logout" => {
                    client
                        .close_session()
                        .await
                        .map_err(HandlerError::internal)?;
                    Ok(Payload::default())
                }
                _ => {
                    client
                        .create_session(None)
                        .await
                        .map_err(HandlerError::internal)?;
                    let key = client.session_key().expect("session key after creation");
                    Ok(Payload::binary(key.into_bytes()))
                }
            }
        }),
        session_options(manager, 0),
    );
    let mut peer = TestPeer::connect(&server);

    // Login: the session creation notification precedes the reply.
    peer.send(build::request_message(
        msg_id(1),
        "login",
        &Payload::utf8(&b"credentials"[..]),
    ))
    .await;

    let notification = peer.recv().await;
    assert_eq!(notification.message_type(), MessageType::SessionCreated);
    let synced: Session = serde_json::from_slice(&notification.payload().data).unwrap();

    let reply = peer.recv().await;
    assert_eq!(reply.id(), msg_id(1));
    assert_eq!(&reply.payload().data[..], synced.key.as_bytes());

    assert_eq!(server.session_registry().active_sessions(), 1);
    assert_eq!(server.session_registry().session_connections(&synced.key), 1);

    // Logout: the closure notification precedes the reply.
    peer.send(build::request_message(
        msg_id(2),
        "logout",
        &Payload::default(),
    ))
    .await;

    let closed = peer.recv().await;
    assert_eq!(closed.message_type(), MessageType::SessionClosed);
    let reply = peer.recv().await;
    assert_eq!(reply.id(), msg_id(2));

    assert_eq!(server.session_registry().active_sessions(), 0);
}

#[tokio::test]
async fn test_custom_session_key_generator() {
    struct FixedKey;
    impl webwire::SessionKeyGenerator for FixedKey {
        fn generate(&self) -> String {
            "customkey123".to_owned()
        }
    }

    let server = Server::new(
        TestImpl::default().on_request(|client, _| async move {
            client
                .create_session(None)
                .await
                .map_err(HandlerError::internal)?;
            Ok(Payload::binary(
                client.session_key().expect("session key").into_bytes(),
            ))
        }),
        ServerOptions {
            sessions_enabled: true,
            session_manager: Some(Arc::new(MapManager::default())),
            session_key_generator: Some(Arc::new(FixedKey)),
            ..ServerOptions::default()
        },
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::request_message(
        msg_id(1),
        "login",
        &Payload::default(),
    ))
    .await;

    let notification = peer.recv().await;
    assert_eq!(notification.message_type(), MessageType::SessionCreated);
    let reply = peer.recv().await;
    assert_eq!(&reply.payload().data[..], b"customkey123");
}

#[tokio::test]
async fn test_session_restore_returns_json_session() {
    let stored = Session::new("knownkey", Some(json!({"uid": "u-7"})));
    let manager = MapManager::with_session(stored.clone());
    let server = Server::new(TestImpl::echo(), session_options(manager, 0));
    let mut peer = TestPeer::connect(&server);

    peer.send(build::nameless_request_message(
        MessageType::RestoreSession,
        msg_id(5),
        b"knownkey",
    ))
    .await;

    let reply = peer.recv().await;
    assert_eq!(reply.message_type(), MessageType::ReplyUtf8);
    assert_eq!(reply.id(), msg_id(5));
    let restored: Session = serde_json::from_slice(&reply.payload().data).unwrap();
    assert_eq!(restored, stored);

    assert_eq!(server.session_registry().active_sessions(), 1);
    assert_eq!(server.session_registry().session_connections("knownkey"), 1);
}

#[tokio::test]
async fn test_session_restore_unknown_key() {
    let server = Server::new(
        TestImpl::echo(),
        session_options(Arc::new(MapManager::default()), 0),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::nameless_request_message(
        MessageType::RestoreSession,
        msg_id(6),
        b"missing",
    ))
    .await;

    let reply = peer.recv().await;
    assert_eq!(reply.message_type(), MessageType::SessionNotFound);
    assert_eq!(reply.id(), msg_id(6));
}

#[tokio::test]
async fn test_session_operations_with_sessions_disabled() {
    let server = Server::new(TestImpl::echo(), ServerOptions::default());
    let mut peer = TestPeer::connect(&server);

    peer.send(build::nameless_request_message(
        MessageType::RestoreSession,
        msg_id(7),
        b"anykey",
    ))
    .await;
    let reply = peer.recv().await;
    assert_eq!(reply.message_type(), MessageType::SessionsDisabled);

    peer.send(build::empty_request_message(
        MessageType::CloseSession,
        msg_id(8),
    ))
    .await;
    let reply = peer.recv().await;
    assert_eq!(reply.message_type(), MessageType::SessionsDisabled);
}

#[tokio::test]
async fn test_session_close_without_session_confirms_anyway() {
    let server = Server::new(
        TestImpl::echo(),
        session_options(Arc::new(MapManager::default()), 0),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::empty_request_message(
        MessageType::CloseSession,
        msg_id(9),
    ))
    .await;

    let reply = peer.recv().await;
    assert_eq!(reply.message_type(), MessageType::ReplyBinary);
    assert_eq!(reply.id(), msg_id(9));
    assert!(reply.payload().is_empty());
}

#[tokio::test]
async fn test_max_session_connections_cap() {
    let stored = Session::new("sharedkey", None);
    let manager = MapManager::with_session(stored);
    let server = Server::new(TestImpl::echo(), session_options(manager, 1));

    let mut first = TestPeer::connect(&server);
    first
        .send(build::nameless_request_message(
            MessageType::RestoreSession,
            msg_id(1),
            b"sharedkey",
        ))
        .await;
    assert_eq!(first.recv().await.message_type(), MessageType::ReplyUtf8);

    let mut second = TestPeer::connect(&server);
    second
        .send(build::nameless_request_message(
            MessageType::RestoreSession,
            msg_id(2),
            b"sharedkey",
        ))
        .await;
    assert_eq!(
        second.recv().await.message_type(),
        MessageType::MaxSessConnsReached
    );
}

#[tokio::test]
async fn test_racing_restores_one_below_cap() {
    // Bucket at one below cap=2: of two racing restorations exactly one
    // wins the last slot.
    let stored = Session::new("sharedkey", None);
    let manager = MapManager::with_session(stored);
    let server = Server::new(TestImpl::echo(), session_options(manager, 2));

    let mut holder = TestPeer::connect(&server);
    holder
        .send(build::nameless_request_message(
            MessageType::RestoreSession,
            msg_id(1),
            b"sharedkey",
        ))
        .await;
    assert_eq!(holder.recv().await.message_type(), MessageType::ReplyUtf8);

    let mut racer_a = TestPeer::connect(&server);
    let mut racer_b = TestPeer::connect(&server);
    racer_a
        .send(build::nameless_request_message(
            MessageType::RestoreSession,
            msg_id(2),
            b"sharedkey",
        ))
        .await;
    racer_b
        .send(build::nameless_request_message(
            MessageType::RestoreSession,
            msg_id(3),
            b"sharedkey",
        ))
        .await;

    let outcomes = [
        racer_a.recv().await.message_type(),
        racer_b.recv().await.message_type(),
    ];
    assert!(outcomes.contains(&MessageType::ReplyUtf8), "{outcomes:?}");
    assert!(
        outcomes.contains(&MessageType::MaxSessConnsReached),
        "{outcomes:?}"
    );
    assert_eq!(server.session_registry().session_connections("sharedkey"), 2);
}

// ── Lifecycle ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_disconnect_cleans_roster_and_registry() {
    let (tx, mut rx) = mpsc::channel(1);
    let manager = Arc::new(MapManager::default());
    let server = Server::new(
        TestImpl::default()
            .on_request(|client, _| async move {
                client
                    .create_session(None)
                    .await
                    .map_err(HandlerError::internal)?;
                Ok(Payload::default())
            })
            .notify_disconnected(tx),
        session_options(manager, 0),
    );

    let mut peer = TestPeer::connect(&server);
    peer.send(build::request_message(
        msg_id(1),
        "login",
        &Payload::default(),
    ))
    .await;
    let _notification = peer.recv().await;
    let _reply = peer.recv().await;
    assert_eq!(server.client_count(), 1);
    assert_eq!(server.session_registry().active_sessions(), 1);

    drop(peer);
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("disconnect hook not fired")
        .unwrap();

    assert_eq!(server.client_count(), 0);
    assert_eq!(server.session_registry().active_sessions(), 0);
}

#[tokio::test]
async fn test_protocol_fault_closes_connection() {
    let (tx, mut rx) = mpsc::channel(1);
    let server = Server::new(
        TestImpl::echo().notify_disconnected(tx),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    // Unknown tag byte: a protocol fault, the connection must be torn down.
    peer.send(Bytes::from_static(&[0xFF])).await;

    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("disconnect hook not fired")
        .unwrap();
    assert_eq!(server.client_count(), 0);
    peer.expect_silence(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn test_bounded_handler_concurrency_queues_excess() {
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let server = Server::new(
        TestImpl::default().on_request({
            let active = active.clone();
            let peak = peak.clone();
            move |_, message| {
                let active = active.clone();
                let peak = peak.clone();
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(30)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    Ok(message.payload().clone())
                }
            }
        }),
        ServerOptions {
            max_concurrent_handlers: 1,
            ..ServerOptions::default()
        },
    );
    let mut peer = TestPeer::connect(&server);

    for n in 1..=3 {
        peer.send(build::request_message(
            msg_id(n),
            "work",
            &Payload::default(),
        ))
        .await;
    }
    // All three are answered (queued, not dropped) and never in parallel.
    for _ in 0..3 {
        let _ = peer.recv().await;
    }
    assert_eq!(peak.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_outbound_ordering_per_agent() {
    let server = Server::new(
        TestImpl::default().on_request(|client, message| async move {
            for n in 0..3u8 {
                client
                    .signal("progress", Payload::binary(vec![n]))
                    .await
                    .map_err(HandlerError::internal)?;
            }
            Ok(message.payload().clone())
        }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::request_message(
        msg_id(1),
        "multi",
        &Payload::binary(&b"done"[..]),
    ))
    .await;

    for n in 0..3u8 {
        let signal = peer.recv().await;
        assert_eq!(signal.message_type(), MessageType::SignalBinary);
        assert_eq!(&signal.payload().data[..], &[n]);
    }
    let reply = peer.recv().await;
    assert_eq!(&reply.payload().data[..], b"done");
}

// ── Shutdown ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_graceful_shutdown_drains_inflight_requests() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let signal_count = Arc::new(AtomicUsize::new(0));

    let server = Server::new(
        TestImpl::default()
            .on_request({
                let entered = entered.clone();
                let release = release.clone();
                move |_, message| {
                    let entered = entered.clone();
                    let release = release.clone();
                    async move {
                        entered.notify_one();
                        release.notified().await;
                        Ok(message.payload().clone())
                    }
                }
            })
            .on_signal({
                let signal_count = signal_count.clone();
                move |_, _| {
                    signal_count.fetch_add(1, Ordering::SeqCst);
                }
            }),
        ServerOptions::default(),
    );
    let mut peer = TestPeer::connect(&server);

    peer.send(build::request_message(
        msg_id(1),
        "slow",
        &Payload::binary(&b"inflight"[..]),
    ))
    .await;
    entered.notified().await;

    let shutdown = {
        let server = server.clone();
        tokio::spawn(async move { server.shutdown().await })
    };

    // Shutdown must block while the handler is mid-flight.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!shutdown.is_finished());

    release.notify_one();
    let reply = peer.recv().await;
    assert_eq!(reply.id(), msg_id(1));
    assert_eq!(&reply.payload().data[..], b"inflight");

    shutdown.await.unwrap();

    // Requests arriving after shutdown get the dedicated shutdown reply.
    peer.send(build::request_message(
        msg_id(2),
        "late",
        &Payload::default(),
    ))
    .await;
    let rejected = peer.recv().await;
    assert_eq!(rejected.message_type(), MessageType::ReplyShutdown);
    assert_eq!(rejected.id(), msg_id(2));

    // Signals arriving after shutdown are dropped silently.
    peer.send(build::signal_message("tick", &Payload::binary(&b"x"[..])))
        .await;
    peer.expect_silence(Duration::from_millis(100)).await;
    assert_eq!(signal_count.load(Ordering::SeqCst), 0);
}

// ── HTTP surface ─────────────────────────────────────────────────────────────

async fn spawn_http(server: &Server) -> std::net::SocketAddr {
    init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let server = server.clone();
    tokio::spawn(async move {
        let _ = server.serve(listener).await;
    });
    addr
}

async fn raw_http(addr: std::net::SocketAddr, request: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(2), stream.read_to_end(&mut response))
        .await
        .expect("timed out reading HTTP response")
        .unwrap();
    String::from_utf8_lossy(&response).into_owned()
}

#[tokio::test]
async fn test_webwire_metadata_endpoint() {
    let server = Server::new(TestImpl::echo(), ServerOptions::default());
    let addr = spawn_http(&server).await;

    let response = raw_http(
        addr,
        "WEBWIRE / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("application/json"), "{response}");
    assert!(response.contains("access-control-allow-origin: *"), "{response}");
    assert!(response.contains("{\"protocol-version\":\"1.2\"}"), "{response}");
}

#[tokio::test]
async fn test_options_delegates_to_implementation_default() {
    let server = Server::new(TestImpl::echo(), ServerOptions::default());
    let addr = spawn_http(&server).await;

    let response = raw_http(
        addr,
        "OPTIONS / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
}

#[tokio::test]
async fn test_refused_upgrade_answers_403() {
    struct Refuser;
    #[async_trait]
    impl ServerImplementation for Refuser {
        fn before_upgrade(&self, _request: &axum::http::request::Parts) -> bool {
            false
        }

        async fn on_request(
            &self,
            _client: Arc<Client>,
            _message: Message,
        ) -> std::result::Result<Payload, HandlerError> {
            unreachable!("no connection may be established");
        }
    }

    let server = Server::new(Refuser, ServerOptions::default());
    let addr = spawn_http(&server).await;

    let response = raw_http(
        addr,
        "GET / HTTP/1.1\r\nHost: localhost\r\nUpgrade: websocket\r\nConnection: close\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\nSec-WebSocket-Version: 13\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 403"), "{response}");
}

#[tokio::test]
async fn test_http_refused_during_shutdown() {
    let server = Server::new(TestImpl::echo(), ServerOptions::default());
    let addr = spawn_http(&server).await;

    server.shutdown().await;

    let response = raw_http(
        addr,
        "GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await;
    assert!(response.starts_with("HTTP/1.1 503"), "{response}");
    assert!(response.contains("Server shutting down"), "{response}");
}
