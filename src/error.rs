//! Error types for webwire.

use thiserror::Error;

/// Main error type for all webwire operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (session file store, listener).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error (sessions, metadata).
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Inbound frame violated the wire protocol.
    #[error("protocol error: {0}")]
    Parse(#[from] ParseError),

    /// The client agent is no longer connected.
    #[error("client disconnected")]
    Disconnected,

    /// Session operations are disabled on this server.
    #[error("sessions are disabled")]
    SessionsDisabled,

    /// The agent already holds an active session.
    #[error("another session is already active")]
    SessionActive,

    /// The per-session concurrent connection cap was reached.
    #[error("maximum number of concurrent session connections reached")]
    MaxSessConnsReached,

    /// No session matched the requested key.
    #[error("session not found")]
    SessionNotFound,

    /// The pluggable session manager reported a failure.
    #[error("session manager failure: {0}")]
    SessionManager(String),

    /// The server is shutting down and refuses new operations.
    #[error("server is shutting down")]
    ServerShutdown,
}

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Typed failure produced by the message parser.
///
/// Any of these constitutes a protocol fault: the server logs it and closes
/// the offending connection.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    /// Zero-length frame.
    #[error("invalid message, empty frame")]
    Empty,

    /// The leading type tag is not part of the protocol.
    #[error("unknown message type: {0}")]
    UnknownType(u8),

    /// Frame shorter than the minimum for its tag.
    #[error("invalid {kind} message, too short ({len} bytes)")]
    TooShort {
        /// Human-readable tag name.
        kind: &'static str,
        /// Actual frame length.
        len: usize,
    },

    /// Declared name length exceeds the remaining frame bytes.
    #[error("corrupt name length flag: {declared} bytes declared, {available} available")]
    CorruptNameLength {
        /// Length from the name-length byte.
        declared: usize,
        /// Bytes actually present past the header.
        available: usize,
    },

    /// Name byte outside printable 7-bit ASCII (0x20..=0x7E).
    #[error("invalid name character: {0:#04x}")]
    InvalidNameByte(u8),

    /// UTF-16 payload with an odd byte length.
    #[error("unaligned UTF-16 payload ({0} bytes)")]
    UnalignedUtf16(usize),

    /// Error reply frame with a zero-length error code.
    #[error("error reply carries an empty error code")]
    EmptyErrorCode,
}

/// Application-defined request failure, visible to the peer.
///
/// Returned from `on_request` handlers via [`HandlerError::Request`]; encoded
/// on the wire as an error reply carrying the code and message verbatim.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct RequestError {
    /// Machine-readable error code (1–255 printable 7-bit ASCII bytes).
    pub code: String,
    /// Human-readable description.
    pub message: String,
}

impl RequestError {
    /// Create a new request error with the given code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

/// Failure returned by an `on_request` handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Deliberate, peer-visible failure: encoded as an error reply with the
    /// embedded code and message.
    #[error(transparent)]
    Request(#[from] RequestError),

    /// Unexpected internal failure: logged server-side, the peer receives an
    /// anonymous internal-error reply and never sees the text.
    #[error("internal error: {0}")]
    Internal(Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap an arbitrary error as an internal (peer-opaque) failure.
    pub fn internal<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Internal(err.into())
    }
}
