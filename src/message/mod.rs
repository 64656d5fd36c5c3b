//! Message module - wire tags, parsed messages, and outbound constructors.
//!
//! Implements the binary framing of the protocol. Every frame delivered by
//! the transport is one complete message:
//!
//! ```text
//! signal   : [tag][nameLen:1][name][pad?][payload]
//! request  : [tag][id:8][nameLen:1][name][pad?][payload]
//! reply    : [tag][id:8][pad?][payload]
//! error    : [tag][id:8][codeLen:1][code][message]
//! special  : [tag][id:8]
//! ```
//!
//! The single `pad` byte only exists for UTF-16 payloads and keeps the
//! payload 2-byte aligned: named signals/requests insert it iff the name
//! length is odd, replies always insert it after the 8-byte identifier.
//!
//! Tag octets are fixed by the protocol and must not change: existing peers
//! depend on them.

pub mod build;

mod parse;

use bytes::Bytes;

use crate::payload::{Payload, PayloadEncoding};

/// Correlation identifier: 8 opaque bytes chosen by the requester.
///
/// All-zero for signals and server-originated notifications.
pub type MessageId = [u8; 8];

/// Message type tags (wire octets).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    /// Correlated failure reply carrying an error code and message.
    ErrorReply = 0,
    /// Special reply: the request was received during server shutdown.
    ReplyShutdown = 1,
    /// Special reply: the request failed internally, details withheld.
    InternalError = 2,
    /// Special reply: no session matched the restoration key.
    SessionNotFound = 3,
    /// Special reply: the per-session connection cap was reached.
    MaxSessConnsReached = 4,
    /// Special reply: session operations are disabled.
    SessionsDisabled = 5,
    /// Server notification: a session was created (payload: JSON session).
    SessionCreated = 21,
    /// Server notification: the active session was closed.
    SessionClosed = 22,
    /// Peer request: destroy the currently active session.
    CloseSession = 31,
    /// Peer request: restore a session by key (payload: the key).
    RestoreSession = 32,
    /// Signal with binary payload.
    SignalBinary = 63,
    /// Signal with UTF-8 payload.
    SignalUtf8 = 64,
    /// Signal with UTF-16 payload.
    SignalUtf16 = 65,
    /// Request with binary payload.
    RequestBinary = 127,
    /// Request with UTF-8 payload.
    RequestUtf8 = 128,
    /// Request with UTF-16 payload.
    RequestUtf16 = 129,
    /// Success reply with binary payload.
    ReplyBinary = 191,
    /// Success reply with UTF-8 payload.
    ReplyUtf8 = 192,
    /// Success reply with UTF-16 payload.
    ReplyUtf16 = 193,
}

impl MessageType {
    /// Decode a wire tag octet.
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::ErrorReply,
            1 => Self::ReplyShutdown,
            2 => Self::InternalError,
            3 => Self::SessionNotFound,
            4 => Self::MaxSessConnsReached,
            5 => Self::SessionsDisabled,
            21 => Self::SessionCreated,
            22 => Self::SessionClosed,
            31 => Self::CloseSession,
            32 => Self::RestoreSession,
            63 => Self::SignalBinary,
            64 => Self::SignalUtf8,
            65 => Self::SignalUtf16,
            127 => Self::RequestBinary,
            128 => Self::RequestUtf8,
            129 => Self::RequestUtf16,
            191 => Self::ReplyBinary,
            192 => Self::ReplyUtf8,
            193 => Self::ReplyUtf16,
            _ => return None,
        })
    }

    /// Wire octet for this tag.
    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Signal tag for the given payload encoding.
    pub fn for_signal(encoding: PayloadEncoding) -> Self {
        match encoding {
            PayloadEncoding::Binary => Self::SignalBinary,
            PayloadEncoding::Utf8 => Self::SignalUtf8,
            PayloadEncoding::Utf16 => Self::SignalUtf16,
        }
    }

    /// Request tag for the given payload encoding.
    pub fn for_request(encoding: PayloadEncoding) -> Self {
        match encoding {
            PayloadEncoding::Binary => Self::RequestBinary,
            PayloadEncoding::Utf8 => Self::RequestUtf8,
            PayloadEncoding::Utf16 => Self::RequestUtf16,
        }
    }

    /// Reply tag for the given payload encoding.
    pub fn for_reply(encoding: PayloadEncoding) -> Self {
        match encoding {
            PayloadEncoding::Binary => Self::ReplyBinary,
            PayloadEncoding::Utf8 => Self::ReplyUtf8,
            PayloadEncoding::Utf16 => Self::ReplyUtf16,
        }
    }

    /// Whether this tag is a fixed-semantics special failure reply.
    #[inline]
    pub fn is_special_reply(self) -> bool {
        matches!(
            self,
            Self::ReplyShutdown
                | Self::InternalError
                | Self::SessionNotFound
                | Self::MaxSessConnsReached
                | Self::SessionsDisabled
        )
    }

    /// Whether this tag is a fire-and-forget signal.
    #[inline]
    pub fn is_signal(self) -> bool {
        matches!(self, Self::SignalBinary | Self::SignalUtf8 | Self::SignalUtf16)
    }

    /// Whether this tag is a correlated request.
    #[inline]
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Self::RequestBinary | Self::RequestUtf8 | Self::RequestUtf16
        )
    }

    /// Human-readable tag name for diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Self::ErrorReply => "error reply",
            Self::ReplyShutdown => "shutdown reply",
            Self::InternalError => "internal error reply",
            Self::SessionNotFound => "session not found reply",
            Self::MaxSessConnsReached => "max session connections reply",
            Self::SessionsDisabled => "sessions disabled reply",
            Self::SessionCreated => "session created notification",
            Self::SessionClosed => "session closed notification",
            Self::CloseSession => "session destruction request",
            Self::RestoreSession => "session restoration request",
            Self::SignalBinary | Self::SignalUtf8 => "signal",
            Self::SignalUtf16 => "UTF-16 signal",
            Self::RequestBinary | Self::RequestUtf8 => "request",
            Self::RequestUtf16 => "UTF-16 request",
            Self::ReplyBinary | Self::ReplyUtf8 => "reply",
            Self::ReplyUtf16 => "UTF-16 reply",
        }
    }
}

/// Minimum frame lengths per tag, in bytes.
pub mod min_len {
    /// Binary/UTF-8 signal: tag + name length + 1 payload byte.
    pub const SIGNAL: usize = 3;
    /// UTF-16 signal: tag + name length + one 2-byte code unit.
    pub const SIGNAL_UTF16: usize = 4;
    /// Binary/UTF-8 request: tag + id + name length + 1 byte of name or payload.
    pub const REQUEST: usize = 11;
    /// UTF-16 request: tag + id + name length + one 2-byte code unit.
    pub const REQUEST_UTF16: usize = 12;
    /// Binary/UTF-8 reply: tag + id.
    pub const REPLY: usize = 9;
    /// UTF-16 reply: tag + id + pad.
    pub const REPLY_UTF16: usize = 10;
    /// Error reply: tag + id + code length + 1 code byte.
    pub const ERROR_REPLY: usize = 11;
    /// Session restoration request: tag + id + 1 key byte.
    pub const RESTORE_SESSION: usize = 10;
    /// Session destruction request: tag + id.
    pub const CLOSE_SESSION: usize = 9;
    /// Session created notification: tag + 1 JSON byte.
    pub const SESSION_CREATED: usize = 2;
    /// Session closed notification: tag only.
    pub const SESSION_CLOSED: usize = 1;
    /// Special failure replies: tag + id.
    pub const SPECIAL_REPLY: usize = 9;
}

/// Maximum name length in bytes (the name length is a single wire byte).
pub const MAX_NAME_LEN: usize = 255;

/// Zero correlation identifier, used by signals and notifications.
pub const NO_ID: MessageId = [0u8; 8];

/// A parsed inbound message.
///
/// Produced by [`Message::parse`]; payload bytes are zero-copy slices of the
/// received frame. For error replies the error code occupies the name slot
/// and the human-readable text forms a UTF-8 payload.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub(crate) message_type: MessageType,
    pub(crate) id: MessageId,
    pub(crate) name: String,
    pub(crate) payload: Payload,
}

impl Message {
    /// The wire tag.
    #[inline]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// The correlation identifier (all-zero for tags that carry none).
    #[inline]
    pub fn id(&self) -> MessageId {
        self.id
    }

    /// The message name (empty for nameless tags).
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The payload.
    #[inline]
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Payload bytes (cheap clone, zero-copy).
    #[inline]
    pub fn payload_bytes(&self) -> Bytes {
        self.payload.data.clone()
    }
}
