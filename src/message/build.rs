//! Outbound message constructors.
//!
//! Constructors mirror the parser and validate at encode time. They panic on
//! caller invariant violations (oversized or out-of-charset names, odd
//! UTF-16 payloads, bad error codes): these protect the library's own
//! callers, not the peer.

use bytes::{BufMut, Bytes, BytesMut};

use super::{MessageId, MessageType, MAX_NAME_LEN};
use crate::payload::{Payload, PayloadEncoding};

fn check_name(name: &str) {
    assert!(
        name.len() <= MAX_NAME_LEN,
        "message name exceeds {} bytes: {}",
        MAX_NAME_LEN,
        name.len()
    );
    for byte in name.bytes() {
        assert!(
            (0x20..=0x7E).contains(&byte),
            "message name contains a byte outside printable 7-bit ASCII: {byte:#04x}"
        );
    }
}

fn check_utf16(payload: &Payload) {
    if payload.encoding == PayloadEncoding::Utf16 {
        assert!(
            payload.len() % 2 == 0,
            "UTF-16 payload length must be even, got {}",
            payload.len()
        );
    }
}

/// Encode a named signal message.
///
/// # Panics
///
/// Panics on a name longer than 255 bytes, a name byte outside 0x20..=0x7E,
/// or an odd-length UTF-16 payload.
pub fn signal_message(name: &str, payload: &Payload) -> Bytes {
    check_name(name);
    check_utf16(payload);

    let pad = header_padding(payload.encoding, name.len());
    let mut buf = BytesMut::with_capacity(2 + name.len() + pad + payload.len());
    buf.put_u8(MessageType::for_signal(payload.encoding).as_u8());
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, pad);
    buf.put_slice(&payload.data);
    buf.freeze()
}

/// Encode a named request message.
///
/// # Panics
///
/// Same conditions as [`signal_message`].
pub fn request_message(id: MessageId, name: &str, payload: &Payload) -> Bytes {
    check_name(name);
    check_utf16(payload);

    let pad = header_padding(payload.encoding, name.len());
    let mut buf = BytesMut::with_capacity(10 + name.len() + pad + payload.len());
    buf.put_u8(MessageType::for_request(payload.encoding).as_u8());
    buf.put_slice(&id);
    buf.put_u8(name.len() as u8);
    buf.put_slice(name.as_bytes());
    buf.put_bytes(0, pad);
    buf.put_slice(&payload.data);
    buf.freeze()
}

/// Encode a success reply. UTF-16 replies carry one pad byte after the
/// identifier.
///
/// # Panics
///
/// Panics on an odd-length UTF-16 payload.
pub fn reply_message(id: MessageId, payload: &Payload) -> Bytes {
    check_utf16(payload);

    let pad = usize::from(payload.encoding == PayloadEncoding::Utf16);
    let mut buf = BytesMut::with_capacity(9 + pad + payload.len());
    buf.put_u8(MessageType::for_reply(payload.encoding).as_u8());
    buf.put_slice(&id);
    buf.put_bytes(0, pad);
    buf.put_slice(&payload.data);
    buf.freeze()
}

/// Encode an error reply carrying a peer-visible code and message.
///
/// # Panics
///
/// Panics on an empty code, a code longer than 255 bytes, or a code byte
/// outside 0x20..=0x7E.
pub fn error_reply_message(id: MessageId, code: &str, message: &str) -> Bytes {
    assert!(!code.is_empty(), "error reply requires a non-empty error code");
    check_name(code);

    let mut buf = BytesMut::with_capacity(10 + code.len() + message.len());
    buf.put_u8(MessageType::ErrorReply.as_u8());
    buf.put_slice(&id);
    buf.put_u8(code.len() as u8);
    buf.put_slice(code.as_bytes());
    buf.put_slice(message.as_bytes());
    buf.freeze()
}

/// Encode a special failure reply with fixed semantics.
///
/// # Panics
///
/// Panics if `message_type` is not one of the special reply tags.
pub fn special_reply_message(message_type: MessageType, id: MessageId) -> Bytes {
    assert!(
        message_type.is_special_reply(),
        "{} is not a special reply type",
        message_type.name()
    );

    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(message_type.as_u8());
    buf.put_slice(&id);
    buf.freeze()
}

/// Encode a nameless request carrying a raw payload (session restoration).
pub fn nameless_request_message(
    message_type: MessageType,
    id: MessageId,
    payload: &[u8],
) -> Bytes {
    let mut buf = BytesMut::with_capacity(9 + payload.len());
    buf.put_u8(message_type.as_u8());
    buf.put_slice(&id);
    buf.put_slice(payload);
    buf.freeze()
}

/// Encode an empty request (session destruction).
pub fn empty_request_message(message_type: MessageType, id: MessageId) -> Bytes {
    let mut buf = BytesMut::with_capacity(9);
    buf.put_u8(message_type.as_u8());
    buf.put_slice(&id);
    buf.freeze()
}

/// Encode the session-created notification carrying the JSON session.
pub fn session_created_message(session_json: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(1 + session_json.len());
    buf.put_u8(MessageType::SessionCreated.as_u8());
    buf.put_slice(session_json);
    buf.freeze()
}

/// Encode the session-closed notification.
pub fn session_closed_message() -> Bytes {
    const FRAME: [u8; 1] = [MessageType::SessionClosed as u8];
    Bytes::from_static(&FRAME)
}

/// One pad byte follows the name iff the payload is UTF-16 and the name
/// length is odd, keeping the payload 2-byte aligned.
fn header_padding(encoding: PayloadEncoding, name_len: usize) -> usize {
    usize::from(encoding == PayloadEncoding::Utf16 && name_len % 2 != 0)
}
