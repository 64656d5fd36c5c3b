//! Inbound frame parser.
//!
//! Validation order per tag: minimum length, name-length consistency, name
//! charset, UTF-16 alignment, UTF-16 payload evenness. Any failure is a
//! protocol fault and the caller closes the connection.

use bytes::Bytes;

use super::{min_len, Message, MessageId, MessageType, NO_ID};
use crate::error::ParseError;
use crate::payload::{Payload, PayloadEncoding};

/// A name (or error code) byte must be printable 7-bit ASCII.
#[inline]
fn valid_name_byte(byte: u8) -> bool {
    (0x20..=0x7E).contains(&byte)
}

fn check_name(bytes: &[u8]) -> Result<(), ParseError> {
    match bytes.iter().find(|b| !valid_name_byte(**b)) {
        Some(byte) => Err(ParseError::InvalidNameByte(*byte)),
        None => Ok(()),
    }
}

/// Name bytes are validated printable ASCII, hence valid UTF-8.
fn name_string(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn read_id(data: &[u8]) -> MessageId {
    let mut id = NO_ID;
    id.copy_from_slice(&data[1..9]);
    id
}

fn check_min_len(
    message_type: MessageType,
    data: &Bytes,
    min: usize,
) -> Result<(), ParseError> {
    if data.len() < min {
        return Err(ParseError::TooShort {
            kind: message_type.name(),
            len: data.len(),
        });
    }
    Ok(())
}

impl Message {
    /// Parse one complete inbound frame.
    pub fn parse(data: Bytes) -> Result<Self, ParseError> {
        let tag = *data.first().ok_or(ParseError::Empty)?;
        let message_type = MessageType::from_u8(tag).ok_or(ParseError::UnknownType(tag))?;

        match message_type {
            MessageType::SignalBinary => {
                parse_signal(message_type, data, PayloadEncoding::Binary)
            }
            MessageType::SignalUtf8 => parse_signal(message_type, data, PayloadEncoding::Utf8),
            MessageType::SignalUtf16 => parse_signal_utf16(message_type, data),
            MessageType::RequestBinary => {
                parse_request(message_type, data, PayloadEncoding::Binary)
            }
            MessageType::RequestUtf8 => parse_request(message_type, data, PayloadEncoding::Utf8),
            MessageType::RequestUtf16 => parse_request_utf16(message_type, data),
            MessageType::ReplyBinary => parse_reply(message_type, data, PayloadEncoding::Binary),
            MessageType::ReplyUtf8 => parse_reply(message_type, data, PayloadEncoding::Utf8),
            MessageType::ReplyUtf16 => parse_reply_utf16(message_type, data),
            MessageType::ErrorReply => parse_error_reply(message_type, data),
            MessageType::RestoreSession => parse_restore_session(message_type, data),
            MessageType::CloseSession => parse_close_session(message_type, data),
            MessageType::SessionCreated => parse_session_created(message_type, data),
            MessageType::SessionClosed => parse_session_closed(message_type, data),
            MessageType::ReplyShutdown
            | MessageType::InternalError
            | MessageType::SessionNotFound
            | MessageType::MaxSessConnsReached
            | MessageType::SessionsDisabled => parse_special_reply(message_type, data),
        }
    }
}

fn parse_signal(
    message_type: MessageType,
    data: Bytes,
    encoding: PayloadEncoding,
) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::SIGNAL)?;

    let name_len = data[1] as usize;
    // The name-length flag must leave room for the full name plus at least
    // one payload byte.
    if data.len() < min_len::SIGNAL + name_len {
        return Err(ParseError::CorruptNameLength {
            declared: name_len,
            available: data.len() - 2,
        });
    }
    check_name(&data[2..2 + name_len])?;

    Ok(Message {
        message_type,
        id: NO_ID,
        name: name_string(&data[2..2 + name_len]),
        payload: Payload {
            encoding,
            data: data.slice(2 + name_len..),
        },
    })
}

fn parse_signal_utf16(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::SIGNAL_UTF16)?;

    let name_len = data[1] as usize;
    let pad = name_len % 2;
    if data.len() < min_len::SIGNAL_UTF16 + name_len + pad {
        return Err(ParseError::CorruptNameLength {
            declared: name_len,
            available: data.len() - 2,
        });
    }
    check_name(&data[2..2 + name_len])?;

    let payload_offset = 2 + name_len + pad;
    let payload_len = data.len() - payload_offset;
    if payload_len % 2 != 0 {
        return Err(ParseError::UnalignedUtf16(payload_len));
    }

    Ok(Message {
        message_type,
        id: NO_ID,
        name: name_string(&data[2..2 + name_len]),
        payload: Payload {
            encoding: PayloadEncoding::Utf16,
            data: data.slice(payload_offset..),
        },
    })
}

fn parse_request(
    message_type: MessageType,
    data: Bytes,
    encoding: PayloadEncoding,
) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::REQUEST)?;

    let id = read_id(&data);
    let name_len = data[9] as usize;
    // A named request must carry the full name; the payload may be empty.
    if data.len() < 10 + name_len {
        return Err(ParseError::CorruptNameLength {
            declared: name_len,
            available: data.len() - 10,
        });
    }
    check_name(&data[10..10 + name_len])?;

    Ok(Message {
        message_type,
        id,
        name: name_string(&data[10..10 + name_len]),
        payload: Payload {
            encoding,
            data: data.slice(10 + name_len..),
        },
    })
}

fn parse_request_utf16(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::REQUEST_UTF16)?;

    let id = read_id(&data);
    let name_len = data[9] as usize;
    let pad = name_len % 2;
    let payload_offset = 10 + name_len + pad;
    if data.len() < payload_offset {
        return Err(ParseError::CorruptNameLength {
            declared: name_len,
            available: data.len() - 10,
        });
    }
    check_name(&data[10..10 + name_len])?;

    let payload_len = data.len() - payload_offset;
    if payload_len % 2 != 0 {
        return Err(ParseError::UnalignedUtf16(payload_len));
    }

    Ok(Message {
        message_type,
        id,
        name: name_string(&data[10..10 + name_len]),
        payload: Payload {
            encoding: PayloadEncoding::Utf16,
            data: data.slice(payload_offset..),
        },
    })
}

fn parse_reply(
    message_type: MessageType,
    data: Bytes,
    encoding: PayloadEncoding,
) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::REPLY)?;

    Ok(Message {
        message_type,
        id: read_id(&data),
        name: String::new(),
        payload: Payload {
            encoding,
            data: data.slice(9..),
        },
    })
}

fn parse_reply_utf16(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::REPLY_UTF16)?;

    // One pad byte always follows the identifier; payload starts at 10.
    let payload_len = data.len() - 10;
    if payload_len % 2 != 0 {
        return Err(ParseError::UnalignedUtf16(payload_len));
    }

    Ok(Message {
        message_type,
        id: read_id(&data),
        name: String::new(),
        payload: Payload {
            encoding: PayloadEncoding::Utf16,
            data: data.slice(10..),
        },
    })
}

fn parse_error_reply(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::ERROR_REPLY)?;

    let code_len = data[9] as usize;
    if code_len == 0 {
        return Err(ParseError::EmptyErrorCode);
    }
    if data.len() < 10 + code_len {
        return Err(ParseError::CorruptNameLength {
            declared: code_len,
            available: data.len() - 10,
        });
    }
    check_name(&data[10..10 + code_len])?;

    Ok(Message {
        message_type,
        id: read_id(&data),
        // The error code occupies the name slot.
        name: name_string(&data[10..10 + code_len]),
        payload: Payload {
            encoding: PayloadEncoding::Utf8,
            data: data.slice(10 + code_len..),
        },
    })
}

fn parse_restore_session(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::RESTORE_SESSION)?;

    Ok(Message {
        message_type,
        id: read_id(&data),
        name: String::new(),
        payload: Payload {
            encoding: PayloadEncoding::Binary,
            data: data.slice(9..),
        },
    })
}

fn parse_close_session(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::CLOSE_SESSION)?;

    Ok(Message {
        message_type,
        id: read_id(&data),
        name: String::new(),
        payload: Payload::default(),
    })
}

fn parse_session_created(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::SESSION_CREATED)?;

    Ok(Message {
        message_type,
        id: NO_ID,
        name: String::new(),
        payload: Payload {
            encoding: PayloadEncoding::Binary,
            data: data.slice(1..),
        },
    })
}

fn parse_session_closed(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::SESSION_CLOSED)?;

    Ok(Message {
        message_type,
        id: NO_ID,
        name: String::new(),
        payload: Payload::default(),
    })
}

fn parse_special_reply(message_type: MessageType, data: Bytes) -> Result<Message, ParseError> {
    check_min_len(message_type, &data, min_len::SPECIAL_REPLY)?;

    Ok(Message {
        message_type,
        id: read_id(&data),
        name: String::new(),
        payload: Payload::default(),
    })
}
