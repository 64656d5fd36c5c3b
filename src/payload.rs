//! Message payloads and their declared encodings.

use bytes::Bytes;

/// Declared encoding of a payload.
///
/// The server never transcodes payload bytes; the encoding only selects the
/// wire tag (and the UTF-16 alignment rules) so the receiving side knows how
/// to interpret them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PayloadEncoding {
    /// Raw binary data (the default).
    #[default]
    Binary,
    /// UTF-8 encoded text.
    Utf8,
    /// UTF-16 encoded text; byte length must be even.
    Utf16,
}

/// A payload: declared encoding plus opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Payload {
    /// Declared encoding.
    pub encoding: PayloadEncoding,
    /// Payload bytes (zero-copy via `bytes::Bytes`).
    pub data: Bytes,
}

impl Payload {
    /// Create a payload with the given encoding.
    ///
    /// # Panics
    ///
    /// Panics if `encoding` is [`PayloadEncoding::Utf16`] and the data length
    /// is odd. UTF-16 payloads are sequences of 2-byte code units; an odd
    /// length is a bug at the call site, not a recoverable condition.
    pub fn new(encoding: PayloadEncoding, data: impl Into<Bytes>) -> Self {
        let data = data.into();
        if encoding == PayloadEncoding::Utf16 {
            assert!(
                data.len() % 2 == 0,
                "UTF-16 payload length must be even, got {}",
                data.len()
            );
        }
        Self { encoding, data }
    }

    /// Create a binary payload.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::new(PayloadEncoding::Binary, data)
    }

    /// Create a UTF-8 payload.
    pub fn utf8(data: impl Into<Bytes>) -> Self {
        Self::new(PayloadEncoding::Utf8, data)
    }

    /// Create a UTF-16 payload.
    ///
    /// # Panics
    ///
    /// Panics if the data length is odd.
    pub fn utf16(data: impl Into<Bytes>) -> Self {
        Self::new(PayloadEncoding::Utf16, data)
    }

    /// Payload length in bytes.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
