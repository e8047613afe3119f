//! Error types for the protocol layer.
//!
//! Each crate in movehub defines its own error enum. When you see a
//! `ProtocolError`, you know the problem is in turning frames into bytes
//! or back, not in networking or group bookkeeping.

use std::io;

/// Why a byte buffer could not be decoded by the binary codec.
///
/// Decoding is all-or-nothing: any of these means no frame (or message)
/// was produced, and the input can be dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// The buffer ended before a complete value was read.
    #[error("truncated input")]
    Truncated,

    /// The first byte is not a known frame discriminator.
    #[error("unknown frame type 0x{0:02x}")]
    UnknownFrameType(u8),

    /// A message, scalar or completion carries a tag no variant owns.
    #[error("unknown tag: {0}")]
    UnknownTag(String),

    /// A move carries a kind value no variant owns.
    #[error("unknown move kind {0}")]
    UnknownMoveKind(u8),

    /// A string field is not valid UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// The bytes are MessagePack but not the shape the frame expects
    /// (wrong types, missing fields, unparseable timestamps, ...).
    #[error("malformed value: {0}")]
    Malformed(String),

    /// Bytes were left over after a complete value.
    #[error("{0} trailing bytes after value")]
    TrailingBytes(usize),
}

impl From<rmp_serde::decode::Error> for DecodeError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        use rmp_serde::decode::Error;

        match err {
            Error::InvalidMarkerRead(e) | Error::InvalidDataRead(e)
                if e.kind() == io::ErrorKind::UnexpectedEof =>
            {
                Self::Truncated
            }
            Error::Utf8Error(_) => Self::InvalidUtf8,
            // serde reports unknown enum tags through `de::Error::unknown_variant`.
            Error::Syntax(msg) | Error::Uncategorized(msg) if msg.starts_with("unknown variant") => {
                Self::UnknownTag(msg)
            }
            other => Self::Malformed(other.to_string()),
        }
    }
}

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The binary codec rejected the input.
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// A value can't be represented in the chosen format (e.g. a
    /// non-finite float in JSON).
    #[error("encode failed: {0}")]
    Encode(String),

    /// JSON serialization failed.
    #[cfg(feature = "json")]
    #[error("json encode failed: {0}")]
    JsonEncode(serde_json::Error),

    /// JSON deserialization failed.
    #[cfg(feature = "json")]
    #[error("json decode failed: {0}")]
    JsonDecode(serde_json::Error),
}
