//! Core protocol types for movehub's wire format.
//!
//! Everything in this module travels "on the wire": a [`Frame`] is the
//! unit the transport carries, and the [`Message`] inside an invocation
//! is the typed payload a hub method receives (a line of chat, a
//! key/value bag, a single [`Move`], or a batch of them).

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::DecodeError;

// ---------------------------------------------------------------------------
// Scalar: the dynamically-typed value inside move data
// ---------------------------------------------------------------------------

/// A single value in a move's data map.
///
/// Game clients put loosely-typed values into move data (`"roll" → 6`,
/// `"name" → "knight"`, `"speed" → 6.6`). Instead of an untyped "any"
/// object we keep a tagged union, so the exact value AND its type come
/// back out of the codec unchanged: an `Int(6)` never turns into a
/// `Float(6.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    /// UTF-8 text.
    Str(String),
    /// Signed 64-bit integer.
    Int(i64),
    /// IEEE-754 double. Encoded bit-exact.
    Float(f64),
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
        }
    }
}

/// Key/value data attached to a move or sent as a dictionary.
///
/// A `BTreeMap` keeps keys sorted, so the encoded bytes for equal maps
/// are always identical.
pub type DataMap = BTreeMap<String, Scalar>;

// ---------------------------------------------------------------------------
// Move
// ---------------------------------------------------------------------------

/// The kind of game action a move represents.
///
/// The wire value is the variant's position (`One` = 0). Add new kinds
/// at the end so existing wire values keep their meaning.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default,
)]
#[serde(into = "u8", try_from = "u8")]
pub enum MoveKind {
    #[default]
    One,
    Two,
    Three,
}

impl MoveKind {
    /// Returns the wire value for this kind.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
        }
    }

    /// Parses a wire value. Returns `None` for values no variant owns.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::One),
            1 => Some(Self::Two),
            2 => Some(Self::Three),
            _ => None,
        }
    }
}

impl From<MoveKind> for u8 {
    fn from(kind: MoveKind) -> Self {
        kind.as_u8()
    }
}

impl TryFrom<u8> for MoveKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_u8(value).ok_or(DecodeError::UnknownMoveKind(value))
    }
}

impl fmt::Display for MoveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::One => write!(f, "One"),
            Self::Two => write!(f, "Two"),
            Self::Three => write!(f, "Three"),
        }
    }
}

/// A typed game action.
///
/// `sequence` is assigned by the sender and unique within its session;
/// `timestamp` never goes backwards for moves a sender produces in order.
/// Neither property is checked by the codec; use
/// [`MoveSequencer`](crate::MoveSequencer) to get both for free.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    /// Sender-assigned sequence number.
    pub sequence: u64,
    /// When the move was made (UTC, nanosecond precision).
    pub timestamp: DateTime<Utc>,
    /// What kind of action this is.
    pub kind: MoveKind,
    /// Free-form action data (`"roll" → 6`).
    #[serde(default)]
    pub data: DataMap,
}

impl Move {
    /// Creates a move with empty data.
    pub fn new(sequence: u64, timestamp: DateTime<Utc>, kind: MoveKind) -> Self {
        Self {
            sequence,
            timestamp,
            kind,
            data: DataMap::new(),
        }
    }

    /// Adds one data entry, builder style.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "move #{} ({}) at {}",
            self.sequence,
            self.kind,
            self.timestamp.to_rfc3339()
        )
    }
}

// ---------------------------------------------------------------------------
// Message: the typed payload of an invocation
// ---------------------------------------------------------------------------

/// The payload carried by an invocation or returned by a completion.
///
/// `#[serde(tag = "type", content = "data")]` produces "adjacently tagged"
/// JSON: `{ "type": "Text", "data": "hello" }`. The binary codec writes
/// the same two-entry map in MessagePack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Message {
    /// A plain line of text (`SendMessage`, `ReceiveMessage`).
    Text(String),

    /// A key/value bag stamped with a time (`SendDictionary`).
    KeyValue {
        data: DataMap,
        timestamp: DateTime<Utc>,
    },

    /// One move (`SendMove`, `ReceiveMove`).
    Move(Move),

    /// A batch of moves (`SendMoves`, `ReceiveMoves`).
    MoveList(Vec<Move>),
}

impl Message {
    /// Short name of the variant, for logs and error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "Text",
            Self::KeyValue { .. } => "KeyValue",
            Self::Move(_) => "Move",
            Self::MoveList(_) => "MoveList",
        }
    }
}

impl From<Move> for Message {
    fn from(value: Move) -> Self {
        Self::Move(value)
    }
}

impl From<Vec<Move>> for Message {
    fn from(value: Vec<Move>) -> Self {
        Self::MoveList(value)
    }
}

// ---------------------------------------------------------------------------
// Frame: the top-level wire unit
// ---------------------------------------------------------------------------

/// Outcome of an invocation, sent back by the hub in a
/// [`Frame::Completion`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Completion {
    /// The method ran and returns nothing.
    Void,
    /// The method ran and returned a value.
    Value(Message),
    /// The method failed on the hub side.
    Error(String),
}

/// One unit on the wire. Every transport message decodes to exactly one
/// frame.
///
/// ```text
/// client                         hub
///   │── Handshake ───────────────▶│
///   │◀────────────── HandshakeAck ─│
///   │── Invocation(id=7) ────────▶│
///   │◀──────── Completion(id=7) ───│
///   │◀── Invocation(no id, push) ──│
///   │◀──────────────────── Ping ──▶│
///   │◀─────────────────── Close ───│
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Frame {
    /// Client → hub, always first: "I speak this protocol".
    Handshake { protocol: String, version: u32 },

    /// Hub → client: handshake accepted (`error: None`) or rejected.
    HandshakeAck { error: Option<String> },

    /// A method call in either direction. `invocation_id: None` means the
    /// caller does not want a reply (pushes and fire-and-forget sends).
    Invocation {
        invocation_id: Option<u64>,
        target: String,
        arguments: Message,
    },

    /// The reply to an invocation that carried an id.
    Completion {
        invocation_id: u64,
        result: Completion,
    },

    /// Keep-alive. Carries nothing.
    Ping,

    /// Hub → client: "I'm closing this connection".
    Close {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

/// The one-byte frame discriminator the binary codec writes in front of
/// each frame's MessagePack body.
///
/// [`peek_frame_type`](crate::peek_frame_type) reads it off raw bytes,
/// which lets a hub tell a binary handshake from a JSON one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameType {
    Handshake = 0x01,
    HandshakeAck = 0x02,
    Invocation = 0x03,
    Completion = 0x04,
    Ping = 0x05,
    Close = 0x06,
}

impl FrameType {
    /// Parses a discriminator byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(Self::Handshake),
            0x02 => Some(Self::HandshakeAck),
            0x03 => Some(Self::Invocation),
            0x04 => Some(Self::Completion),
            0x05 => Some(Self::Ping),
            0x06 => Some(Self::Close),
            _ => None,
        }
    }
}

impl Frame {
    /// Returns the discriminator for this frame.
    pub fn frame_type(&self) -> FrameType {
        match self {
            Self::Handshake { .. } => FrameType::Handshake,
            Self::HandshakeAck { .. } => FrameType::HandshakeAck,
            Self::Invocation { .. } => FrameType::Invocation,
            Self::Completion { .. } => FrameType::Completion,
            Self::Ping => FrameType::Ping,
            Self::Close { .. } => FrameType::Close,
        }
    }
}

// =========================================================================
// Tests
// =========================================================================
