//! Wire protocol for movehub.
//!
//! This crate defines the "language" a client and a hub speak:
//!
//! - **Types** ([`Frame`], [`Message`], [`Move`], [`Scalar`]): the
//!   structures that travel on the wire.
//! - **Codec** ([`Codec`] trait, [`BinaryCodec`], [`JsonCodec`]): how
//!   those structures are converted to/from bytes.
//! - **Errors** ([`ProtocolError`], [`DecodeError`]): what can go wrong
//!   during encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between transport (raw bytes) and the
//! connection/dispatcher (who sent what, and who waits for a reply). It
//! doesn't know about sockets or groups.
//!
//! ```text
//! Transport (bytes) → Protocol (Frame) → Dispatcher (handlers, replies)
//! ```

mod codec;
mod error;
mod sequencer;
mod types;

pub use codec::{decode_message, encode_message, peek_frame_type, BinaryCodec, Codec};
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::{DecodeError, ProtocolError};
pub use sequencer::MoveSequencer;
pub use types::{
    Completion, DataMap, Frame, FrameType, Message, Move, MoveKind, Scalar,
};

/// Protocol version sent in every handshake. Hubs reject other versions.
pub const PROTOCOL_VERSION: u32 = 1;

/// Hub method names.
///
/// Outbound calls (client → hub) and inbound pushes (hub → client) are
/// addressed by name, the same way the hub registers them.
pub mod methods {
    /// `SendMessage(string)`: replies with a string.
    pub const SEND_MESSAGE: &str = "SendMessage";
    /// `SendDictionary(mapping, timestamp)`: no reply value.
    pub const SEND_DICTIONARY: &str = "SendDictionary";
    /// `SendMove(Move)`: replies with a move.
    pub const SEND_MOVE: &str = "SendMove";
    /// `SendMoves(list<Move>)`: replies with a move list.
    pub const SEND_MOVES: &str = "SendMoves";
    /// `JoinGroup(string)`.
    pub const JOIN_GROUP: &str = "JoinGroup";
    /// `LeaveGroup(string)`.
    pub const LEAVE_GROUP: &str = "LeaveGroup";

    /// Push: `ReceiveMessage(string)`.
    pub const RECEIVE_MESSAGE: &str = "ReceiveMessage";
    /// Push: `ReceiveMove(Move)`.
    pub const RECEIVE_MOVE: &str = "ReceiveMove";
    /// Push: `ReceiveMoves(list<Move>)`.
    pub const RECEIVE_MOVES: &str = "ReceiveMoves";
}
