//! Unified error type for the movehub client.

use movehub_connection::{ConnectError, SendError};
use movehub_dispatch::InvokeError;
use movehub_groups::{JoinError, LeaveError};
use movehub_protocol::ProtocolError;
use movehub_transport::TransportError;

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `movehub` crate you deal with this single error type
/// instead of importing errors from each layer. Every variant but
/// [`UnexpectedReply`](Self::UnexpectedReply) converts automatically,
/// so `?` works on any layer's result.
#[derive(Debug, thiserror::Error)]
pub enum HubError {
    /// A transport-level error (dial, send, recv).
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A protocol-level error (encode, decode).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Connecting or handshaking with the hub failed.
    #[error(transparent)]
    Connect(#[from] ConnectError),

    /// Writing a frame failed.
    #[error(transparent)]
    Send(#[from] SendError),

    /// A hub call failed (timeout, connection lost, hub error).
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    /// Joining a group failed.
    #[error(transparent)]
    Join(#[from] JoinError),

    /// Leaving a group failed.
    #[error(transparent)]
    Leave(#[from] LeaveError),

    /// The hub answered a call with a payload of the wrong shape.
    #[error("{method} expected a {expected} reply, got {got}")]
    UnexpectedReply {
        method: &'static str,
        expected: &'static str,
        got: &'static str,
    },
}
