//! Error types for the connection layer.

use std::time::Duration;

use movehub_protocol::ProtocolError;
use movehub_transport::TransportError;

use crate::ConnectionState;

/// Errors returned by [`Connection::connect`](crate::Connection::connect).
///
/// Whatever the variant, the socket that was being set up has already
/// been closed and the connection is back in `Disconnected` (or stays
/// `Closed`).
#[derive(Debug, thiserror::Error)]
pub enum ConnectError {
    /// The connection was closed. Closed connections can't be reopened.
    #[error("connection is closed")]
    Closed,

    /// Another connect or a reconnection is already in progress.
    #[error("cannot connect while {0}")]
    InvalidState(ConnectionState),

    /// Dialing the hub failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The hub didn't acknowledge the handshake in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),

    /// The hub answered the handshake with an error.
    #[error("handshake rejected: {0}")]
    Rejected(String),

    /// The hub broke the handshake protocol (closed early, sent
    /// something other than an acknowledgement).
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A handshake frame couldn't be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),
}

/// Errors returned by [`Connection::send`](crate::Connection::send).
#[derive(Debug, thiserror::Error)]
pub enum SendError {
    /// Sends are only possible while `Connected`.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The socket rejected the write.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The frame couldn't be encoded.
    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_state() {
        let err = SendError::NotConnected(ConnectionState::Reconnecting);
        assert_eq!(err.to_string(), "not connected (state: Reconnecting)");

        let err = ConnectError::InvalidState(ConnectionState::Connecting);
        assert_eq!(err.to_string(), "cannot connect while Connecting");
    }

    #[test]
    fn test_timeout_message() {
        let err = ConnectError::Timeout(Duration::from_millis(250));
        assert_eq!(err.to_string(), "handshake timed out after 250ms");
    }
}
