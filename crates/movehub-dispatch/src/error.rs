//! Error types for the dispatch layer.

use std::time::Duration;

use movehub_connection::{ConnectionState, SendError};
use movehub_protocol::ProtocolError;

/// Why an invocation failed.
#[derive(Debug, thiserror::Error)]
pub enum InvokeError {
    /// No completion arrived within the reply timeout.
    #[error("no reply within {0:?}")]
    Timeout(Duration),

    /// The connection wasn't `Connected` when the call was made.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The connection dropped while waiting for the reply.
    #[error("connection lost before the reply arrived")]
    ConnectionLost,

    /// The hub completed the call with an error.
    #[error("hub error: {0}")]
    Remote(String),

    /// Writing the invocation to the socket failed.
    #[error("send failed: {0}")]
    Send(#[source] SendError),

    /// The arguments couldn't be encoded.
    #[error("encode failed: {0}")]
    Encode(#[from] ProtocolError),
}

impl From<SendError> for InvokeError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NotConnected(state) => Self::NotConnected(state),
            SendError::Encode(e) => Self::Encode(e),
            other => Self::Send(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_error_not_connected_maps_to_not_connected() {
        let err: InvokeError = SendError::NotConnected(ConnectionState::Reconnecting).into();
        assert!(matches!(err, InvokeError::NotConnected(ConnectionState::Reconnecting)));
    }

    #[test]
    fn test_display() {
        assert_eq!(
            InvokeError::Timeout(Duration::from_millis(500)).to_string(),
            "no reply within 500ms"
        );
        assert_eq!(
            InvokeError::Remote("no such group".into()).to_string(),
            "hub error: no such group"
        );
    }
}
