/// Errors raised while moving bytes between client and hub.
///
/// The connection layer treats every variant except [`InvalidUrl`]
/// as "this socket is gone" and reconnects; [`InvalidUrl`] never gets
/// better by retrying.
///
/// [`InvalidUrl`]: TransportError::InvalidUrl
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The peer or the local side already closed this socket.
    #[error("socket closed: {0}")]
    ConnectionClosed(String),

    /// Dialing the hub (TCP connect + WebSocket upgrade) failed.
    #[error("could not reach hub: {0}")]
    ConnectFailed(#[source] std::io::Error),

    /// The URL has no scheme a connector can dial.
    #[error("unsupported hub url: {0}")]
    InvalidUrl(String),

    /// Writing a message failed.
    #[error("write failed: {0}")]
    SendFailed(#[source] std::io::Error),

    /// Reading a message failed.
    #[error("read failed: {0}")]
    ReceiveFailed(#[source] std::io::Error),

    /// The listener couldn't bind or accept (hub side).
    #[error("accept failed: {0}")]
    AcceptFailed(#[source] std::io::Error),

    /// The listener was shut down.
    #[error("listener shut down")]
    Shutdown,
}
