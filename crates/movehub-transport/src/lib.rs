//! Transport abstraction layer for movehub.
//!
//! Provides the [`Socket`], [`Connector`] and [`Transport`] traits that
//! abstract over how bytes move between a client and a hub.
//!
//! - A [`Socket`] is one established, bidirectional byte-message stream.
//! - A [`Connector`] dials a URL and produces a socket (client side).
//! - A [`Transport`] accepts incoming sockets (hub side; used by test
//!   hubs and tools).
//!
//! # Feature Flags
//!
//! - `websocket` (default): WebSocket transport via `tokio-tungstenite`
//! - `memory`: in-process socket pairs over tokio channels, for tests

#![allow(async_fn_in_trait)]

mod error;
#[cfg(feature = "memory")]
mod memory;
#[cfg(feature = "websocket")]
mod websocket;

pub use error::TransportError;
#[cfg(feature = "memory")]
pub use memory::{memory_pair, memory_transport, MemoryConnector, MemoryListener, MemorySocket};
#[cfg(feature = "websocket")]
pub use websocket::{
    websocket_url, WebSocketConnector, WebSocketSocket, WebSocketTransport,
};

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counter for generating unique socket IDs across all transports.
static NEXT_SOCKET_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identifier for a socket. Only used to correlate log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SocketId(u64);

impl SocketId {
    /// Creates a new `SocketId` from a raw `u64`.
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Allocates the next process-unique id.
    pub fn next() -> Self {
        Self(NEXT_SOCKET_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Returns the underlying `u64` value.
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SocketId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sock-{}", self.0)
    }
}

/// A single established socket that can send and receive byte messages.
///
/// # Contract
///
/// - `send` may be called from several tasks at once; implementations
///   serialize writes so frames never interleave.
/// - `recv` is called by one reader task only and must be cancel-safe:
///   dropping the future before it completes must not lose a message.
///   The connection's reader loop races `recv` against timers.
/// - `close` releases the underlying handle. Calling it twice is fine.
///
/// The methods return `impl Future + Send` (rather than `async fn`) so
/// generic code can hold a socket inside a spawned Tokio task.
pub trait Socket: Send + Sync + 'static {
    /// Sends one message to the remote peer.
    fn send(
        &self,
        data: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Receives the next message from the remote peer.
    ///
    /// Returns `Ok(None)` when the connection is cleanly closed.
    fn recv(
        &self,
    ) -> impl Future<Output = Result<Option<Vec<u8>>, TransportError>> + Send;

    /// Closes the socket.
    fn close(&self) -> impl Future<Output = Result<(), TransportError>> + Send;

    /// Returns the unique identifier for this socket.
    fn id(&self) -> SocketId;
}

/// Dials a hub and produces a [`Socket`].
///
/// The connection calls this once on `connect()` and again for every
/// reconnection attempt, always with the same URL.
pub trait Connector: Send + Sync + 'static {
    /// The socket type produced by this connector.
    type Socket: Socket;

    /// Opens a new socket to `url`.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = Result<Self::Socket, TransportError>> + Send;
}

/// Accepts new incoming sockets.
pub trait Transport: Send + Sync + 'static {
    /// The socket type produced by this transport.
    type Socket: Socket;
    /// The error type for transport operations.
    type Error: std::error::Error + Send + Sync;

    /// Waits for and accepts the next incoming socket.
    async fn accept(&mut self) -> Result<Self::Socket, Self::Error>;

    /// Gracefully shuts down the transport, stopping new sockets.
    async fn shutdown(&self) -> Result<(), Self::Error>;
}
