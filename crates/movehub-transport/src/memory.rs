//! In-process transport over tokio channels.
//!
//! Used by tests that need a real [`Socket`] without opening ports, in
//! particular tests that run with a paused clock. A [`MemoryConnector`]
//! and [`MemoryListener`] come as a pair from [`memory_transport`]; every
//! `connect` hands the far end of a fresh [`memory_pair`] to the listener.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, Mutex};

use crate::{Connector, Socket, SocketId, Transport, TransportError};

/// One end of an in-memory socket pair.
pub struct MemorySocket {
    id: SocketId,
    tx: std::sync::Mutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    rx: Mutex<mpsc::UnboundedReceiver<Vec<u8>>>,
}

/// Creates two connected sockets. Bytes sent on one arrive on the other.
pub fn memory_pair() -> (MemorySocket, MemorySocket) {
    let (a_tx, b_rx) = mpsc::unbounded_channel();
    let (b_tx, a_rx) = mpsc::unbounded_channel();
    (MemorySocket::new(a_tx, a_rx), MemorySocket::new(b_tx, b_rx))
}

impl MemorySocket {
    fn new(
        tx: mpsc::UnboundedSender<Vec<u8>>,
        rx: mpsc::UnboundedReceiver<Vec<u8>>,
    ) -> Self {
        Self {
            id: SocketId::next(),
            tx: std::sync::Mutex::new(Some(tx)),
            rx: Mutex::new(rx),
        }
    }

    fn sender(&self) -> Option<mpsc::UnboundedSender<Vec<u8>>> {
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Socket for MemorySocket {
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let tx = self
            .sender()
            .ok_or_else(|| TransportError::ConnectionClosed("socket closed".into()))?;
        tx.send(data.to_vec())
            .map_err(|_| TransportError::ConnectionClosed("peer dropped".into()))
    }

    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        Ok(self.rx.lock().await.recv().await)
    }

    async fn close(&self) -> Result<(), TransportError> {
        // Dropping the sender ends the peer's stream once it has drained.
        self.tx
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        Ok(())
    }

    fn id(&self) -> SocketId {
        self.id
    }
}

#[derive(Debug, Default)]
struct ListenerState {
    shut_down: AtomicBool,
    refusing: AtomicBool,
    attempts: AtomicU64,
}

/// Client side of an in-memory transport.
#[derive(Clone)]
pub struct MemoryConnector {
    incoming: mpsc::UnboundedSender<MemorySocket>,
    state: Arc<ListenerState>,
}

/// Hub side of an in-memory transport.
pub struct MemoryListener {
    incoming: mpsc::UnboundedReceiver<MemorySocket>,
    state: Arc<ListenerState>,
}

/// Creates a connected connector/listener pair.
pub fn memory_transport() -> (MemoryConnector, MemoryListener) {
    let (tx, rx) = mpsc::unbounded_channel();
    let state = Arc::new(ListenerState::default());
    (
        MemoryConnector {
            incoming: tx,
            state: Arc::clone(&state),
        },
        MemoryListener {
            incoming: rx,
            state,
        },
    )
}

impl MemoryConnector {
    /// While `true`, every `connect` fails as if the hub were down.
    pub fn set_refusing(&self, refusing: bool) {
        self.state.refusing.store(refusing, Ordering::SeqCst);
    }

    /// Number of `connect` calls made so far, successful or not.
    pub fn connect_attempts(&self) -> u64 {
        self.state.attempts.load(Ordering::SeqCst)
    }
}

impl Connector for MemoryConnector {
    type Socket = MemorySocket;

    async fn connect(&self, url: &str) -> Result<MemorySocket, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = || {
            TransportError::ConnectFailed(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                format!("no memory listener for {url}"),
            ))
        };
        if self.state.refusing.load(Ordering::SeqCst)
            || self.state.shut_down.load(Ordering::SeqCst)
        {
            return Err(refused());
        }
        let (local, remote) = memory_pair();
        self.incoming.send(remote).map_err(|_| refused())?;
        tracing::debug!(id = %local.id(), url, "memory socket connected");
        Ok(local)
    }
}

impl Transport for MemoryListener {
    type Socket = MemorySocket;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<MemorySocket, TransportError> {
        if self.state.shut_down.load(Ordering::SeqCst) {
            return Err(TransportError::Shutdown);
        }
        self.incoming.recv().await.ok_or(TransportError::Shutdown)
    }

    async fn shutdown(&self) -> Result<(), TransportError> {
        self.state.shut_down.store(true, Ordering::SeqCst);
        Ok(())
    }
}
