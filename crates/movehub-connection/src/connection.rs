//! The connection: one socket at a time, a reader task per socket, and
//! the reconnection loop.
//!
//! # Concurrency
//!
//! All mutable state (lifecycle state, current socket, generation) lives
//! behind one short-lived `std::sync::Mutex` that is never held across an
//! `.await`. Every established socket gets a *generation* number; the
//! reader task for generation `n` may only tear down generation `n`, so a
//! slow reader can never report the loss of a socket that was already
//! replaced or closed. That is what makes `Disconnected` fire exactly
//! once per loss.
//!
//! `close()` flips a `watch` flag that every reader, backoff sleep and
//! in-flight handshake selects on, so it takes effect immediately
//! whatever the connection is doing. Dropping the last [`Connection`]
//! handle flips the same flag: the reader task then closes its socket
//! and exits instead of pinging and reconnecting for nobody.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use movehub_protocol::{Codec, Frame, PROTOCOL_VERSION};
use movehub_transport::{Connector, Socket};
use tokio::sync::{broadcast, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    ConnectError, ConnectionConfig, ConnectionEvent, ConnectionState, DisconnectReason, FrameSink,
    SendError,
};

/// Buffered events per [`Connection::subscribe`] receiver.
const EVENT_CAPACITY: usize = 64;

/// Stand-in deadline when `now + duration` does not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A client connection to a hub.
///
/// Cheap to clone: clones share the same socket and state. When the last
/// clone is dropped the background reader closes the socket and stops.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use movehub_connection::{Connection, ConnectionConfig, FrameSink};
/// use movehub_protocol::{BinaryCodec, Frame};
/// use movehub_transport::WebSocketConnector;
///
/// struct Print;
/// impl FrameSink for Print {
///     fn on_frame(&self, frame: Frame) {
///         println!("{frame:?}");
///     }
/// }
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let conn = Connection::new(
///     WebSocketConnector,
///     ConnectionConfig::new("http://localhost:5000/hub"),
///     Arc::new(BinaryCodec),
///     Arc::new(Print),
/// );
/// conn.connect().await?;
/// conn.send_frame(&Frame::Ping).await?;
/// conn.close().await;
/// # Ok(())
/// # }
/// ```
pub struct Connection<K: Connector> {
    inner: Arc<Inner<K>>,
    _owner: Arc<OwnerGuard<K>>,
}

impl<K: Connector> Clone for Connection<K> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            _owner: Arc::clone(&self._owner),
        }
    }
}

/// Shared by every [`Connection`] handle, never by the reader task. When
/// the last handle goes away it raises the shutdown flag.
struct OwnerGuard<K: Connector> {
    inner: Weak<Inner<K>>,
}

impl<K: Connector> Drop for OwnerGuard<K> {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.upgrade() {
            inner.shutdown.send_replace(true);
        }
    }
}

struct Shared<S> {
    state: ConnectionState,
    socket: Option<Arc<S>>,
    generation: u64,
}

struct Inner<K: Connector> {
    connector: K,
    config: ConnectionConfig,
    codec: Arc<dyn Codec>,
    sink: Arc<dyn FrameSink>,
    shared: Mutex<Shared<K::Socket>>,
    state_tx: watch::Sender<ConnectionState>,
    events: broadcast::Sender<ConnectionEvent>,
    shutdown: watch::Sender<bool>,
}

impl<K: Connector> Connection<K> {
    /// Creates a disconnected connection. Nothing is dialed until
    /// [`connect`](Self::connect).
    ///
    /// The config is passed through [`ConnectionConfig::validated`].
    pub fn new(
        connector: K,
        config: ConnectionConfig,
        codec: Arc<dyn Codec>,
        sink: Arc<dyn FrameSink>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown, _) = watch::channel(false);
        let inner = Arc::new(Inner {
            connector,
            config: config.validated(),
            codec,
            sink,
            shared: Mutex::new(Shared {
                state: ConnectionState::Disconnected,
                socket: None,
                generation: 0,
            }),
            state_tx,
            events,
            shutdown,
        });
        let owner = Arc::new(OwnerGuard {
            inner: Arc::downgrade(&inner),
        });
        Self {
            inner,
            _owner: owner,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    /// A receiver that always holds the latest state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state_tx.subscribe()
    }

    /// Subscribes to lifecycle events from this point on.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.inner.events.subscribe()
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// The codec shared by every frame on this connection.
    pub fn codec(&self) -> &Arc<dyn Codec> {
        &self.inner.codec
    }

    /// Dials the hub and performs the handshake.
    ///
    /// `Disconnected → Connecting → Connected`. On failure the socket is
    /// closed and the state returns to `Disconnected`. A no-op when
    /// already connected.
    ///
    /// # Errors
    /// - [`ConnectError::Closed`] after [`close`](Self::close)
    /// - [`ConnectError::InvalidState`] while connecting or reconnecting
    /// - dial, handshake and timeout failures
    pub async fn connect(&self) -> Result<(), ConnectError> {
        let inner = &self.inner;
        {
            let mut shared = inner.lock();
            match shared.state {
                ConnectionState::Connected => return Ok(()),
                ConnectionState::Closed => return Err(ConnectError::Closed),
                ConnectionState::Disconnected => {
                    inner.set_state(&mut shared, ConnectionState::Connecting);
                }
                other => return Err(ConnectError::InvalidState(other)),
            }
        }

        info!(url = %inner.config.url, "connecting");
        match inner.establish().await {
            Ok(socket) => {
                if inner.install(socket, ConnectionEvent::Connected).await {
                    info!(url = %inner.config.url, "connected");
                    Ok(())
                } else {
                    Err(ConnectError::Closed)
                }
            }
            Err(e) => {
                inner.transition(ConnectionState::Connecting, ConnectionState::Disconnected);
                warn!(url = %inner.config.url, error = %e, "connect failed");
                Err(e)
            }
        }
    }

    /// Sends raw bytes. Only allowed while `Connected`.
    pub async fn send(&self, data: &[u8]) -> Result<(), SendError> {
        let socket = self.inner.current_socket()?;
        socket.send(data).await?;
        Ok(())
    }

    /// Encodes `frame` with the connection's codec and sends it.
    pub async fn send_frame(&self, frame: &Frame) -> Result<(), SendError> {
        let bytes = self.inner.codec.encode(frame)?;
        self.send(&bytes).await
    }

    /// Closes the connection for good.
    ///
    /// Stops the reader, cancels any reconnection in progress, and
    /// releases the socket. Calling it again does nothing.
    pub async fn close(&self) {
        let inner = &self.inner;
        let socket = {
            let mut shared = inner.lock();
            if !inner.set_state(&mut shared, ConnectionState::Closed) {
                return;
            }
            shared.socket.take()
        };
        inner.shutdown.send_replace(true);

        if let Some(socket) = socket {
            if let Err(e) = socket.close().await {
                debug!(id = %socket.id(), error = %e, "error closing socket");
            }
        }
        inner.emit(ConnectionEvent::Closed);
        info!(url = %inner.config.url, "connection closed");
    }
}

impl<K: Connector> Inner<K> {
    fn lock(&self) -> MutexGuard<'_, Shared<K::Socket>> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies a transition if the state machine allows it.
    fn set_state(&self, shared: &mut Shared<K::Socket>, to: ConnectionState) -> bool {
        if !shared.state.can_transition_to(to) {
            return false;
        }
        debug!(from = %shared.state, %to, "state change");
        shared.state = to;
        self.state_tx.send_replace(to);
        true
    }

    /// `from → to`, only if the connection is currently in `from`.
    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let mut shared = self.lock();
        shared.state == from && self.set_state(&mut shared, to)
    }

    fn emit(&self, event: ConnectionEvent) {
        self.sink.on_event(&event);
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    fn current_socket(&self) -> Result<Arc<K::Socket>, SendError> {
        let shared = self.lock();
        match (&shared.socket, shared.state) {
            (Some(socket), ConnectionState::Connected) => Ok(Arc::clone(socket)),
            (_, state) => Err(SendError::NotConnected(state)),
        }
    }

    /// Dials and handshakes. Closes the socket on every failure path.
    async fn establish(&self) -> Result<Arc<K::Socket>, ConnectError> {
        let mut shutdown = self.shutdown.subscribe();

        let socket = tokio::select! {
            _ = shutdown_signal(&mut shutdown) => return Err(ConnectError::Closed),
            dialed = self.connector.connect(&self.config.url) => dialed?,
        };

        let limit = self.config.handshake_timeout;
        let outcome = tokio::select! {
            _ = shutdown_signal(&mut shutdown) => Err(ConnectError::Closed),
            result = time::timeout(limit, self.handshake(&socket)) => {
                result.unwrap_or(Err(ConnectError::Timeout(limit)))
            }
        };

        match outcome {
            Ok(()) => {
                debug!(id = %socket.id(), "handshake complete");
                Ok(Arc::new(socket))
            }
            Err(e) => {
                if let Err(close_err) = socket.close().await {
                    debug!(id = %socket.id(), error = %close_err, "error closing socket");
                }
                Err(e)
            }
        }
    }

    async fn handshake(&self, socket: &K::Socket) -> Result<(), ConnectError> {
        let hello = Frame::Handshake {
            protocol: self.codec.name().to_string(),
            version: PROTOCOL_VERSION,
        };
        socket.send(&self.codec.encode(&hello)?).await?;

        loop {
            let Some(bytes) = socket.recv().await? else {
                return Err(ConnectError::Handshake(
                    "connection closed during handshake".into(),
                ));
            };
            match self.codec.decode(&bytes)? {
                Frame::HandshakeAck { error: None } => return Ok(()),
                Frame::HandshakeAck { error: Some(e) } => return Err(ConnectError::Rejected(e)),
                Frame::Ping => continue,
                Frame::Close { error, .. } => {
                    return Err(ConnectError::Rejected(
                        error.unwrap_or_else(|| "closed by hub".into()),
                    ));
                }
                other => {
                    return Err(ConnectError::Handshake(format!(
                        "expected handshake ack, got {:?}",
                        other.frame_type()
                    )));
                }
            }
        }
    }

    /// Makes `socket` the current one and starts its reader.
    ///
    /// Returns `false` (and closes the socket) if the connection was
    /// closed while the socket was being established.
    async fn install(self: &Arc<Self>, socket: Arc<K::Socket>, event: ConnectionEvent) -> bool {
        let generation = {
            let mut shared = self.lock();
            if shared.state == ConnectionState::Connecting
                && self.set_state(&mut shared, ConnectionState::Connected)
            {
                shared.generation += 1;
                shared.socket = Some(Arc::clone(&socket));
                Some(shared.generation)
            } else {
                None
            }
        };

        match generation {
            Some(generation) => {
                self.emit(event);
                self.spawn_reader(socket, generation);
                true
            }
            None => {
                if let Err(e) = socket.close().await {
                    debug!(id = %socket.id(), error = %e, "error closing socket");
                }
                false
            }
        }
    }

    fn spawn_reader(self: &Arc<Self>, socket: Arc<K::Socket>, generation: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.read_loop(socket, generation).await;
        });
    }

    /// Reads frames until the socket is lost or the connection closed.
    ///
    /// Also owns keep-alive: a `Ping` every `keep_alive_interval`, and a
    /// disconnect if nothing arrives for `server_timeout`.
    async fn read_loop(self: Arc<Self>, socket: Arc<K::Socket>, generation: u64) {
        let id = socket.id();
        let mut shutdown = self.shutdown.subscribe();
        let keep_alive = self.config.keep_alive_interval;
        let server_timeout = self.config.server_timeout;

        let mut ping = time::interval_at(deadline_after(keep_alive), keep_alive);
        ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut deadline = deadline_after(server_timeout);
        debug!(%id, generation, "reader started");

        let reason = loop {
            tokio::select! {
                _ = shutdown_signal(&mut shutdown) => {
                    debug!(%id, "reader stopped by shutdown");
                    self.abandon(generation).await;
                    return;
                }
                _ = time::sleep_until(deadline) => {
                    break DisconnectReason::ServerTimeout(server_timeout);
                }
                _ = ping.tick() => {
                    let sent = match self.codec.encode(&Frame::Ping) {
                        Ok(bytes) => socket.send(&bytes).await.map_err(|e| e.to_string()),
                        Err(e) => Err(e.to_string()),
                    };
                    if let Err(e) = sent {
                        break DisconnectReason::Transport(e);
                    }
                }
                received = socket.recv() => match received {
                    Ok(Some(bytes)) => {
                        deadline = deadline_after(server_timeout);
                        match self.codec.decode(&bytes) {
                            Ok(Frame::Ping) => {}
                            Ok(Frame::Close { error, allow_reconnect }) => {
                                break DisconnectReason::HubClosed { error, allow_reconnect };
                            }
                            Ok(frame @ (Frame::Invocation { .. } | Frame::Completion { .. })) => {
                                self.sink.on_frame(frame);
                            }
                            Ok(other) => {
                                debug!(%id, frame = ?other.frame_type(), "ignoring late handshake frame");
                            }
                            Err(e) => {
                                warn!(%id, error = %e, len = bytes.len(), "dropping malformed frame");
                            }
                        }
                    }
                    Ok(None) => break DisconnectReason::PeerClosed,
                    Err(e) => break DisconnectReason::Transport(e.to_string()),
                },
            }
        };

        self.connection_lost(generation, reason).await;
    }

    /// Releases this generation's socket when shutdown came from the last
    /// handle being dropped. After `close()` the socket is already gone
    /// and this does nothing.
    async fn abandon(&self, generation: u64) {
        let socket = {
            let mut shared = self.lock();
            if shared.generation != generation
                || !self.set_state(&mut shared, ConnectionState::Closed)
            {
                return;
            }
            shared.socket.take()
        };

        if let Some(socket) = socket {
            if let Err(e) = socket.close().await {
                debug!(id = %socket.id(), error = %e, "error closing abandoned socket");
            }
        }
        self.emit(ConnectionEvent::Closed);
        info!(url = %self.config.url, "all handles dropped, connection closed");
    }

    async fn connection_lost(self: &Arc<Self>, generation: u64, reason: DisconnectReason) {
        let reconnect = self.config.reconnect.enabled && reason.allows_reconnect();
        let socket = {
            let mut shared = self.lock();
            if shared.generation != generation || shared.state != ConnectionState::Connected {
                return;
            }
            let next = if reconnect {
                ConnectionState::Reconnecting
            } else {
                ConnectionState::Disconnected
            };
            self.set_state(&mut shared, next);
            shared.socket.take()
        };

        if let Some(socket) = socket {
            if let Err(e) = socket.close().await {
                debug!(id = %socket.id(), error = %e, "error closing lost socket");
            }
        }
        warn!(%reason, reconnect, "connection lost");
        self.emit(ConnectionEvent::Disconnected { reason });

        if reconnect {
            self.reconnect_loop().await;
        }
    }

    /// Retries with backoff until connected, closed, or out of attempts.
    async fn reconnect_loop(self: &Arc<Self>) {
        let policy = &self.config.reconnect;
        let mut shutdown = self.shutdown.subscribe();
        let mut attempts: u32 = 0;

        loop {
            if self.lock().state != ConnectionState::Reconnecting {
                return;
            }
            if !policy.allows_attempt(attempts) {
                if self.transition(ConnectionState::Reconnecting, ConnectionState::Disconnected) {
                    warn!(attempts, "giving up reconnecting");
                    self.emit(ConnectionEvent::ReconnectFailed { attempts });
                }
                return;
            }

            attempts += 1;
            let delay = policy.delay_for(attempts);
            info!(attempt = attempts, ?delay, "reconnecting");
            self.emit(ConnectionEvent::Reconnecting {
                attempt: attempts,
                delay,
            });

            tokio::select! {
                _ = shutdown_signal(&mut shutdown) => {
                    // Already `Closed` after close(); this covers dropped handles.
                    self.transition(ConnectionState::Reconnecting, ConnectionState::Closed);
                    return;
                }
                _ = time::sleep(delay) => {}
            }

            if !self.transition(ConnectionState::Reconnecting, ConnectionState::Connecting) {
                return;
            }
            match self.establish().await {
                Ok(socket) => {
                    if self.install(socket, ConnectionEvent::Reconnected).await {
                        info!(attempts, "reconnected");
                    }
                    return;
                }
                Err(e) => {
                    warn!(attempt = attempts, error = %e, "reconnect attempt failed");
                    if !self.transition(ConnectionState::Connecting, ConnectionState::Reconnecting) {
                        return;
                    }
                }
            }
        }
    }
}

/// `now + duration`, or a far-future instant if that would overflow.
fn deadline_after(duration: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(duration)
        .unwrap_or_else(|| now + FAR_FUTURE)
}

/// Resolves once `close()` has been called or every handle dropped.
async fn shutdown_signal(rx: &mut watch::Receiver<bool>) {
    // Err means the sender is gone, which also means shutting down.
    let _ = rx.wait_for(|closed| *closed).await;
}
