//! [`HubClient`] and its builder.
//!
//! This is the entry point for talking to a hub. It ties together all
//! the layers: transport → protocol → connection → dispatcher → groups.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use movehub_connection::{ConnectionConfig, ConnectionEvent, ConnectionState, ReconnectPolicy};
use movehub_dispatch::{DispatchConfig, Dispatcher};
use movehub_groups::GroupRegistry;
use movehub_protocol::{methods, BinaryCodec, Codec, DataMap, Message, Move, MoveKind, MoveSequencer};
use movehub_transport::{websocket_url, Connector, WebSocketConnector};
use tokio::sync::{broadcast, watch};
use tracing::{debug, info};

use crate::handlers::{move_handler, move_reply, moves_handler, moves_reply, text_handler, text_reply};
use crate::HubError;

/// Builder for configuring a [`HubClient`].
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use movehub::prelude::*;
///
/// # async fn run() -> Result<(), HubError> {
/// let client = HubClient::builder("https://hub.example.com/game")
///     .reply_timeout(Duration::from_secs(10))
///     .build()?;
/// client.connect().await?;
/// # Ok(())
/// # }
/// ```
pub struct HubClientBuilder {
    connection: ConnectionConfig,
    dispatch: DispatchConfig,
    codec: Arc<dyn Codec>,
}

impl HubClientBuilder {
    /// Creates a builder for the hub at `url`, with default settings and
    /// the binary codec.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            connection: ConnectionConfig::new(url),
            dispatch: DispatchConfig::default(),
            codec: Arc::new(BinaryCodec),
        }
    }

    /// Sets the codec announced in the handshake and used for every frame.
    pub fn codec(mut self, codec: impl Codec) -> Self {
        self.codec = Arc::new(codec);
        self
    }

    /// Replaces the connection settings. The builder's URL is kept.
    pub fn connection_config(mut self, config: ConnectionConfig) -> Self {
        self.connection = ConnectionConfig {
            url: self.connection.url,
            ..config
        };
        self
    }

    /// Sets the reconnection policy.
    pub fn reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.connection.reconnect = policy;
        self
    }

    /// Sets the dispatcher settings.
    pub fn dispatch_config(mut self, config: DispatchConfig) -> Self {
        self.dispatch = config;
        self
    }

    /// Sets how long a hub call waits for its reply.
    pub fn reply_timeout(mut self, timeout: Duration) -> Self {
        self.dispatch.reply_timeout = timeout;
        self
    }

    /// Builds a client that dials the hub over WebSocket.
    ///
    /// `http://` and `https://` URLs are accepted and mapped to `ws://`
    /// and `wss://`. Must be called inside a Tokio runtime.
    ///
    /// # Errors
    /// Returns [`HubError::Transport`] if the URL has no usable scheme.
    pub fn build(self) -> Result<HubClient<WebSocketConnector>, HubError> {
        websocket_url(&self.connection.url)?;
        Ok(self.build_with(WebSocketConnector::new()))
    }

    /// Builds a client that dials through `connector`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn build_with<K: Connector>(self, connector: K) -> HubClient<K> {
        debug!(url = %self.connection.url, codec = self.codec.name(), "building hub client");
        let dispatcher = Arc::new(Dispatcher::new(
            connector,
            self.connection,
            self.dispatch,
            self.codec,
        ));
        let groups = GroupRegistry::new(Arc::clone(&dispatcher));
        HubClient {
            dispatcher,
            groups,
            sequencer: Arc::new(Mutex::new(MoveSequencer::new())),
        }
    }
}

/// A client of one hub.
///
/// Cheap to clone; clones share the connection, the handlers, and the
/// group records.
pub struct HubClient<K: Connector = WebSocketConnector> {
    dispatcher: Arc<Dispatcher<K>>,
    groups: Arc<GroupRegistry<K>>,
    sequencer: Arc<Mutex<MoveSequencer>>,
}

impl<K: Connector> Clone for HubClient<K> {
    fn clone(&self) -> Self {
        Self {
            dispatcher: Arc::clone(&self.dispatcher),
            groups: Arc::clone(&self.groups),
            sequencer: Arc::clone(&self.sequencer),
        }
    }
}

impl HubClient<WebSocketConnector> {
    /// Creates a new builder for the hub at `url`.
    pub fn builder(url: impl Into<String>) -> HubClientBuilder {
        HubClientBuilder::new(url)
    }
}

impl<K: Connector> HubClient<K> {
    // -- Lifecycle ---------------------------------------------------------

    /// Connects to the hub and completes the handshake.
    ///
    /// Does nothing if already connected. When this reopens a connection
    /// that gave up reconnecting, groups joined earlier are joined again
    /// before it returns.
    ///
    /// # Errors
    /// Returns [`HubError::Connect`] if the hub can't be reached, rejects
    /// the handshake, or the client was closed.
    pub async fn connect(&self) -> Result<(), HubError> {
        let connection = self.dispatcher.connection();
        if connection.state().is_connected() {
            return Ok(());
        }
        connection.connect().await?;

        let rejoined = self.groups.replay().await;
        if rejoined > 0 {
            info!(rejoined, "restored group memberships");
        }
        Ok(())
    }

    /// Closes the client for good. Pending calls fail, group records are
    /// dropped, and any reconnection in progress stops. Idempotent.
    pub async fn close(&self) {
        self.dispatcher.connection().close().await;
    }

    /// The current connection state.
    pub fn state(&self) -> ConnectionState {
        self.dispatcher.connection().state()
    }

    /// A receiver that always holds the latest connection state.
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.dispatcher.connection().state_changes()
    }

    /// Subscribes to connection lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.dispatcher.connection().subscribe()
    }

    /// The dispatcher underneath, for raw invocations.
    pub fn dispatcher(&self) -> &Dispatcher<K> {
        &self.dispatcher
    }

    /// The group registry underneath.
    pub fn groups(&self) -> &GroupRegistry<K> {
        &self.groups
    }

    // -- Outbound calls ----------------------------------------------------

    /// Calls `SendMessage` and returns the hub's reply text, if any.
    pub async fn send_message(&self, text: &str) -> Result<Option<String>, HubError> {
        let reply = self
            .dispatcher
            .invoke(methods::SEND_MESSAGE, Message::Text(text.to_string()))
            .await?;
        text_reply(methods::SEND_MESSAGE, reply)
    }

    /// Calls `SendDictionary`. Resolves once the hub has processed it.
    pub async fn send_dictionary(
        &self,
        data: DataMap,
        timestamp: DateTime<Utc>,
    ) -> Result<(), HubError> {
        let reply = self
            .dispatcher
            .invoke(methods::SEND_DICTIONARY, Message::KeyValue { data, timestamp })
            .await?;
        if let Some(value) = reply {
            debug!(got = value.kind(), "ignoring SendDictionary reply value");
        }
        Ok(())
    }

    /// Calls `SendMove` and returns the move the hub echoes back, if any.
    pub async fn send_move(&self, mv: Move) -> Result<Option<Move>, HubError> {
        let reply = self
            .dispatcher
            .invoke(methods::SEND_MOVE, Message::Move(mv))
            .await?;
        move_reply(methods::SEND_MOVE, reply)
    }

    /// Calls `SendMoves` and returns the hub's move list, if any.
    pub async fn send_moves(&self, moves: Vec<Move>) -> Result<Option<Vec<Move>>, HubError> {
        let reply = self
            .dispatcher
            .invoke(methods::SEND_MOVES, Message::MoveList(moves))
            .await?;
        moves_reply(methods::SEND_MOVES, reply)
    }

    /// Joins `group`. See [`GroupRegistry::join`].
    pub async fn join_group(&self, group: &str) -> Result<(), HubError> {
        Ok(self.groups.join(group).await?)
    }

    /// Leaves `group`. See [`GroupRegistry::leave`].
    pub async fn leave_group(&self, group: &str) -> Result<(), HubError> {
        Ok(self.groups.leave(group).await?)
    }

    /// Stamps a new move with this client's next sequence number and a
    /// timestamp no older than the previous move's.
    pub fn next_move(&self, kind: MoveKind, data: DataMap) -> Move {
        self.sequencer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_move(kind, data)
    }

    // -- Inbound pushes ----------------------------------------------------

    /// Handles `ReceiveMessage` pushes, replacing any previous handler.
    pub fn on_receive_message<F>(&self, handler: F)
    where
        F: Fn(String) + Send + Sync + 'static,
    {
        self.dispatcher.register(
            methods::RECEIVE_MESSAGE,
            text_handler(methods::RECEIVE_MESSAGE, handler),
        );
    }

    /// Handles `ReceiveMove` pushes, replacing any previous handler.
    pub fn on_receive_move<F>(&self, handler: F)
    where
        F: Fn(Move) + Send + Sync + 'static,
    {
        self.dispatcher.register(
            methods::RECEIVE_MOVE,
            move_handler(methods::RECEIVE_MOVE, handler),
        );
    }

    /// Handles `ReceiveMoves` pushes, replacing any previous handler.
    pub fn on_receive_moves<F>(&self, handler: F)
    where
        F: Fn(Vec<Move>) + Send + Sync + 'static,
    {
        self.dispatcher.register(
            methods::RECEIVE_MOVES,
            moves_handler(methods::RECEIVE_MOVES, handler),
        );
    }

    /// Handles pushes addressed to `target` with the raw payload.
    ///
    /// Handlers run on the connection's reader task and must not block.
    pub fn on<F>(&self, target: impl Into<String>, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        self.dispatcher.register(target, handler);
    }

    /// Removes the handler for `target`. Returns whether one existed.
    pub fn off(&self, target: &str) -> bool {
        self.dispatcher.unregister(target)
    }
}
