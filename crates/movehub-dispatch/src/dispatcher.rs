//! The dispatcher and its handler/pending tables.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use movehub_connection::{
    Connection, ConnectionConfig, ConnectionEvent, ConnectionState, FrameSink,
};
use movehub_protocol::{Codec, Completion, Frame, Message};
use movehub_transport::Connector;
use tokio::sync::oneshot;
use tokio::time;
use tracing::{debug, warn};

use crate::{DispatchConfig, InvokeError};

/// A handler for inbound hub pushes.
///
/// Runs on the connection's reader task: keep it short, and hand
/// anything slow to a channel or a spawned task.
pub type Handler = Arc<dyn Fn(Message) + Send + Sync>;

type Reply = Result<Option<Message>, InvokeError>;

// ---------------------------------------------------------------------------
// DispatchTable
// ---------------------------------------------------------------------------

/// Handlers and in-flight invocations. This is the connection's
/// [`FrameSink`]: every inbound frame lands in [`DispatchTable::dispatch`].
struct DispatchTable {
    handlers: Mutex<HashMap<String, Handler>>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Reply>>>,
    next_id: AtomicU64,
}

impl DispatchTable {
    fn new() -> Self {
        Self {
            handlers: Mutex::new(HashMap::new()),
            pending: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn handlers(&self) -> MutexGuard<'_, HashMap<String, Handler>> {
        self.handlers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn pending(&self) -> MutexGuard<'_, HashMap<u64, oneshot::Sender<Reply>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn dispatch(&self, frame: Frame) {
        match frame {
            Frame::Invocation {
                invocation_id,
                target,
                arguments,
            } => {
                if let Some(id) = invocation_id {
                    debug!(id, %target, "hub asked for a reply; clients don't send one");
                }
                // Clone the handler out so it runs without the table locked;
                // a handler may register or unregister others.
                let handler = self.handlers().get(&target).cloned();
                match handler {
                    Some(handler) => handler(arguments),
                    None => warn!(%target, kind = arguments.kind(), "no handler registered; dropping"),
                }
            }
            Frame::Completion {
                invocation_id,
                result,
            } => self.complete(invocation_id, result),
            other => debug!(frame = ?other.frame_type(), "ignoring non-dispatch frame"),
        }
    }

    fn complete(&self, id: u64, result: Completion) {
        let Some(reply) = self.pending().remove(&id) else {
            debug!(id, "completion for unknown invocation; dropping");
            return;
        };
        let outcome = match result {
            Completion::Void => Ok(None),
            Completion::Value(msg) => Ok(Some(msg)),
            Completion::Error(e) => Err(InvokeError::Remote(e)),
        };
        // The caller may have given up already.
        let _ = reply.send(outcome);
    }

    /// Resolves every in-flight invocation with `ConnectionLost`.
    fn fail_all(&self) {
        let drained: Vec<_> = self.pending().drain().collect();
        if !drained.is_empty() {
            debug!(count = drained.len(), "failing pending invocations");
        }
        for (_, reply) in drained {
            let _ = reply.send(Err(InvokeError::ConnectionLost));
        }
    }
}

impl FrameSink for DispatchTable {
    fn on_frame(&self, frame: Frame) {
        self.dispatch(frame);
    }

    fn on_event(&self, event: &ConnectionEvent) {
        if matches!(
            event,
            ConnectionEvent::Disconnected { .. } | ConnectionEvent::Closed
        ) {
            self.fail_all();
        }
    }
}

/// Removes a pending entry when the invoking future finishes or is
/// dropped, whichever comes first.
struct PendingGuard<'a> {
    id: u64,
    table: &'a DispatchTable,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.table.pending().remove(&self.id);
    }
}

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Routes hub pushes to handlers and correlates calls with replies.
///
/// ## Example
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use movehub_connection::ConnectionConfig;
/// use movehub_dispatch::{DispatchConfig, Dispatcher};
/// use movehub_protocol::{methods, BinaryCodec, Message};
/// use movehub_transport::WebSocketConnector;
///
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let dispatcher = Dispatcher::new(
///     WebSocketConnector,
///     ConnectionConfig::new("http://localhost:5000/hub"),
///     DispatchConfig::default(),
///     Arc::new(BinaryCodec),
/// );
/// dispatcher.register(methods::RECEIVE_MESSAGE, |msg| println!("{msg:?}"));
/// dispatcher.connection().connect().await?;
///
/// let reply = dispatcher
///     .invoke(methods::SEND_MESSAGE, Message::Text("Hello World!".into()))
///     .await?;
/// println!("{reply:?}");
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher<K: Connector> {
    connection: Connection<K>,
    table: Arc<DispatchTable>,
    codec: Arc<dyn Codec>,
    config: DispatchConfig,
}

impl<K: Connector> Dispatcher<K> {
    /// Creates a dispatcher and the (disconnected) connection it owns.
    pub fn new(
        connector: K,
        connection_config: ConnectionConfig,
        config: DispatchConfig,
        codec: Arc<dyn Codec>,
    ) -> Self {
        let table = Arc::new(DispatchTable::new());
        let connection = Connection::new(
            connector,
            connection_config,
            Arc::clone(&codec),
            Arc::clone(&table) as Arc<dyn FrameSink>,
        );
        Self {
            connection,
            table,
            codec,
            config: config.validated(),
        }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &Connection<K> {
        &self.connection
    }

    /// The validated configuration in use.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Registers `handler` for pushes addressed to `target`, replacing
    /// any handler already registered for it.
    pub fn register<F>(&self, target: impl Into<String>, handler: F)
    where
        F: Fn(Message) + Send + Sync + 'static,
    {
        let target = target.into();
        if self
            .table
            .handlers()
            .insert(target.clone(), Arc::new(handler))
            .is_some()
        {
            debug!(%target, "replaced handler");
        }
    }

    /// Removes the handler for `target`. Returns whether one existed.
    pub fn unregister(&self, target: &str) -> bool {
        self.table.handlers().remove(target).is_some()
    }

    /// Calls `method` on the hub and waits for its completion.
    ///
    /// Returns `Ok(None)` for a call that completes without a value.
    /// Dropping the returned future abandons the call; a late completion
    /// is then discarded.
    ///
    /// # Errors
    /// - [`InvokeError::NotConnected`] if the connection isn't up
    /// - [`InvokeError::Timeout`] after the configured reply timeout
    /// - [`InvokeError::ConnectionLost`] if the connection drops first
    /// - [`InvokeError::Remote`] if the hub reports an error
    pub async fn invoke(&self, method: &str, arguments: Message) -> Result<Option<Message>, InvokeError> {
        let id = self.table.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply_tx, reply_rx) = oneshot::channel();

        // Register before checking the state: a disconnect racing with
        // this call then always finds the entry and fails it.
        self.table.pending().insert(id, reply_tx);
        let _guard = PendingGuard {
            id,
            table: &self.table,
        };

        let state = self.connection.state();
        if state != ConnectionState::Connected {
            return Err(InvokeError::NotConnected(state));
        }

        let frame = Frame::Invocation {
            invocation_id: Some(id),
            target: method.to_string(),
            arguments,
        };
        let bytes = self.codec.encode(&frame)?;
        self.connection.send(&bytes).await?;
        debug!(id, method, "invocation sent");

        let limit = self.config.reply_timeout;
        match time::timeout(limit, reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(InvokeError::ConnectionLost),
            Err(_) => {
                warn!(id, method, timeout = ?limit, "invocation timed out");
                Err(InvokeError::Timeout(limit))
            }
        }
    }

    /// Calls `method` without asking for a reply. Resolves once the
    /// frame is written.
    pub async fn send(&self, method: &str, arguments: Message) -> Result<(), InvokeError> {
        let frame = Frame::Invocation {
            invocation_id: None,
            target: method.to_string(),
            arguments,
        };
        let bytes = self.codec.encode(&frame)?;
        self.connection.send(&bytes).await?;
        debug!(method, "message sent");
        Ok(())
    }

    /// Decodes one inbound frame and routes it.
    ///
    /// The connection's reader does this for every frame it receives;
    /// this entry point exists for frames obtained some other way.
    /// Undecodable input is logged and dropped.
    pub fn dispatch_inbound(&self, data: &[u8]) {
        match self.codec.decode(data) {
            Ok(frame) => self.table.dispatch(frame),
            Err(e) => warn!(error = %e, len = data.len(), "dropping undecodable frame"),
        }
    }

    /// Number of invocations waiting for a completion.
    pub fn pending_invocations(&self) -> usize {
        self.table.pending().len()
    }
}
