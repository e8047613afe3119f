//! A mock hub for end-to-end client tests.
//!
//! It speaks the hub side of the protocol over either transport: acks the
//! handshake in whichever codec the client announced, answers pings,
//! records every invocation, and completes reply-expecting calls by
//! echoing the argument back (or with a scripted completion).

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use movehub::protocol::{
    methods, peek_frame_type, BinaryCodec, Codec, Completion, Frame, FrameType, JsonCodec, Message,
};
use movehub::transport::{
    memory_transport, MemoryConnector, Socket, Transport, WebSocketTransport,
};
use tokio::sync::mpsc;

/// One invocation the hub received.
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub target: String,
    pub arguments: Message,
    pub expects_reply: bool,
}

enum Outbound {
    Frame(Frame),
    Hangup,
}

struct HubShared {
    calls: mpsc::UnboundedSender<Call>,
    ended: mpsc::UnboundedSender<()>,
    scripted: Mutex<HashMap<String, Completion>>,
    outbox: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

impl HubShared {
    fn completion_for(&self, target: &str, arguments: Message) -> Completion {
        if let Some(scripted) = self.scripted.lock().unwrap().get(target) {
            return scripted.clone();
        }
        match target {
            methods::SEND_MESSAGE | methods::SEND_MOVE | methods::SEND_MOVES => {
                Completion::Value(arguments)
            }
            _ => Completion::Void,
        }
    }

    fn outbound(&self, item: Outbound) {
        let outbox = self.outbox.lock().unwrap();
        outbox
            .as_ref()
            .expect("no client connected")
            .send(item)
            .map_err(|_| ())
            .expect("client connection is gone");
    }
}

pub struct MockHub {
    calls: mpsc::UnboundedReceiver<Call>,
    ended: mpsc::UnboundedReceiver<()>,
    shared: Arc<HubShared>,
}

impl MockHub {
    fn new() -> (Self, Arc<HubShared>) {
        let (tx, calls) = mpsc::unbounded_channel();
        let (ended_tx, ended) = mpsc::unbounded_channel();
        let shared = Arc::new(HubShared {
            calls: tx,
            ended: ended_tx,
            scripted: Mutex::new(HashMap::new()),
            outbox: Mutex::new(None),
        });
        (
            Self {
                calls,
                ended,
                shared: Arc::clone(&shared),
            },
            shared,
        )
    }

    /// A hub reachable through the returned in-memory connector.
    pub fn memory() -> (Self, MemoryConnector) {
        let (connector, mut listener) = memory_transport();
        let (hub, shared) = Self::new();
        tokio::spawn(async move {
            while let Ok(sock) = listener.accept().await {
                tokio::spawn(serve(sock, Arc::clone(&shared)));
            }
        });
        (hub, connector)
    }

    /// A hub listening for WebSocket clients on a local port. Returns
    /// its `http://` URL.
    pub async fn websocket() -> (Self, String) {
        let mut transport = WebSocketTransport::bind("127.0.0.1:0")
            .await
            .expect("should bind");
        let url = format!("http://{}", transport.local_addr().expect("local addr"));
        let (hub, shared) = Self::new();
        tokio::spawn(async move {
            while let Ok(sock) = transport.accept().await {
                tokio::spawn(serve(sock, Arc::clone(&shared)));
            }
        });
        (hub, url)
    }

    /// Completes every later call to `target` with `completion`.
    pub fn script(&self, target: &str, completion: Completion) {
        self.shared
            .scripted
            .lock()
            .unwrap()
            .insert(target.to_string(), completion);
    }

    /// Pushes an invocation (no reply wanted) to the connected client.
    pub fn push(&self, target: &str, arguments: Message) {
        self.shared.outbound(Outbound::Frame(Frame::Invocation {
            invocation_id: None,
            target: target.to_string(),
            arguments,
        }));
    }

    /// Closes the current client socket from the hub side.
    pub fn hang_up(&self) {
        self.shared.outbound(Outbound::Hangup);
    }

    /// The next invocation, failing the test after five seconds.
    pub async fn next_call(&mut self) -> Call {
        tokio::time::timeout(Duration::from_secs(5), self.calls.recv())
            .await
            .expect("no call within 5s")
            .expect("hub stopped")
    }

    /// Waits until a client session ends (the client's socket closed),
    /// failing the test after `limit`.
    pub async fn session_ended(&mut self, limit: Duration) {
        tokio::time::timeout(limit, self.ended.recv())
            .await
            .expect("client session still open")
            .expect("hub stopped");
    }

    /// Asserts no further call arrives within `window`.
    pub async fn assert_quiet(&mut self, window: Duration) {
        if let Ok(Some(call)) = tokio::time::timeout(window, self.calls.recv()).await {
            panic!("unexpected call: {call:?}");
        }
    }
}

async fn serve<S: Socket>(sock: S, shared: Arc<HubShared>) {
    let Ok(Some(hello)) = sock.recv().await else {
        return;
    };
    let codec: Box<dyn Codec> = match peek_frame_type(&hello) {
        Some(FrameType::Handshake) => Box::new(BinaryCodec),
        _ => Box::new(JsonCodec),
    };
    if !matches!(codec.decode(&hello), Ok(Frame::Handshake { .. })) {
        return;
    }

    let (tx, mut outbox) = mpsc::unbounded_channel();
    *shared.outbox.lock().unwrap() = Some(tx);
    if reply(&sock, &*codec, &Frame::HandshakeAck { error: None }).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            Some(item) = outbox.recv() => match item {
                Outbound::Frame(frame) => {
                    if reply(&sock, &*codec, &frame).await.is_err() {
                        break;
                    }
                }
                Outbound::Hangup => {
                    let _ = sock.close().await;
                    break;
                }
            },
            received = sock.recv() => {
                let Ok(Some(bytes)) = received else {
                    break;
                };
                match codec.decode(&bytes) {
                    Ok(Frame::Invocation { invocation_id, target, arguments }) => {
                        let _ = shared.calls.send(Call {
                            target: target.clone(),
                            arguments: arguments.clone(),
                            expects_reply: invocation_id.is_some(),
                        });
                        if let Some(id) = invocation_id {
                            let result = shared.completion_for(&target, arguments);
                            let done = Frame::Completion { invocation_id: id, result };
                            if reply(&sock, &*codec, &done).await.is_err() {
                                break;
                            }
                        }
                    }
                    Ok(Frame::Ping) => {
                        let _ = reply(&sock, &*codec, &Frame::Ping).await;
                    }
                    _ => {}
                }
            }
        }
    }
    let _ = shared.ended.send(());
}

async fn reply<S: Socket>(sock: &S, codec: &dyn Codec, frame: &Frame) -> Result<(), ()> {
    let bytes = codec.encode(frame).map_err(|_| ())?;
    sock.send(&bytes).await.map_err(|_| ())
}
