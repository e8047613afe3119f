//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! The stream is split into a write half and a read half, each behind its
//! own lock. The reader task parks inside `recv` for as long as the socket
//! is idle, so sharing one lock between both directions would block every
//! `send` behind it.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Mutex;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::{Connector, Socket, SocketId, Transport, TransportError};

/// Maps a hub URL to the WebSocket URL that is actually dialed.
///
/// `http` becomes `ws` and `https` becomes `wss`; `ws`/`wss` URLs pass
/// through unchanged. Anything else is rejected.
pub fn websocket_url(url: &str) -> Result<String, TransportError> {
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| TransportError::InvalidUrl(url.to_string()))?;
    let mapped = match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        _ => return Err(TransportError::InvalidUrl(url.to_string())),
    };
    if rest.is_empty() {
        return Err(TransportError::InvalidUrl(url.to_string()));
    }
    Ok(format!("{mapped}://{rest}"))
}

fn io_error(kind: std::io::ErrorKind, e: tungstenite::Error) -> std::io::Error {
    std::io::Error::new(kind, e)
}

/// A WebSocket-based [`Transport`] that listens for incoming sockets.
///
/// After [`shutdown`](Transport::shutdown), `accept` fails with
/// [`TransportError::Shutdown`] and drops the listener, which releases
/// the port. Sockets accepted earlier stay open.
pub struct WebSocketTransport {
    listener: Option<TcpListener>,
    stopped: AtomicBool,
}

impl WebSocketTransport {
    /// Binds a new WebSocket transport to the given address.
    pub async fn bind(addr: &str) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(TransportError::AcceptFailed)?;
        tracing::info!(addr, "WebSocket transport listening");
        Ok(Self {
            listener: Some(listener),
            stopped: AtomicBool::new(false),
        })
    }

    /// The address the listener is bound to. Useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        self.listener
            .as_ref()
            .ok_or(TransportError::Shutdown)?
            .local_addr()
            .map_err(TransportError::AcceptFailed)
    }
}

impl Transport for WebSocketTransport {
    type Socket = WebSocketSocket<TcpStream>;
    type Error = TransportError;

    async fn accept(&mut self) -> Result<Self::Socket, Self::Error> {
        if self.stopped.load(Ordering::SeqCst) {
            self.listener = None;
        }
        let listener = self.listener.as_ref().ok_or(TransportError::Shutdown)?;
        let (stream, addr) = listener
            .accept()
            .await
            .map_err(TransportError::AcceptFailed)?;

        let ws = tokio_tungstenite::accept_async(stream).await.map_err(|e| {
            TransportError::AcceptFailed(io_error(
                std::io::ErrorKind::ConnectionRefused,
                e,
            ))
        })?;

        let socket = WebSocketSocket::new(ws);
        tracing::debug!(id = %socket.id(), %addr, "accepted WebSocket socket");
        Ok(socket)
    }

    async fn shutdown(&self) -> Result<(), Self::Error> {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            tracing::info!("WebSocket transport shut down");
        }
        Ok(())
    }
}

/// Dials hubs over WebSocket.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

impl WebSocketConnector {
    pub fn new() -> Self {
        Self
    }
}

impl Connector for WebSocketConnector {
    type Socket = WebSocketSocket<MaybeTlsStream<TcpStream>>;

    async fn connect(&self, url: &str) -> Result<Self::Socket, TransportError> {
        let target = websocket_url(url)?;
        let (ws, _response) = tokio_tungstenite::connect_async(target.as_str())
            .await
            .map_err(|e| {
                TransportError::ConnectFailed(io_error(
                    std::io::ErrorKind::ConnectionRefused,
                    e,
                ))
            })?;
        let socket = WebSocketSocket::new(ws);
        tracing::debug!(id = %socket.id(), url = %target, "WebSocket connected");
        Ok(socket)
    }
}

/// A single WebSocket socket, split into independently locked halves.
pub struct WebSocketSocket<S> {
    id: SocketId,
    sink: Mutex<SplitSink<WebSocketStream<S>, Message>>,
    stream: Mutex<SplitStream<WebSocketStream<S>>>,
}

impl<S> WebSocketSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    fn new(ws: WebSocketStream<S>) -> Self {
        let (sink, stream) = ws.split();
        Self {
            id: SocketId::next(),
            sink: Mutex::new(sink),
            stream: Mutex::new(stream),
        }
    }
}

impl<S> Socket for WebSocketSocket<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let msg = Message::Binary(data.to_vec().into());
        self.sink.lock().await.send(msg).await.map_err(|e| {
            TransportError::SendFailed(io_error(std::io::ErrorKind::BrokenPipe, e))
        })
    }

    // Cancel-safe: both the lock and `next()` on a split stream can be
    // dropped mid-await without losing a buffered message.
    async fn recv(&self) -> Result<Option<Vec<u8>>, TransportError> {
        let mut stream = self.stream.lock().await;
        loop {
            match stream.next().await {
                Some(Ok(Message::Binary(data))) => return Ok(Some(data.into())),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(text.as_bytes().to_vec()));
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue, // ping/pong/raw frame
                Some(Err(
                    tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed,
                )) => return Ok(None),
                Some(Err(e)) => {
                    return Err(TransportError::ReceiveFailed(io_error(
                        std::io::ErrorKind::ConnectionReset,
                        e,
                    )));
                }
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        match self.sink.lock().await.close().await {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(TransportError::SendFailed(io_error(
                std::io::ErrorKind::BrokenPipe,
                e,
            ))),
        }
    }

    fn id(&self) -> SocketId {
        self.id
    }
}
