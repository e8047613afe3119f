//! Connection state machine, lifecycle events, and the frame sink seam.

use std::fmt;
use std::time::Duration;

use movehub_protocol::Frame;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectionState
// ---------------------------------------------------------------------------

/// The lifecycle state of a connection.
///
/// ```text
///                 connect()
///  Disconnected ───────────→ Connecting ──(ack)──→ Connected
///       ↑                        │  ↑                  │
///       │  (failed, no retry)    │  │ (backoff over)   │ (drop)
///       └────────────────────────┤  │                  ▼
///       ↑                        └──┴──────────── Reconnecting
///       └───────(attempts exhausted / retry disabled)──┘
///
///  any state ──close()──→ Closed   (terminal)
/// ```
///
/// - **Disconnected**: No socket. `connect()` may be called.
/// - **Connecting**: Dialing and handshaking.
/// - **Connected**: Handshake done; sends are allowed.
/// - **Reconnecting**: Lost the socket, waiting out a backoff delay.
/// - **Closed**: `close()` was called. Nothing leaves this state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

impl ConnectionState {
    /// Returns `true` if transitioning to `target` is valid.
    pub fn can_transition_to(self, target: Self) -> bool {
        use ConnectionState::*;
        matches!(
            (self, target),
            (Disconnected, Connecting | Closed)
                | (Connecting, Connected | Disconnected | Reconnecting | Closed)
                | (Connected, Reconnecting | Disconnected | Closed)
                | (Reconnecting, Connecting | Disconnected | Closed)
        )
    }

    /// Returns `true` only in `Connected`.
    pub fn is_connected(self) -> bool {
        self == Self::Connected
    }

    /// Returns `true` for `Closed`, the terminal state.
    pub fn is_terminal(self) -> bool {
        self == Self::Closed
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "Disconnected"),
            Self::Connecting => write!(f, "Connecting"),
            Self::Connected => write!(f, "Connected"),
            Self::Reconnecting => write!(f, "Reconnecting"),
            Self::Closed => write!(f, "Closed"),
        }
    }
}

// ---------------------------------------------------------------------------
// Events
// ---------------------------------------------------------------------------

/// Why an established connection was lost.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The hub closed the socket.
    PeerClosed,
    /// Nothing arrived from the hub within the server timeout.
    ServerTimeout(Duration),
    /// Reading from or writing to the socket failed.
    Transport(String),
    /// The hub sent a `Close` frame.
    HubClosed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

impl DisconnectReason {
    /// A hub `Close` with `allow_reconnect = false` forbids reconnecting.
    pub fn allows_reconnect(&self) -> bool {
        !matches!(
            self,
            Self::HubClosed {
                allow_reconnect: false,
                ..
            }
        )
    }
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PeerClosed => write!(f, "closed by peer"),
            Self::ServerTimeout(after) => write!(f, "no data from hub for {after:?}"),
            Self::Transport(e) => write!(f, "transport error: {e}"),
            Self::HubClosed { error: Some(e), .. } => write!(f, "hub closed: {e}"),
            Self::HubClosed { error: None, .. } => write!(f, "hub closed"),
        }
    }
}

/// Lifecycle notifications.
///
/// Delivered synchronously to the [`FrameSink`] (in order, from the task
/// that caused them) and broadcast to every
/// [`Connection::subscribe`](crate::Connection::subscribe) receiver.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// `connect()` succeeded.
    Connected,
    /// An established connection was lost. Fires exactly once per loss.
    Disconnected { reason: DisconnectReason },
    /// A reconnection attempt will start after `delay`.
    Reconnecting { attempt: u32, delay: Duration },
    /// A reconnection attempt succeeded.
    Reconnected,
    /// The reconnection policy gave up.
    ReconnectFailed { attempts: u32 },
    /// `close()` was called.
    Closed,
}

// ---------------------------------------------------------------------------
// FrameSink
// ---------------------------------------------------------------------------

/// Receives what the connection reads off the socket.
///
/// The connection consumes handshake, `Ping` and `Close` frames itself;
/// everything else (invocations and completions) goes to `on_frame`, in
/// arrival order, on the connection's reader task. Implementations must
/// not block: spawn or hand off anything slow.
pub trait FrameSink: Send + Sync + 'static {
    /// An inbound frame for the layer above.
    fn on_frame(&self, frame: Frame);

    /// A lifecycle event. The default ignores it.
    fn on_event(&self, _event: &ConnectionEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use ConnectionState::*;

    const ALL: [ConnectionState; 5] = [Disconnected, Connecting, Connected, Reconnecting, Closed];

    #[test]
    fn test_closed_is_terminal() {
        for target in ALL {
            assert!(!Closed.can_transition_to(target), "Closed -> {target}");
        }
        assert!(Closed.is_terminal());
    }

    #[test]
    fn test_every_live_state_can_close() {
        for from in [Disconnected, Connecting, Connected, Reconnecting] {
            assert!(from.can_transition_to(Closed), "{from} -> Closed");
        }
    }

    #[test]
    fn test_transition_table() {
        assert!(Disconnected.can_transition_to(Connecting));
        assert!(!Disconnected.can_transition_to(Connected));
        assert!(!Disconnected.can_transition_to(Reconnecting));

        assert!(Connecting.can_transition_to(Connected));
        assert!(Connecting.can_transition_to(Disconnected));
        assert!(Connecting.can_transition_to(Reconnecting));

        assert!(Connected.can_transition_to(Reconnecting));
        assert!(Connected.can_transition_to(Disconnected));
        assert!(!Connected.can_transition_to(Connecting));

        assert!(Reconnecting.can_transition_to(Connecting));
        assert!(Reconnecting.can_transition_to(Disconnected));
        assert!(!Reconnecting.can_transition_to(Connected));
    }

    #[test]
    fn test_no_self_transitions() {
        for s in ALL {
            assert!(!s.can_transition_to(s), "{s} -> {s}");
        }
    }

    #[test]
    fn test_disconnect_reason_allows_reconnect() {
        assert!(DisconnectReason::PeerClosed.allows_reconnect());
        assert!(DisconnectReason::ServerTimeout(Duration::from_secs(1)).allows_reconnect());
        assert!(DisconnectReason::HubClosed {
            error: None,
            allow_reconnect: true
        }
        .allows_reconnect());
        assert!(!DisconnectReason::HubClosed {
            error: Some("kicked".into()),
            allow_reconnect: false
        }
        .allows_reconnect());
    }

    #[test]
    fn test_disconnect_reason_display() {
        let reason = DisconnectReason::HubClosed {
            error: Some("server restarting".into()),
            allow_reconnect: true,
        };
        assert_eq!(reason.to_string(), "hub closed: server restarting");
        assert_eq!(DisconnectReason::PeerClosed.to_string(), "closed by peer");
    }
}
