//! Integration tests for group membership and replay.

use std::sync::Arc;
use std::time::Duration;

use movehub_connection::{ConnectionConfig, ConnectionEvent, ConnectionState, ReconnectPolicy};
use movehub_dispatch::{DispatchConfig, Dispatcher, InvokeError};
use movehub_groups::{GroupRegistry, JoinError, LeaveError, MembershipState};
use movehub_protocol::{BinaryCodec, Codec, Completion, Frame, Message};
use movehub_transport::{memory_transport, MemoryConnector, MemoryListener, Socket, Transport};
use tokio::sync::{mpsc, Notify};

// ---------------------------------------------------------------------------
// Scripted hub
// ---------------------------------------------------------------------------

/// A hub that acks every handshake and completes every invocation,
/// reporting each call it sees. Calls whose argument equals `reject`
/// complete with an error.
struct Hub {
    calls: mpsc::UnboundedReceiver<(String, String)>,
    kick: Arc<Notify>,
}

impl Hub {
    fn spawn(mut listener: MemoryListener, reject: Option<&'static str>) -> Self {
        let (tx, calls) = mpsc::unbounded_channel();
        let kick = Arc::new(Notify::new());
        let kicked = Arc::clone(&kick);

        tokio::spawn(async move {
            while let Ok(sock) = listener.accept().await {
                let _hello = sock.recv().await;
                let ack = BinaryCodec.encode(&Frame::HandshakeAck { error: None }).unwrap();
                if sock.send(&ack).await.is_err() {
                    continue;
                }

                loop {
                    let bytes = tokio::select! {
                        _ = kicked.notified() => {
                            let _ = sock.close().await;
                            break;
                        }
                        received = sock.recv() => match received {
                            Ok(Some(bytes)) => bytes,
                            _ => break,
                        },
                    };
                    let Ok(Frame::Invocation {
                        invocation_id: Some(id),
                        target,
                        arguments: Message::Text(arg),
                    }) = BinaryCodec.decode(&bytes)
                    else {
                        continue;
                    };

                    let result = if Some(arg.as_str()) == reject {
                        Completion::Error("denied".into())
                    } else {
                        Completion::Void
                    };
                    let _ = tx.send((target, arg));
                    let done = BinaryCodec
                        .encode(&Frame::Completion {
                            invocation_id: id,
                            result,
                        })
                        .unwrap();
                    let _ = sock.send(&done).await;
                }
            }
        });

        Self { calls, kick }
    }

    /// Drops the current client socket.
    fn kick(&self) {
        self.kick.notify_one();
    }

    async fn next_call(&mut self) -> Option<(String, String)> {
        self.calls.recv().await
    }
}

fn call(target: &str, arg: &str) -> (String, String) {
    (target.to_string(), arg.to_string())
}

async fn setup(
    reject: Option<&'static str>,
) -> (
    Arc<GroupRegistry<MemoryConnector>>,
    Arc<Dispatcher<MemoryConnector>>,
    Hub,
) {
    let (connector, listener) = memory_transport();
    let hub = Hub::spawn(listener, reject);
    let config = ConnectionConfig {
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(50),
            jitter: 0.0,
            ..ReconnectPolicy::default()
        },
        ..ConnectionConfig::new("memory://hub")
    };
    let dispatcher = Arc::new(Dispatcher::new(
        connector,
        config,
        DispatchConfig::with_reply_timeout(Duration::from_secs(5)),
        Arc::new(BinaryCodec),
    ));
    let registry = GroupRegistry::new(Arc::clone(&dispatcher));
    dispatcher.connection().connect().await.unwrap();
    (registry, dispatcher, hub)
}

// ---------------------------------------------------------------------------
// join / leave
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_join_confirms_membership() {
    let (groups, _d, mut hub) = setup(None).await;

    groups.join("game").await.unwrap();

    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "game")));
    assert!(groups.is_member("game"));
    let record = groups.membership("game").unwrap();
    assert_eq!(record.state, MembershipState::Confirmed);
    assert_eq!(record.name, "game");
    assert_eq!(groups.groups(), vec!["game".to_string()]);
}

#[tokio::test]
async fn test_join_confirmed_group_is_noop() {
    let (groups, _d, mut hub) = setup(None).await;

    groups.join("game").await.unwrap();
    groups.join("game").await.unwrap();
    groups.leave("game").await.unwrap();

    // The hub sees calls in order: a second JoinGroup would show up here.
    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "game")));
    assert_eq!(hub.next_call().await, Some(call("LeaveGroup", "game")));
}

#[tokio::test]
async fn test_failed_join_removes_record() {
    let (groups, _d, mut hub) = setup(Some("vip")).await;

    let err = groups.join("vip").await.unwrap_err();
    assert!(matches!(err, JoinError::Invoke(InvokeError::Remote(_))), "{err:?}");
    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "vip")));
    assert!(groups.membership("vip").is_none());
    assert!(groups.groups().is_empty());
}

#[tokio::test]
async fn test_join_requires_connection() {
    let (connector, _listener) = memory_transport();
    let dispatcher = Arc::new(Dispatcher::new(
        connector,
        ConnectionConfig::new("memory://hub"),
        DispatchConfig::default(),
        Arc::new(BinaryCodec),
    ));
    let groups = GroupRegistry::new(dispatcher);

    let err = groups.join("game").await.unwrap_err();
    assert!(matches!(err, JoinError::NotConnected(ConnectionState::Disconnected)));
    assert!(groups.groups().is_empty());
}

#[tokio::test]
async fn test_leave_removes_record() {
    let (groups, _d, mut hub) = setup(None).await;
    groups.join("game").await.unwrap();
    groups.leave("game").await.unwrap();

    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "game")));
    assert_eq!(hub.next_call().await, Some(call("LeaveGroup", "game")));
    assert!(!groups.is_member("game"));
    assert!(groups.membership("game").is_none());
}

#[tokio::test]
async fn test_leave_non_member_is_noop() {
    let (groups, _d, mut hub) = setup(None).await;

    groups.leave("elsewhere").await.unwrap();
    groups.join("marker").await.unwrap();

    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "marker")));
}

#[tokio::test]
async fn test_leave_while_disconnected_is_an_error() {
    let (connector, listener) = memory_transport();
    let hub = Hub::spawn(listener, None);
    let dispatcher = Arc::new(Dispatcher::new(
        connector,
        ConnectionConfig {
            reconnect: ReconnectPolicy::disabled(),
            ..ConnectionConfig::new("memory://hub")
        },
        DispatchConfig::default(),
        Arc::new(BinaryCodec),
    ));
    let groups = GroupRegistry::new(Arc::clone(&dispatcher));
    dispatcher.connection().connect().await.unwrap();
    groups.join("game").await.unwrap();

    let mut states = dispatcher.connection().state_changes();
    hub.kick();
    states
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();

    let err = groups.leave("game").await.unwrap_err();
    assert!(matches!(err, LeaveError::NotConnected(ConnectionState::Disconnected)));
    assert!(groups.is_member("game"), "record survives a failed leave");

    // A replay that can't reach the hub keeps the record for next time.
    assert_eq!(groups.replay().await, 0);
    assert!(groups.is_member("game"));
}

// ---------------------------------------------------------------------------
// Replay
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn test_reconnect_replays_each_group_exactly_once() {
    let (groups, d, mut hub) = setup(None).await;
    groups.join("g1").await.unwrap();
    groups.join("g2").await.unwrap();
    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "g1")));
    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "g2")));

    let mut events = d.connection().subscribe();
    hub.kick();
    loop {
        if events.recv().await.unwrap() == ConnectionEvent::Reconnected {
            break;
        }
    }

    let mut replayed = vec![
        hub.next_call().await.unwrap(),
        hub.next_call().await.unwrap(),
    ];
    replayed.sort();
    assert_eq!(replayed, vec![call("JoinGroup", "g1"), call("JoinGroup", "g2")]);

    // And nothing more, however long we wait.
    let extra = tokio::time::timeout(Duration::from_secs(5), hub.next_call()).await;
    assert!(extra.is_err(), "unexpected extra call: {extra:?}");
    assert!(groups.is_member("g1") && groups.is_member("g2"));
}

#[tokio::test]
async fn test_manual_replay_rejoins_confirmed_groups() {
    let (groups, _d, mut hub) = setup(None).await;
    groups.join("g1").await.unwrap();
    hub.next_call().await;

    assert_eq!(groups.replay().await, 1);
    assert_eq!(hub.next_call().await, Some(call("JoinGroup", "g1")));
}

#[tokio::test]
async fn test_close_drops_all_records() {
    let (groups, d, _hub) = setup(None).await;
    groups.join("g1").await.unwrap();
    groups.join("g2").await.unwrap();

    let mut events = d.connection().subscribe();
    d.connection().close().await;
    assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Closed);

    for _ in 0..100 {
        if groups.groups().is_empty() {
            break;
        }
        tokio::task::yield_now().await;
    }
    assert!(groups.groups().is_empty());
}
