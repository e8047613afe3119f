//! End-to-end tests for the hub client over the in-memory transport.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{Call, MockHub};
use movehub::connection::ConnectError;
use movehub::dispatch::InvokeError;
use movehub::prelude::*;
use movehub::protocol::Completion;
use movehub::transport::{MemoryConnector, TransportError};
use tokio::sync::mpsc;

async fn connected_client() -> (HubClient<MemoryConnector>, MockHub) {
    let (hub, connector) = MockHub::memory();
    let client = HubClientBuilder::new("memory://hub")
        .reply_timeout(Duration::from_secs(5))
        .build_with(connector);
    client.connect().await.expect("should connect");
    (client, hub)
}

fn call(target: &str, arguments: Message) -> Call {
    Call {
        target: target.to_string(),
        arguments,
        expects_reply: true,
    }
}

// =========================================================================
// Typed calls
// =========================================================================

#[tokio::test]
async fn test_join_then_send_move_reaches_hub_in_order() {
    let (client, mut hub) = connected_client().await;
    let mv = Move::new(1, Utc::now(), MoveKind::One).with("roll", 6);

    client.join_group("game").await.unwrap();
    let echoed = client.send_move(mv.clone()).await.unwrap();

    assert_eq!(hub.next_call().await, call("JoinGroup", Message::Text("game".into())));
    assert_eq!(hub.next_call().await, call("SendMove", Message::Move(mv.clone())));
    hub.assert_quiet(Duration::from_millis(200)).await;
    assert_eq!(echoed, Some(mv));
    assert!(client.groups().is_member("game"));
}

#[tokio::test]
async fn test_send_message_returns_reply_text() {
    let (client, mut hub) = connected_client().await;

    let reply = client.send_message("Hello World!").await.unwrap();

    assert_eq!(reply.as_deref(), Some("Hello World!"));
    assert_eq!(
        hub.next_call().await,
        call("SendMessage", Message::Text("Hello World!".into()))
    );
}

#[tokio::test]
async fn test_send_moves_returns_move_list() {
    let (client, _hub) = connected_client().await;
    let moves = vec![
        client.next_move(MoveKind::One, DataMap::new()),
        client.next_move(MoveKind::Three, DataMap::from([("speed".into(), Scalar::Float(6.6))])),
    ];

    let reply = client.send_moves(moves.clone()).await.unwrap();

    assert_eq!(reply, Some(moves));
}

#[tokio::test]
async fn test_send_dictionary_carries_data_and_timestamp() {
    let (client, mut hub) = connected_client().await;
    let data = DataMap::from([
        ("name".to_string(), Scalar::from("knight")),
        ("hp".to_string(), Scalar::Int(12)),
    ]);
    let timestamp = Utc::now();

    client.send_dictionary(data.clone(), timestamp).await.unwrap();

    assert_eq!(
        hub.next_call().await,
        call("SendDictionary", Message::KeyValue { data, timestamp })
    );
}

#[tokio::test]
async fn test_reply_of_wrong_variant_is_unexpected_reply() {
    let (client, hub) = connected_client().await;
    hub.script(methods::SEND_MOVE, Completion::Value(Message::Text("nope".into())));

    let err = client
        .send_move(client.next_move(MoveKind::Two, DataMap::new()))
        .await
        .unwrap_err();

    assert!(
        matches!(err, HubError::UnexpectedReply { expected: "Move", got: "Text", .. }),
        "{err:?}"
    );
}

#[tokio::test]
async fn test_hub_error_surfaces_as_remote() {
    let (client, hub) = connected_client().await;
    hub.script(methods::SEND_MESSAGE, Completion::Error("muted".into()));

    let err = client.send_message("hi").await.unwrap_err();

    assert!(matches!(err, HubError::Invoke(InvokeError::Remote(ref m)) if m == "muted"));
}

#[tokio::test]
async fn test_void_reply_is_none() {
    let (client, hub) = connected_client().await;
    hub.script(methods::SEND_MESSAGE, Completion::Void);

    assert_eq!(client.send_message("anyone?").await.unwrap(), None);
}

// =========================================================================
// Pushes
// =========================================================================

#[tokio::test]
async fn test_typed_handlers_receive_pushes() {
    let (client, hub) = connected_client().await;
    let (move_tx, mut move_rx) = mpsc::unbounded_channel();
    let (text_tx, mut text_rx) = mpsc::unbounded_channel();
    let (list_tx, mut list_rx) = mpsc::unbounded_channel();
    client.on_receive_move(move |mv| {
        let _ = move_tx.send(mv);
    });
    client.on_receive_message(move |text| {
        let _ = text_tx.send(text);
    });
    client.on_receive_moves(move |moves| {
        let _ = list_tx.send(moves);
    });

    let mv = Move::new(7, Utc::now(), MoveKind::Two).with("name", "knight");
    hub.push(methods::RECEIVE_MOVE, Message::Move(mv.clone()));
    hub.push(methods::RECEIVE_MESSAGE, Message::Text("your turn".into()));
    hub.push(methods::RECEIVE_MOVES, Message::MoveList(vec![mv.clone()]));

    assert_eq!(move_rx.recv().await.unwrap(), mv);
    assert_eq!(text_rx.recv().await.unwrap(), "your turn");
    assert_eq!(list_rx.recv().await.unwrap(), vec![mv]);
}

#[tokio::test]
async fn test_raw_handler_can_be_removed() {
    let (client, hub) = connected_client().await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    client.on("Announce", move |msg| {
        let _ = tx.send(msg);
    });

    hub.push("Announce", Message::Text("first".into()));
    assert_eq!(rx.recv().await.unwrap(), Message::Text("first".into()));

    assert!(client.off("Announce"));
    assert!(!client.off("Announce"));
    hub.push("Announce", Message::Text("second".into()));

    // With the handler gone the sender side is dropped and nothing more
    // can arrive.
    assert_eq!(rx.recv().await, None);
}

// =========================================================================
// Lifecycle
// =========================================================================

#[tokio::test]
async fn test_calls_before_connect_fail() {
    let (_hub, connector) = MockHub::memory();
    let client = HubClientBuilder::new("memory://hub").build_with(connector);

    let err = client.send_message("hi").await.unwrap_err();
    assert!(
        matches!(err, HubError::Invoke(InvokeError::NotConnected(ConnectionState::Disconnected))),
        "{err:?}"
    );
    let err = client.join_group("game").await.unwrap_err();
    assert!(matches!(err, HubError::Join(_)), "{err:?}");
}

#[tokio::test]
async fn test_close_is_terminal() {
    let (client, _hub) = connected_client().await;

    client.close().await;
    client.close().await;

    assert_eq!(client.state(), ConnectionState::Closed);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, HubError::Connect(ConnectError::Closed)), "{err:?}");
}

#[tokio::test]
async fn test_connect_after_giving_up_restores_groups() {
    let (mut hub, connector) = MockHub::memory();
    let client = HubClientBuilder::new("memory://hub")
        .reconnect(ReconnectPolicy::disabled())
        .build_with(connector);
    client.connect().await.unwrap();
    client.join_group("game").await.unwrap();
    hub.next_call().await;

    let mut states = client.state_changes();
    hub.hang_up();
    states
        .wait_for(|s| *s == ConnectionState::Disconnected)
        .await
        .unwrap();
    assert!(client.groups().is_member("game"));

    client.connect().await.unwrap();

    assert_eq!(hub.next_call().await, call("JoinGroup", Message::Text("game".into())));
    hub.assert_quiet(Duration::from_millis(200)).await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_every_client_handle_hangs_up() {
    let (client, mut hub) = connected_client().await;
    client.join_group("game").await.unwrap();
    hub.next_call().await;
    client.on_receive_move(|_| {});
    let other = client.clone();

    drop(client);
    hub.assert_quiet(Duration::from_secs(20)).await;
    assert_eq!(other.state(), ConnectionState::Connected);

    drop(other);
    hub.session_ended(Duration::from_secs(60)).await;
}

#[tokio::test]
async fn test_next_move_numbers_moves_in_order() {
    let (_hub, connector) = MockHub::memory();
    let client = HubClientBuilder::new("memory://hub").build_with(connector);

    let first = client.next_move(MoveKind::One, DataMap::new());
    let second = client.clone().next_move(MoveKind::One, DataMap::new());

    assert_eq!(first.sequence, 1);
    assert_eq!(second.sequence, 2, "clones share the sequencer");
    assert!(second.timestamp >= first.timestamp);
}

#[tokio::test]
async fn test_build_rejects_unusable_url() {
    let Err(err) = HubClient::builder("ftp://hub.example.com").build() else {
        panic!("ftp:// should be rejected");
    };
    assert!(matches!(err, HubError::Transport(TransportError::InvalidUrl(_))), "{err:?}");
}
