//! Adapters between the typed hub surface and raw [`Message`] payloads.
//!
//! Pushes arrive as a [`Message`]; the typed `on_receive_*` handlers only
//! want the payload shape their method carries. Replies go the other way:
//! a typed call unwraps the completion value and turns a wrong shape into
//! [`HubError::UnexpectedReply`].

use movehub_protocol::{Message, Move};
use tracing::warn;

use crate::HubError;

/// Wraps a text handler. Pushes of any other shape are logged and dropped.
pub(crate) fn text_handler<F>(method: &'static str, handler: F) -> impl Fn(Message) + Send + Sync + 'static
where
    F: Fn(String) + Send + Sync + 'static,
{
    move |msg| match msg {
        Message::Text(text) => handler(text),
        other => mismatched_push(method, "Text", &other),
    }
}

/// Wraps a single-move handler.
pub(crate) fn move_handler<F>(method: &'static str, handler: F) -> impl Fn(Message) + Send + Sync + 'static
where
    F: Fn(Move) + Send + Sync + 'static,
{
    move |msg| match msg {
        Message::Move(mv) => handler(mv),
        other => mismatched_push(method, "Move", &other),
    }
}

/// Wraps a move-batch handler.
pub(crate) fn moves_handler<F>(method: &'static str, handler: F) -> impl Fn(Message) + Send + Sync + 'static
where
    F: Fn(Vec<Move>) + Send + Sync + 'static,
{
    move |msg| match msg {
        Message::MoveList(moves) => handler(moves),
        other => mismatched_push(method, "MoveList", &other),
    }
}

fn mismatched_push(method: &'static str, expected: &'static str, got: &Message) {
    warn!(method, expected, got = got.kind(), "dropping push with unexpected payload");
}

pub(crate) fn unexpected(method: &'static str, expected: &'static str, got: &Message) -> HubError {
    HubError::UnexpectedReply {
        method,
        expected,
        got: got.kind(),
    }
}

pub(crate) fn text_reply(method: &'static str, reply: Option<Message>) -> Result<Option<String>, HubError> {
    match reply {
        None => Ok(None),
        Some(Message::Text(text)) => Ok(Some(text)),
        Some(other) => Err(unexpected(method, "Text", &other)),
    }
}

pub(crate) fn move_reply(method: &'static str, reply: Option<Message>) -> Result<Option<Move>, HubError> {
    match reply {
        None => Ok(None),
        Some(Message::Move(mv)) => Ok(Some(mv)),
        Some(other) => Err(unexpected(method, "Move", &other)),
    }
}

pub(crate) fn moves_reply(method: &'static str, reply: Option<Message>) -> Result<Option<Vec<Move>>, HubError> {
    match reply {
        None => Ok(None),
        Some(Message::MoveList(moves)) => Ok(Some(moves)),
        Some(other) => Err(unexpected(method, "MoveList", &other)),
    }
}
