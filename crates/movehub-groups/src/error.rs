//! Error types for the group layer.

use movehub_connection::ConnectionState;
use movehub_dispatch::InvokeError;

/// Errors that can occur when joining a group.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// Groups can only be joined while connected.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// A join for this group is already waiting for the hub.
    #[error("join for group {0:?} already in progress")]
    InProgress(String),

    /// The `JoinGroup` call failed. The record was removed.
    #[error("join failed: {0}")]
    Invoke(InvokeError),
}

impl From<InvokeError> for JoinError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NotConnected(state) => Self::NotConnected(state),
            other => Self::Invoke(other),
        }
    }
}

/// Errors that can occur when leaving a group.
#[derive(Debug, thiserror::Error)]
pub enum LeaveError {
    /// Groups can only be left while connected.
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),

    /// The `LeaveGroup` call failed. The record is kept.
    #[error("leave failed: {0}")]
    Invoke(InvokeError),
}

impl From<InvokeError> for LeaveError {
    fn from(err: InvokeError) -> Self {
        match err {
            InvokeError::NotConnected(state) => Self::NotConnected(state),
            other => Self::Invoke(other),
        }
    }
}
