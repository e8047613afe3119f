//! Hub connection lifecycle for movehub.
//!
//! A [`Connection`] owns exactly one socket at a time and is responsible
//! for everything that happens to it:
//!
//! 1. **Handshake**: announcing the codec and protocol version, and
//!    waiting for the hub's acknowledgement
//! 2. **Keep-alive**: sending `Ping` frames and noticing a silent hub
//! 3. **Reconnection**: exponential backoff after an unexpected drop,
//!    governed by a [`ReconnectPolicy`]
//!
//! Frames that aren't about the connection itself (invocations and
//! completions) are handed to a [`FrameSink`], which is how the
//! dispatcher plugs in.
//!
//! # How it fits in the stack
//!
//! ```text
//! Dispatcher / Group Registry (above)  ← invoke, register, join
//!     ↕
//! Connection Layer (this crate)  ← state machine, reader task, backoff
//!     ↕
//! Transport + Protocol (below)  ← sockets, frames
//! ```

mod config;
mod connection;
mod error;
mod state;

pub use config::{ConnectionConfig, ReconnectPolicy};
pub use connection::Connection;
pub use error::{ConnectError, SendError};
pub use state::{ConnectionEvent, ConnectionState, DisconnectReason, FrameSink};
