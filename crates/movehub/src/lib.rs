//! # movehub
//!
//! Real-time game-move relay client.
//!
//! A [`HubClient`] keeps one persistent connection to a hub, calls hub
//! methods with typed payloads (`SendMessage`, `SendMove`, ...), routes
//! the hub's pushes to your handlers, and remembers the groups you joined
//! so they survive a reconnection.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use movehub::prelude::*;
//!
//! # async fn run() -> Result<(), HubError> {
//! movehub::init_tracing();
//!
//! let client = HubClient::builder("http://localhost:5000/hub").build()?;
//! client.on_receive_move(|mv| println!("got {mv}"));
//! client.connect().await?;
//! client.join_group("game").await?;
//!
//! let mv = client.next_move(MoveKind::One, DataMap::from([("roll".to_string(), Scalar::Int(6))]));
//! client.send_move(mv).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! Each layer lives in its own crate and is re-exported here:
//!
//! - [`transport`]: sockets (WebSocket, in-memory)
//! - [`protocol`]: frames, moves, codecs
//! - [`connection`]: handshake, keep-alive, reconnection
//! - [`dispatch`]: correlated calls and push routing
//! - [`groups`]: durable group membership

mod client;
mod error;
mod handlers;

pub use client::{HubClient, HubClientBuilder};
pub use error::HubError;

pub use movehub_connection as connection;
pub use movehub_dispatch as dispatch;
pub use movehub_groups as groups;
pub use movehub_protocol as protocol;
pub use movehub_transport as transport;

use tracing_subscriber::EnvFilter;

/// Installs a `tracing` subscriber that prints to stderr.
///
/// The filter comes from `RUST_LOG` and defaults to `movehub=info`.
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("movehub=info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Everything needed to build a client and exchange moves.
pub mod prelude {
    pub use crate::{HubClient, HubClientBuilder, HubError};
    pub use movehub_connection::{ConnectionConfig, ConnectionEvent, ConnectionState, ReconnectPolicy};
    pub use movehub_dispatch::DispatchConfig;
    pub use movehub_protocol::{
        methods, BinaryCodec, Codec, DataMap, JsonCodec, Message, Move, MoveKind, MoveSequencer,
        Scalar,
    };
}
