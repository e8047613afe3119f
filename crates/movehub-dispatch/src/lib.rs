//! Message dispatch for movehub.
//!
//! The [`Dispatcher`] sits on top of a [`Connection`](movehub_connection::Connection)
//! and gives it meaning:
//!
//! - **Outbound**: [`Dispatcher::invoke`] sends a hub call tagged with a
//!   fresh invocation id and waits for the matching completion;
//!   [`Dispatcher::send`] is the fire-and-forget variant.
//! - **Inbound**: pushes from the hub are routed by target name to the
//!   handler registered with [`Dispatcher::register`].
//!
//! Handlers run on the connection's reader task, one frame at a time,
//! so they observe pushes in exactly the order the hub sent them.

mod config;
mod dispatcher;
mod error;

pub use config::DispatchConfig;
pub use dispatcher::{Dispatcher, Handler};
pub use error::InvokeError;
