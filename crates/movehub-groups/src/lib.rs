//! Group membership for movehub.
//!
//! Hubs broadcast pushes to named groups, and forget a client's groups
//! when its connection drops. The [`GroupRegistry`] remembers which
//! groups this client has joined and joins them again after every
//! reconnection, so callers can treat membership as durable.
//!
//! # Key types
//!
//! - [`GroupRegistry`]: join/leave and the replay watcher
//! - [`Membership`]: one group record (`Pending` until the hub confirms)
//! - [`JoinError`] / [`LeaveError`]: why a request failed

mod error;
mod membership;
mod registry;

pub use error::{JoinError, LeaveError};
pub use membership::{Membership, MembershipState};
pub use registry::GroupRegistry;
