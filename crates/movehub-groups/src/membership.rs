//! Group membership records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a membership stands with the hub.
///
/// ```text
///   join() ──→ Pending ──(hub confirms)──→ Confirmed ──leave()──→ (removed)
///                 │
///                 └──(call fails / abandoned)──→ (removed)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MembershipState {
    /// `JoinGroup` sent, no completion yet.
    Pending,
    /// The hub completed `JoinGroup`.
    Confirmed,
}

/// This client's record of one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Membership {
    /// Group name as given to `join`.
    pub name: String,
    /// When the join was requested.
    pub joined_at: DateTime<Utc>,
    pub state: MembershipState,
}

impl Membership {
    pub(crate) fn pending(name: &str) -> Self {
        Self {
            name: name.to_string(),
            joined_at: Utc::now(),
            state: MembershipState::Pending,
        }
    }

    /// Returns `true` once the hub has confirmed the join.
    pub fn is_confirmed(&self) -> bool {
        self.state == MembershipState::Confirmed
    }
}
