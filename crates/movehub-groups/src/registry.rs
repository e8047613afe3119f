//! The group registry: membership records plus the replay watcher.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use movehub_connection::ConnectionEvent;
use movehub_dispatch::Dispatcher;
use movehub_protocol::{methods, Message};
use movehub_transport::Connector;
use tokio::sync::broadcast;
use tokio::task::AbortHandle;
use tracing::{debug, info, warn};

use crate::{JoinError, LeaveError, Membership, MembershipState};

/// Tracks the groups this client belongs to.
///
/// Created with [`GroupRegistry::new`], which also starts a small task
/// that watches the connection's events:
///
/// - on `Reconnected` it sends `JoinGroup` once for every confirmed group
///   (the hub forgot them when the old socket went away);
/// - on `Closed` it drops every record.
///
/// Records are kept in name order, so replays are deterministic.
pub struct GroupRegistry<K: Connector> {
    dispatcher: Arc<Dispatcher<K>>,
    groups: Mutex<BTreeMap<String, Membership>>,
    watcher: Mutex<Option<AbortHandle>>,
}

impl<K: Connector> GroupRegistry<K> {
    /// Creates a registry on top of `dispatcher` and starts its watcher.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(dispatcher: Arc<Dispatcher<K>>) -> Arc<Self> {
        // Subscribe before anything can happen, so no event is missed.
        let events = dispatcher.connection().subscribe();
        let registry = Arc::new(Self {
            dispatcher,
            groups: Mutex::new(BTreeMap::new()),
            watcher: Mutex::new(None),
        });

        let task = tokio::spawn(watch_events(Arc::downgrade(&registry), events));
        *registry.watcher_slot() = Some(task.abort_handle());
        registry
    }

    fn groups_map(&self) -> MutexGuard<'_, BTreeMap<String, Membership>> {
        self.groups.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watcher_slot(&self) -> MutexGuard<'_, Option<AbortHandle>> {
        self.watcher.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Joins `group`.
    ///
    /// Records the group as `Pending`, calls `JoinGroup`, and marks it
    /// `Confirmed` when the hub completes the call. On failure the record
    /// is removed. Joining a group that is already confirmed does nothing.
    ///
    /// # Errors
    /// - [`JoinError::NotConnected`] when the connection isn't up
    /// - [`JoinError::InProgress`] while another join for `group` is pending
    /// - [`JoinError::Invoke`] when the hub call fails
    pub async fn join(&self, group: &str) -> Result<(), JoinError> {
        let state = self.dispatcher.connection().state();
        if !state.is_connected() {
            return Err(JoinError::NotConnected(state));
        }

        {
            let mut groups = self.groups_map();
            match groups.get(group).map(|m| m.state) {
                Some(MembershipState::Confirmed) => {
                    debug!(group, "already a member");
                    return Ok(());
                }
                Some(MembershipState::Pending) => {
                    return Err(JoinError::InProgress(group.to_string()));
                }
                None => {
                    groups.insert(group.to_string(), Membership::pending(group));
                }
            }
        }

        // If this future is dropped mid-call, the pending record goes too.
        let mut guard = PendingJoin {
            registry: self,
            group,
            armed: true,
        };

        match self
            .dispatcher
            .invoke(methods::JOIN_GROUP, Message::Text(group.to_string()))
            .await
        {
            Ok(_) => {
                guard.armed = false;
                if let Some(m) = self.groups_map().get_mut(group) {
                    m.state = MembershipState::Confirmed;
                }
                info!(group, "joined group");
                Ok(())
            }
            Err(e) => {
                // The guard removes the record.
                warn!(group, error = %e, "join failed");
                Err(e.into())
            }
        }
    }

    /// Leaves `group`. Does nothing if this client isn't a member.
    ///
    /// The record is removed once the hub completes `LeaveGroup`; if the
    /// call fails the record stays.
    ///
    /// # Errors
    /// - [`LeaveError::NotConnected`] when the connection isn't up
    /// - [`LeaveError::Invoke`] when the hub call fails
    pub async fn leave(&self, group: &str) -> Result<(), LeaveError> {
        if !self.groups_map().contains_key(group) {
            debug!(group, "not a member; nothing to leave");
            return Ok(());
        }

        let state = self.dispatcher.connection().state();
        if !state.is_connected() {
            return Err(LeaveError::NotConnected(state));
        }

        self.dispatcher
            .invoke(methods::LEAVE_GROUP, Message::Text(group.to_string()))
            .await
            .inspect_err(|e| warn!(group, error = %e, "leave failed"))?;

        self.groups_map().remove(group);
        info!(group, "left group");
        Ok(())
    }

    /// Sends `JoinGroup` once for every confirmed group.
    ///
    /// The watcher calls this after an automatic reconnection. After a
    /// manual `connect()` (once reconnection gave up) call it yourself.
    /// A failed rejoin is logged and the record kept, so the next
    /// reconnection retries it. Returns how many rejoins succeeded.
    pub async fn replay(&self) -> usize {
        let confirmed: Vec<String> = self
            .groups_map()
            .values()
            .filter(|m| m.is_confirmed())
            .map(|m| m.name.clone())
            .collect();
        if confirmed.is_empty() {
            return 0;
        }

        info!(count = confirmed.len(), "rejoining groups");
        let mut rejoined = 0;
        for group in confirmed {
            match self
                .dispatcher
                .invoke(methods::JOIN_GROUP, Message::Text(group.clone()))
                .await
            {
                Ok(_) => {
                    debug!(%group, "rejoined group");
                    rejoined += 1;
                }
                Err(e) => warn!(%group, error = %e, "rejoin failed"),
            }
        }
        rejoined
    }

    /// Names of all recorded groups (pending or confirmed), in order.
    pub fn groups(&self) -> Vec<String> {
        self.groups_map().keys().cloned().collect()
    }

    /// The record for `group`, if any.
    pub fn membership(&self, group: &str) -> Option<Membership> {
        self.groups_map().get(group).cloned()
    }

    /// Returns `true` if the hub has confirmed membership of `group`.
    pub fn is_member(&self, group: &str) -> bool {
        self.groups_map()
            .get(group)
            .is_some_and(Membership::is_confirmed)
    }

    fn clear(&self) {
        let dropped = std::mem::take(&mut *self.groups_map());
        if !dropped.is_empty() {
            debug!(count = dropped.len(), "connection closed; dropping group records");
        }
    }
}

impl<K: Connector> Drop for GroupRegistry<K> {
    fn drop(&mut self) {
        if let Some(watcher) = self.watcher_slot().take() {
            watcher.abort();
        }
    }
}

/// Removes a still-pending record when a join doesn't complete.
struct PendingJoin<'a, K: Connector> {
    registry: &'a GroupRegistry<K>,
    group: &'a str,
    armed: bool,
}

impl<K: Connector> Drop for PendingJoin<'_, K> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut groups = self.registry.groups_map();
        if groups
            .get(self.group)
            .is_some_and(|m| m.state == MembershipState::Pending)
        {
            groups.remove(self.group);
        }
    }
}

/// Reacts to connection events for as long as the registry is alive.
async fn watch_events<K: Connector>(
    registry: Weak<GroupRegistry<K>>,
    mut events: broadcast::Receiver<ConnectionEvent>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "group watcher fell behind on connection events");
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => return,
        };

        let Some(registry) = registry.upgrade() else {
            return;
        };
        match event {
            ConnectionEvent::Reconnected => {
                registry.replay().await;
            }
            ConnectionEvent::Closed => registry.clear(),
            _ => {}
        }
    }
}
