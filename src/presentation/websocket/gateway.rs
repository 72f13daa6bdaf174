//! Connection Gateway
//!
//! The real-time fan-out engine. Tracks every live connection, which
//! broadcast groups each belongs to, and delivers group payloads to the
//! current membership.
//!
//! The membership index is two dashmaps (connection -> groups, group ->
//! connections) locked per entry; no lock is ever held across I/O, so a
//! join blocked on an authorization query never stalls another
//! connection's broadcast. Delivery is fire-and-forget through each
//! connection's unbounded channel: the socket writer task owns the actual
//! send, and a slow consumer can never block the broadcaster.
//!
//! Invariant: a group's membership is a subset of open connections. A
//! broadcast observes membership as of the moment it walks the group's
//! entry; connections joining or leaving mid-broadcast may or may not see
//! that one payload, but a disconnected connection is never delivered to
//! after `unregister` completes.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use uuid::Uuid;

use super::messages::{GatewaySend, OpCode, Payload};
use crate::domain::scope::ChatScope;
use crate::infrastructure::metrics;

/// One live transport connection.
pub struct Connection {
    pub id: Uuid,
    pub user_id: i64,
    sender: mpsc::UnboundedSender<GatewaySend>,
    sequence: AtomicU64,
    groups: RwLock<HashSet<String>>,
}

impl Connection {
    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Group tags this connection is currently joined to.
    pub fn groups(&self) -> Vec<String> {
        self.groups.read().iter().cloned().collect()
    }

    /// Queue a dispatch frame for this connection. Returns false when the
    /// connection's writer has gone away.
    pub fn dispatch(&self, event: &str, data: serde_json::Value) -> bool {
        self.sender
            .send(GatewaySend {
                op: OpCode::Dispatch as u8,
                d: Some(data),
                s: Some(self.next_sequence()),
                t: Some(event.to_string()),
            })
            .is_ok()
    }

    /// Queue a raw (non-dispatch) frame.
    pub fn send(&self, message: GatewaySend) -> bool {
        self.sender.send(message).is_ok()
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .finish()
    }
}

/// The gateway's shared membership index.
pub struct Gateway {
    /// Live connections by connection id
    connections: DashMap<Uuid, Arc<Connection>>,
    /// User id to connection ids (one user can have multiple devices)
    user_connections: DashMap<i64, Vec<Uuid>>,
    /// Group tag to member connection ids
    group_members: DashMap<String, Vec<Uuid>>,
}

impl Gateway {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
            user_connections: DashMap::new(),
            group_members: DashMap::new(),
        }
    }

    /// Register a newly identified connection.
    pub fn register(
        &self,
        user_id: i64,
        sender: mpsc::UnboundedSender<GatewaySend>,
    ) -> Arc<Connection> {
        let connection = Arc::new(Connection {
            id: Uuid::new_v4(),
            user_id,
            sender,
            sequence: AtomicU64::new(0),
            groups: RwLock::new(HashSet::new()),
        });

        self.connections.insert(connection.id, connection.clone());
        self.user_connections
            .entry(user_id)
            .or_default()
            .push(connection.id);

        metrics::GATEWAY_CONNECTIONS_ACTIVE
            .with_label_values(&["identified"])
            .inc();
        tracing::info!(user_id, connection_id = %connection.id, "Connection registered");

        connection
    }

    /// Remove a connection from the index and from every group it joined.
    /// Safe to call more than once for the same connection.
    pub fn unregister(&self, connection_id: Uuid) {
        let Some((_, connection)) = self.connections.remove(&connection_id) else {
            return;
        };

        if let Some(mut ids) = self.user_connections.get_mut(&connection.user_id) {
            ids.retain(|id| *id != connection_id);
        }

        let groups = connection.groups();
        for group in &groups {
            self.remove_member(group, connection_id);
        }

        metrics::GATEWAY_CONNECTIONS_ACTIVE
            .with_label_values(&["identified"])
            .dec();
        tracing::info!(
            user_id = connection.user_id,
            connection_id = %connection_id,
            groups = groups.len(),
            "Connection unregistered"
        );
    }

    /// Record group membership for a connection. Duplicate joins collapse
    /// to a single membership entry (no double delivery).
    pub fn join_group(&self, connection_id: Uuid, group_tag: &str) {
        let Some(connection) = self.connections.get(&connection_id) else {
            return;
        };

        let newly_joined = connection.groups.write().insert(group_tag.to_string());
        if newly_joined {
            self.group_members
                .entry(group_tag.to_string())
                .or_default()
                .push(connection_id);
        }
    }

    /// Drop group membership for a connection. Never fails; removing a
    /// membership that does not exist is a no-op.
    pub fn leave_group(&self, connection_id: Uuid, group_tag: &str) {
        if let Some(connection) = self.connections.get(&connection_id) {
            connection.groups.write().remove(group_tag);
        }
        self.remove_member(group_tag, connection_id);
    }

    /// Take a connection out of a group's member vec, dropping the key
    /// once it empties so group churn cannot grow the index unboundedly.
    fn remove_member(&self, group_tag: &str, connection_id: Uuid) {
        let now_empty = self
            .group_members
            .get_mut(group_tag)
            .map(|mut members| {
                members.retain(|id| *id != connection_id);
                members.is_empty()
            })
            .unwrap_or(false);
        // The entry guard is gone here; re-check under the removal lock.
        if now_empty {
            self.group_members
                .remove_if(group_tag, |_, members| members.is_empty());
        }
    }

    /// Deliver `content` wrapped in the group envelope to every member of
    /// `group_tag`. A group with no members is a silent no-op. Returns the
    /// number of connections the payload was queued for.
    pub fn broadcast(&self, group_tag: &str, event: &str, content: serde_json::Value) -> usize {
        let member_ids: Vec<Uuid> = match self.group_members.get(group_tag) {
            Some(members) => members.clone(),
            None => return 0,
        };
        if member_ids.is_empty() {
            return 0;
        }

        let envelope = Payload::new(group_tag, content);
        let data = match serde_json::to_value(&envelope) {
            Ok(v) => v,
            Err(e) => {
                tracing::error!(group = group_tag, error = %e, "Failed to encode payload");
                return 0;
            }
        };

        let mut delivered = 0;
        for id in member_ids {
            if let Some(connection) = self.connections.get(&id) {
                if connection.dispatch(event, data.clone()) {
                    delivered += 1;
                }
            }
        }

        let scope_kind = ChatScope::parse_tag(group_tag)
            .map(|s| s.kind_label())
            .unwrap_or("unknown");
        metrics::BROADCASTS_TOTAL
            .with_label_values(&[scope_kind])
            .inc();
        tracing::debug!(group = group_tag, event, delivered, "Broadcast");

        delivered
    }

    /// Whether the user has at least one live connection.
    pub fn is_user_online(&self, user_id: i64) -> bool {
        self.user_connections
            .get(&user_id)
            .map(|ids| !ids.is_empty())
            .unwrap_or(false)
    }

    /// Number of live connections.
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Number of members currently indexed under a group.
    pub fn group_size(&self, group_tag: &str) -> usize {
        self.group_members
            .get(group_tag)
            .map(|m| m.len())
            .unwrap_or(0)
    }

    /// Number of groups currently present in the membership index.
    pub fn group_count(&self) -> usize {
        self.group_members.len()
    }
}

impl Default for Gateway {
    fn default() -> Self {
        Self::new()
    }
}
