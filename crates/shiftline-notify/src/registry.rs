//! # Connection Registry
//!
//! Process-wide map of live observer connections.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  registry.connect(user, tenant, capacity)                              │
//! │       │   inserts entry, returns (ConnectionHandle, Receiver)          │
//! │       ▼                                                                 │
//! │  handle.join(Room::Branch(..)) / handle.join(Room::Courier(..))        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  FanoutHub pushes Deliveries into the connection's bounded queue       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  drop(handle)  ──▶  entry removed                                      │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The map is sharded (`DashMap`), so presence queries run concurrently
//! with connects and disconnects.

use dashmap::DashMap;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use crate::event::Room;

/// One frame queued for a connection.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Event name (`newOrder`, `orderUpdated`).
    pub name: &'static str,
    /// JSON payload, shared between every recipient of the same event.
    pub payload: Arc<str>,
}

#[derive(Debug)]
pub(crate) struct Connection {
    pub(crate) user_id: String,
    pub(crate) tenant_id: String,
    pub(crate) rooms: HashSet<Room>,
    pub(crate) sender: mpsc::Sender<Delivery>,
}

/// Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct ConnectionRegistry {
    connections: Arc<DashMap<String, Connection>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a connection. It is joined to its tenant room; callers
    /// join further rooms through the handle.
    pub fn connect(
        &self,
        user_id: impl Into<String>,
        tenant_id: impl Into<String>,
        capacity: usize,
    ) -> (ConnectionHandle, mpsc::Receiver<Delivery>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let id = Uuid::new_v4().to_string();
        let user_id = user_id.into();
        let tenant_id = tenant_id.into();

        let mut rooms = HashSet::new();
        rooms.insert(Room::Tenant(tenant_id.clone()));

        debug!(
            connection_id = %id,
            user_id = %user_id,
            tenant_id = %tenant_id,
            "Connection registered"
        );
        self.connections.insert(
            id.clone(),
            Connection {
                user_id,
                tenant_id,
                rooms,
                sender,
            },
        );

        let handle = ConnectionHandle {
            id,
            registry: self.clone(),
        };
        (handle, receiver)
    }

    /// Distinct users with a live connection in the tenant.
    pub fn online_in_tenant(&self, tenant_id: &str) -> Vec<String> {
        let users: BTreeSet<String> = self
            .connections
            .iter()
            .filter(|entry| entry.tenant_id == tenant_id)
            .map(|entry| entry.user_id.clone())
            .collect();
        users.into_iter().collect()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Senders of every connection joined to at least one of `rooms`.
    /// Each connection appears once however many rooms it matches.
    pub(crate) fn recipients(&self, rooms: &[Room]) -> Vec<(String, mpsc::Sender<Delivery>)> {
        self.connections
            .iter()
            .filter(|entry| rooms.iter().any(|room| entry.rooms.contains(room)))
            .map(|entry| (entry.key().clone(), entry.sender.clone()))
            .collect()
    }

    fn join(&self, id: &str, room: Room) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.rooms.insert(room);
        }
    }

    fn leave(&self, id: &str, room: &Room) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.rooms.remove(room);
        }
    }

    fn remove(&self, id: &str) {
        if self.connections.remove(id).is_some() {
            debug!(connection_id = %id, "Connection removed");
        }
    }
}

/// Owner of a registry entry. Dropping it unregisters the connection.
#[derive(Debug)]
pub struct ConnectionHandle {
    id: String,
    registry: ConnectionRegistry,
}

impl ConnectionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn join(&self, room: Room) {
        self.registry.join(&self.id, room);
    }

    pub fn leave(&self, room: &Room) {
        self.registry.leave(&self.id, room);
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        self.registry.remove(&self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_removes_entry() {
        let registry = ConnectionRegistry::new();
        let (first, _rx1) = registry.connect("u1", "t1", 8);
        let (second, _rx2) = registry.connect("u2", "t1", 8);
        assert_eq!(registry.len(), 2);

        drop(first);
        assert_eq!(registry.len(), 1);
        drop(second);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_online_in_tenant_is_distinct_and_scoped() {
        let registry = ConnectionRegistry::new();
        let (_a, _ra) = registry.connect("u1", "t1", 8);
        let (_b, _rb) = registry.connect("u1", "t1", 8);
        let (_c, _rc) = registry.connect("u2", "t1", 8);
        let (_d, _rd) = registry.connect("u3", "t2", 8);

        assert_eq!(registry.online_in_tenant("t1"), vec!["u1", "u2"]);
        assert_eq!(registry.online_in_tenant("t2"), vec!["u3"]);
        assert!(registry.online_in_tenant("t3").is_empty());
    }

    #[test]
    fn test_recipients_are_deduplicated() {
        let registry = ConnectionRegistry::new();
        let (handle, _rx) = registry.connect("u1", "t1", 8);
        handle.join(Room::Branch("b1".into()));

        let rooms = vec![Room::Tenant("t1".into()), Room::Branch("b1".into())];
        assert_eq!(registry.recipients(&rooms).len(), 1);

        handle.leave(&Room::Branch("b1".into()));
        assert_eq!(registry.recipients(&[Room::Branch("b1".into())]).len(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_connects_and_presence() {
        let registry = ConnectionRegistry::new();
        let mut tasks = Vec::new();
        for i in 0..16 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let (handle, _rx) = registry.connect(format!("u{}", i), "t1", 4);
                let online = registry.online_in_tenant("t1");
                assert!(!online.is_empty());
                drop(handle);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }
        assert!(registry.is_empty());
    }
}
