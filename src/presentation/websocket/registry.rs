//! Connection Registry
//!
//! Maps user IDs to their live connections. Backed by a sharded map so
//! fan-out on one user never waits on registration of users in other
//! shards.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::session::{Connection, ConnectionId, Payload, SendError};

/// Result of registering a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// The user had no connections before this one
    FirstForUser,
    /// The user already had other connections
    Additional,
    /// This exact connection was already registered
    AlreadyRegistered,
}

/// Result of unregistering a connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unregistration {
    /// The user has no connections left
    LastForUser,
    /// The user still has this many connections
    Remaining(usize),
    /// The connection was not registered
    NotRegistered,
}

/// Counts from one fan-out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub failed: usize,
}

impl Delivery {
    fn merge(&mut self, other: Delivery) {
        self.delivered += other.delivered;
        self.failed += other.failed;
    }
}

/// Registry of live connections keyed by user ID.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<i64, Vec<Arc<Connection>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to its user's live set
    pub fn register(&self, connection: Arc<Connection>) -> Registration {
        let user_id = connection.user_id();
        let mut entry = self.connections.entry(user_id).or_default();

        if entry.iter().any(|c| c.id() == connection.id()) {
            return Registration::AlreadyRegistered;
        }

        let first = entry.is_empty();
        entry.push(connection);

        tracing::debug!(user_id, connections = entry.len(), "Connection registered");

        if first {
            Registration::FirstForUser
        } else {
            Registration::Additional
        }
    }

    /// Remove one connection; a no-op if it is not registered
    pub fn unregister(&self, connection: &Connection) -> Unregistration {
        let user_id = connection.user_id();
        let Entry::Occupied(mut entry) = self.connections.entry(user_id) else {
            return Unregistration::NotRegistered;
        };

        let before = entry.get().len();
        entry.get_mut().retain(|c| c.id() != connection.id());
        let remaining = entry.get().len();

        if remaining == before {
            return Unregistration::NotRegistered;
        }

        tracing::debug!(user_id, remaining, "Connection unregistered");

        if remaining == 0 {
            entry.remove();
            Unregistration::LastForUser
        } else {
            Unregistration::Remaining(remaining)
        }
    }

    /// Deliver to every live connection of one user.
    ///
    /// A failed write closes that connection and does not stop delivery to
    /// the others. The connection stays listed until its owner unregisters
    /// it, but receives nothing further.
    pub fn send_to_user(&self, user_id: i64, payload: &Payload) -> Delivery {
        match self.connections.get(&user_id) {
            Some(connections) => deliver(connections.value(), payload),
            None => Delivery::default(),
        }
    }

    /// Deliver to every connection of each listed user
    pub fn send_to_users<I>(&self, user_ids: I, payload: &Payload) -> Delivery
    where
        I: IntoIterator<Item = i64>,
    {
        let mut total = Delivery::default();
        for user_id in user_ids {
            total.merge(self.send_to_user(user_id, payload));
        }
        total
    }

    /// Deliver to every live connection of every user
    pub fn broadcast(&self, payload: &Payload) -> Delivery {
        let mut total = Delivery::default();
        for entry in self.connections.iter() {
            total.merge(deliver(entry.value(), payload));
        }
        total
    }

    /// Whether the user has at least one open connection
    pub fn is_online(&self, user_id: i64) -> bool {
        self.connections
            .get(&user_id)
            .map(|connections| connections.iter().any(|c| c.is_open()))
            .unwrap_or(false)
    }

    pub fn contains(&self, user_id: i64, connection_id: ConnectionId) -> bool {
        self.connections
            .get(&user_id)
            .map(|connections| connections.iter().any(|c| c.id() == connection_id))
            .unwrap_or(false)
    }

    /// Total registered connections
    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|entry| entry.value().len()).sum()
    }

    /// Users with at least one registered connection
    pub fn user_count(&self) -> usize {
        self.connections.len()
    }
}

fn deliver(connections: &[Arc<Connection>], payload: &Payload) -> Delivery {
    let mut delivery = Delivery::default();
    for connection in connections {
        match connection.send(payload) {
            Ok(()) => delivery.delivered += 1,
            // Already failed once; its owner has not unregistered it yet
            Err(SendError::Closed) => {}
            Err(e @ SendError::Disconnected) => {
                tracing::debug!(
                    user_id = connection.user_id(),
                    connection_id = %connection.id(),
                    error = %e,
                    "Write to dead connection failed"
                );
                delivery.failed += 1;
            }
        }
    }
    delivery
}
