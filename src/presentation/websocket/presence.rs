//! Presence Notifier
//!
//! Announces users going online and offline to every live connection.

use std::sync::Arc;

use super::messages::{PresenceStatus, ServerEvent};
use super::registry::{ConnectionRegistry, Delivery, Registration, Unregistration};
use super::session::Payload;
use crate::config::PresenceMode;
use crate::infrastructure::metrics;

/// Broadcasts `status` events on connection lifecycle changes.
pub struct PresenceNotifier {
    registry: Arc<ConnectionRegistry>,
    mode: PresenceMode,
}

impl PresenceNotifier {
    pub fn new(registry: Arc<ConnectionRegistry>, mode: PresenceMode) -> Self {
        Self { registry, mode }
    }

    pub fn mode(&self) -> PresenceMode {
        self.mode
    }

    /// Called after a connection was registered.
    ///
    /// Returns the fan-out counts, or `None` when nothing was announced.
    pub fn connected(&self, user_id: i64, registration: Registration) -> Option<Delivery> {
        let announce = match (self.mode, registration) {
            (_, Registration::AlreadyRegistered) => false,
            (PresenceMode::PerUser, Registration::Additional) => false,
            _ => true,
        };
        announce.then(|| self.announce(user_id, PresenceStatus::Online))
    }

    /// Called after a connection was unregistered.
    ///
    /// In per-user mode the offline event is withheld if the user has
    /// reconnected since the unregister.
    pub fn disconnected(&self, user_id: i64, unregistration: Unregistration) -> Option<Delivery> {
        let announce = match (self.mode, unregistration) {
            (_, Unregistration::NotRegistered) => false,
            (PresenceMode::PerUser, Unregistration::Remaining(_)) => false,
            (PresenceMode::PerUser, Unregistration::LastForUser) => {
                !self.registry.is_online(user_id)
            }
            _ => true,
        };
        announce.then(|| self.announce(user_id, PresenceStatus::Offline))
    }

    fn announce(&self, user_id: i64, status: PresenceStatus) -> Delivery {
        let event = ServerEvent::status(user_id, status);
        let delivery = match serde_json::to_string(&event) {
            Ok(text) => {
                let payload: Payload = Arc::from(text);
                self.registry.broadcast(&payload)
            }
            Err(e) => {
                tracing::error!(user_id, error = %e, "Failed to encode status event");
                return Delivery::default();
            }
        };

        metrics::record_presence(status.as_str());
        metrics::record_fanout(delivery.delivered, delivery.failed);

        tracing::debug!(
            user_id,
            status = status.as_str(),
            delivered = delivery.delivered,
            failed = delivery.failed,
            "Presence broadcast"
        );

        delivery
    }
}
