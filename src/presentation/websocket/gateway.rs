//! WebSocket Gateway
//!
//! Entry point for the per-connection loop: connection lifecycle, presence
//! and frame dispatch behind one handle shared by every socket task.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;

use super::dispatcher::{DispatchError, Dispatched, Dispatcher};
use super::presence::PresenceNotifier;
use super::registry::{ConnectionRegistry, Registration, Unregistration};
use super::session::Connection;
use crate::application::services::{ChatError, ChatService};
use crate::config::{PresenceMode, Settings};
use crate::infrastructure::metrics;

/// Gateway behaviour toggles
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayConfig {
    pub presence_mode: PresenceMode,
    pub echo_malformed: bool,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            presence_mode: PresenceMode::PerUser,
            echo_malformed: true,
        }
    }
}

impl From<&Settings> for GatewayConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            presence_mode: settings.presence.mode,
            echo_malformed: settings.websocket.echo_malformed,
        }
    }
}

/// WebSocket gateway managing all connections
pub struct Gateway {
    registry: Arc<ConnectionRegistry>,
    presence: PresenceNotifier,
    dispatcher: Dispatcher,
    /// Held across a registry change and its presence broadcast
    lifecycle: Mutex<()>,
}

impl Gateway {
    pub fn new(chat: Arc<dyn ChatService>, config: GatewayConfig) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            presence: PresenceNotifier::new(Arc::clone(&registry), config.presence_mode),
            dispatcher: Dispatcher::new(chat, Arc::clone(&registry), config.echo_malformed),
            registry,
            lifecycle: Mutex::new(()),
        }
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    /// Number of live connections
    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    /// Register a freshly upgraded connection and announce it.
    pub fn on_connect(&self, connection: Arc<Connection>) -> Registration {
        let user_id = connection.user_id();
        let connection_id = connection.id();

        let registration = {
            let _guard = self.lifecycle.lock();
            let registration = self.registry.register(connection);
            self.presence.connected(user_id, registration);
            registration
        };
        metrics::set_websocket_connections(self.registry.connection_count());

        tracing::info!(
            user_id,
            connection_id = %connection_id,
            registration = ?registration,
            "User connected"
        );

        registration
    }

    /// Close and unregister a connection, announcing the user offline when
    /// the presence mode calls for it. Safe to call more than once.
    pub fn on_disconnect(&self, connection: &Connection) -> Unregistration {
        connection.close();

        let unregistration = {
            let _guard = self.lifecycle.lock();
            let unregistration = self.registry.unregister(connection);
            self.presence.disconnected(connection.user_id(), unregistration);
            unregistration
        };
        if unregistration == Unregistration::NotRegistered {
            return unregistration;
        }

        metrics::set_websocket_connections(self.registry.connection_count());

        tracing::info!(
            user_id = connection.user_id(),
            connection_id = %connection.id(),
            unregistration = ?unregistration,
            "User disconnected"
        );

        unregistration
    }

    /// Process one inbound text frame.
    ///
    /// Failures are logged and counted here; they never close the connection.
    pub async fn handle_frame(&self, connection: &Connection, frame: &str) {
        let start = Instant::now();

        match self.dispatcher.dispatch(connection, frame).await {
            Ok(Dispatched::Echoed) => {
                metrics::record_dropped("malformed");
                tracing::debug!(
                    user_id = connection.user_id(),
                    connection_id = %connection.id(),
                    "Echoed malformed frame"
                );
            }
            Ok(Dispatched::Delivered { kind, delivery }) => {
                metrics::record_dispatch(kind, start.elapsed().as_secs_f64());
                tracing::trace!(
                    user_id = connection.user_id(),
                    kind,
                    delivered = delivery.delivered,
                    failed = delivery.failed,
                    "Envelope dispatched"
                );
            }
            Err(e) => self.dropped(connection, e, start),
        }
    }

    fn dropped(&self, connection: &Connection, error: DispatchError, start: Instant) {
        let reason = error.reason();
        metrics::record_dropped(reason);
        if let Some(kind) = error.kind() {
            metrics::record_dispatch(kind, start.elapsed().as_secs_f64());
        }

        match &error {
            DispatchError::Chat {
                source: ChatError::Storage { operation, source },
                ..
            } => {
                metrics::record_collaborator_failure(operation);
                tracing::warn!(
                    user_id = connection.user_id(),
                    connection_id = %connection.id(),
                    reason,
                    storage_error = source.kind(),
                    error = %error,
                    "Envelope dropped"
                );
            }
            _ => {
                tracing::debug!(
                    user_id = connection.user_id(),
                    connection_id = %connection.id(),
                    reason,
                    error = %error,
                    "Envelope dropped"
                );
            }
        }
    }
}
