//! WebSocket Gateway
//!
//! Live connections, envelope routing and presence.

pub mod dispatcher;
pub mod gateway;
pub mod handler;
pub mod messages;
pub mod presence;
pub mod registry;
pub mod session;

pub use dispatcher::{DispatchError, Dispatched, Dispatcher};
pub use gateway::{Gateway, GatewayConfig};
pub use handler::ws_handler;
pub use messages::{Envelope, EnvelopeError, PresenceStatus, ServerEvent};
pub use presence::PresenceNotifier;
pub use registry::{ConnectionRegistry, Delivery, Registration, Unregistration};
pub use session::{Connection, ConnectionId, ConnectionState, Payload, SendError};
