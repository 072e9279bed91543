//! WebSocket Connection Handles
//!
//! A `Connection` is the registry's view of one live socket: the owning
//! user, an outbound queue drained by the socket's writer task, and the
//! Open/Closed state.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

/// Serialized outbound frame, shared between all recipients of a fan-out.
pub type Payload = Arc<str>;

/// Unique identifier of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lifecycle of a connection. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Open,
    Closed,
}

/// Outbound send failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendError {
    #[error("connection is closed")]
    Closed,

    #[error("peer went away")]
    Disconnected,
}

/// A live connection owned by one user.
pub struct Connection {
    id: ConnectionId,
    user_id: i64,
    sender: mpsc::UnboundedSender<Payload>,
    closed: AtomicBool,
}

impl Connection {
    pub fn new(user_id: i64, sender: mpsc::UnboundedSender<Payload>) -> Self {
        Self {
            id: ConnectionId::new(),
            user_id,
            sender,
            closed: AtomicBool::new(false),
        }
    }

    /// Create a connection together with the receiving end of its queue.
    pub fn channel(user_id: i64) -> (Arc<Self>, mpsc::UnboundedReceiver<Payload>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self::new(user_id, tx)), rx)
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn state(&self) -> ConnectionState {
        if self.closed.load(Ordering::Acquire) || self.sender.is_closed() {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }

    pub fn is_open(&self) -> bool {
        self.state() == ConnectionState::Open
    }

    /// Transition to `Closed`. Returns false if it already was.
    pub fn close(&self) -> bool {
        !self.closed.swap(true, Ordering::AcqRel)
    }

    /// Queue a frame for the writer task.
    ///
    /// Never blocks. A failed write closes the connection so later fan-outs
    /// skip it.
    pub fn send(&self, payload: &Payload) -> Result<(), SendError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SendError::Closed);
        }
        self.sender.send(Arc::clone(payload)).map_err(|_| {
            self.close();
            SendError::Disconnected
        })
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("user_id", &self.user_id)
            .field("state", &self.state())
            .finish()
    }
}
