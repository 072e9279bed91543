//! Message Dispatcher
//!
//! Turns one inbound frame into its effects: persistence through the chat
//! service and fan-out through the connection registry.

use std::sync::Arc;

use serde::Serialize;

use super::messages::{
    Command, Envelope, EnvelopeError, ReadEvent, Rejection, ServerEvent, SignalKind, TypingEvent,
    ECHO_PREFIX,
};
use super::registry::{ConnectionRegistry, Delivery};
use super::session::{Connection, Payload};
use crate::application::services::{ChatError, ChatService, PostMessageDto};
use crate::infrastructure::metrics;

/// What a frame led to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatched {
    /// A malformed frame was echoed back to its sender
    Echoed,
    /// An event was fanned out
    Delivered {
        kind: &'static str,
        delivery: Delivery,
    },
}

/// Why a frame was dropped
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    #[error("{kind} rejected: {source}")]
    Rejected {
        kind: &'static str,
        #[source]
        source: Rejection,
    },

    #[error("{kind} failed: {source}")]
    Chat {
        kind: &'static str,
        #[source]
        source: ChatError,
    },

    #[error("failed to encode {kind} event: {source}")]
    Encode {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl DispatchError {
    /// Metric label for the drop
    pub fn reason(&self) -> &'static str {
        match self {
            DispatchError::Envelope(EnvelopeError::Malformed(_)) => "malformed",
            DispatchError::Envelope(EnvelopeError::UnknownType(_)) => "unknown_type",
            DispatchError::Envelope(EnvelopeError::Schema { .. }) => "schema",
            DispatchError::Rejected { .. } => "rejected",
            DispatchError::Chat {
                source: ChatError::NotAMember { .. },
                ..
            } => "not_a_member",
            DispatchError::Chat {
                source: ChatError::Storage { .. },
                ..
            } => "storage",
            DispatchError::Encode { .. } => "encode",
        }
    }

    /// Envelope type, when the frame got far enough to have one
    pub fn kind(&self) -> Option<&'static str> {
        match self {
            DispatchError::Envelope(_) => None,
            DispatchError::Rejected { kind, .. }
            | DispatchError::Chat { kind, .. }
            | DispatchError::Encode { kind, .. } => Some(*kind),
        }
    }
}

/// Routes envelopes from live connections.
pub struct Dispatcher {
    chat: Arc<dyn ChatService>,
    registry: Arc<ConnectionRegistry>,
    echo_malformed: bool,
}

impl Dispatcher {
    pub fn new(
        chat: Arc<dyn ChatService>,
        registry: Arc<ConnectionRegistry>,
        echo_malformed: bool,
    ) -> Self {
        Self {
            chat,
            registry,
            echo_malformed,
        }
    }

    /// Handle one text frame received on `connection`.
    ///
    /// Never affects the connection's lifetime; every failure is returned
    /// for the caller to log.
    pub async fn dispatch(
        &self,
        connection: &Connection,
        frame: &str,
    ) -> Result<Dispatched, DispatchError> {
        let envelope = match Envelope::parse(frame) {
            Ok(envelope) => envelope,
            Err(EnvelopeError::Malformed(_)) if self.echo_malformed => {
                let echo: Payload = Arc::from(format!("{}{}", ECHO_PREFIX, frame));
                // The connection may already be closing; nothing else to do
                let _ = connection.send(&echo);
                return Ok(Dispatched::Echoed);
            }
            Err(e) => return Err(e.into()),
        };

        let kind = envelope.kind();
        metrics::record_envelope(kind);

        let command = envelope
            .into_command()
            .map_err(|source| DispatchError::Rejected { kind, source })?;

        let actor_id = connection.user_id();
        let delivery = match command {
            Command::PostMessage {
                message_type,
                chat_id,
                content,
                media_url,
            } => {
                let posted = self
                    .chat
                    .post_message(
                        actor_id,
                        PostMessageDto {
                            chat_id,
                            content,
                            message_type,
                            media_url,
                        },
                    )
                    .await
                    .map_err(|source| DispatchError::Chat { kind, source })?;

                tracing::debug!(
                    message_id = posted.message.id,
                    chat_id,
                    sender_id = actor_id,
                    "Message stored"
                );

                let payload = encode(kind, &ServerEvent::message(posted.message))?;
                self.registry.send_to_users(posted.recipients, &payload)
            }

            Command::MarkRead { chat_id } => {
                let receipt = self
                    .chat
                    .mark_read(actor_id, chat_id)
                    .await
                    .map_err(|source| DispatchError::Chat { kind, source })?;

                tracing::debug!(
                    chat_id,
                    reader_id = actor_id,
                    updated = receipt.updated,
                    "Chat read"
                );

                let event = ServerEvent::Read(ReadEvent {
                    chat_id,
                    user_id: actor_id,
                });
                let payload = encode(kind, &event)?;
                self.registry.send_to_users(receipt.recipients, &payload)
            }

            Command::Typing { chat_id, is_typing } => {
                let recipients = self
                    .chat
                    .typing_recipients(actor_id, chat_id)
                    .await
                    .map_err(|source| DispatchError::Chat { kind, source })?;

                let event = ServerEvent::Typing(TypingEvent {
                    chat_id,
                    user_id: actor_id,
                    is_typing,
                });
                let payload = encode(kind, &event)?;
                self.registry.send_to_users(recipients, &payload)
            }

            Command::Signal {
                kind: signal,
                recipient_id,
                data,
            } => self.signal(signal, actor_id, recipient_id, data)?,
        };

        metrics::record_fanout(delivery.delivered, delivery.failed);

        Ok(Dispatched::Delivered { kind, delivery })
    }

    fn signal(
        &self,
        signal: SignalKind,
        sender_id: i64,
        recipient_id: i64,
        data: serde_json::Value,
    ) -> Result<Delivery, DispatchError> {
        let payload = encode(signal.as_str(), &ServerEvent::signal(signal, sender_id, data))?;
        let delivery = self.registry.send_to_user(recipient_id, &payload);

        if delivery.delivered == 0 {
            tracing::debug!(
                sender_id,
                recipient_id,
                kind = signal.as_str(),
                "Signal recipient offline"
            );
        }

        Ok(delivery)
    }
}

fn encode<T: Serialize>(kind: &'static str, event: &T) -> Result<Payload, DispatchError> {
    serde_json::to_string(event)
        .map(Arc::from)
        .map_err(|source| DispatchError::Encode { kind, source })
}
