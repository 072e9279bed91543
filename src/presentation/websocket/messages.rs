//! WebSocket Message Types
//!
//! Inbound envelopes sent by clients and outbound events sent by the server.
//! Every frame is a JSON object discriminated by its `type` field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

use crate::domain::{Message, MessageStatus, MessageType};

/// Prefix of the reply sent for frames that are not JSON objects.
pub const ECHO_PREFIX: &str = "Echo: ";

/// Envelope type assumed when a frame carries no `type` field.
pub const DEFAULT_ENVELOPE_TYPE: &str = "text";

const ENVELOPE_TYPES: &[&str] = &[
    "text",
    "media",
    "read",
    "typing",
    "call-offer",
    "call-answer",
    "ice-candidate",
    "call-reject",
    "status",
];

/// Why an inbound frame could not be turned into an `Envelope`
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("malformed frame: {0}")]
    Malformed(String),

    #[error("unknown envelope type `{0}`")]
    UnknownType(String),

    #[error("invalid `{kind}` envelope: {source}")]
    Schema {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Why a well-formed envelope was refused
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("missing required field `{0}`")]
    MissingField(&'static str),

    #[error("invalid fields: {0}")]
    Invalid(String),

    #[error("`{0}` envelopes are server-originated")]
    ServerOnly(&'static str),
}

/// Inbound envelope, validated at the schema level only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Envelope {
    Text(ChatMessageFrame),
    Media(ChatMessageFrame),
    Read(ReadFrame),
    Typing(TypingFrame),
    CallOffer(SignalFrame),
    CallAnswer(SignalFrame),
    IceCandidate(SignalFrame),
    CallReject(SignalFrame),
    Status(Value),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct ChatMessageFrame {
    #[validate(required, range(min = 1))]
    pub chat_id: Option<i64>,
    #[validate(required, length(min = 1, max = 4000))]
    pub content: Option<String>,
    pub media_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct ReadFrame {
    #[validate(required, range(min = 1))]
    pub chat_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct TypingFrame {
    #[validate(required, range(min = 1))]
    pub chat_id: Option<i64>,
    pub is_typing: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
pub struct SignalFrame {
    #[validate(required, range(min = 1))]
    pub recipient_id: Option<i64>,
    /// Opaque SDP or ICE payload
    pub data: Option<Value>,
}

/// Call-signaling message kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalKind {
    CallOffer,
    CallAnswer,
    IceCandidate,
    CallReject,
}

impl SignalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CallOffer => "call-offer",
            Self::CallAnswer => "call-answer",
            Self::IceCandidate => "ice-candidate",
            Self::CallReject => "call-reject",
        }
    }
}

/// A business-valid request extracted from an envelope.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    PostMessage {
        message_type: MessageType,
        chat_id: i64,
        content: String,
        media_url: Option<String>,
    },
    MarkRead {
        chat_id: i64,
    },
    Typing {
        chat_id: i64,
        is_typing: bool,
    },
    Signal {
        kind: SignalKind,
        recipient_id: i64,
        data: Value,
    },
}

impl Envelope {
    /// Parse a raw text frame.
    ///
    /// A frame without `type` is treated as `text`.
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let mut value: Value =
            serde_json::from_str(text).map_err(|e| EnvelopeError::Malformed(e.to_string()))?;

        let object = value
            .as_object_mut()
            .ok_or_else(|| EnvelopeError::Malformed("frame is not a JSON object".into()))?;

        let kind = match object.get("type") {
            None => {
                object.insert("type".into(), Value::from(DEFAULT_ENVELOPE_TYPE));
                DEFAULT_ENVELOPE_TYPE.to_string()
            }
            Some(Value::String(kind)) => kind.clone(),
            Some(other) => return Err(EnvelopeError::UnknownType(other.to_string())),
        };

        if !ENVELOPE_TYPES.contains(&kind.as_str()) {
            return Err(EnvelopeError::UnknownType(kind));
        }

        serde_json::from_value(value).map_err(|source| EnvelopeError::Schema { kind, source })
    }

    /// Wire name of this envelope's type
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Text(_) => "text",
            Envelope::Media(_) => "media",
            Envelope::Read(_) => "read",
            Envelope::Typing(_) => "typing",
            Envelope::CallOffer(_) => SignalKind::CallOffer.as_str(),
            Envelope::CallAnswer(_) => SignalKind::CallAnswer.as_str(),
            Envelope::IceCandidate(_) => SignalKind::IceCandidate.as_str(),
            Envelope::CallReject(_) => SignalKind::CallReject.as_str(),
            Envelope::Status(_) => "status",
        }
    }

    /// Apply the per-type business rules.
    pub fn into_command(self) -> Result<Command, Rejection> {
        match self {
            Envelope::Text(frame) => frame.into_command(MessageType::Text),
            Envelope::Media(frame) => frame.into_command(MessageType::Media),
            Envelope::Read(frame) => {
                validate(&frame)?;
                let chat_id = frame.chat_id.ok_or(Rejection::MissingField("chat_id"))?;
                Ok(Command::MarkRead { chat_id })
            }
            Envelope::Typing(frame) => {
                validate(&frame)?;
                let chat_id = frame.chat_id.ok_or(Rejection::MissingField("chat_id"))?;
                Ok(Command::Typing {
                    chat_id,
                    is_typing: frame.is_typing.unwrap_or(true),
                })
            }
            Envelope::CallOffer(frame) => frame.into_command(SignalKind::CallOffer),
            Envelope::CallAnswer(frame) => frame.into_command(SignalKind::CallAnswer),
            Envelope::IceCandidate(frame) => frame.into_command(SignalKind::IceCandidate),
            Envelope::CallReject(frame) => frame.into_command(SignalKind::CallReject),
            Envelope::Status(_) => Err(Rejection::ServerOnly("status")),
        }
    }
}

impl ChatMessageFrame {
    fn into_command(self, message_type: MessageType) -> Result<Command, Rejection> {
        validate(&self)?;
        let chat_id = self.chat_id.ok_or(Rejection::MissingField("chat_id"))?;
        let content = self.content.ok_or(Rejection::MissingField("content"))?;
        Ok(Command::PostMessage {
            message_type,
            chat_id,
            content,
            media_url: self.media_url,
        })
    }
}

impl SignalFrame {
    fn into_command(self, kind: SignalKind) -> Result<Command, Rejection> {
        validate(&self)?;
        let recipient_id = self
            .recipient_id
            .ok_or(Rejection::MissingField("recipient_id"))?;
        Ok(Command::Signal {
            kind,
            recipient_id,
            data: self.data.unwrap_or(Value::Null),
        })
    }
}

fn validate<T: Validate>(frame: &T) -> Result<(), Rejection> {
    frame.validate().map_err(|errors| {
        let mut fields: Vec<_> = errors
            .field_errors()
            .into_iter()
            .map(|(field, errs)| {
                let code = errs.first().map(|e| e.code.to_string()).unwrap_or_default();
                format!("{}: {}", field, code)
            })
            .collect();
        fields.sort();
        Rejection::Invalid(fields.join(", "))
    })
}

/// Online/offline status carried by presence events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PresenceStatus {
    Online,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Online => "online",
            Self::Offline => "offline",
        }
    }
}

/// Outbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum ServerEvent {
    Text(MessageEvent),
    Media(MessageEvent),
    Read(ReadEvent),
    Typing(TypingEvent),
    CallOffer(SignalEvent),
    CallAnswer(SignalEvent),
    IceCandidate(SignalEvent),
    CallReject(SignalEvent),
    Status(StatusEvent),
}

/// A stored message, mirrored to every chat member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEvent {
    pub message_id: i64,
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub media_url: Option<String>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadEvent {
    pub chat_id: i64,
    pub user_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypingEvent {
    pub chat_id: i64,
    pub user_id: i64,
    pub is_typing: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalEvent {
    pub sender_id: i64,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub user_id: i64,
    pub status: PresenceStatus,
}

impl ServerEvent {
    /// Event announcing a stored message, typed after the message.
    pub fn message(message: Message) -> Self {
        let message_type = message.message_type;
        let event = MessageEvent {
            message_id: message.id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            media_url: message.media_url,
            status: message.status,
            created_at: message.created_at,
        };
        match message_type {
            MessageType::Text => ServerEvent::Text(event),
            MessageType::Media => ServerEvent::Media(event),
        }
    }

    pub fn signal(kind: SignalKind, sender_id: i64, data: Value) -> Self {
        let event = SignalEvent { sender_id, data };
        match kind {
            SignalKind::CallOffer => ServerEvent::CallOffer(event),
            SignalKind::CallAnswer => ServerEvent::CallAnswer(event),
            SignalKind::IceCandidate => ServerEvent::IceCandidate(event),
            SignalKind::CallReject => ServerEvent::CallReject(event),
        }
    }

    pub fn status(user_id: i64, status: PresenceStatus) -> Self {
        ServerEvent::Status(StatusEvent { user_id, status })
    }
}
