//! Message entity and repository trait.
//!
//! Maps to the `messages` table in the database schema.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// Kind of a durable chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text message
    #[default]
    Text,
    /// Message referencing an uploaded file via `media_url`
    Media,
}

impl MessageType {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "media" => Self::Media,
            _ => Self::Text,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Media => "media",
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Delivery status of a message.
///
/// Messages are stored as `sent`. A read receipt moves every message in the
/// chat not sent by the reader to `read` in one step. `delivered` is a valid
/// stored value but nothing in the live path writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    #[default]
    Sent,
    Delivered,
    Read,
}

impl MessageStatus {
    /// Convert from database string representation.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "delivered" => Self::Delivered,
            "read" => Self::Read,
            _ => Self::Sent,
        }
    }

    /// Convert to database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Read => "read",
        }
    }
}

impl std::fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A persisted chat message.
///
/// Maps to the `messages` table:
/// - message_id: BIGSERIAL PRIMARY KEY
/// - chat_id: BIGINT NOT NULL REFERENCES chats(chat_id)
/// - sender_id: BIGINT NOT NULL
/// - content: TEXT NULL
/// - media_url: TEXT NULL
/// - msg_type: TEXT NOT NULL DEFAULT 'text'
/// - status: TEXT NOT NULL DEFAULT 'sent'
/// - created_at: TIMESTAMPTZ NOT NULL DEFAULT NOW()
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically increasing identifier assigned by storage
    pub id: i64,

    /// Chat the message belongs to
    pub chat_id: i64,

    /// Author user ID
    pub sender_id: i64,

    /// Message body
    pub content: String,

    /// Location of the attached file, for media messages
    pub media_url: Option<String>,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    pub status: MessageStatus,

    /// Server-side creation timestamp
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Whether a recipient has read the message.
    pub fn is_read(&self) -> bool {
        self.status == MessageStatus::Read
    }
}

/// Fields supplied by the sender when creating a message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMessage {
    pub chat_id: i64,
    pub sender_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
}

/// Persistence contract for chat messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Store a new message with status `sent`, returning the stored record
    /// with its assigned id and timestamp.
    async fn create_message(&self, message: NewMessage) -> Result<Message, AppError>;

    /// Mark every message in the chat that was not sent by `reader_id` and
    /// is not yet read as `read`.
    ///
    /// Returns the number of messages that changed. Re-running it for the
    /// same reader has no further effect.
    async fn mark_chat_read(&self, chat_id: i64, reader_id: i64) -> Result<u64, AppError>;

    /// All messages of a chat, oldest first.
    async fn find_by_chat(&self, chat_id: i64) -> Result<Vec<Message>, AppError>;
}
