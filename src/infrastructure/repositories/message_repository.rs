//! Message Repository Implementation
//!
//! PostgreSQL implementation of the persistence collaborator: message
//! creation and bulk read receipts.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::time::Instant;

use crate::domain::{Message, MessageRepository, MessageStatus, MessageType, NewMessage};
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// PostgreSQL message repository implementation.
#[derive(Clone)]
pub struct PgMessageRepository {
    pool: PgPool,
}

impl PgMessageRepository {
    /// Creates a new PgMessageRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

/// Internal row type for message queries.
/// Maps to the messages table schema defined in the migration.
#[derive(Debug, sqlx::FromRow)]
struct MessageRow {
    message_id: i64,
    chat_id: i64,
    sender_id: i64,
    content: Option<String>,
    media_url: Option<String>,
    msg_type: String,
    status: String,
    created_at: DateTime<Utc>,
}

impl MessageRow {
    /// Converts database row to domain Message entity.
    fn into_message(self) -> Message {
        Message {
            id: self.message_id,
            chat_id: self.chat_id,
            sender_id: self.sender_id,
            content: self.content.unwrap_or_default(),
            media_url: self.media_url,
            message_type: MessageType::from_str(&self.msg_type),
            status: MessageStatus::from_str(&self.status),
            created_at: self.created_at,
        }
    }
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn create_message(&self, message: NewMessage) -> Result<Message, AppError> {
        let start = Instant::now();
        let row = sqlx::query_as::<_, MessageRow>(
            r#"
            INSERT INTO messages (chat_id, sender_id, content, media_url, msg_type, status)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING message_id, chat_id, sender_id, content, media_url,
                      msg_type, status, created_at
            "#,
        )
        .bind(message.chat_id)
        .bind(message.sender_id)
        .bind(&message.content)
        .bind(&message.media_url)
        .bind(message.message_type.as_str())
        .bind(MessageStatus::Sent.as_str())
        .fetch_one(&self.pool)
        .await?;
        metrics::record_db_query("insert", "messages", start.elapsed().as_secs_f64());

        Ok(row.into_message())
    }

    /// Single UPDATE so concurrent readers never observe a half-applied receipt.
    async fn mark_chat_read(&self, chat_id: i64, reader_id: i64) -> Result<u64, AppError> {
        let start = Instant::now();
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET status = $3
            WHERE chat_id = $1 AND sender_id <> $2 AND status <> $3
            "#,
        )
        .bind(chat_id)
        .bind(reader_id)
        .bind(MessageStatus::Read.as_str())
        .execute(&self.pool)
        .await?;
        metrics::record_db_query("update", "messages", start.elapsed().as_secs_f64());

        Ok(result.rows_affected())
    }

    async fn find_by_chat(&self, chat_id: i64) -> Result<Vec<Message>, AppError> {
        let rows = sqlx::query_as::<_, MessageRow>(
            r#"
            SELECT message_id, chat_id, sender_id, content, media_url,
                   msg_type, status, created_at
            FROM messages
            WHERE chat_id = $1
            ORDER BY created_at ASC, message_id ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_message()).collect())
    }
}
