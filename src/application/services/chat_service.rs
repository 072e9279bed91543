//! Chat Service
//!
//! Business rules behind live chat events: who receives them and what gets
//! stored. Transport-agnostic; the WebSocket dispatcher calls into it.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{MembershipRepository, Message, MessageRepository, MessageType, NewMessage};
use crate::shared::error::AppError;

/// Chat service trait
#[async_trait]
pub trait ChatService: Send + Sync {
    /// Persist a message and resolve who should receive it
    async fn post_message(
        &self,
        sender_id: i64,
        request: PostMessageDto,
    ) -> Result<PostedMessage, ChatError>;

    /// Mark the chat's messages from others as read by `reader_id`
    async fn mark_read(&self, reader_id: i64, chat_id: i64) -> Result<ReadReceipt, ChatError>;

    /// Members who should see `actor_id`'s typing indicator
    async fn typing_recipients(&self, actor_id: i64, chat_id: i64) -> Result<Vec<i64>, ChatError>;
}

/// Post message request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostMessageDto {
    pub chat_id: i64,
    pub content: String,
    pub message_type: MessageType,
    pub media_url: Option<String>,
}

/// A stored message and the members to deliver it to.
#[derive(Debug, Clone)]
pub struct PostedMessage {
    pub message: Message,
    pub recipients: Vec<i64>,
}

/// Result of a bulk read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadReceipt {
    pub chat_id: i64,
    pub reader_id: i64,
    /// Messages whose status changed
    pub updated: u64,
    pub recipients: Vec<i64>,
}

/// Chat service errors
#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("User {user_id} is not a member of chat {chat_id}")]
    NotAMember { chat_id: i64, user_id: i64 },

    #[error("{operation} failed: {source}")]
    Storage {
        operation: &'static str,
        #[source]
        source: AppError,
    },
}

impl ChatError {
    fn storage(operation: &'static str) -> impl FnOnce(AppError) -> Self {
        move |source| ChatError::Storage { operation, source }
    }
}

/// Chat service implementation
pub struct ChatServiceImpl {
    message_repo: Arc<dyn MessageRepository>,
    membership_repo: Arc<dyn MembershipRepository>,
    enforce_membership: bool,
}

impl ChatServiceImpl {
    pub fn new(
        message_repo: Arc<dyn MessageRepository>,
        membership_repo: Arc<dyn MembershipRepository>,
        enforce_membership: bool,
    ) -> Self {
        Self {
            message_repo,
            membership_repo,
            enforce_membership,
        }
    }

    /// Members of the chat, each listed once, in ascending order.
    ///
    /// Fails with `NotAMember` when enforcement is on and `actor_id` is not
    /// among them.
    async fn resolve_members(&self, chat_id: i64, actor_id: i64) -> Result<Vec<i64>, ChatError> {
        let mut members = self
            .membership_repo
            .members_of(chat_id)
            .await
            .map_err(ChatError::storage("members_of"))?;
        members.sort_unstable();
        members.dedup();

        if self.enforce_membership && members.binary_search(&actor_id).is_err() {
            return Err(ChatError::NotAMember {
                chat_id,
                user_id: actor_id,
            });
        }

        Ok(members)
    }
}

#[async_trait]
impl ChatService for ChatServiceImpl {
    async fn post_message(
        &self,
        sender_id: i64,
        request: PostMessageDto,
    ) -> Result<PostedMessage, ChatError> {
        let recipients = self.resolve_members(request.chat_id, sender_id).await?;

        let message = self
            .message_repo
            .create_message(NewMessage {
                chat_id: request.chat_id,
                sender_id,
                content: request.content,
                message_type: request.message_type,
                media_url: request.media_url,
            })
            .await
            .map_err(ChatError::storage("create_message"))?;

        Ok(PostedMessage {
            message,
            recipients,
        })
    }

    async fn mark_read(&self, reader_id: i64, chat_id: i64) -> Result<ReadReceipt, ChatError> {
        let recipients = self.resolve_members(chat_id, reader_id).await?;

        let updated = self
            .message_repo
            .mark_chat_read(chat_id, reader_id)
            .await
            .map_err(ChatError::storage("mark_chat_read"))?;

        Ok(ReadReceipt {
            chat_id,
            reader_id,
            updated,
            recipients,
        })
    }

    async fn typing_recipients(&self, actor_id: i64, chat_id: i64) -> Result<Vec<i64>, ChatError> {
        let mut members = self.resolve_members(chat_id, actor_id).await?;
        members.retain(|&id| id != actor_id);
        Ok(members)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MessageStatus, MockMembershipRepository, MockMessageRepository};
    use chrono::Utc;
    use mockall::predicate::eq;
    use pretty_assertions::assert_eq;

    fn stored(new: &NewMessage, id: i64) -> Message {
        Message {
            id,
            chat_id: new.chat_id,
            sender_id: new.sender_id,
            content: new.content.clone(),
            media_url: new.media_url.clone(),
            message_type: new.message_type,
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        }
    }

    fn members(ids: Vec<i64>) -> MockMembershipRepository {
        let mut repo = MockMembershipRepository::new();
        repo.expect_members_of()
            .returning(move |_| Ok(ids.clone()));
        repo
    }

    fn request(chat_id: i64, content: &str) -> PostMessageDto {
        PostMessageDto {
            chat_id,
            content: content.to_string(),
            message_type: MessageType::Text,
            media_url: None,
        }
    }

    #[tokio::test]
    async fn test_post_message_stores_once_and_includes_sender() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create_message()
            .times(1)
            .returning(|new| Ok(stored(&new, 41)));

        let service =
            ChatServiceImpl::new(Arc::new(messages), Arc::new(members(vec![2, 1, 2])), true);
        let posted = service.post_message(1, request(7, "hi")).await.unwrap();

        assert_eq!(posted.message.id, 41);
        assert_eq!(posted.message.sender_id, 1);
        assert_eq!(posted.message.content, "hi");
        assert_eq!(posted.recipients, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_non_member_is_rejected_before_persistence() {
        let mut messages = MockMessageRepository::new();
        messages.expect_create_message().never();

        let service = ChatServiceImpl::new(Arc::new(messages), Arc::new(members(vec![2, 3])), true);
        let err = service.post_message(1, request(7, "hi")).await.unwrap_err();

        assert!(matches!(
            err,
            ChatError::NotAMember {
                chat_id: 7,
                user_id: 1
            }
        ));
    }

    #[tokio::test]
    async fn test_non_member_allowed_when_enforcement_disabled() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create_message()
            .times(1)
            .returning(|new| Ok(stored(&new, 1)));

        let service =
            ChatServiceImpl::new(Arc::new(messages), Arc::new(members(vec![2, 3])), false);
        let posted = service.post_message(1, request(7, "hi")).await.unwrap();

        assert_eq!(posted.recipients, vec![2, 3]);
    }

    #[tokio::test]
    async fn test_storage_failure_surfaces_operation() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_create_message()
            .returning(|_| Err(AppError::Internal("down".into())));

        let service = ChatServiceImpl::new(Arc::new(messages), Arc::new(members(vec![1])), true);
        let err = service.post_message(1, request(7, "hi")).await.unwrap_err();

        assert!(matches!(
            err,
            ChatError::Storage {
                operation: "create_message",
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_mark_read_forwards_reader() {
        let mut messages = MockMessageRepository::new();
        messages
            .expect_mark_chat_read()
            .with(eq(7), eq(2))
            .times(1)
            .returning(|_, _| Ok(3));

        let service = ChatServiceImpl::new(Arc::new(messages), Arc::new(members(vec![1, 2])), true);
        let receipt = service.mark_read(2, 7).await.unwrap();

        assert_eq!(
            receipt,
            ReadReceipt {
                chat_id: 7,
                reader_id: 2,
                updated: 3,
                recipients: vec![1, 2],
            }
        );
    }

    #[tokio::test]
    async fn test_typing_recipients_exclude_actor() {
        let service = ChatServiceImpl::new(
            Arc::new(MockMessageRepository::new()),
            Arc::new(members(vec![1, 2, 3])),
            true,
        );

        assert_eq!(service.typing_recipients(2, 7).await.unwrap(), vec![1, 3]);
    }

    #[tokio::test]
    async fn test_membership_failure_is_storage_error() {
        let mut membership = MockMembershipRepository::new();
        membership
            .expect_members_of()
            .returning(|_| Err(AppError::Internal("timeout".into())));

        let service = ChatServiceImpl::new(
            Arc::new(MockMessageRepository::new()),
            Arc::new(membership),
            true,
        );
        let err = service.typing_recipients(1, 7).await.unwrap_err();

        assert!(matches!(
            err,
            ChatError::Storage {
                operation: "members_of",
                ..
            }
        ));
    }
}
