//! Chat membership repository trait.
//!
//! Backed by the `chat_members` table.

use async_trait::async_trait;

use crate::shared::error::AppError;

/// Membership lookup contract.
///
/// Resolves the recipients of chat-scoped events.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MembershipRepository: Send + Sync {
    /// User IDs of everyone in the chat. Empty for an unknown chat.
    async fn members_of(&self, chat_id: i64) -> Result<Vec<i64>, AppError>;
}
