//! In-Memory Storage
//!
//! Process-local implementation of both collaborator contracts. Selected with
//! `storage.backend = "memory"` and used by the test suites.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::domain::{
    Message, MessageRepository, MembershipRepository, MessageStatus, NewMessage,
};
use crate::shared::error::AppError;

#[derive(Default)]
struct StoreState {
    members: BTreeMap<i64, BTreeSet<i64>>,
    messages: Vec<Message>,
    last_message_id: i64,
    last_chat_id: i64,
}

/// Chat store held entirely in memory.
#[derive(Default)]
pub struct InMemoryChatStore {
    state: RwLock<StoreState>,
    unavailable: AtomicBool,
}

impl InMemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a chat with the given members and return its id.
    pub fn create_chat(&self, members: &[i64]) -> i64 {
        let mut state = self.state.write();
        state.last_chat_id += 1;
        let chat_id = state.last_chat_id;
        state
            .members
            .insert(chat_id, members.iter().copied().collect());
        chat_id
    }

    /// Add a user to a chat, creating the chat if it does not exist.
    pub fn add_member(&self, chat_id: i64, user_id: i64) {
        let mut state = self.state.write();
        state.last_chat_id = state.last_chat_id.max(chat_id);
        state.members.entry(chat_id).or_default().insert(user_id);
    }

    /// Make every subsequent call fail until switched back.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Number of stored messages across all chats.
    pub fn message_count(&self) -> usize {
        self.state.read().messages.len()
    }

    fn check_available(&self) -> Result<(), AppError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::Internal("storage unavailable".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageRepository for InMemoryChatStore {
    async fn create_message(&self, message: NewMessage) -> Result<Message, AppError> {
        self.check_available()?;

        let mut state = self.state.write();
        if !state.members.contains_key(&message.chat_id) {
            return Err(AppError::NotFound(format!("chat {}", message.chat_id)));
        }

        state.last_message_id += 1;
        let stored = Message {
            id: state.last_message_id,
            chat_id: message.chat_id,
            sender_id: message.sender_id,
            content: message.content,
            media_url: message.media_url,
            message_type: message.message_type,
            status: MessageStatus::Sent,
            created_at: Utc::now(),
        };
        state.messages.push(stored.clone());

        Ok(stored)
    }

    async fn mark_chat_read(&self, chat_id: i64, reader_id: i64) -> Result<u64, AppError> {
        self.check_available()?;

        let mut state = self.state.write();
        let mut changed = 0;
        for message in state.messages.iter_mut().filter(|m| {
            m.chat_id == chat_id && m.sender_id != reader_id && m.status != MessageStatus::Read
        }) {
            message.status = MessageStatus::Read;
            changed += 1;
        }

        Ok(changed)
    }

    async fn find_by_chat(&self, chat_id: i64) -> Result<Vec<Message>, AppError> {
        self.check_available()?;

        Ok(self
            .state
            .read()
            .messages
            .iter()
            .filter(|m| m.chat_id == chat_id)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MembershipRepository for InMemoryChatStore {
    async fn members_of(&self, chat_id: i64) -> Result<Vec<i64>, AppError> {
        self.check_available()?;

        Ok(self
            .state
            .read()
            .members
            .get(&chat_id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }
}
