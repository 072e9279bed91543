//! # Domain Entities
//!
//! Core domain entities of the chat backend.
//!
//! - **Message**: a durable chat message with delivery status
//! - **Chat membership**: which users belong to a chat
//!
//! ## Repository Traits
//!
//! `MessageRepository` and `MembershipRepository` are the persistence and
//! membership contracts the dispatch core consumes. They are implemented in
//! the infrastructure layer (PostgreSQL and in-memory).

mod chat;
mod message;

pub use chat::MembershipRepository;
pub use message::{Message, MessageRepository, MessageStatus, MessageType, NewMessage};

#[cfg(test)]
pub use chat::MockMembershipRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
