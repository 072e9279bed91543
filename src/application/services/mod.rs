//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **ChatService**: message posting, read receipts, typing recipients

pub mod chat_service;

// Re-export chat service types
pub use chat_service::{
    ChatError, ChatService, ChatServiceImpl, PostMessageDto, PostedMessage, ReadReceipt,
};
