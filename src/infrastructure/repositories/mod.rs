//! Repository Implementations
//!
//! PostgreSQL implementations of the domain repository traits.
//!
//! ## Usage Example
//!
//! ```rust,ignore
//! use sqlx::PgPool;
//! use crate::infrastructure::repositories::{PgMembershipRepository, PgMessageRepository};
//!
//! async fn setup_repositories(pool: PgPool) {
//!     let message_repo = PgMessageRepository::new(pool.clone());
//!     let membership_repo = PgMembershipRepository::new(pool);
//! }
//! ```

pub mod membership_repository;
pub mod message_repository;

pub use membership_repository::PgMembershipRepository;
pub use message_repository::PgMessageRepository;
