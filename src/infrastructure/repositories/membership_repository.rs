//! Membership Repository Implementation
//!
//! PostgreSQL implementation of the MembershipRepository trait.

use async_trait::async_trait;
use sqlx::PgPool;
use std::time::Instant;

use crate::domain::MembershipRepository;
use crate::infrastructure::metrics;
use crate::shared::error::AppError;

/// PostgreSQL membership repository implementation.
#[derive(Clone)]
pub struct PgMembershipRepository {
    pool: PgPool,
}

impl PgMembershipRepository {
    /// Create a new PgMembershipRepository with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipRepository for PgMembershipRepository {
    async fn members_of(&self, chat_id: i64) -> Result<Vec<i64>, AppError> {
        let start = Instant::now();
        let members = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT user_id FROM chat_members
            WHERE chat_id = $1
            ORDER BY joined_at ASC
            "#,
        )
        .bind(chat_id)
        .fetch_all(&self.pool)
        .await?;
        metrics::record_db_query("select", "chat_members", start.elapsed().as_secs_f64());

        Ok(members)
    }
}
