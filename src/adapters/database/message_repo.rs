use crate::adapters::database::DbPool;
use crate::adapters::database::records::MessageRecord;
use crate::domain::message::Message;
use crate::error::Result;
use crate::storage::MessageStore;
use async_trait::async_trait;

#[derive(Clone, Debug)]
pub struct MessageRepository {
    pool: DbPool,
}

impl MessageRepository {
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MessageStore for MessageRepository {
    #[tracing::instrument(level = "debug", skip(self, message), fields(message_id = %message.id))]
    async fn insert(&self, message: &Message) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, username, text, sent_at)
            VALUES ($1, $2, $3, $4)
            "#,
        )
        .bind(message.id)
        .bind(&message.username)
        .bind(&message.text)
        .bind(message.time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[tracing::instrument(level = "debug", skip(self))]
    async fn recent(&self, limit: u32) -> Result<Vec<Message>> {
        // Newest `limit` rows, flipped back to chronological order
        let records = sqlx::query_as::<_, MessageRecord>(
            r#"
            SELECT id, username, text, sent_at
            FROM (
                SELECT id, username, text, sent_at
                FROM messages
                ORDER BY sent_at DESC, id DESC
                LIMIT $1
            ) recent
            ORDER BY sent_at ASC, id ASC
            "#,
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        Ok(records.into_iter().map(Into::into).collect())
    }
}
