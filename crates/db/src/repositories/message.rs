use sqlx::{sqlite::SqliteRow, Row};

use textback_core::domain::message::{Channel, Direction, MessageRecord, MessageStatus};
use textback_core::domain::workflow::WorkflowId;

use super::{parse_optional_uuid, parse_timestamp, parse_uuid, MessageRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMessageRepository {
    pool: DbPool,
}

impl SqlMessageRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl MessageRepository for SqlMessageRepository {
    async fn insert(&self, message: MessageRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO messages (
                id,
                workflow_id,
                direction,
                channel,
                content,
                phone_number,
                conversation_id,
                is_first_in_conversation,
                response_to_message_id,
                status,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(message.id.to_string())
        .bind(&message.workflow_id.0)
        .bind(message.direction.as_str())
        .bind(message.channel.as_str())
        .bind(&message.content)
        .bind(&message.phone_number)
        .bind(message.conversation_id.map(|value| value.to_string()))
        .bind(message.is_first_in_conversation)
        .bind(message.response_to_message_id.map(|value| value.to_string()))
        .bind(message.status.as_str())
        .bind(message.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent_for_contact(
        &self,
        workflow_id: &WorkflowId,
        phone_number: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT
                id,
                workflow_id,
                direction,
                channel,
                content,
                phone_number,
                conversation_id,
                is_first_in_conversation,
                response_to_message_id,
                status,
                created_at
             FROM messages
             WHERE workflow_id = ? AND phone_number = ?
             ORDER BY created_at DESC, id DESC
             LIMIT ?",
        )
        .bind(&workflow_id.0)
        .bind(phone_number)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(message_from_row).collect()
    }
}

fn message_from_row(row: SqliteRow) -> Result<MessageRecord, RepositoryError> {
    let direction_raw = row.try_get::<String, _>("direction")?;
    let direction = Direction::parse(&direction_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown message direction `{direction_raw}`"))
    })?;

    let channel_raw = row.try_get::<String, _>("channel")?;
    let channel = Channel::parse(&channel_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown message channel `{channel_raw}`"))
    })?;

    let status_raw = row.try_get::<String, _>("status")?;
    let status = MessageStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown message status `{status_raw}`")))?;

    Ok(MessageRecord {
        id: parse_uuid("id", row.try_get("id")?)?,
        workflow_id: WorkflowId(row.try_get("workflow_id")?),
        direction,
        channel,
        content: row.try_get("content")?,
        phone_number: row.try_get("phone_number")?,
        conversation_id: parse_optional_uuid("conversation_id", row.try_get("conversation_id")?)?,
        is_first_in_conversation: row.try_get("is_first_in_conversation")?,
        response_to_message_id: parse_optional_uuid(
            "response_to_message_id",
            row.try_get("response_to_message_id")?,
        )?,
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
