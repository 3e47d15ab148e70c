use async_trait::async_trait;
use thiserror::Error;

use textback_core::chrono::{DateTime, Utc};
use textback_core::domain::consent::ConsentRecord;
use textback_core::domain::message::MessageRecord;
use textback_core::domain::workflow::{BusinessId, Workflow, WorkflowId};
use textback_core::uuid::Uuid;

pub mod consent;
pub mod memory;
pub mod message;
pub mod workflow;

pub use consent::SqlConsentRepository;
pub use memory::{InMemoryConsentRepository, InMemoryMessageRepository, InMemoryWorkflowRepository};
pub use message::SqlMessageRepository;
pub use workflow::SqlWorkflowRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait ConsentRepository: Send + Sync {
    /// Returns the consent record for the contact, creating a pending one
    /// when none exists. Concurrent callers for the same contact converge on
    /// a single row.
    async fn get_or_create(
        &self,
        phone_number: &str,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, RepositoryError>;

    async fn save(&self, record: ConsentRecord) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait MessageRepository: Send + Sync {
    async fn insert(&self, message: MessageRecord) -> Result<(), RepositoryError>;

    /// Most recent messages for a contact within a workflow, newest first.
    async fn recent_for_contact(
        &self,
        workflow_id: &WorkflowId,
        phone_number: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError>;
}

#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    async fn active_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<Workflow>, RepositoryError>;

    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError>;
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_uuid(column: &str, value: String) -> Result<Uuid, RepositoryError> {
    Uuid::parse_str(&value).map_err(|error| {
        RepositoryError::Decode(format!("invalid uuid in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_optional_uuid(
    column: &str,
    value: Option<String>,
) -> Result<Option<Uuid>, RepositoryError> {
    value.map(|raw| parse_uuid(column, raw)).transpose()
}
