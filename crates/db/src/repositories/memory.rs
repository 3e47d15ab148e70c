use std::collections::HashMap;

use tokio::sync::RwLock;

use textback_core::chrono::{DateTime, Utc};
use textback_core::domain::consent::{ConsentRecord, ConsentStatus};
use textback_core::domain::message::MessageRecord;
use textback_core::domain::workflow::{BusinessId, Workflow, WorkflowId};
use textback_core::uuid::Uuid;

use super::{ConsentRepository, MessageRepository, RepositoryError, WorkflowRepository};

#[derive(Default)]
pub struct InMemoryConsentRepository {
    records: RwLock<HashMap<(String, String), ConsentRecord>>,
}

#[async_trait::async_trait]
impl ConsentRepository for InMemoryConsentRepository {
    async fn get_or_create(
        &self,
        phone_number: &str,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, RepositoryError> {
        let mut records = self.records.write().await;
        let key = (phone_number.to_string(), business_id.0.clone());
        let record = records.entry(key).or_insert_with(|| ConsentRecord {
            id: Uuid::new_v4(),
            phone_number: phone_number.to_string(),
            business_id: business_id.clone(),
            status: ConsentStatus::Pending,
            created_at: now,
            updated_at: now,
        });
        Ok(record.clone())
    }

    async fn save(&self, record: ConsentRecord) -> Result<(), RepositoryError> {
        let mut records = self.records.write().await;
        records.insert((record.phone_number.clone(), record.business_id.0.clone()), record);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryMessageRepository {
    messages: RwLock<Vec<MessageRecord>>,
}

#[async_trait::async_trait]
impl MessageRepository for InMemoryMessageRepository {
    async fn insert(&self, message: MessageRecord) -> Result<(), RepositoryError> {
        let mut messages = self.messages.write().await;
        messages.push(message);
        Ok(())
    }

    async fn recent_for_contact(
        &self,
        workflow_id: &WorkflowId,
        phone_number: &str,
        limit: u32,
    ) -> Result<Vec<MessageRecord>, RepositoryError> {
        let messages = self.messages.read().await;
        let mut matches: Vec<(usize, &MessageRecord)> = messages
            .iter()
            .enumerate()
            .filter(|(_, message)| {
                message.workflow_id == *workflow_id && message.phone_number == phone_number
            })
            .collect();
        // Newest first; ties broken by insertion order, like the SQL index.
        matches.sort_by(|(a_idx, a), (b_idx, b)| {
            b.created_at.cmp(&a.created_at).then(b_idx.cmp(a_idx))
        });

        Ok(matches
            .into_iter()
            .take(limit as usize)
            .map(|(_, message)| message.clone())
            .collect())
    }
}

#[derive(Default)]
pub struct InMemoryWorkflowRepository {
    workflows: RwLock<HashMap<String, Workflow>>,
}

#[async_trait::async_trait]
impl WorkflowRepository for InMemoryWorkflowRepository {
    async fn active_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let workflows = self.workflows.read().await;
        Ok(workflows
            .values()
            .filter(|workflow| workflow.active && workflow.business_id == *business_id)
            .max_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.0.cmp(&b.id.0)))
            .cloned())
    }

    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        let mut workflows = self.workflows.write().await;
        workflows.insert(workflow.id.0.clone(), workflow);
        Ok(())
    }
}
