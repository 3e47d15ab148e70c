use sqlx::Executor;

use crate::connection::DbPool;
use crate::repositories::RepositoryError;

/// Canonical demo seeds and verification contract for the conversation engine.
const SEED_WORKFLOWS: &[WorkflowSeedContract] = &[
    WorkflowSeedContract {
        workflow_id: "wf-demo-salon-001",
        business_id: "demo-salon",
        name: "After-hours text-back",
        active: true,
        timeout_minutes: 30,
        section_count: 4,
        description: "Salon auto-reply with booking next steps - active",
    },
    WorkflowSeedContract {
        workflow_id: "wf-demo-salon-000",
        business_id: "demo-salon",
        name: "Launch pilot",
        active: false,
        timeout_minutes: 30,
        section_count: 0,
        description: "Retired pilot workflow - inactive",
    },
    WorkflowSeedContract {
        workflow_id: "wf-demo-dental-001",
        business_id: "demo-dental",
        name: "Missed-call follow-up",
        active: true,
        timeout_minutes: 45,
        section_count: 1,
        description: "Dental office follow-up with scheduling hints - active",
    },
];

const SEED_CONSENTS: &[ConsentSeedContract] = &[
    ConsentSeedContract {
        id: "5f0dd7a2-4a0e-4a3c-8f21-000000000001",
        phone_number: "+15105550201",
        business_id: "demo-salon",
        status: "confirmed",
    },
    ConsentSeedContract {
        id: "5f0dd7a2-4a0e-4a3c-8f21-000000000002",
        phone_number: "+15105550202",
        business_id: "demo-salon",
        status: "declined",
    },
    ConsentSeedContract {
        id: "5f0dd7a2-4a0e-4a3c-8f21-000000000003",
        phone_number: "+15105550203",
        business_id: "demo-dental",
        status: "pending",
    },
];

const SEED_CONVERSATION_ID: &str = "7a0a3a1e-8a3f-4a52-9f2e-5b1c6d9e0a11";
const SEED_INBOUND_MESSAGE_ID: &str = "0b5dbb6e-3a1c-4f4e-9a2d-111111111111";
const SEED_OUTBOUND_MESSAGE_ID: &str = "0b5dbb6e-3a1c-4f4e-9a2d-222222222222";
const SEED_CONVERSATION_PHONE: &str = "+15105550201";
const SEED_CONVERSATION_WORKFLOW: &str = "wf-demo-salon-001";

/// Demo seed dataset for local runs and end-to-end checks.
///
/// Provides deterministic fixtures for:
/// 1. An active salon workflow with a full section layout
/// 2. A second business with its own active workflow
/// 3. Consent records in all three states
/// 4. A prior two-message conversation for session-resolution checks
pub struct DemoSeedDataset;

impl DemoSeedDataset {
    pub const SQL: &str = include_str!("../../../config/fixtures/demo_seed.sql");

    /// Applies the seed SQL in one transaction. Re-running is safe; every
    /// statement upserts on its row id.
    pub async fn load(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
        let mut tx = pool.begin().await?;

        tx.execute(sqlx::query(Self::SQL)).await?;
        tx.commit().await?;

        let workflows_seeded = SEED_WORKFLOWS
            .iter()
            .map(|workflow| WorkflowSeedInfo {
                workflow_id: workflow.workflow_id,
                business_id: workflow.business_id,
                description: workflow.description,
            })
            .collect::<Vec<_>>();

        Ok(SeedResult { workflows_seeded })
    }

    /// Checks each expected row against the live database and reports the
    /// per-fixture result.
    pub async fn verify(pool: &DbPool) -> Result<VerificationResult, RepositoryError> {
        let mut checks = Vec::new();

        for workflow in SEED_WORKFLOWS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM workflows WHERE id = ?1 AND business_id = ?2 AND active = ?3)",
            )
            .bind(workflow.workflow_id)
            .bind(workflow.business_id)
            .bind(workflow.active)
            .fetch_one(pool)
            .await?;
            checks.push((workflow.workflow_id, present == 1));

            let settings_ok: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM workflows
                    WHERE id = ?1
                      AND COALESCE(CAST(json_extract(settings_json, '$.conversation_timeout_minutes') AS INTEGER), 30) = ?2
                      AND COALESCE(json_array_length(settings_json, '$.sections'), 0) = ?3
                 )",
            )
            .bind(workflow.workflow_id)
            .bind(workflow.timeout_minutes)
            .bind(workflow.section_count)
            .fetch_one(pool)
            .await?;
            checks.push((workflow.settings_label(), settings_ok == 1));
        }

        for consent in SEED_CONSENTS {
            let present: i64 = sqlx::query_scalar(
                "SELECT EXISTS(
                    SELECT 1 FROM consent_records
                    WHERE id = ?1 AND phone_number = ?2 AND business_id = ?3 AND status = ?4
                 )",
            )
            .bind(consent.id)
            .bind(consent.phone_number)
            .bind(consent.business_id)
            .bind(consent.status)
            .fetch_one(pool)
            .await?;
            checks.push((consent.id, present == 1));
        }

        let thread_size: i64 =
            sqlx::query_scalar("SELECT COUNT(1) FROM messages WHERE conversation_id = ?1")
                .bind(SEED_CONVERSATION_ID)
                .fetch_one(pool)
                .await?;
        checks.push(("conversation-thread-size", thread_size == 2));

        let inbound_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM messages
                WHERE id = ?1 AND direction = 'inbound' AND status = 'received'
                  AND is_first_in_conversation = 1 AND phone_number = ?2
             )",
        )
        .bind(SEED_INBOUND_MESSAGE_ID)
        .bind(SEED_CONVERSATION_PHONE)
        .fetch_one(pool)
        .await?;
        checks.push(("conversation-inbound", inbound_ok == 1));

        let outbound_ok: i64 = sqlx::query_scalar(
            "SELECT EXISTS(
                SELECT 1 FROM messages
                WHERE id = ?1 AND direction = 'outbound' AND status = 'sent'
                  AND response_to_message_id = ?2 AND workflow_id = ?3
             )",
        )
        .bind(SEED_OUTBOUND_MESSAGE_ID)
        .bind(SEED_INBOUND_MESSAGE_ID)
        .bind(SEED_CONVERSATION_WORKFLOW)
        .fetch_one(pool)
        .await?;
        checks.push(("conversation-outbound", outbound_ok == 1));

        let all_present = checks.iter().all(|(_, exists)| *exists);
        Ok(VerificationResult { all_present, checks })
    }

    /// Removes the seeded rows so a shared test database starts empty.
    pub async fn clean(pool: &DbPool) -> Result<(), RepositoryError> {
        let mut tx = pool.begin().await?;

        // Replies reference their prompt row, so they go first.
        sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(SEED_OUTBOUND_MESSAGE_ID)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM messages WHERE id = ?1")
            .bind(SEED_INBOUND_MESSAGE_ID)
            .execute(&mut *tx)
            .await?;

        let quoted_consents = sql_array_from_ids(
            &SEED_CONSENTS.iter().map(|consent| consent.id).collect::<Vec<_>>(),
        );
        sqlx::query(&format!("DELETE FROM consent_records WHERE id IN {quoted_consents}"))
            .execute(&mut *tx)
            .await?;

        let quoted_workflows = sql_array_from_ids(
            &SEED_WORKFLOWS.iter().map(|workflow| workflow.workflow_id).collect::<Vec<_>>(),
        );
        sqlx::query(&format!("DELETE FROM workflows WHERE id IN {quoted_workflows}"))
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct WorkflowSeedContract {
    workflow_id: &'static str,
    business_id: &'static str,
    name: &'static str,
    active: bool,
    timeout_minutes: i64,
    section_count: i64,
    description: &'static str,
}

impl WorkflowSeedContract {
    fn settings_label(&self) -> &'static str {
        match self.workflow_id {
            "wf-demo-salon-001" => "workflow-salon-settings",
            "wf-demo-salon-000" => "workflow-pilot-settings",
            _ => "workflow-dental-settings",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ConsentSeedContract {
    id: &'static str,
    phone_number: &'static str,
    business_id: &'static str,
    status: &'static str,
}

fn sql_array_from_ids(ids: &[&str]) -> String {
    let quoted = ids.iter().map(|id| format!("'{}'", id)).collect::<Vec<_>>().join(",");
    format!("({quoted})")
}

#[derive(Debug)]
pub struct SeedResult {
    pub workflows_seeded: Vec<WorkflowSeedInfo>,
}

#[derive(Debug)]
pub struct WorkflowSeedInfo {
    pub workflow_id: &'static str,
    pub business_id: &'static str,
    pub description: &'static str,
}

#[derive(Debug)]
pub struct VerificationResult {
    pub all_present: bool,
    pub checks: Vec<(&'static str, bool)>,
}
