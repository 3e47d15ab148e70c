use sqlx::{sqlite::SqliteRow, Row};

use textback_core::domain::workflow::{BusinessId, Workflow, WorkflowId, WorkflowSettings};

use super::{parse_timestamp, RepositoryError, WorkflowRepository};
use crate::DbPool;

pub struct SqlWorkflowRepository {
    pool: DbPool,
}

impl SqlWorkflowRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl WorkflowRepository for SqlWorkflowRepository {
    async fn active_for_business(
        &self,
        business_id: &BusinessId,
    ) -> Result<Option<Workflow>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                business_id,
                name,
                active,
                settings_json,
                created_at
             FROM workflows
             WHERE business_id = ? AND active = 1
             ORDER BY created_at DESC, id DESC
             LIMIT 1",
        )
        .bind(&business_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(workflow_from_row).transpose()
    }

    async fn save(&self, workflow: Workflow) -> Result<(), RepositoryError> {
        let settings_json = serde_json::to_string(&workflow.settings)
            .map_err(|error| RepositoryError::Decode(error.to_string()))?;

        sqlx::query(
            "INSERT INTO workflows (
                id,
                business_id,
                name,
                active,
                settings_json,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                business_id = excluded.business_id,
                name = excluded.name,
                active = excluded.active,
                settings_json = excluded.settings_json",
        )
        .bind(&workflow.id.0)
        .bind(&workflow.business_id.0)
        .bind(&workflow.name)
        .bind(workflow.active)
        .bind(settings_json)
        .bind(workflow.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn workflow_from_row(row: SqliteRow) -> Result<Workflow, RepositoryError> {
    let settings_raw = row.try_get::<String, _>("settings_json")?;
    let settings = serde_json::from_str::<WorkflowSettings>(&settings_raw)
        .map_err(|error| RepositoryError::Decode(format!("invalid workflow settings: {error}")))?;

    Ok(Workflow {
        id: WorkflowId(row.try_get("id")?),
        business_id: BusinessId(row.try_get("business_id")?),
        name: row.try_get("name")?,
        active: row.try_get("active")?,
        settings,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}
