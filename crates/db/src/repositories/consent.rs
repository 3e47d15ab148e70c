use sqlx::{sqlite::SqliteRow, Row};

use textback_core::chrono::{DateTime, Utc};
use textback_core::domain::consent::{ConsentRecord, ConsentStatus};
use textback_core::domain::workflow::BusinessId;
use textback_core::uuid::Uuid;

use super::{parse_timestamp, parse_uuid, ConsentRepository, RepositoryError};
use crate::DbPool;

pub struct SqlConsentRepository {
    pool: DbPool,
}

impl SqlConsentRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl ConsentRepository for SqlConsentRepository {
    async fn get_or_create(
        &self,
        phone_number: &str,
        business_id: &BusinessId,
        now: DateTime<Utc>,
    ) -> Result<ConsentRecord, RepositoryError> {
        // DO NOTHING keeps the winning row; the follow-up SELECT reads it
        // regardless of which caller inserted first.
        sqlx::query(
            "INSERT INTO consent_records (
                id,
                phone_number,
                business_id,
                status,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(phone_number, business_id) DO NOTHING",
        )
        .bind(Uuid::new_v4().to_string())
        .bind(phone_number)
        .bind(&business_id.0)
        .bind(ConsentStatus::Pending.as_str())
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .execute(&self.pool)
        .await?;

        let row = sqlx::query(
            "SELECT
                id,
                phone_number,
                business_id,
                status,
                created_at,
                updated_at
             FROM consent_records
             WHERE phone_number = ? AND business_id = ?",
        )
        .bind(phone_number)
        .bind(&business_id.0)
        .fetch_one(&self.pool)
        .await?;

        consent_from_row(row)
    }

    async fn save(&self, record: ConsentRecord) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO consent_records (
                id,
                phone_number,
                business_id,
                status,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                updated_at = excluded.updated_at",
        )
        .bind(record.id.to_string())
        .bind(&record.phone_number)
        .bind(&record.business_id.0)
        .bind(record.status.as_str())
        .bind(record.created_at.to_rfc3339())
        .bind(record.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn consent_from_row(row: SqliteRow) -> Result<ConsentRecord, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = ConsentStatus::parse(&status_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown consent status `{status_raw}`")))?;

    Ok(ConsentRecord {
        id: parse_uuid("id", row.try_get("id")?)?,
        phone_number: row.try_get("phone_number")?,
        business_id: BusinessId(row.try_get("business_id")?),
        status,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Utc};

    use textback_core::domain::consent::{transition_for_intent, ConsentStatus};
    use textback_core::domain::workflow::BusinessId;
    use textback_core::intent::Intent;

    use super::SqlConsentRepository;
    use crate::migrations;
    use crate::repositories::ConsentRepository;
    use crate::{connect_with_settings, DbPool};

    #[tokio::test]
    async fn get_or_create_defaults_to_pending_and_reuses_the_row() {
        let pool = setup_pool().await;
        let repo = SqlConsentRepository::new(pool.clone());
        let business_id = BusinessId("biz-salon".to_string());

        let first = repo
            .get_or_create("+15105550101", &business_id, parse_ts("2026-03-01T12:00:00Z"))
            .await
            .expect("create consent");
        assert_eq!(first.status, ConsentStatus::Pending);

        let second = repo
            .get_or_create("+15105550101", &business_id, parse_ts("2026-03-01T12:05:00Z"))
            .await
            .expect("fetch consent");
        assert_eq!(second.id, first.id);
        assert_eq!(second.created_at, first.created_at);

        pool.close().await;
    }

    #[tokio::test]
    async fn save_persists_status_transitions_without_rewriting_history() {
        let pool = setup_pool().await;
        let repo = SqlConsentRepository::new(pool.clone());
        let business_id = BusinessId("biz-salon".to_string());

        let record = repo
            .get_or_create("+15105550102", &business_id, parse_ts("2026-03-01T12:00:00Z"))
            .await
            .expect("create consent");

        let transition = transition_for_intent(record.status, Intent::OptIn);
        assert!(transition.changed);

        let mut confirmed = record.clone();
        confirmed.status = transition.to;
        confirmed.updated_at = parse_ts("2026-03-01T12:10:00Z");
        repo.save(confirmed).await.expect("save confirmed consent");

        let found = repo
            .get_or_create("+15105550102", &business_id, parse_ts("2026-03-01T12:15:00Z"))
            .await
            .expect("re-fetch consent");
        assert_eq!(found.id, record.id);
        assert_eq!(found.status, ConsentStatus::Confirmed);
        assert_eq!(found.created_at, record.created_at);
        assert_eq!(found.updated_at, parse_ts("2026-03-01T12:10:00Z"));

        pool.close().await;
    }

    #[tokio::test]
    async fn opted_out_contacts_keep_their_record() {
        let pool = setup_pool().await;
        let repo = SqlConsentRepository::new(pool.clone());
        let business_id = BusinessId("biz-salon".to_string());

        let record = repo
            .get_or_create("+15105550103", &business_id, parse_ts("2026-03-01T12:00:00Z"))
            .await
            .expect("create consent");

        let mut declined = record.clone();
        declined.status = ConsentStatus::Declined;
        declined.updated_at = parse_ts("2026-03-01T12:01:00Z");
        repo.save(declined).await.expect("save declined consent");

        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(1) FROM consent_records WHERE phone_number = ? AND business_id = ?",
        )
        .bind("+15105550103")
        .bind("biz-salon")
        .fetch_one(&pool)
        .await
        .expect("count consent rows");
        assert_eq!(count, 1, "opt-out should update the record in place, never delete it");

        let found = repo
            .get_or_create("+15105550103", &business_id, parse_ts("2026-03-01T12:30:00Z"))
            .await
            .expect("re-fetch consent");
        assert_eq!(found.status, ConsentStatus::Declined);

        pool.close().await;
    }

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:?cache=shared", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn parse_ts(value: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(value).expect("valid rfc3339").with_timezone(&Utc)
    }
}
