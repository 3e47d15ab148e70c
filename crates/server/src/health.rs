use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;
use textback_db::DbPool;
use tracing::{error, info};

#[derive(Clone)]
pub struct HealthState {
    db_pool: DbPool,
}

#[derive(Clone, Debug, Serialize)]
pub struct Probe {
    pub name: &'static str,
    pub ok: bool,
    pub detail: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub probes: Vec<Probe>,
    pub checked_at: String,
}

pub fn router(db_pool: DbPool) -> Router {
    Router::new().route("/health", get(health)).with_state(HealthState { db_pool })
}

/// Serves readiness on its own port so operational probes never contend with
/// webhook traffic.
pub async fn spawn(bind_address: &str, port: u16, db_pool: DbPool) -> std::io::Result<()> {
    let address = format!("{bind_address}:{port}");
    let listener = tokio::net::TcpListener::bind(&address).await?;

    info!(
        event_name = "system.health.start",
        correlation_id = "bootstrap",
        business_id = "unknown",
        conversation_id = "unknown",
        bind_address = %address,
        "health endpoint listening"
    );

    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router(db_pool)).await {
            error!(
                event_name = "system.health.error",
                correlation_id = "bootstrap",
                business_id = "unknown",
                conversation_id = "unknown",
                error = %err,
                "health endpoint stopped serving"
            );
        }
    });

    Ok(())
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let probes = vec![ping_database(&state.db_pool).await, inspect_schema(&state.db_pool).await];
    let ready = probes.iter().all(|probe| probe.ok);

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        probes,
        checked_at: Utc::now().to_rfc3339(),
    };
    let code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (code, Json(payload))
}

async fn ping_database(pool: &DbPool) -> Probe {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => Probe {
            name: "database",
            ok: true,
            detail: "query round trip succeeded".to_string(),
        },
        Err(err) => Probe { name: "database", ok: false, detail: format!("query failed: {err}") },
    }
}

async fn inspect_schema(pool: &DbPool) -> Probe {
    let tables = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM sqlite_master \
         WHERE type = 'table' AND name IN ('workflows', 'consent_records', 'messages')",
    )
    .fetch_one(pool)
    .await;

    match tables {
        Ok(3) => Probe { name: "schema", ok: true, detail: "engine tables present".to_string() },
        Ok(found) => Probe {
            name: "schema",
            ok: false,
            detail: format!("expected 3 engine tables, found {found}"),
        },
        Err(err) => {
            Probe { name: "schema", ok: false, detail: format!("schema query failed: {err}") }
        }
    }
}
