use std::sync::Arc;

use secrecy::ExposeSecret;
use textback_agent::{HttpLlmClient, LlmReplyAgent, ReplyAgent};
use textback_booking::{
    AppointmentContextBuilder, DisabledSchedulingClient, HttpSchedulingClient,
    SchedulingContextBuilder,
};
use textback_core::config::{AppConfig, ConfigError, LoadOptions};
use textback_core::KeywordIntentClassifier;
use textback_db::repositories::{SqlConsentRepository, SqlMessageRepository, SqlWorkflowRepository};
use textback_db::{connect, migrations, DbPool};
use textback_sms::SignatureValidator;
use thiserror::Error;
use tracing::info;

use crate::orchestrator::ReplyOrchestrator;
use crate::webhook::WebhookState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub orchestrator: Arc<ReplyOrchestrator>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("collaborator setup failed: {0}")]
    Collaborator(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        business_id = "unknown",
        conversation_id = "unknown",
        "starting application bootstrap"
    );

    let db_pool = connect(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        business_id = "unknown",
        conversation_id = "unknown",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        business_id = "unknown",
        conversation_id = "unknown",
        "database migrations applied"
    );

    let llm = HttpLlmClient::from_config(&config.llm)
        .map_err(|error| BootstrapError::Collaborator(error.to_string()))?;
    let agent: Arc<dyn ReplyAgent> = Arc::new(LlmReplyAgent::new(llm));

    let context_builder: Arc<dyn AppointmentContextBuilder> = if config.scheduling.enabled {
        let scheduling = HttpSchedulingClient::from_config(&config.scheduling)
            .map_err(|error| BootstrapError::Collaborator(error.to_string()))?;
        Arc::new(SchedulingContextBuilder::new(scheduling))
    } else {
        Arc::new(SchedulingContextBuilder::new(DisabledSchedulingClient))
    };

    let orchestrator = Arc::new(ReplyOrchestrator::new(
        Arc::new(SqlWorkflowRepository::new(db_pool.clone())),
        Arc::new(SqlConsentRepository::new(db_pool.clone())),
        Arc::new(SqlMessageRepository::new(db_pool.clone())),
        Arc::new(KeywordIntentClassifier),
        context_builder,
        agent,
        config.engine.history_limit,
    ));

    Ok(Application { config, db_pool, orchestrator })
}

impl Application {
    /// Shared state for the webhook router. Signature enforcement is wired
    /// only when config enables it; validation guarantees the token and
    /// public base URL are present in that case.
    pub fn webhook_state(&self) -> WebhookState {
        let signature = if self.config.sms.validate_signatures {
            self.config
                .sms
                .auth_token
                .as_ref()
                .map(|token| Arc::new(SignatureValidator::new(token.expose_secret())))
        } else {
            None
        };

        WebhookState {
            orchestrator: self.orchestrator.clone(),
            signature,
            public_base_url: self.config.sms.public_base_url.clone(),
        }
    }
}
