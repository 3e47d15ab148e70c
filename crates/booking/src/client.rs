use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use textback_core::config::SchedulingConfig;
use textback_core::domain::workflow::WorkflowId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchedulingError {
    #[error("scheduling transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("scheduling endpoint returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
    #[error("scheduling response could not be decoded: {0}")]
    Decode(String),
    #[error("scheduling integration is disabled")]
    Disabled,
}

/// Availability verdict for one requested slot.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SlotCheck {
    pub available: bool,
    #[serde(default)]
    pub alternatives: Vec<String>,
}

/// Outcome of an appointment creation request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BookingConfirmation {
    pub confirmed: bool,
    #[serde(default)]
    pub reference: Option<String>,
}

#[async_trait]
pub trait SchedulingClient: Send + Sync {
    async fn verify_appointment(
        &self,
        workflow_id: &WorkflowId,
        when: DateTime<Utc>,
    ) -> Result<SlotCheck, SchedulingError>;

    async fn create_appointment(
        &self,
        workflow_id: &WorkflowId,
        when: DateTime<Utc>,
        name: Option<&str>,
        email: Option<&str>,
        phone_number: &str,
    ) -> Result<BookingConfirmation, SchedulingError>;
}

/// Talks to the external scheduling service over REST with bearer auth.
pub struct HttpSchedulingClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HttpSchedulingClient {
    /// Callers check `config.enabled` first; a missing base URL also reads
    /// as disabled so this constructor never panics.
    pub fn from_config(config: &SchedulingConfig) -> Result<Self, SchedulingError> {
        if !config.enabled {
            return Err(SchedulingError::Disabled);
        }
        let Some(base_url) = &config.base_url else {
            return Err(SchedulingError::Disabled);
        };
        let client =
            reqwest::Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn post_json(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<String, SchedulingError> {
        let mut builder = self.client.post(url).json(payload);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key.expose_secret());
        }
        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        if !(200..300).contains(&status) {
            return Err(SchedulingError::Api { status, body });
        }
        Ok(body)
    }
}

#[async_trait]
impl SchedulingClient for HttpSchedulingClient {
    async fn verify_appointment(
        &self,
        workflow_id: &WorkflowId,
        when: DateTime<Utc>,
    ) -> Result<SlotCheck, SchedulingError> {
        let url = format!("{}/appointments/verify", self.base_url);
        let payload = json!({
            "workflow_id": workflow_id.to_string(),
            "requested_time": when.to_rfc3339(),
        });
        let body = self.post_json(&url, &payload).await?;
        serde_json::from_str(&body).map_err(|err| SchedulingError::Decode(format!("{err}: {body}")))
    }

    async fn create_appointment(
        &self,
        workflow_id: &WorkflowId,
        when: DateTime<Utc>,
        name: Option<&str>,
        email: Option<&str>,
        phone_number: &str,
    ) -> Result<BookingConfirmation, SchedulingError> {
        let url = format!("{}/appointments", self.base_url);
        let payload = json!({
            "workflow_id": workflow_id.to_string(),
            "requested_time": when.to_rfc3339(),
            "name": name,
            "email": email,
            "phone_number": phone_number,
        });
        let body = self.post_json(&url, &payload).await?;
        serde_json::from_str(&body).map_err(|err| SchedulingError::Decode(format!("{err}: {body}")))
    }
}

/// Stands in when no scheduling integration is configured. Every call
/// reports the integration as unavailable and the context builder turns
/// that into guidance for the sender.
#[derive(Debug, Default, Clone)]
pub struct DisabledSchedulingClient;

#[async_trait]
impl SchedulingClient for DisabledSchedulingClient {
    async fn verify_appointment(
        &self,
        _workflow_id: &WorkflowId,
        _when: DateTime<Utc>,
    ) -> Result<SlotCheck, SchedulingError> {
        Err(SchedulingError::Disabled)
    }

    async fn create_appointment(
        &self,
        _workflow_id: &WorkflowId,
        _when: DateTime<Utc>,
        _name: Option<&str>,
        _email: Option<&str>,
        _phone_number: &str,
    ) -> Result<BookingConfirmation, SchedulingError> {
        Err(SchedulingError::Disabled)
    }
}
