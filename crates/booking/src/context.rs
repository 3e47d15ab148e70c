use async_trait::async_trait;
use chrono::{DateTime, Utc};
use textback_core::domain::workflow::WorkflowId;
use tracing::warn;

use crate::client::SchedulingClient;
use crate::dates::extract_datetime;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextKind {
    Booking,
    Availability,
}

impl ContextKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Booking => "booking",
            Self::Availability => "availability",
        }
    }
}

/// What the scheduling lookup produced for one turn. This is prompt input
/// for the drafting agent, never an error path; `message` always holds
/// something the model can relay or act on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppointmentContext {
    pub kind: ContextKind,
    pub success: bool,
    pub booking_date: Option<DateTime<Utc>>,
    pub message: String,
    pub detail: Option<String>,
    pub error: Option<String>,
}

impl AppointmentContext {
    fn failure(
        kind: ContextKind,
        booking_date: Option<DateTime<Utc>>,
        message: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            success: false,
            booking_date,
            message: message.into(),
            detail: None,
            error: Some(error.into()),
        }
    }

    /// Renders the context for the model prompt.
    pub fn prompt_block(&self) -> String {
        match &self.detail {
            Some(detail) => format!("{} {}", self.message, detail),
            None => self.message.clone(),
        }
    }
}

/// Builds appointment context for booking and availability turns.
#[async_trait]
pub trait AppointmentContextBuilder: Send + Sync {
    async fn booking_context(
        &self,
        workflow_id: &WorkflowId,
        body: &str,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> AppointmentContext;

    async fn availability_context(
        &self,
        workflow_id: &WorkflowId,
        body: &str,
        now: DateTime<Utc>,
    ) -> AppointmentContext;
}

pub struct SchedulingContextBuilder<S> {
    scheduling: S,
}

impl<S: SchedulingClient> SchedulingContextBuilder<S> {
    pub fn new(scheduling: S) -> Self {
        Self { scheduling }
    }
}

#[async_trait]
impl<S: SchedulingClient> AppointmentContextBuilder for SchedulingContextBuilder<S> {
    async fn booking_context(
        &self,
        workflow_id: &WorkflowId,
        body: &str,
        phone_number: &str,
        now: DateTime<Utc>,
    ) -> AppointmentContext {
        let Some(when) = extract_datetime(body, now) else {
            return AppointmentContext::failure(
                ContextKind::Booking,
                None,
                "The message did not name a day or time. Ask the sender for one.",
                "No date found",
            );
        };

        match self.scheduling.create_appointment(workflow_id, when, None, None, phone_number).await
        {
            Ok(confirmation) if confirmation.confirmed => AppointmentContext {
                kind: ContextKind::Booking,
                success: true,
                booking_date: Some(when),
                message: format!("Appointment request recorded for {}.", format_when(when)),
                detail: confirmation.reference.map(|reference| format!("Reference: {reference}.")),
                error: None,
            },
            Ok(_) => AppointmentContext::failure(
                ContextKind::Booking,
                Some(when),
                format!(
                    "The {} slot could not be confirmed. Offer to find another time.",
                    format_when(when)
                ),
                "slot not confirmed",
            ),
            Err(err) => {
                warn!(
                    event_name = "scheduling.create_failed",
                    workflow_id = %workflow_id,
                    error = %err,
                    "appointment creation failed"
                );
                AppointmentContext::failure(
                    ContextKind::Booking,
                    Some(when),
                    "The booking system is unavailable right now. Offer to follow up.",
                    err.to_string(),
                )
            }
        }
    }

    async fn availability_context(
        &self,
        workflow_id: &WorkflowId,
        body: &str,
        now: DateTime<Utc>,
    ) -> AppointmentContext {
        // No date in the message means "what do you have now-ish".
        let when = extract_datetime(body, now).unwrap_or(now);

        match self.scheduling.verify_appointment(workflow_id, when).await {
            Ok(check) => {
                let message = if check.available {
                    format!("{} is available.", format_when(when))
                } else if check.alternatives.is_empty() {
                    format!("{} is not available.", format_when(when))
                } else {
                    format!(
                        "{} is not available. Alternatives: {}.",
                        format_when(when),
                        check.alternatives.join(", ")
                    )
                };
                AppointmentContext {
                    kind: ContextKind::Availability,
                    success: true,
                    booking_date: Some(when),
                    message,
                    detail: None,
                    error: None,
                }
            }
            Err(err) => {
                warn!(
                    event_name = "scheduling.verify_failed",
                    workflow_id = %workflow_id,
                    error = %err,
                    "availability check failed"
                );
                AppointmentContext::failure(
                    ContextKind::Availability,
                    Some(when),
                    "Availability could not be checked right now. Offer to follow up.",
                    err.to_string(),
                )
            }
        }
    }
}

fn format_when(when: DateTime<Utc>) -> String {
    when.format("%A %B %-d at %-I:%M%P UTC").to_string()
}
