use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// External identifier of a business tenant, as it appears in webhook paths.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BusinessId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl std::fmt::Display for BusinessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A business's reply workflow. The engine reads these; authoring them is a
/// separate surface.
#[derive(Debug, Clone, PartialEq)]
pub struct Workflow {
    pub id: WorkflowId,
    pub business_id: BusinessId,
    pub name: String,
    pub active: bool,
    pub settings: WorkflowSettings,
    pub created_at: DateTime<Utc>,
}

/// Per-workflow reply behavior, stored as a JSON document alongside the
/// workflow row. Every field has a serde default so sparse documents from
/// older deployments still load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    #[serde(default = "default_conversation_timeout_minutes")]
    pub conversation_timeout_minutes: i64,
    #[serde(default = "default_sections")]
    pub sections: Vec<SectionConfig>,
    #[serde(default = "default_fallback_text")]
    pub fallback_text: String,
    #[serde(default = "default_opt_in_prompt")]
    pub opt_in_prompt: String,
    #[serde(default = "default_opt_in_ack")]
    pub opt_in_ack: String,
    #[serde(default = "default_opt_out_ack")]
    pub opt_out_ack: String,
    #[serde(default = "default_opted_out_notice")]
    pub opted_out_notice: String,
    #[serde(default)]
    pub agent_instructions: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionConfig {
    pub kind: SectionKind,
    #[serde(default = "default_section_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionKind {
    Greeting,
    MainContent,
    NextSteps,
    SignOff,
}

impl SectionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Greeting => "greeting",
            Self::MainContent => "main_content",
            Self::NextSteps => "next_steps",
            Self::SignOff => "sign_off",
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorkflowValidationError {
    #[error("conversation_timeout_minutes must be at least 1 (got {0})")]
    InvalidTimeout(i64),
    #[error("sections must include a main_content entry")]
    MissingMainContent,
    #[error("fallback_text must not be empty")]
    EmptyFallbackText,
    #[error("opt_in_prompt must contain at least one alphanumeric character")]
    EmptyOptInPrompt,
}

impl WorkflowSettings {
    pub fn conversation_timeout(&self) -> Duration {
        Duration::minutes(self.conversation_timeout_minutes)
    }

    pub fn validate(&self) -> Result<(), WorkflowValidationError> {
        if self.conversation_timeout_minutes < 1 {
            return Err(WorkflowValidationError::InvalidTimeout(self.conversation_timeout_minutes));
        }
        if !self.sections.iter().any(|section| section.kind == SectionKind::MainContent) {
            return Err(WorkflowValidationError::MissingMainContent);
        }
        if self.fallback_text.trim().is_empty() {
            return Err(WorkflowValidationError::EmptyFallbackText);
        }
        // The composer compares the prompt by its normalized form; a prompt
        // that normalizes to nothing would defeat the dedup invariant.
        if !self.opt_in_prompt.chars().any(char::is_alphanumeric) {
            return Err(WorkflowValidationError::EmptyOptInPrompt);
        }
        Ok(())
    }
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            conversation_timeout_minutes: default_conversation_timeout_minutes(),
            sections: default_sections(),
            fallback_text: default_fallback_text(),
            opt_in_prompt: default_opt_in_prompt(),
            opt_in_ack: default_opt_in_ack(),
            opt_out_ack: default_opt_out_ack(),
            opted_out_notice: default_opted_out_notice(),
            agent_instructions: String::new(),
        }
    }
}

fn default_conversation_timeout_minutes() -> i64 {
    30
}

fn default_section_enabled() -> bool {
    true
}

fn default_sections() -> Vec<SectionConfig> {
    vec![
        SectionConfig {
            kind: SectionKind::Greeting,
            enabled: true,
            text: "Hi! Thanks for reaching out.".to_string(),
        },
        SectionConfig { kind: SectionKind::MainContent, enabled: true, text: String::new() },
        SectionConfig {
            kind: SectionKind::NextSteps,
            enabled: true,
            text: "You can reply here with questions or a preferred time.".to_string(),
        },
        SectionConfig { kind: SectionKind::SignOff, enabled: true, text: "Talk soon!".to_string() },
    ]
}

fn default_fallback_text() -> String {
    "Thank you for your message. Our team will respond shortly.".to_string()
}

fn default_opt_in_prompt() -> String {
    "Reply YES to receive text updates or STOP to opt out.".to_string()
}

fn default_opt_in_ack() -> String {
    "You're signed up for text updates. Reply STOP at any time to opt out.".to_string()
}

fn default_opt_out_ack() -> String {
    "You've been unsubscribed and will not receive further messages.".to_string()
}

fn default_opted_out_notice() -> String {
    "You previously opted out of text messages. Reply YES if you'd like to hear from us again."
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::{SectionKind, WorkflowSettings, WorkflowValidationError};

    #[test]
    fn sparse_settings_document_fills_defaults() {
        let settings: WorkflowSettings =
            serde_json::from_str(r#"{"conversation_timeout_minutes": 45}"#)
                .expect("sparse document should deserialize");

        assert_eq!(settings.conversation_timeout_minutes, 45);
        assert_eq!(settings.sections.len(), 4);
        assert_eq!(settings.fallback_text, "Thank you for your message. Our team will respond shortly.");
        assert!(settings.opt_in_prompt.contains("YES"));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn section_entries_default_to_enabled() {
        let settings: WorkflowSettings = serde_json::from_str(
            r#"{"sections": [{"kind": "main_content"}, {"kind": "sign_off", "enabled": false, "text": "Bye"}]}"#,
        )
        .expect("sections should deserialize");

        assert!(settings.sections[0].enabled);
        assert_eq!(settings.sections[0].kind, SectionKind::MainContent);
        assert!(!settings.sections[1].enabled);
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let settings =
            WorkflowSettings { conversation_timeout_minutes: 0, ..WorkflowSettings::default() };
        assert_eq!(settings.validate(), Err(WorkflowValidationError::InvalidTimeout(0)));
    }

    #[test]
    fn validate_requires_main_content_section() {
        let mut settings = WorkflowSettings::default();
        settings.sections.retain(|section| section.kind != SectionKind::MainContent);
        assert_eq!(settings.validate(), Err(WorkflowValidationError::MissingMainContent));
    }

    #[test]
    fn validate_rejects_symbol_only_opt_in_prompt() {
        let settings =
            WorkflowSettings { opt_in_prompt: "!!! ???".to_string(), ..WorkflowSettings::default() };
        assert_eq!(settings.validate(), Err(WorkflowValidationError::EmptyOptInPrompt));
    }

    #[test]
    fn default_timeout_is_thirty_minutes() {
        let settings = WorkflowSettings::default();
        assert_eq!(settings.conversation_timeout(), chrono::Duration::minutes(30));
    }
}
