use thiserror::Error;

/// Reply used whenever a turn cannot be processed normally. The webhook
/// still answers 200 with this text so the sender never sees a dead end.
pub const SAFE_GENERIC_REPLY: &str = "Thank you for your message. Our team will respond shortly.";

/// Failure taxonomy for a reply turn. The orchestrator is the last stop for
/// every variant; none of them crosses the webhook boundary as an error
/// status.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("persistence failure: {0}")]
    Persistence(String),
    #[error("collaborator failure ({collaborator}): {detail}")]
    Collaborator { collaborator: &'static str, detail: String },
    #[error("validation failure: {0}")]
    Validation(String),
}

impl EngineError {
    pub fn persistence(detail: impl std::fmt::Display) -> Self {
        Self::Persistence(detail.to_string())
    }

    pub fn collaborator(collaborator: &'static str, detail: impl std::fmt::Display) -> Self {
        Self::Collaborator { collaborator, detail: detail.to_string() }
    }

    /// Class label for structured logs.
    pub fn class(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "configuration",
            Self::Persistence(_) => "persistence",
            Self::Collaborator { .. } => "collaborator",
            Self::Validation(_) => "validation",
        }
    }

    /// What the sender receives when this error ends the turn.
    pub fn safe_reply(&self) -> &'static str {
        SAFE_GENERIC_REPLY
    }
}
