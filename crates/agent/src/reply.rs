use async_trait::async_trait;
use serde::Deserialize;
use textback_core::domain::workflow::WorkflowSettings;
use tracing::warn;

use crate::llm::{ChatMessage, ChatRequest, LlmClient, LlmError};

/// Everything the drafting agent sees for one turn. History is oldest first
/// and already capped by the caller.
pub struct ReplyInput<'a> {
    pub body: &'a str,
    pub settings: &'a WorkflowSettings,
    pub history: &'a [ChatMessage],
    pub is_new_conversation: bool,
    pub appointment_context: Option<&'a str>,
}

/// The agent's verdict for one turn. `degraded` marks output that did not
/// come back in the structured shape, so the caller can log it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReply {
    pub message: String,
    pub include_next_steps: bool,
    pub include_sign_off: bool,
    pub degraded: bool,
}

impl AgentReply {
    pub fn fallback(settings: &WorkflowSettings) -> Self {
        Self {
            message: settings.fallback_text.clone(),
            include_next_steps: false,
            include_sign_off: false,
            degraded: true,
        }
    }
}

/// Drafts the conversational reply for a turn. Implementations must not
/// fail; transport and parse problems degrade into usable output.
#[async_trait]
pub trait ReplyAgent: Send + Sync {
    async fn draft_reply(&self, input: ReplyInput<'_>) -> AgentReply;
}

pub struct LlmReplyAgent<C> {
    client: C,
}

impl<C: LlmClient> LlmReplyAgent<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<C: LlmClient> ReplyAgent for LlmReplyAgent<C> {
    async fn draft_reply(&self, input: ReplyInput<'_>) -> AgentReply {
        let mut messages = Vec::with_capacity(input.history.len() + 1);
        messages.extend_from_slice(input.history);
        messages.push(ChatMessage::user(input.body));
        let request = ChatRequest { system: system_prompt(&input), messages };

        match self.client.complete(&request).await {
            Ok(raw) => parse_reply(&raw),
            Err(err) => {
                let event = match err {
                    LlmError::RateLimited { .. } => "agent.rate_limited",
                    _ => "agent.fallback_engaged",
                };
                warn!(
                    event_name = event,
                    error = %err,
                    "model call failed; using workflow fallback"
                );
                AgentReply::fallback(input.settings)
            }
        }
    }
}

fn system_prompt(input: &ReplyInput<'_>) -> String {
    let mut prompt = String::from(
        "You are an SMS assistant replying on behalf of a business. \
         Keep replies short and friendly; this is a text message. \
         Respond with a JSON object: {\"message\": string, \
         \"include_next_steps\": bool, \"include_sign_off\": bool}.",
    );
    let instructions = input.settings.agent_instructions.trim();
    if !instructions.is_empty() {
        prompt.push_str("\n\nBusiness instructions: ");
        prompt.push_str(instructions);
    }
    if input.is_new_conversation {
        prompt.push_str("\n\nThis is the first message of a new conversation.");
    }
    if let Some(context) = input.appointment_context {
        prompt.push_str("\n\nAppointment lookup result: ");
        prompt.push_str(context);
    }
    prompt
}

#[derive(Deserialize)]
struct RawReply {
    message: String,
    #[serde(default = "default_flag")]
    include_next_steps: bool,
    #[serde(default = "default_flag")]
    include_sign_off: bool,
}

fn default_flag() -> bool {
    true
}

/// Models wrap JSON in code fences or slip into prose often enough that
/// strict parsing would throw away perfectly good replies.
fn parse_reply(raw: &str) -> AgentReply {
    let stripped = strip_code_fence(raw.trim());
    match serde_json::from_str::<RawReply>(stripped) {
        Ok(reply) => AgentReply {
            message: reply.message.trim().to_string(),
            include_next_steps: reply.include_next_steps,
            include_sign_off: reply.include_sign_off,
            degraded: false,
        },
        Err(_) => AgentReply {
            message: stripped.to_string(),
            include_next_steps: true,
            include_sign_off: true,
            degraded: true,
        },
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    // Drop the info string ("json") on the opening fence line.
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use textback_core::domain::workflow::WorkflowSettings;

    use super::{AgentReply, LlmReplyAgent, ReplyAgent, ReplyInput};
    use crate::llm::{ChatMessage, ChatRequest, ChatRole, LlmClient, LlmError};

    #[derive(Default)]
    struct ScriptedLlm {
        outcomes: Mutex<VecDeque<Result<String, LlmError>>>,
        requests: Mutex<Vec<ChatRequest>>,
    }

    impl ScriptedLlm {
        fn replying(outcome: Result<String, LlmError>) -> Self {
            let scripted = Self::default();
            scripted.outcomes.lock().unwrap().push_back(outcome);
            scripted
        }
    }

    #[async_trait]
    impl LlmClient for &ScriptedLlm {
        async fn complete(&self, request: &ChatRequest) -> Result<String, LlmError> {
            self.requests.lock().unwrap().push(request.clone());
            self.outcomes
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(LlmError::Decode("script exhausted".to_string())))
        }
    }

    fn settings() -> WorkflowSettings {
        WorkflowSettings {
            agent_instructions: "You answer for Bayside Salon.".to_string(),
            ..WorkflowSettings::default()
        }
    }

    fn input<'a>(
        settings: &'a WorkflowSettings,
        history: &'a [ChatMessage],
        appointment_context: Option<&'a str>,
    ) -> ReplyInput<'a> {
        ReplyInput {
            body: "Do you have anything tomorrow?",
            settings,
            history,
            is_new_conversation: false,
            appointment_context,
        }
    }

    #[tokio::test]
    async fn structured_output_is_parsed() {
        let llm = ScriptedLlm::replying(Ok(String::from(
            r#"{"message": "We have 3pm open tomorrow.", "include_next_steps": true, "include_sign_off": false}"#,
        )));
        let workflow = settings();

        let reply = LlmReplyAgent::new(&llm).draft_reply(input(&workflow, &[], None)).await;

        assert_eq!(
            reply,
            AgentReply {
                message: "We have 3pm open tomorrow.".to_string(),
                include_next_steps: true,
                include_sign_off: false,
                degraded: false,
            }
        );
    }

    #[tokio::test]
    async fn code_fenced_json_is_accepted() {
        let llm =
            ScriptedLlm::replying(Ok("```json\n{\"message\": \"Sure thing!\"}\n```".to_string()));
        let workflow = settings();

        let reply = LlmReplyAgent::new(&llm).draft_reply(input(&workflow, &[], None)).await;

        assert_eq!(reply.message, "Sure thing!");
        assert!(reply.include_next_steps);
        assert!(reply.include_sign_off);
        assert!(!reply.degraded);
    }

    #[tokio::test]
    async fn prose_output_is_kept_with_sections_enabled() {
        let llm = ScriptedLlm::replying(Ok("We open at 9am tomorrow.".to_string()));
        let workflow = settings();

        let reply = LlmReplyAgent::new(&llm).draft_reply(input(&workflow, &[], None)).await;

        assert_eq!(reply.message, "We open at 9am tomorrow.");
        assert!(reply.include_next_steps);
        assert!(reply.include_sign_off);
        assert!(reply.degraded);
    }

    #[tokio::test]
    async fn transport_failure_degrades_to_the_workflow_fallback() {
        let llm =
            ScriptedLlm::replying(Err(LlmError::Api { status: 503, body: "oops".to_string() }));
        let workflow = settings();

        let reply = LlmReplyAgent::new(&llm).draft_reply(input(&workflow, &[], None)).await;

        assert_eq!(reply, AgentReply::fallback(&workflow));
        assert_eq!(reply.message, workflow.fallback_text);
        assert!(!reply.include_next_steps);
        assert!(!reply.include_sign_off);
    }

    #[tokio::test]
    async fn rate_limits_degrade_the_same_way() {
        let llm = ScriptedLlm::replying(Err(LlmError::RateLimited { status: 429 }));
        let workflow = settings();

        let reply = LlmReplyAgent::new(&llm).draft_reply(input(&workflow, &[], None)).await;

        assert_eq!(reply, AgentReply::fallback(&workflow));
    }

    #[tokio::test]
    async fn request_carries_history_then_the_current_message() {
        let llm = ScriptedLlm::replying(Ok(r#"{"message": "ok"}"#.to_string()));
        let workflow = settings();
        let history =
            [ChatMessage::user("Hi there"), ChatMessage::assistant("Hello! How can we help?")];

        LlmReplyAgent::new(&llm)
            .draft_reply(input(&workflow, &history, Some("3pm is available")))
            .await;

        let requests = llm.requests.lock().unwrap();
        let request = &requests[0];
        assert_eq!(request.messages.len(), 3);
        assert_eq!(request.messages[0], ChatMessage::user("Hi there"));
        assert_eq!(request.messages[2].role, ChatRole::User);
        assert_eq!(request.messages[2].content, "Do you have anything tomorrow?");
        assert!(request.system.contains("You answer for Bayside Salon."));
        assert!(request.system.contains("3pm is available"));
    }
}
