//! The per-turn reply pipeline.
//!
//! One inbound SMS becomes exactly one outbound reply. Consent keywords are
//! answered with fixed acknowledgements before anything else runs, declined
//! contacts only ever see the opted-out notice, and every stage after consent
//! degrades instead of failing. A collaborator outage can cost history or
//! persistence for a turn, never the reply itself.

use std::sync::Arc;

use chrono::Utc;
use textback_agent::{history_from_records, ReplyAgent, ReplyInput};
use textback_booking::AppointmentContextBuilder;
use textback_core::compose::{ComposeFlags, MessageComposer};
use textback_core::domain::consent::{transition_for_intent, ConsentStatus};
use textback_core::domain::message::MessageRecord;
use textback_core::domain::workflow::BusinessId;
use textback_core::intent::{Intent, IntentClassifier};
use textback_core::session::resolve_session;
use textback_core::EngineError;
use textback_db::repositories::{ConsentRepository, MessageRepository, WorkflowRepository};
use textback_sms::mask_phone;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One inbound turn. `from` holds whatever the carrier sent; the webhook
/// substitutes the literal `"unknown"` when the field was absent.
#[derive(Clone, Debug)]
pub struct TurnRequest {
    pub business_id: BusinessId,
    pub from: String,
    pub body: String,
    pub correlation_id: Uuid,
}

/// How a turn was resolved. The webhook relays only `reply`; the disposition
/// is for logs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TurnDisposition {
    /// No active workflow, or the lookup failed.
    WorkflowUnavailable,
    /// The consent record could not be read or written.
    ConsentUnavailable,
    /// Fixed opt-in acknowledgement; nothing persisted.
    OptInAcknowledged,
    /// Fixed opt-out acknowledgement; nothing persisted.
    OptOutAcknowledged,
    /// Declined contact sent a regular message; opted-out notice.
    OptedOutNotice,
    /// Full pipeline: drafted (or fallback) text through the composer.
    Replied,
}

impl TurnDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WorkflowUnavailable => "workflow_unavailable",
            Self::ConsentUnavailable => "consent_unavailable",
            Self::OptInAcknowledged => "opt_in_acknowledged",
            Self::OptOutAcknowledged => "opt_out_acknowledged",
            Self::OptedOutNotice => "opted_out_notice",
            Self::Replied => "replied",
        }
    }
}

#[derive(Clone, Debug)]
pub struct TurnOutcome {
    pub reply: String,
    pub disposition: TurnDisposition,
}

impl TurnOutcome {
    fn degraded(error: &EngineError, disposition: TurnDisposition) -> Self {
        Self { reply: error.safe_reply().to_string(), disposition }
    }
}

pub struct ReplyOrchestrator {
    workflows: Arc<dyn WorkflowRepository>,
    consents: Arc<dyn ConsentRepository>,
    messages: Arc<dyn MessageRepository>,
    classifier: Arc<dyn IntentClassifier>,
    context_builder: Arc<dyn AppointmentContextBuilder>,
    agent: Arc<dyn ReplyAgent>,
    composer: MessageComposer,
    history_limit: u32,
}

impl ReplyOrchestrator {
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        consents: Arc<dyn ConsentRepository>,
        messages: Arc<dyn MessageRepository>,
        classifier: Arc<dyn IntentClassifier>,
        context_builder: Arc<dyn AppointmentContextBuilder>,
        agent: Arc<dyn ReplyAgent>,
        history_limit: u32,
    ) -> Self {
        Self {
            workflows,
            consents,
            messages,
            classifier,
            context_builder,
            agent,
            composer: MessageComposer,
            history_limit,
        }
    }

    /// Runs the whole turn. Never returns an error; the worst any failure can
    /// do is downgrade the reply to the generic safe text.
    pub async fn handle_turn(&self, request: &TurnRequest) -> TurnOutcome {
        let now = Utc::now();
        let masked_from = mask_phone(&request.from);

        info!(
            event_name = "turn.received",
            correlation_id = %request.correlation_id,
            business_id = %request.business_id,
            conversation_id = "unknown",
            from = %masked_from,
            body_chars = request.body.chars().count(),
            "inbound turn received"
        );

        let workflow = match self.workflows.active_for_business(&request.business_id).await {
            Ok(Some(workflow)) => workflow,
            Ok(None) => {
                let failure = EngineError::Configuration("no active workflow".to_string());
                warn!(
                    event_name = "turn.no_active_workflow",
                    correlation_id = %request.correlation_id,
                    business_id = %request.business_id,
                    conversation_id = "unknown",
                    from = %masked_from,
                    error_class = failure.class(),
                    "no active workflow for business; sending safe reply"
                );
                return TurnOutcome::degraded(&failure, TurnDisposition::WorkflowUnavailable);
            }
            Err(error) => {
                let failure = EngineError::persistence(error);
                warn!(
                    event_name = "turn.workflow_lookup_failed",
                    correlation_id = %request.correlation_id,
                    business_id = %request.business_id,
                    conversation_id = "unknown",
                    from = %masked_from,
                    error = %failure,
                    error_class = failure.class(),
                    "workflow lookup failed; sending safe reply"
                );
                return TurnOutcome::degraded(&failure, TurnDisposition::WorkflowUnavailable);
            }
        };

        let consent =
            match self.consents.get_or_create(&request.from, &request.business_id, now).await {
                Ok(record) => record,
                Err(error) => {
                    let failure = EngineError::persistence(error);
                    warn!(
                        event_name = "turn.consent_load_failed",
                        correlation_id = %request.correlation_id,
                        business_id = %request.business_id,
                        conversation_id = "unknown",
                        from = %masked_from,
                        error = %failure,
                        error_class = failure.class(),
                        "consent lookup failed; sending safe reply"
                    );
                    return TurnOutcome::degraded(&failure, TurnDisposition::ConsentUnavailable);
                }
            };

        let intent = self.classifier.classify(&request.body);
        debug!(
            event_name = "turn.intent_classified",
            correlation_id = %request.correlation_id,
            business_id = %request.business_id,
            conversation_id = "unknown",
            from = %masked_from,
            intent = intent.as_str(),
            consent_status = consent.status.as_str(),
            "intent classified"
        );

        // Consent keywords resolve with fixed text and touch nothing else: no
        // drafting, no scheduling, no message rows.
        if matches!(intent, Intent::OptIn | Intent::OptOut) {
            let transition = transition_for_intent(consent.status, intent);
            if transition.changed {
                let mut updated = consent;
                updated.status = transition.to;
                updated.updated_at = now;
                if let Err(error) = self.consents.save(updated).await {
                    let failure = EngineError::persistence(error);
                    warn!(
                        event_name = "turn.consent_save_failed",
                        correlation_id = %request.correlation_id,
                        business_id = %request.business_id,
                        conversation_id = "unknown",
                        from = %masked_from,
                        error = %failure,
                        error_class = failure.class(),
                        "consent transition could not be persisted; sending safe reply"
                    );
                    return TurnOutcome::degraded(&failure, TurnDisposition::ConsentUnavailable);
                }
                info!(
                    event_name = "turn.consent_updated",
                    correlation_id = %request.correlation_id,
                    business_id = %request.business_id,
                    conversation_id = "unknown",
                    from = %masked_from,
                    consent_from = transition.from.as_str(),
                    consent_to = transition.to.as_str(),
                    "consent state changed"
                );
            }

            let (reply, disposition) = match intent {
                Intent::OptIn => {
                    (workflow.settings.opt_in_ack.clone(), TurnDisposition::OptInAcknowledged)
                }
                _ => (workflow.settings.opt_out_ack.clone(), TurnDisposition::OptOutAcknowledged),
            };
            info!(
                event_name = "turn.consent_acknowledged",
                correlation_id = %request.correlation_id,
                business_id = %request.business_id,
                conversation_id = "unknown",
                from = %masked_from,
                disposition = disposition.as_str(),
                "consent keyword acknowledged"
            );
            return TurnOutcome { reply, disposition };
        }

        if consent.status == ConsentStatus::Declined {
            info!(
                event_name = "turn.opted_out_notice",
                correlation_id = %request.correlation_id,
                business_id = %request.business_id,
                conversation_id = "unknown",
                from = %masked_from,
                "declined contact messaged; sending opted-out notice"
            );
            return TurnOutcome {
                reply: workflow.settings.opted_out_notice.clone(),
                disposition: TurnDisposition::OptedOutNotice,
            };
        }

        let include_opt_in_prompt = consent.status == ConsentStatus::Pending;

        // One history query serves both the session decision (newest row) and
        // the drafting transcript. Losing it costs context, not the turn.
        let history = match self
            .messages
            .recent_for_contact(&workflow.id, &request.from, self.history_limit)
            .await
        {
            Ok(records) => records,
            Err(error) => {
                warn!(
                    event_name = "turn.history_unavailable",
                    correlation_id = %request.correlation_id,
                    business_id = %request.business_id,
                    conversation_id = "unknown",
                    from = %masked_from,
                    error = %error,
                    "history fetch failed; continuing without history"
                );
                Vec::new()
            }
        };

        let session =
            resolve_session(history.first(), workflow.settings.conversation_timeout(), now);
        debug!(
            event_name = "turn.session_resolved",
            correlation_id = %request.correlation_id,
            business_id = %request.business_id,
            conversation_id = %session.conversation_id,
            from = %masked_from,
            is_new_conversation = session.is_new_conversation,
            "session resolved"
        );

        let inbound = MessageRecord::inbound(
            workflow.id.clone(),
            &request.from,
            &request.body,
            session.conversation_id,
            session.is_new_conversation,
            now,
        );
        let inbound_id = inbound.id;
        let inbound_id = match self.messages.insert(inbound).await {
            Ok(()) => Some(inbound_id),
            Err(error) => {
                warn!(
                    event_name = "turn.inbound_persist_failed",
                    correlation_id = %request.correlation_id,
                    business_id = %request.business_id,
                    conversation_id = %session.conversation_id,
                    from = %masked_from,
                    error = %error,
                    "inbound message could not be persisted; continuing"
                );
                None
            }
        };

        let appointment = match intent {
            Intent::BookingRequest => Some(
                self.context_builder
                    .booking_context(&workflow.id, &request.body, &request.from, now)
                    .await,
            ),
            Intent::AvailabilityQuery => {
                Some(self.context_builder.availability_context(&workflow.id, &request.body, now).await)
            }
            _ => None,
        };
        if let Some(context) = &appointment {
            debug!(
                event_name = "turn.appointment_context_built",
                correlation_id = %request.correlation_id,
                business_id = %request.business_id,
                conversation_id = %session.conversation_id,
                from = %masked_from,
                kind = context.kind.as_str(),
                success = context.success,
                "appointment context attached to draft"
            );
        }

        let transcript = history_from_records(&history, self.history_limit);
        let prompt_block = appointment.as_ref().map(|context| context.prompt_block());
        let draft = self
            .agent
            .draft_reply(ReplyInput {
                body: &request.body,
                settings: &workflow.settings,
                history: &transcript,
                is_new_conversation: session.is_new_conversation,
                appointment_context: prompt_block.as_deref(),
            })
            .await;
        if draft.degraded {
            info!(
                event_name = "turn.agent_degraded",
                correlation_id = %request.correlation_id,
                business_id = %request.business_id,
                conversation_id = %session.conversation_id,
                from = %masked_from,
                "agent output degraded; composing from fallback"
            );
        }

        let reply = self.composer.compose(
            &draft.message,
            &workflow.settings,
            ComposeFlags {
                is_new_conversation: session.is_new_conversation,
                include_next_steps: draft.include_next_steps,
                include_sign_off: draft.include_sign_off,
                include_opt_in_prompt,
            },
        );

        let outbound = MessageRecord::outbound(
            workflow.id.clone(),
            &request.from,
            &reply,
            session.conversation_id,
            inbound_id,
            now,
        );
        if let Err(error) = self.messages.insert(outbound).await {
            warn!(
                event_name = "turn.outbound_persist_failed",
                correlation_id = %request.correlation_id,
                business_id = %request.business_id,
                conversation_id = %session.conversation_id,
                from = %masked_from,
                error = %error,
                "outbound message could not be persisted; reply still sent"
            );
        }

        info!(
            event_name = "turn.replied",
            correlation_id = %request.correlation_id,
            business_id = %request.business_id,
            conversation_id = %session.conversation_id,
            from = %masked_from,
            intent = intent.as_str(),
            degraded = draft.degraded,
            reply_chars = reply.chars().count(),
            "turn complete"
        );

        TurnOutcome { reply, disposition: TurnDisposition::Replied }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;

    use chrono::{DateTime, Duration, Utc};
    use tokio::sync::Mutex;
    use uuid::Uuid;

    use textback_agent::{AgentReply, ReplyAgent, ReplyInput};
    use textback_booking::{AppointmentContext, AppointmentContextBuilder, ContextKind};
    use textback_core::domain::consent::ConsentStatus;
    use textback_core::domain::message::{Direction, MessageRecord, MessageStatus};
    use textback_core::domain::workflow::{BusinessId, Workflow, WorkflowId, WorkflowSettings};
    use textback_core::intent::KeywordIntentClassifier;
    use textback_core::SAFE_GENERIC_REPLY;
    use textback_db::repositories::{
        ConsentRepository, InMemoryConsentRepository, InMemoryMessageRepository,
        InMemoryWorkflowRepository, MessageRepository, RepositoryError, WorkflowRepository,
    };

    use super::{ReplyOrchestrator, TurnDisposition, TurnRequest};

    const BUSINESS: &str = "biz-1";
    const WORKFLOW: &str = "wf-1";
    const PHONE: &str = "+15105550100";

    #[derive(Clone, Debug)]
    struct RecordedDraft {
        body: String,
        history_len: usize,
        is_new_conversation: bool,
        appointment_context: Option<String>,
    }

    #[derive(Default)]
    struct ScriptedAgent {
        state: Mutex<ScriptedAgentState>,
    }

    #[derive(Default)]
    struct ScriptedAgentState {
        replies: VecDeque<AgentReply>,
        calls: Vec<RecordedDraft>,
    }

    impl ScriptedAgent {
        fn with_replies(replies: Vec<AgentReply>) -> Self {
            Self {
                state: Mutex::new(ScriptedAgentState {
                    replies: replies.into(),
                    calls: Vec::new(),
                }),
            }
        }

        async fn calls(&self) -> Vec<RecordedDraft> {
            self.state.lock().await.calls.clone()
        }
    }

    #[async_trait::async_trait]
    impl ReplyAgent for ScriptedAgent {
        async fn draft_reply(&self, input: ReplyInput<'_>) -> AgentReply {
            let mut state = self.state.lock().await;
            state.calls.push(RecordedDraft {
                body: input.body.to_string(),
                history_len: input.history.len(),
                is_new_conversation: input.is_new_conversation,
                appointment_context: input.appointment_context.map(str::to_string),
            });
            state.replies.pop_front().unwrap_or(AgentReply {
                message: "Happy to help with that.".to_string(),
                include_next_steps: false,
                include_sign_off: false,
                degraded: false,
            })
        }
    }

    #[derive(Default)]
    struct ScriptedContextBuilder {
        calls: Mutex<Vec<(ContextKind, String)>>,
    }

    impl ScriptedContextBuilder {
        async fn calls(&self) -> Vec<(ContextKind, String)> {
            self.calls.lock().await.clone()
        }
    }

    #[async_trait::async_trait]
    impl AppointmentContextBuilder for ScriptedContextBuilder {
        async fn booking_context(
            &self,
            _workflow_id: &WorkflowId,
            body: &str,
            _phone_number: &str,
            _now: DateTime<Utc>,
        ) -> AppointmentContext {
            self.calls.lock().await.push((ContextKind::Booking, body.to_string()));
            AppointmentContext {
                kind: ContextKind::Booking,
                success: true,
                booking_date: None,
                message: "Appointment request recorded.".to_string(),
                detail: None,
                error: None,
            }
        }

        async fn availability_context(
            &self,
            _workflow_id: &WorkflowId,
            body: &str,
            _now: DateTime<Utc>,
        ) -> AppointmentContext {
            self.calls.lock().await.push((ContextKind::Availability, body.to_string()));
            AppointmentContext {
                kind: ContextKind::Availability,
                success: true,
                booking_date: None,
                message: "Open slots exist in the requested window.".to_string(),
                detail: None,
                error: None,
            }
        }
    }

    struct Engine {
        orchestrator: ReplyOrchestrator,
        workflows: Arc<InMemoryWorkflowRepository>,
        consents: Arc<InMemoryConsentRepository>,
        messages: Arc<InMemoryMessageRepository>,
        agent: Arc<ScriptedAgent>,
        contexts: Arc<ScriptedContextBuilder>,
    }

    fn engine_with_agent(agent: ScriptedAgent) -> Engine {
        let workflows = Arc::new(InMemoryWorkflowRepository::default());
        let consents = Arc::new(InMemoryConsentRepository::default());
        let messages = Arc::new(InMemoryMessageRepository::default());
        let agent = Arc::new(agent);
        let contexts = Arc::new(ScriptedContextBuilder::default());
        let orchestrator = ReplyOrchestrator::new(
            workflows.clone(),
            consents.clone(),
            messages.clone(),
            Arc::new(KeywordIntentClassifier),
            contexts.clone(),
            agent.clone(),
            10,
        );
        Engine { orchestrator, workflows, consents, messages, agent, contexts }
    }

    fn engine() -> Engine {
        engine_with_agent(ScriptedAgent::default())
    }

    async fn seed_workflow(engine: &Engine) -> Workflow {
        let workflow = Workflow {
            id: WorkflowId(WORKFLOW.to_string()),
            business_id: BusinessId(BUSINESS.to_string()),
            name: "After-hours text-back".to_string(),
            active: true,
            settings: WorkflowSettings::default(),
            created_at: Utc::now(),
        };
        engine.workflows.save(workflow.clone()).await.expect("seed workflow");
        workflow
    }

    async fn set_consent(engine: &Engine, status: ConsentStatus) {
        let mut record = engine
            .consents
            .get_or_create(PHONE, &BusinessId(BUSINESS.to_string()), Utc::now())
            .await
            .expect("create consent");
        record.status = status;
        engine.consents.save(record).await.expect("save consent");
    }

    async fn consent_status(engine: &Engine) -> ConsentStatus {
        engine
            .consents
            .get_or_create(PHONE, &BusinessId(BUSINESS.to_string()), Utc::now())
            .await
            .expect("read consent")
            .status
    }

    async fn persisted(engine: &Engine) -> Vec<MessageRecord> {
        engine
            .messages
            .recent_for_contact(&WorkflowId(WORKFLOW.to_string()), PHONE, 50)
            .await
            .expect("list messages")
    }

    fn request(body: &str) -> TurnRequest {
        TurnRequest {
            business_id: BusinessId(BUSINESS.to_string()),
            from: PHONE.to_string(),
            body: body.to_string(),
            correlation_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn stop_declines_pending_consent_with_fixed_ack_and_no_ai_call() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;

        let outcome = engine.orchestrator.handle_turn(&request("STOP")).await;

        assert_eq!(outcome.disposition, TurnDisposition::OptOutAcknowledged);
        assert_eq!(outcome.reply, workflow.settings.opt_out_ack);
        assert_eq!(consent_status(&engine).await, ConsentStatus::Declined);
        assert!(engine.agent.calls().await.is_empty());
        assert!(persisted(&engine).await.is_empty());
    }

    #[tokio::test]
    async fn yes_variant_confirms_consent_with_fixed_ack() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;

        let outcome = engine.orchestrator.handle_turn(&request("Yes please")).await;

        assert_eq!(outcome.disposition, TurnDisposition::OptInAcknowledged);
        assert_eq!(outcome.reply, workflow.settings.opt_in_ack);
        assert_eq!(consent_status(&engine).await, ConsentStatus::Confirmed);
        assert!(engine.agent.calls().await.is_empty());
    }

    #[tokio::test]
    async fn declined_contact_resubscribes_on_yes() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;
        set_consent(&engine, ConsentStatus::Declined).await;

        let outcome = engine.orchestrator.handle_turn(&request("YES")).await;

        assert_eq!(outcome.reply, workflow.settings.opt_in_ack);
        assert_eq!(consent_status(&engine).await, ConsentStatus::Confirmed);
    }

    #[tokio::test]
    async fn declined_contact_gets_opted_out_notice_without_ai() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;
        set_consent(&engine, ConsentStatus::Declined).await;

        let outcome = engine.orchestrator.handle_turn(&request("what are your hours?")).await;

        assert_eq!(outcome.disposition, TurnDisposition::OptedOutNotice);
        assert_eq!(outcome.reply, workflow.settings.opted_out_notice);
        assert!(engine.agent.calls().await.is_empty());
        assert!(persisted(&engine).await.is_empty());
    }

    #[tokio::test]
    async fn booking_request_passes_appointment_context_to_agent() {
        let engine = engine();
        seed_workflow(&engine).await;

        let outcome = engine
            .orchestrator
            .handle_turn(&request("can I book an appointment for tomorrow at 3pm"))
            .await;

        assert_eq!(outcome.disposition, TurnDisposition::Replied);
        let context_calls = engine.contexts.calls().await;
        assert_eq!(context_calls.len(), 1);
        assert_eq!(context_calls[0].0, ContextKind::Booking);

        let drafts = engine.agent.calls().await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].appointment_context.as_deref(), Some("Appointment request recorded."));
    }

    #[tokio::test]
    async fn availability_query_builds_availability_context() {
        let engine = engine();
        seed_workflow(&engine).await;

        engine.orchestrator.handle_turn(&request("what times are open this week?")).await;

        let context_calls = engine.contexts.calls().await;
        assert_eq!(context_calls.len(), 1);
        assert_eq!(context_calls[0].0, ContextKind::Availability);
    }

    #[tokio::test]
    async fn generic_message_skips_appointment_lookup() {
        let engine = engine();
        seed_workflow(&engine).await;

        engine.orchestrator.handle_turn(&request("do you sell gift cards?")).await;

        assert!(engine.contexts.calls().await.is_empty());
        let drafts = engine.agent.calls().await;
        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].appointment_context, None);
    }

    #[tokio::test]
    async fn agent_fallback_reply_still_persists_both_rows() {
        let fallback = AgentReply::fallback(&WorkflowSettings::default());
        let engine = engine_with_agent(ScriptedAgent::with_replies(vec![fallback]));
        let workflow = seed_workflow(&engine).await;

        let outcome = engine.orchestrator.handle_turn(&request("do you sell gift cards?")).await;

        assert_eq!(outcome.disposition, TurnDisposition::Replied);
        assert!(outcome.reply.contains(&workflow.settings.fallback_text));

        let rows = persisted(&engine).await;
        assert_eq!(rows.len(), 2);
        // Newest first: the outbound row answers the inbound one.
        let outbound = &rows[0];
        let inbound = &rows[1];
        assert_eq!(inbound.direction, Direction::Inbound);
        assert_eq!(inbound.status, MessageStatus::Received);
        assert!(inbound.is_first_in_conversation);
        assert_eq!(outbound.direction, Direction::Outbound);
        assert_eq!(outbound.status, MessageStatus::Sent);
        assert_eq!(outbound.response_to_message_id, Some(inbound.id));
        assert_eq!(outbound.conversation_id, inbound.conversation_id);
        assert_eq!(outbound.content, outcome.reply);
    }

    #[tokio::test]
    async fn unknown_business_id_resolves_to_generic_safe_reply() {
        let engine = engine();

        let outcome = engine.orchestrator.handle_turn(&request("hello")).await;

        assert_eq!(outcome.disposition, TurnDisposition::WorkflowUnavailable);
        assert_eq!(outcome.reply, SAFE_GENERIC_REPLY);
        assert!(engine.agent.calls().await.is_empty());
    }

    #[tokio::test]
    async fn workflow_lookup_failure_is_fail_open() {
        struct FailingWorkflows;

        #[async_trait::async_trait]
        impl WorkflowRepository for FailingWorkflows {
            async fn active_for_business(
                &self,
                _business_id: &BusinessId,
            ) -> Result<Option<Workflow>, RepositoryError> {
                Err(RepositoryError::Decode("scripted failure".to_string()))
            }

            async fn save(&self, _workflow: Workflow) -> Result<(), RepositoryError> {
                Err(RepositoryError::Decode("scripted failure".to_string()))
            }
        }

        let agent = Arc::new(ScriptedAgent::default());
        let orchestrator = ReplyOrchestrator::new(
            Arc::new(FailingWorkflows),
            Arc::new(InMemoryConsentRepository::default()),
            Arc::new(InMemoryMessageRepository::default()),
            Arc::new(KeywordIntentClassifier),
            Arc::new(ScriptedContextBuilder::default()),
            agent.clone(),
            10,
        );

        let outcome = orchestrator.handle_turn(&request("hello")).await;

        assert_eq!(outcome.disposition, TurnDisposition::WorkflowUnavailable);
        assert_eq!(outcome.reply, SAFE_GENERIC_REPLY);
        assert!(agent.calls().await.is_empty());
    }

    #[tokio::test]
    async fn consent_save_failure_degrades_to_generic_reply() {
        struct SaveFailingConsents {
            inner: InMemoryConsentRepository,
        }

        #[async_trait::async_trait]
        impl ConsentRepository for SaveFailingConsents {
            async fn get_or_create(
                &self,
                phone_number: &str,
                business_id: &BusinessId,
                now: DateTime<Utc>,
            ) -> Result<textback_core::domain::consent::ConsentRecord, RepositoryError> {
                self.inner.get_or_create(phone_number, business_id, now).await
            }

            async fn save(
                &self,
                _record: textback_core::domain::consent::ConsentRecord,
            ) -> Result<(), RepositoryError> {
                Err(RepositoryError::Decode("scripted failure".to_string()))
            }
        }

        let workflows = Arc::new(InMemoryWorkflowRepository::default());
        let agent = Arc::new(ScriptedAgent::default());
        let orchestrator = ReplyOrchestrator::new(
            workflows.clone(),
            Arc::new(SaveFailingConsents { inner: InMemoryConsentRepository::default() }),
            Arc::new(InMemoryMessageRepository::default()),
            Arc::new(KeywordIntentClassifier),
            Arc::new(ScriptedContextBuilder::default()),
            agent.clone(),
            10,
        );
        workflows
            .save(Workflow {
                id: WorkflowId(WORKFLOW.to_string()),
                business_id: BusinessId(BUSINESS.to_string()),
                name: "After-hours text-back".to_string(),
                active: true,
                settings: WorkflowSettings::default(),
                created_at: Utc::now(),
            })
            .await
            .expect("seed workflow");

        let outcome = orchestrator.handle_turn(&request("STOP")).await;

        assert_eq!(outcome.disposition, TurnDisposition::ConsentUnavailable);
        assert_eq!(outcome.reply, SAFE_GENERIC_REPLY);
    }

    #[tokio::test]
    async fn second_message_within_timeout_reuses_conversation() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;
        set_consent(&engine, ConsentStatus::Confirmed).await;

        let conversation = Uuid::new_v4();
        engine
            .messages
            .insert(MessageRecord::inbound(
                workflow.id.clone(),
                PHONE,
                "first message",
                conversation,
                true,
                Utc::now() - Duration::minutes(10),
            ))
            .await
            .expect("seed earlier message");

        engine.orchestrator.handle_turn(&request("still there?")).await;

        let rows = persisted(&engine).await;
        assert_eq!(rows.len(), 3);
        let outbound = &rows[0];
        let inbound = &rows[1];
        assert_eq!(inbound.content, "still there?");
        assert_eq!(inbound.conversation_id, Some(conversation));
        assert!(!inbound.is_first_in_conversation);
        assert_eq!(outbound.conversation_id, Some(conversation));

        let drafts = engine.agent.calls().await;
        assert_eq!(drafts.len(), 1);
        assert!(!drafts[0].is_new_conversation);
        assert_eq!(drafts[0].history_len, 1);
    }

    #[tokio::test]
    async fn gap_beyond_timeout_starts_new_conversation() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;
        set_consent(&engine, ConsentStatus::Confirmed).await;

        let stale_conversation = Uuid::new_v4();
        engine
            .messages
            .insert(MessageRecord::inbound(
                workflow.id.clone(),
                PHONE,
                "old message",
                stale_conversation,
                true,
                Utc::now() - Duration::minutes(31),
            ))
            .await
            .expect("seed stale message");

        engine.orchestrator.handle_turn(&request("hello again")).await;

        let rows = persisted(&engine).await;
        let inbound = rows.iter().find(|row| row.content == "hello again").expect("inbound row");
        assert_ne!(inbound.conversation_id, Some(stale_conversation));
        assert!(inbound.is_first_in_conversation);

        let drafts = engine.agent.calls().await;
        assert!(drafts[0].is_new_conversation);
    }

    #[tokio::test]
    async fn pending_consent_appends_prompt_exactly_once_when_agent_echoes_it() {
        let settings = WorkflowSettings::default();
        let echo = AgentReply {
            message: format!("You're on the list!\n{}", settings.opt_in_prompt),
            include_next_steps: false,
            include_sign_off: false,
            degraded: false,
        };
        let engine = engine_with_agent(ScriptedAgent::with_replies(vec![echo]));
        seed_workflow(&engine).await;

        let outcome = engine.orchestrator.handle_turn(&request("tell me more")).await;

        assert_eq!(outcome.reply.matches(settings.opt_in_prompt.as_str()).count(), 1);
    }

    #[tokio::test]
    async fn confirmed_consent_gets_no_prompt() {
        let engine = engine();
        let workflow = seed_workflow(&engine).await;
        set_consent(&engine, ConsentStatus::Confirmed).await;

        let outcome = engine.orchestrator.handle_turn(&request("tell me more")).await;

        assert!(!outcome.reply.contains(&workflow.settings.opt_in_prompt));
    }

    #[tokio::test]
    async fn history_fetch_failure_still_produces_a_reply() {
        struct HistorylessMessages {
            inner: Arc<InMemoryMessageRepository>,
        }

        #[async_trait::async_trait]
        impl MessageRepository for HistorylessMessages {
            async fn insert(&self, message: MessageRecord) -> Result<(), RepositoryError> {
                self.inner.insert(message).await
            }

            async fn recent_for_contact(
                &self,
                _workflow_id: &WorkflowId,
                _phone_number: &str,
                _limit: u32,
            ) -> Result<Vec<MessageRecord>, RepositoryError> {
                Err(RepositoryError::Decode("scripted failure".to_string()))
            }
        }

        let workflows = Arc::new(InMemoryWorkflowRepository::default());
        let store = Arc::new(InMemoryMessageRepository::default());
        let agent = Arc::new(ScriptedAgent::default());
        let orchestrator = ReplyOrchestrator::new(
            workflows.clone(),
            Arc::new(InMemoryConsentRepository::default()),
            Arc::new(HistorylessMessages { inner: store.clone() }),
            Arc::new(KeywordIntentClassifier),
            Arc::new(ScriptedContextBuilder::default()),
            agent.clone(),
            10,
        );
        workflows
            .save(Workflow {
                id: WorkflowId(WORKFLOW.to_string()),
                business_id: BusinessId(BUSINESS.to_string()),
                name: "After-hours text-back".to_string(),
                active: true,
                settings: WorkflowSettings::default(),
                created_at: Utc::now(),
            })
            .await
            .expect("seed workflow");

        let outcome = orchestrator.handle_turn(&request("anyone there?")).await;

        assert_eq!(outcome.disposition, TurnDisposition::Replied);
        assert!(!outcome.reply.is_empty());

        // No history means the turn starts a fresh conversation, and writes
        // still land through the working insert path.
        let drafts = agent.calls().await;
        assert_eq!(drafts[0].history_len, 0);
        assert!(drafts[0].is_new_conversation);
        let rows = store
            .recent_for_contact(&WorkflowId(WORKFLOW.to_string()), PHONE, 10)
            .await
            .expect("list persisted rows");
        assert_eq!(rows.len(), 2);
    }
}
