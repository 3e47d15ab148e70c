use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::domain::message::MessageRecord;

/// Which conversation a turn belongs to, derived from history rather than
/// stored session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionDecision {
    pub conversation_id: Uuid,
    pub is_new_conversation: bool,
}

impl SessionDecision {
    fn fresh() -> Self {
        Self { conversation_id: Uuid::new_v4(), is_new_conversation: true }
    }
}

/// Decide the session from the most recent message for the contact.
///
/// A new conversation id is minted when there is no prior message, when the
/// prior message pre-dates session tracking (NULL conversation id), or when
/// the gap since the prior message exceeds the workflow timeout. A gap of
/// exactly the timeout still reuses the session.
///
/// Two near-simultaneous first messages can each mint their own id; the
/// resolver reads history without locking, so that race is accepted.
pub fn resolve_session(
    most_recent: Option<&MessageRecord>,
    timeout: Duration,
    now: DateTime<Utc>,
) -> SessionDecision {
    let Some(last) = most_recent else {
        return SessionDecision::fresh();
    };
    let Some(conversation_id) = last.conversation_id else {
        return SessionDecision::fresh();
    };
    if now.signed_duration_since(last.created_at) > timeout {
        return SessionDecision::fresh();
    }
    SessionDecision { conversation_id, is_new_conversation: false }
}
