use textback_core::domain::message::{Direction, MessageRecord};

use crate::llm::ChatMessage;

/// Shapes stored rows into the transcript sent to the model. `records`
/// arrives newest first straight from the store; the model wants oldest
/// first, capped at `limit` most recent entries.
pub fn history_from_records(records: &[MessageRecord], limit: u32) -> Vec<ChatMessage> {
    let take = records.len().min(limit as usize);
    records[..take]
        .iter()
        .rev()
        .map(|record| match record.direction {
            Direction::Inbound => ChatMessage::user(record.content.clone()),
            Direction::Outbound => ChatMessage::assistant(record.content.clone()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use textback_core::domain::message::MessageRecord;
    use textback_core::domain::workflow::WorkflowId;
    use uuid::Uuid;

    use super::history_from_records;
    use crate::llm::ChatMessage;

    fn workflow_id() -> WorkflowId {
        WorkflowId("wf-1".to_string())
    }

    #[test]
    fn orders_oldest_first_and_maps_directions_to_roles() {
        let conversation = Uuid::new_v4();
        // Newest first, as the store returns them.
        let records = vec![
            MessageRecord::outbound(
                workflow_id(),
                "+15550001111",
                "See you at 3pm.",
                conversation,
                None,
                Utc::now(),
            ),
            MessageRecord::inbound(
                workflow_id(),
                "+15550001111",
                "Can I come at 3pm?",
                conversation,
                true,
                Utc::now(),
            ),
        ];

        let history = history_from_records(&records, 10);

        assert_eq!(
            history,
            vec![ChatMessage::user("Can I come at 3pm?"), ChatMessage::assistant("See you at 3pm.")]
        );
    }

    #[test]
    fn caps_at_the_limit_keeping_the_newest_rows() {
        let conversation = Uuid::new_v4();
        let records: Vec<_> = (1..=5)
            .rev()
            .map(|n| {
                MessageRecord::inbound(
                    workflow_id(),
                    "+15550001111",
                    format!("message {n}"),
                    conversation,
                    false,
                    Utc::now(),
                )
            })
            .collect();

        let history = history_from_records(&records, 3);

        let contents: Vec<_> = history.iter().map(|entry| entry.content.as_str()).collect();
        assert_eq!(contents, ["message 3", "message 4", "message 5"]);
    }

    #[test]
    fn no_history_yields_an_empty_transcript() {
        assert!(history_from_records(&[], 10).is_empty());
    }
}
