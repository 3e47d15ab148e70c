use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::workflow::WorkflowId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "inbound" => Some(Self::Inbound),
            "outbound" => Some(Self::Outbound),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Channel {
    Sms,
    Voice,
    Email,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Sms => "sms",
            Self::Voice => "voice",
            Self::Email => "email",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sms" => Some(Self::Sms),
            "voice" => Some(Self::Voice),
            "email" => Some(Self::Email),
            _ => None,
        }
    }
}

/// Lifecycle status of a stored message. Inbound rows land as `Received`,
/// outbound rows as `Sent`; `Delivered`/`Failed` are reserved for delivery
/// receipts, which this engine does not consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Received,
    Sent,
    Delivered,
    Failed,
}

impl MessageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Received => "received",
            Self::Sent => "sent",
            Self::Delivered => "delivered",
            Self::Failed => "failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "received" => Some(Self::Received),
            "sent" => Some(Self::Sent),
            "delivered" => Some(Self::Delivered),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One message row, either direction. `conversation_id` is nullable because
/// rows written before session tracking existed carry none.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: Uuid,
    pub workflow_id: WorkflowId,
    pub direction: Direction,
    pub channel: Channel,
    pub content: String,
    pub phone_number: String,
    pub conversation_id: Option<Uuid>,
    pub is_first_in_conversation: bool,
    pub response_to_message_id: Option<Uuid>,
    pub status: MessageStatus,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    pub fn inbound(
        workflow_id: WorkflowId,
        phone_number: impl Into<String>,
        content: impl Into<String>,
        conversation_id: Uuid,
        is_first_in_conversation: bool,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            direction: Direction::Inbound,
            channel: Channel::Sms,
            content: content.into(),
            phone_number: phone_number.into(),
            conversation_id: Some(conversation_id),
            is_first_in_conversation,
            response_to_message_id: None,
            status: MessageStatus::Received,
            created_at: now,
        }
    }

    pub fn outbound(
        workflow_id: WorkflowId,
        phone_number: impl Into<String>,
        content: impl Into<String>,
        conversation_id: Uuid,
        response_to_message_id: Option<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            workflow_id,
            direction: Direction::Outbound,
            channel: Channel::Sms,
            content: content.into(),
            phone_number: phone_number.into(),
            conversation_id: Some(conversation_id),
            is_first_in_conversation: false,
            response_to_message_id,
            status: MessageStatus::Sent,
            created_at: now,
        }
    }
}
