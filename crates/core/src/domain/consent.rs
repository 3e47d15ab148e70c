use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::workflow::BusinessId;
use crate::intent::Intent;

/// SMS consent state for one (phone_number, business_id) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Confirmed,
    Declined,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Confirmed => "confirmed",
            Self::Declined => "declined",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "confirmed" => Some(Self::Confirmed),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }
}

/// One consent record per (phone_number, business_id); never deleted, only
/// transitioned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub phone_number: String,
    pub business_id: BusinessId,
    pub status: ConsentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConsentTransition {
    pub from: ConsentStatus,
    pub to: ConsentStatus,
    pub changed: bool,
}

/// Total transition function of the consent machine. Opt-in confirms from any
/// state (a declined contact may re-subscribe), opt-out declines from any
/// state, and every other intent leaves the record untouched. Repeats are
/// reported as unchanged so callers can skip the write.
pub fn transition_for_intent(current: ConsentStatus, intent: Intent) -> ConsentTransition {
    let to = match intent {
        Intent::OptIn => ConsentStatus::Confirmed,
        Intent::OptOut => ConsentStatus::Declined,
        _ => current,
    };
    ConsentTransition { from: current, to, changed: to != current }
}

#[cfg(test)]
mod tests {
    use super::{transition_for_intent, ConsentStatus};
    use crate::intent::Intent;

    #[test]
    fn transition_table_is_total_and_idempotent() {
        struct Case {
            current: ConsentStatus,
            intent: Intent,
            expect_to: ConsentStatus,
            expect_changed: bool,
        }

        let cases = [
            Case {
                current: ConsentStatus::Pending,
                intent: Intent::OptIn,
                expect_to: ConsentStatus::Confirmed,
                expect_changed: true,
            },
            Case {
                current: ConsentStatus::Pending,
                intent: Intent::OptOut,
                expect_to: ConsentStatus::Declined,
                expect_changed: true,
            },
            Case {
                current: ConsentStatus::Confirmed,
                intent: Intent::OptIn,
                expect_to: ConsentStatus::Confirmed,
                expect_changed: false,
            },
            Case {
                current: ConsentStatus::Confirmed,
                intent: Intent::OptOut,
                expect_to: ConsentStatus::Declined,
                expect_changed: true,
            },
            Case {
                current: ConsentStatus::Declined,
                intent: Intent::OptIn,
                expect_to: ConsentStatus::Confirmed,
                expect_changed: true,
            },
            Case {
                current: ConsentStatus::Declined,
                intent: Intent::OptOut,
                expect_to: ConsentStatus::Declined,
                expect_changed: false,
            },
            Case {
                current: ConsentStatus::Pending,
                intent: Intent::Generic,
                expect_to: ConsentStatus::Pending,
                expect_changed: false,
            },
            Case {
                current: ConsentStatus::Confirmed,
                intent: Intent::BookingRequest,
                expect_to: ConsentStatus::Confirmed,
                expect_changed: false,
            },
            Case {
                current: ConsentStatus::Declined,
                intent: Intent::AvailabilityQuery,
                expect_to: ConsentStatus::Declined,
                expect_changed: false,
            },
        ];

        for case in cases {
            let transition = transition_for_intent(case.current, case.intent);
            assert_eq!(transition.from, case.current);
            assert_eq!(
                transition.to, case.expect_to,
                "{:?} + {:?} should land on {:?}",
                case.current, case.intent, case.expect_to
            );
            assert_eq!(transition.changed, case.expect_changed);
        }
    }

    #[test]
    fn status_strings_round_trip() {
        for status in [ConsentStatus::Pending, ConsentStatus::Confirmed, ConsentStatus::Declined] {
            assert_eq!(ConsentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConsentStatus::parse("unsubscribed"), None);
    }
}
