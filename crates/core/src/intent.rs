use serde::{Deserialize, Serialize};

/// What the sender is asking for, decided by ordered rules; the first rule
/// that matches wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    OptIn,
    OptOut,
    BookingRequest,
    AvailabilityQuery,
    Generic,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OptIn => "opt_in",
            Self::OptOut => "opt_out",
            Self::BookingRequest => "booking_request",
            Self::AvailabilityQuery => "availability_query",
            Self::Generic => "generic",
        }
    }
}

pub trait IntentClassifier: Send + Sync {
    fn classify(&self, body: &str) -> Intent;
}

/// Default rule set.
///
/// Precedence: opt-in, opt-out, booking request, availability query, generic.
/// All comparisons are case-insensitive. Keyword matching works on word
/// boundaries so `booking` never triggers the `book` rule and `sometimes`
/// never counts as `times`.
#[derive(Debug, Default, Clone)]
pub struct KeywordIntentClassifier;

impl IntentClassifier for KeywordIntentClassifier {
    fn classify(&self, body: &str) -> Intent {
        let trimmed = body.trim();

        if is_opt_in(trimmed) {
            return Intent::OptIn;
        }
        // Opt-out is strict: the entire trimmed body must be the word, so a
        // sentence that merely mentions "stop" never unsubscribes anyone.
        if trimmed.eq_ignore_ascii_case("stop") {
            return Intent::OptOut;
        }

        let tokens = tokenize(trimmed);
        if BOOKING_PHRASES.iter().any(|phrase| contains_phrase(&tokens, phrase)) {
            return Intent::BookingRequest;
        }
        if AVAILABILITY_KEYWORDS.iter().any(|keyword| contains_phrase(&tokens, keyword)) {
            return Intent::AvailabilityQuery;
        }

        Intent::Generic
    }
}

const BOOKING_PHRASES: &[&str] = &["book", "let's book", "schedule me", "make an appointment", "reserve"];

const AVAILABILITY_KEYWORDS: &[&str] =
    &["appointment", "booking", "schedule", "consultation", "availability", "times"];

fn is_opt_in(trimmed: &str) -> bool {
    if trimmed.eq_ignore_ascii_case("yes") {
        return true;
    }

    let lowered = trimmed.to_lowercase();
    if let Some(rest) = lowered.strip_prefix("yes") {
        let next = rest.chars().next();
        if next.is_some_and(|ch| ch.is_whitespace() || matches!(ch, ',' | '.' | ';' | ':')) {
            return true;
        }
    }

    tokenize(&lowered).iter().any(|token| token == "yes")
}

fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|ch: char| !ch.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(tokens: &[String], phrase: &str) -> bool {
    let needle = tokenize(phrase);
    if needle.is_empty() || tokens.len() < needle.len() {
        return false;
    }
    tokens
        .windows(needle.len())
        .any(|window| window.iter().zip(needle.iter()).all(|(a, b)| a == b))
}
