/// Inbound SMS webhook form payload.
///
/// Providers post `application/x-www-form-urlencoded` bodies; only the
/// fields the engine cares about are kept, everything else is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InboundSms {
    pub from: Option<String>,
    pub to: Option<String>,
    pub body: String,
    pub message_sid: Option<String>,
}

impl InboundSms {
    /// Placeholder sender recorded when the provider omits `From`.
    pub const UNKNOWN_SENDER: &'static str = "unknown";

    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        let mut inbound = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "From" => inbound.from = non_empty(value),
                "To" => inbound.to = non_empty(value),
                "Body" => inbound.body = value.clone(),
                "MessageSid" => inbound.message_sid = non_empty(value),
                _ => {}
            }
        }
        inbound
    }

    pub fn from_number(&self) -> &str {
        self.from.as_deref().unwrap_or(Self::UNKNOWN_SENDER)
    }
}

fn non_empty(value: &str) -> Option<String> {
    if value.trim().is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Redacts a phone number down to its trailing digits for log output.
pub fn mask_phone(value: &str) -> String {
    let digits: Vec<char> = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() <= 4 {
        return "***".to_string();
    }
    let tail: String = digits[digits.len() - 4..].iter().collect();
    format!("***{tail}")
}
