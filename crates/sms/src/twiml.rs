const XML_HEADER: &str = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>";

/// Renders a TwiML document that replies to the sender with `body`.
pub fn message_response(body: &str) -> String {
    format!("{XML_HEADER}<Response><Message>{}</Message></Response>", escape_xml(body))
}

/// Renders a TwiML document that acknowledges the webhook without replying.
pub fn empty_response() -> String {
    format!("{XML_HEADER}<Response></Response>")
}

fn escape_xml(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}
