use crate::domain::workflow::{SectionKind, WorkflowSettings};

/// Per-turn switches for the composer. `is_new_conversation` comes from the
/// session decision, the next-steps/sign-off pair from the AI output, and
/// `include_opt_in_prompt` from the consent status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComposeFlags {
    pub is_new_conversation: bool,
    pub include_next_steps: bool,
    pub include_sign_off: bool,
    pub include_opt_in_prompt: bool,
}

/// Assembles the outgoing message from the workflow's ordered sections.
#[derive(Debug, Default, Clone)]
pub struct MessageComposer;

impl MessageComposer {
    /// Walk the configured sections in order, fill main content from the AI
    /// text (or the workflow fallback when the AI produced nothing usable),
    /// join the non-empty pieces with newlines, and guarantee the opt-in
    /// prompt appears at most once.
    pub fn compose(&self, ai_text: &str, settings: &WorkflowSettings, flags: ComposeFlags) -> String {
        let prompt_normalized = normalize(&settings.opt_in_prompt);

        let mut parts: Vec<String> = Vec::new();
        for section in &settings.sections {
            if !section.enabled {
                continue;
            }
            let text = match section.kind {
                SectionKind::Greeting => {
                    if !flags.is_new_conversation {
                        continue;
                    }
                    section.text.clone()
                }
                SectionKind::MainContent => main_content(ai_text, settings, &prompt_normalized),
                SectionKind::NextSteps => {
                    if !flags.include_next_steps {
                        continue;
                    }
                    section.text.clone()
                }
                SectionKind::SignOff => {
                    if !flags.include_sign_off {
                        continue;
                    }
                    section.text.clone()
                }
            };
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                parts.push(trimmed.to_string());
            }
        }

        let mut body = parts.join("\n");
        if body.is_empty() {
            body = settings.fallback_text.trim().to_string();
        }

        if flags.include_opt_in_prompt && !normalize(&body).contains(prompt_normalized.as_str()) {
            if !body.is_empty() {
                body.push('\n');
            }
            body.push_str(settings.opt_in_prompt.trim());
        }

        dedup_prompt_lines(&body, &prompt_normalized)
    }
}

fn main_content(ai_text: &str, settings: &WorkflowSettings, prompt_normalized: &str) -> String {
    let trimmed = ai_text.trim();
    // An AI reply that is nothing but the opt-in prompt would read as a bare
    // consent nag; swap in the fallback and let the prompt ride as its own
    // line when consent is still pending.
    if trimmed.is_empty() || normalize(trimmed) == prompt_normalized {
        return settings.fallback_text.clone();
    }
    trimmed.to_string()
}

fn dedup_prompt_lines(body: &str, prompt_normalized: &str) -> String {
    let mut seen_prompt = false;
    let mut kept: Vec<&str> = Vec::new();
    for line in body.lines() {
        if normalize(line) == prompt_normalized {
            if seen_prompt {
                continue;
            }
            seen_prompt = true;
        }
        kept.push(line);
    }
    kept.join("\n")
}

fn normalize(text: &str) -> String {
    text.chars().filter(|ch| ch.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}
