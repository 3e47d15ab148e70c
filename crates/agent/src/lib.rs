pub mod history;
pub mod llm;
pub mod reply;

pub use history::history_from_records;
pub use llm::{ChatMessage, ChatRequest, ChatRole, HttpLlmClient, LlmClient, LlmError};
pub use reply::{AgentReply, LlmReplyAgent, ReplyAgent, ReplyInput};
