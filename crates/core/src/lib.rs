pub mod compose;
pub mod config;
pub mod domain;
pub mod errors;
pub mod intent;
pub mod session;

pub use chrono;
pub use uuid;

pub use compose::{ComposeFlags, MessageComposer};
pub use errors::{EngineError, SAFE_GENERIC_REPLY};
pub use intent::{Intent, IntentClassifier, KeywordIntentClassifier};
pub use session::{resolve_session, SessionDecision};
