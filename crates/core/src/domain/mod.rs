pub mod consent;
pub mod message;
pub mod workflow;
