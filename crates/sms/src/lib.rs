pub mod payload;
pub mod signature;
pub mod twiml;

pub use payload::{mask_phone, InboundSms};
pub use signature::SignatureValidator;
