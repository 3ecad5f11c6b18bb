pub mod error_messages;
pub mod log;
pub mod term;
