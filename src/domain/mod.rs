pub mod chat_log;
pub mod commands;
pub mod conversation;
pub mod error;
pub mod events;
pub mod presence;
pub mod session;
pub mod user;
pub mod wire;
