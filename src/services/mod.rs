pub mod config;
pub mod connection;
pub mod dispatcher;
pub mod engine;
pub mod session_worker;
