// Presentation layer - HTTP API
pub mod app_state;
pub mod error;
pub mod handlers;
