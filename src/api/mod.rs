//! HTTP and WebSocket API

pub mod family_handlers;
pub mod handlers;
pub mod history_handlers;
pub mod query;
pub mod routes;
pub mod suggestion_handlers;
pub mod ws_auth;
pub mod ws_chat_handler;
pub mod ws_handlers;

pub use routes::create_router;
