//! Chat client side of `/ws/app-chat`
//!
//! `reconnect` holds the controller that keeps one authenticated socket alive
//! for a party; `bin/chat_client` is a terminal front-end over it.

pub mod reconnect;

pub use reconnect::{ChatClient, ClientConfig, ClientError, ClientEvent, ClientState};
