//! CRUD event system for real-time WebSocket notifications
//!
//! This module provides:
//! - `CrudEvent`: typed events emitted after every family mutation
//! - `EventBus`: broadcast channel distributing events to `/ws/events` clients

mod bus;
mod types;

pub use bus::EventBus;
pub use types::{CrudAction, CrudEvent, EntityType, EventEmitter};
