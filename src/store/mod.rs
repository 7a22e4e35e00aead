//! Persistence layer
//!
//! - `FamilyStore`: the trait every backend implements
//! - `SqliteStore`: sqlx-backed durable storage
//! - `MemoryStore`: in-process storage for tests and `storage.backend: memory`

mod memory;
pub mod models;
mod sqlite;
mod traits;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use traits::FamilyStore;
