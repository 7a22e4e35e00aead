//! AI suggestion lifecycle
//!
//! - `models`: suggestion kinds, statuses and the `Suggestion` record
//! - `normalize`: per-kind field-name normalization table
//! - `materializer`: kind → handler table producing durable entities
//! - `engine`: generate / list / accept / dismiss / assign

pub mod engine;
pub mod materializer;
pub mod models;
pub mod normalize;

pub use engine::SuggestionEngine;

use models::SuggestionStatus;
use normalize::NormalizeError;
use uuid::Uuid;

/// Errors surfaced by the suggestion engine
#[derive(Debug, thiserror::Error)]
pub enum SuggestionError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("Suggestion {id} is already {status}")]
    AlreadyResolved { id: Uuid, status: SuggestionStatus },

    #[error("{0}")]
    InvalidRequest(String),

    #[error("Suggestion cannot be materialized: {0}")]
    Materialization(#[from] NormalizeError),

    #[error("Suggestion generator failed: {0:#}")]
    Generator(anyhow::Error),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}
