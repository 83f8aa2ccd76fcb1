//! Error kinds for the pure in-memory vocabulary: a `thiserror` enum plus a
//! `Result` alias.

use thiserror::Error;

use crate::ids::Uid;

/// Errors raised while constructing or mutating entities/entity types
/// before any file I/O is involved.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("validation failed for {what}: {message}")]
    Validation { what: String, message: String },

    #[error("{} parameter errors reported together: {}", .0.len(), summarize(.0))]
    AggregateValidation(Vec<ModelError>),

    #[error("entity type mismatch for uid {uid}: expected {expected}, found {found}")]
    TypeMismatch {
        uid: Uid,
        expected: &'static str,
        found: &'static str,
    },
}

fn summarize(errors: &[ModelError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, ModelError>;
