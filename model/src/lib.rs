//! In-memory entity graph and type registry vocabulary for geoh5-format
//! project files.
//!
//! This crate has no file I/O and no concept of "the workspace" as a live,
//! mutable arena — that lives in `geoh5-io`, which depends on this crate:
//! the lower layer defines the vocabulary, the upper layer gives it a life
//! cycle.

pub mod concat;
pub mod entity;
pub mod error;
pub mod ids;
pub mod types;

pub use error::{ModelError, Result};
pub use ids::{Association, PrimitiveType, Uid};
