//! Error kinds for the workspace, reader, and writer, in the same
//! kind-enum-plus-context shape as `geoh5_model::error`.

use thiserror::Error;

use geoh5_model::Uid;

/// Errors surfaced by `Workspace` and its reader/writer.
#[derive(Debug, Error)]
pub enum IoError {
    /// Operation attempted on a closed workspace.
    #[error("workspace is closed")]
    ClosedFile,

    /// Write attempted under `r` mode.
    #[error("workspace was opened read-only")]
    ReadOnly,

    /// A uid/name-qualified lookup required a result but found none.
    /// Regular lookups return an empty result instead of this error.
    #[error("not found: {0}")]
    NotFound(String),

    /// On-disk record missing a required field.
    #[error("corrupt record for {uid}: {message}")]
    Corrupt { uid: Uid, message: String },

    /// External `h5repack` failed; swallowed by the caller, kept here only
    /// so the attempt can be logged.
    #[error("repack failed: {0}")]
    RepackFailed(String),

    #[error(transparent)]
    Model(#[from] geoh5_model::ModelError),

    #[error(transparent)]
    Hdf5(#[from] hdf5::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IoError>;
