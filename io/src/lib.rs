//! Workspace, persistence reader/writer and concatenation layer binding the
//! `geoh5-model` entity graph to an HDF5 container.
//!
//! `workspace` owns the arenas and life cycle, `reader`/`writer` do the HDF5
//! translation, and `container` is the only module that calls the `hdf5`
//! crate's primitives for attribute/dataset value codecs.

pub mod active;
pub mod concat;
pub mod container;
pub mod error;
pub mod reader;
pub mod writer;
pub mod workspace;

pub use active::{activate, deactivate, active as active_workspace, ActivationGuard};
pub use container::Mode;
pub use error::{IoError, Result};
pub use workspace::{ProjectAttributes, Workspace, WorkspaceOptions};
