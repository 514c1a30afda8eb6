//! Error types shared across the workspace's domain model.

use thiserror::Error;

/// Errors raised while interpreting the types in this crate.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypesError {
    #[error("unknown packet source discriminant: {0}")]
    UnknownSource(u8),
}
