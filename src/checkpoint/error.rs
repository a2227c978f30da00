//! Errors raised while saving or restoring checkpoints.

use thiserror::Error;

/// Why a checkpoint could not be written, read or applied.
#[derive(Debug, Error)]
pub enum CheckpointError {
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    /// Written by an incompatible format version
    #[error("Unsupported checkpoint version {found}, supported: {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// Taken from a different machine
    #[error("Checkpoint belongs to machine '{found}', expected '{expected}'")]
    MachineMismatch { found: String, expected: String },

    /// Names a node the definition does not have
    #[error("Unknown node '{0}' in checkpoint")]
    UnknownNode(String),

    /// The saved configuration or history cannot be applied
    #[error("Checkpoint validation failed: {0}")]
    ValidationFailed(String),
}
