//! Save-state (snapshot) decode error type.

use thiserror::Error;

/// Error produced while decoding a snapshot blob produced by
/// [`crate::Console::serialize`].
#[derive(Debug, Clone, Error)]
pub enum SnapshotError {
    /// The blob does not start with the expected `b"NES1"` magic.
    #[error("invalid snapshot magic (expected b\"NES1\")")]
    InvalidMagic,

    /// The blob declares a version this build does not know how to decode.
    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    /// The blob ended before all required fields could be read.
    #[error("truncated snapshot: need {needed} bytes, have {available}")]
    Truncated {
        /// Bytes required to decode the next field.
        needed: usize,
        /// Bytes actually remaining in the blob.
        available: usize,
    },

    /// The blob's mapper sub-blob was produced by a different mapper than
    /// the one currently attached to the console.
    #[error("mapper mismatch: snapshot was taken with mapper {expected}, console has {actual}")]
    MapperMismatch {
        /// Mapper number recorded in the snapshot.
        expected: u16,
        /// Mapper number of the console attempting to load it.
        actual: u16,
    },
}
