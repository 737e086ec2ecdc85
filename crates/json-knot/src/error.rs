//! Error types for encoding and decoding.

use thiserror::Error;

/// Error during encoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EncodeError {
    /// The registry has no kind for a value reached during discovery.
    ///
    /// Lenient mode downgrades this to an empty record placeholder so the
    /// rest of the graph keeps its referential structure.
    #[error("cannot encode unsupported kind {kind:?}")]
    UnsupportedType { kind: &'static str },

    /// A deferred value was reached by the synchronous entry point.
    ///
    /// Deferred productions need a completion barrier; use
    /// [`encode_deferred`](crate::encode_deferred), or enable lenient mode
    /// to emit an empty placeholder instead.
    #[error("deferred values require encode_deferred")]
    MissingCompletionHandler,

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("wire text serialization failed: {0}")]
    Json(String),
}

/// Error during decoding.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    /// The payload is not the expected structured-text shape.
    #[error("invalid payload: {context}")]
    InvalidPayload { context: &'static str },

    #[error("unsupported format version {version:?}")]
    UnsupportedVersion { version: String },

    /// A pointer names a tag the registry does not know — typically data
    /// produced by a newer encoder. Lenient mode drops such pointers
    /// (returning the raw token verbatim when it is the root).
    #[error("cannot decode unrecognized pointer tag {tag:?}")]
    UnrecognizedTag { tag: String },

    /// A pointer token is structurally invalid.
    #[error("malformed pointer token {token:?}")]
    MalformedPointer { token: String },

    #[error("{tag} pointer index {index} out of bounds (table size: {size})")]
    IndexOutOfBounds {
        tag: char,
        index: usize,
        size: usize,
    },

    /// A slot's serialized parts do not match its kind's shape.
    #[error("malformed parts for tag {tag:?}: {context}")]
    MalformedParts { tag: char, context: &'static str },

    #[error("{field} length {len} exceeds maximum {max}")]
    LengthExceedsLimit {
        field: &'static str,
        len: usize,
        max: usize,
    },

    #[error("wire text parse failed: {0}")]
    Json(String),
}
