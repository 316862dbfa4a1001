//! Framing and encoding errors.

use thiserror::Error;

/// Errors produced while turning values into protocol lines.
#[derive(Error, Debug)]
pub enum CodecError {
    /// Serialization to JSON failed
    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// The encoded payload contained a raw newline and cannot be framed
    #[error("encoded payload contains an embedded newline")]
    EmbeddedNewline,
}

/// Convenience type alias for `Result<T, CodecError>`.
pub type CodecResult<T> = Result<T, CodecError>;
