//! Decoder error kinds.
//!
//! One flat enum, one `#[error("...")]` message per variant, no `anyhow`
//! inside the library.
//!
//! An empty recognition result is deliberately absent from this enum: it is
//! not an error, so it is represented as a normal [`crate::result::Result`]
//! with `is_final() == true`, never an `Err`.

use thiserror::Error;

/// Fatal error kinds surfaced by the decoder.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// Invalid or missing configuration; fatal at `allocate` time.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// The linguist produced a malformed state, or non-emitting expansion
    /// exceeded its depth cap (a cycle in the silence/null-arc graph).
    #[error("search graph error: {0}")]
    Graph(String),

    /// The acoustic scorer failed for a given frame (bad feature, model
    /// mismatch); fatal for the current utterance only.
    #[error("scorer error at frame {frame}: {reason}")]
    Scorer { frame: u64, reason: String },

    /// Underflow/NaN encountered during log-domain arithmetic. Recovered by
    /// clamping to `LOG_ZERO`, but still surfaced so callers can log it.
    #[error("numeric error in log-domain arithmetic: {0}")]
    Numeric(String),
}

pub type DecoderResult<T> = std::result::Result<T, DecoderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_messages_are_descriptive() {
        let e = DecoderError::Scorer {
            frame: 42,
            reason: "nan".into(),
        };
        assert_eq!(e.to_string(), "scorer error at frame 42: nan");
    }
}
