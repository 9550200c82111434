// Decoding of questions pushed by the presenter over the question stream.

use thiserror::Error;

use crate::question::Question;

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed question payload: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Decode one push payload. Each payload carries exactly one question.
pub fn decode_question(raw: &str) -> Result<Question, ProtocolError> {
    Ok(serde_json::from_str(raw)?)
}
