// AI Assessment/Comparison Engine.
// Builds prompts from contract data or documents, makes exactly one model call
// per operation through llm_client, and validates the JSON the model returns.

pub mod assess;
pub mod compare;
pub mod handlers;
pub mod json_extract;
pub mod prompts;
pub mod query;

use thiserror::Error;

use crate::llm_client::LlmError;

/// Failure contract shared by every engine operation.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    ExtractionFailed(String),

    #[error("{0}")]
    UnparsableResponse(String),

    #[error("{0}")]
    Transport(String),
}

impl From<LlmError> for EngineError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::EmptyContent => {
                EngineError::UnparsableResponse("No text response from the model".into())
            }
            other => EngineError::Transport(other.to_string()),
        }
    }
}
