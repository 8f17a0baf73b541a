//! Error taxonomy shared by the controller, the completion client and storage.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ChatError {
    /// The inference runtime could not be reached.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    /// The runtime was reachable but the generation request failed.
    #[error("generation failed: {0}")]
    GenerationError(String),

    /// Restore input was not a JSON array of messages.
    #[error("malformed history: {0}")]
    MalformedHistory(String),

    /// Reading or writing persisted history failed.
    #[error("storage failure: {0}")]
    StorageFailure(String),
}

impl From<std::io::Error> for ChatError {
    fn from(e: std::io::Error) -> Self {
        ChatError::StorageFailure(e.to_string())
    }
}
