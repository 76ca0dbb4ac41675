//! Error types for viva-context

use thiserror::Error;

/// Result type alias using viva-context Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur around the pipeline. The pipeline itself never
/// fails a turn; these feed the compactor's fail-open path and surface
/// from the consumed interfaces (checkpoint storage, model transport).
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the model provider layer
    #[error(transparent)]
    Ai(#[from] viva_ai::Error),

    /// Checkpoint storage failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Summary generation returned no usable text (the compactor fails
    /// open on this)
    #[error("Summarization error: {0}")]
    Summarization(String),
}
