//! Retrieval error types.

use thiserror::Error;

/// Errors raised by the retriever and its HTTP backends.
///
/// "No matches" is not an error: the retriever returns the no-results
/// sentinel text instead.
#[derive(Debug, Error)]
pub enum RetrievalError {
    /// Transport failure talking to the embedding service or vector store.
    #[error("retrieval request failed: {reason}")]
    RequestFailed { reason: String },

    /// Non-2xx response from a backend.
    #[error("retrieval backend HTTP {status}: {body}")]
    HttpError { status: u16, body: String },

    /// The embedding service answered without vectors.
    #[error("empty embedding response for {count} inputs")]
    EmptyEmbedding { count: usize },

    /// The configured Chroma collection does not exist.
    #[error("collection not found: {name}")]
    CollectionNotFound { name: String },

    /// Tool arguments could not be turned into a search request.
    #[error("invalid search arguments: {reason}")]
    InvalidArguments { reason: String },
}
