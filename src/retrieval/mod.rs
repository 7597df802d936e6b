//! Document retrieval: the retriever contract and its Chroma adapter.
//!
//! The orchestrator only sees [`Retriever`]; embedding and vector-store
//! plumbing stay behind it.

pub mod chroma;
pub mod embeddings;
pub mod errors;
pub mod format;
pub mod types;

pub use chroma::ChromaRetriever;
pub use errors::RetrievalError;
pub use format::{format_documents, RetrievedDocument, NO_RESULTS_SENTINEL};
pub use types::{Retriever, SearchRequest, DEFAULT_TOP_K};
