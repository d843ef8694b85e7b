//! Error taxonomy for the retrieval-augmented pipeline.
//!
//! Every library entry point returns [`Result<T>`](Result). The variants map
//! onto the failure classes callers need to tell apart:
//!
//! | Variant | Raised by | Severity |
//! |---------|-----------|----------|
//! | [`UnsupportedFormat`](RagError::UnsupportedFormat) | loader | per file, skipped |
//! | [`Extraction`](RagError::Extraction) | loader | per file, skipped |
//! | [`EmbeddingServiceUnavailable`](RagError::EmbeddingServiceUnavailable) | loader, chain | fatal to the call |
//! | [`ServiceUnavailable`](RagError::ServiceUnavailable) | catalog | fatal to model selection |
//! | [`GenerationFailed`](RagError::GenerationFailed) | chain | fatal to the current answer |

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RagError>;

#[derive(Debug, Error)]
pub enum RagError {
    /// No parser is registered for the file's extension.
    #[error("unsupported format for {}: {extension:?}", path.display())]
    UnsupportedFormat { path: PathBuf, extension: String },

    /// A parser exists but could not read the file.
    #[error("failed to extract text from {}: {reason}", path.display())]
    Extraction { path: PathBuf, reason: String },

    #[error("embedding service unavailable: {0}")]
    EmbeddingServiceUnavailable(String),

    #[error("model service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("generation failed: {0}")]
    GenerationFailed(String),

    #[error("no model selected")]
    NoModelSelected,

    #[error("no documents have been indexed in this session")]
    NoDocumentsIndexed,

    #[error("none of the uploaded files produced indexable text")]
    NoIndexableContent,

    #[error("embedding dimension mismatch: index uses {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid upload: {0}")]
    InvalidUpload(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    pub fn embedding<E: std::fmt::Display>(err: E) -> Self {
        RagError::EmbeddingServiceUnavailable(err.to_string())
    }

    pub fn service<E: std::fmt::Display>(err: E) -> Self {
        RagError::ServiceUnavailable(err.to_string())
    }

    pub fn generation<E: std::fmt::Display>(err: E) -> Self {
        RagError::GenerationFailed(err.to_string())
    }

    /// Whether the loader may skip the offending file and keep going.
    pub fn is_skippable(&self) -> bool {
        matches!(
            self,
            RagError::UnsupportedFormat { .. } | RagError::Extraction { .. }
        )
    }
}
