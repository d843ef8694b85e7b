//! Core data models used throughout the pipeline.
//!
//! These types represent the uploads, parsed documents, chunks, and chat
//! messages that flow between the loader, the chain, and the session.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A raw file handed over by the display layer.
#[derive(Debug, Clone)]
pub struct Upload {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Upload {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Source formats the loader knows how to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    PlainText,
    Markdown,
    Pdf,
    Docx,
}

impl Format {
    /// Resolve a format from a file extension (case-insensitive, no dot).
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "txt" | "text" | "log" | "csv" => Some(Format::PlainText),
            "md" | "markdown" => Some(Format::Markdown),
            "pdf" => Some(Format::Pdf),
            "docx" => Some(Format::Docx),
            _ => None,
        }
    }
}

/// A parsed document. Lives only for the duration of an index build.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    /// File name relative to the staging root, used as the chunk source label.
    pub name: String,
    pub format: Format,
    pub text: String,
}

/// A span of a document's text, the unit of retrieval.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub chunk_index: i64,
    pub text: String,
    pub hash: String,
}

/// A chunk returned from a similarity lookup.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// Cosine similarity to the query vector, in `[-1.0, 1.0]`.
    pub score: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One entry in the conversation history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// `false` when an assistant answer was cut short by a failure or a
    /// cancellation.
    pub complete: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            complete: true,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            complete: true,
            created_at: Utc::now(),
        }
    }

    pub fn incomplete(mut self) -> Self {
        self.complete = false;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_extension("txt"), Some(Format::PlainText));
        assert_eq!(Format::from_extension("MD"), Some(Format::Markdown));
        assert_eq!(Format::from_extension("Pdf"), Some(Format::Pdf));
        assert_eq!(Format::from_extension("docx"), Some(Format::Docx));
        assert_eq!(Format::from_extension("xyz"), None);
        assert_eq!(Format::from_extension(""), None);
    }

    #[test]
    fn test_incomplete_marks_message() {
        let msg = Message::assistant("partial").incomplete();
        assert_eq!(msg.role, Role::Assistant);
        assert!(!msg.complete);
        assert!(Message::user("hi").complete);
    }
}
