//! Document loading: staging → extraction → chunking → embedding → index.
//!
//! [`stage_uploads`] writes an upload batch into an ephemeral directory and
//! [`load_documents`] turns a directory into a ready [`VectorIndex`].
//!
//! Files whose extension has no parser, and supported files that fail to
//! parse, are skipped with a warning and listed in the [`LoadReport`]; the
//! rest of the batch still gets indexed. An unreachable embedding service
//! aborts the whole build: no partial index is ever returned.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::chunk::chunk_text;
use crate::config::ChunkingConfig;
use crate::error::{RagError, Result};
use crate::extract::extract_text;
use crate::index::VectorIndex;
use crate::models::{Chunk, Document, Format, Upload};
use crate::provider::EmbeddingHandle;

/// Summary of one index build.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub files_indexed: usize,
    pub chunks: usize,
    /// Files left out of the index, with the reason.
    pub skipped: Vec<(PathBuf, RagError)>,
}

/// Write uploads into a fresh temporary directory.
///
/// Each upload is stored under its bare file name; any directory
/// components in the supplied name are discarded. Two uploads that reduce
/// to the same name are rejected rather than overwriting each other. The
/// directory and its contents are removed when the returned [`TempDir`] is
/// dropped.
pub fn stage_uploads(uploads: &[Upload]) -> Result<TempDir> {
    let staging = tempfile::Builder::new().prefix("rag-upload-").tempdir()?;
    let mut staged: HashSet<String> = HashSet::with_capacity(uploads.len());

    for upload in uploads {
        let name = Path::new(&upload.filename)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .filter(|n| !n.trim().is_empty())
            .ok_or_else(|| {
                RagError::InvalidUpload(format!("unusable file name: {:?}", upload.filename))
            })?;
        if !staged.insert(name.clone()) {
            return Err(RagError::InvalidUpload(format!(
                "more than one upload is named {:?}",
                name
            )));
        }
        std::fs::write(staging.path().join(name), &upload.bytes)?;
    }

    Ok(staging)
}

/// Build a [`VectorIndex`] from every supported file under `dir`.
///
/// # Errors
///
/// - [`RagError::EmbeddingServiceUnavailable`] if any embedding call fails.
/// - [`RagError::NoIndexableContent`] if no file produced any text.
/// - [`RagError::Io`] if the directory cannot be walked.
pub async fn load_documents(
    embedder: &EmbeddingHandle,
    dir: &Path,
    chunking: &ChunkingConfig,
) -> Result<(VectorIndex, LoadReport)> {
    let mut report = LoadReport::default();
    let mut chunks: Vec<Chunk> = Vec::new();

    for path in scan_directory(dir)? {
        let doc = match read_document_blocking(dir, &path).await {
            Ok(doc) => doc,
            Err(e) if e.is_skippable() => {
                warn!("skipping {}: {}", path.display(), e);
                report.skipped.push((path, e));
                continue;
            }
            Err(e) => return Err(e),
        };

        let doc_chunks = chunk_text(
            &doc.name,
            &doc.text,
            chunking.chunk_size,
            chunking.chunk_overlap,
        );
        if doc_chunks.is_empty() {
            warn!("skipping {}: no text content", doc.path.display());
            report.skipped.push((
                doc.path.clone(),
                RagError::Extraction {
                    path: doc.path,
                    reason: "no text content".to_string(),
                },
            ));
            continue;
        }

        report.files_indexed += 1;
        chunks.extend(doc_chunks);
    }

    if chunks.is_empty() {
        return Err(RagError::NoIndexableContent);
    }

    let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
    let vectors = embedder.embed(&texts).await?;

    let mut index = VectorIndex::new(embedder.clone());
    for (chunk, vector) in chunks.into_iter().zip(vectors) {
        index.insert(chunk, vector)?;
    }
    report.chunks = index.len();

    info!(
        files = report.files_indexed,
        chunks = report.chunks,
        skipped = report.skipped.len(),
        model = embedder.model(),
        "index built"
    );

    Ok((index, report))
}

/// Regular files under `root`, sorted by path. Hidden directories such as
/// `.git` are not descended into; hidden files are kept.
fn scan_directory(root: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !(e.file_type().is_dir() && is_hidden(e.file_name())));
    for entry in walker {
        let entry = entry.map_err(|e| RagError::Io(e.into()))?;
        if entry.file_type().is_file() {
            paths.push(entry.into_path());
        }
    }

    Ok(paths)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Read and extract one file off the async runtime. A panic inside a
/// parser is reported as an extraction failure for that file.
async fn read_document_blocking(root: &Path, path: &Path) -> Result<Document> {
    let (root, owned) = (root.to_path_buf(), path.to_path_buf());
    tokio::task::spawn_blocking(move || read_document(&root, &owned))
        .await
        .map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
}

fn read_document(root: &Path, path: &Path) -> Result<Document> {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_string())
        .unwrap_or_default();
    let format = Format::from_extension(&extension).ok_or_else(|| RagError::UnsupportedFormat {
        path: path.to_path_buf(),
        extension: extension.clone(),
    })?;

    let bytes = std::fs::read(path)?;
    let text = extract_text(&bytes, format).map_err(|e| RagError::Extraction {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;

    let name = path
        .strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .to_string();

    Ok(Document {
        path: path.to_path_buf(),
        name,
        format,
        text,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::provider::testing::ScriptedProvider;

    fn embedder(provider: Arc<ScriptedProvider>) -> EmbeddingHandle {
        EmbeddingHandle::new(provider, "nomic-embed-text", 4)
    }

    fn small_chunks() -> ChunkingConfig {
        ChunkingConfig {
            chunk_size: 80,
            chunk_overlap: 20,
        }
    }

    #[test]
    fn test_stage_uploads_strips_directories() {
        let staging = stage_uploads(&[
            Upload::new("../../etc/notes.txt", "hello"),
            Upload::new("guide.md", "# Guide"),
        ])
        .unwrap();

        assert!(staging.path().join("notes.txt").exists());
        assert!(staging.path().join("guide.md").exists());
        assert_eq!(std::fs::read_dir(staging.path()).unwrap().count(), 2);
    }

    #[test]
    fn test_stage_uploads_rejects_empty_name() {
        let err = stage_uploads(&[Upload::new("", "x")]).unwrap_err();
        assert!(matches!(err, RagError::InvalidUpload(_)));
    }

    #[test]
    fn test_stage_uploads_rejects_duplicate_names() {
        let err = stage_uploads(&[
            Upload::new("alpha/notes.txt", "Alpha document about apples."),
            Upload::new("beta/notes.txt", "Beta document about bananas."),
        ])
        .unwrap_err();
        assert!(matches!(err, RagError::InvalidUpload(ref msg) if msg.contains("notes.txt")));
    }

    #[tokio::test]
    async fn test_hidden_files_are_indexed_hidden_dirs_are_not() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join(".notes.md"), "# Notes\n\nDotfile body.").unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        std::fs::write(tmp.path().join(".git").join("HEAD.txt"), "ref: main").unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let (index, report) = load_documents(&embedder(provider), tmp.path(), &small_chunks())
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 1);
        assert!(report.skipped.is_empty());
        let sources: Vec<&str> = index.chunks().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec![".notes.md"]);
    }

    #[test]
    fn test_staging_directory_is_removed_on_drop() {
        let staging = stage_uploads(&[Upload::new("a.txt", "a")]).unwrap();
        let path = staging.path().to_path_buf();
        drop(staging);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unsupported_file_is_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "Rust ownership rules.").unwrap();
        std::fs::write(tmp.path().join("data.xyz"), "opaque").unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let (index, report) = load_documents(&embedder(provider), tmp.path(), &small_chunks())
            .await
            .unwrap();

        assert_eq!(report.files_indexed, 1);
        assert_eq!(index.len(), 1);
        assert_eq!(report.skipped.len(), 1);
        assert!(report.skipped[0].0.ends_with("data.xyz"));
        assert!(matches!(
            report.skipped[0].1,
            RagError::UnsupportedFormat { .. }
        ));
    }

    #[tokio::test]
    async fn test_only_unsupported_files_is_an_error() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("data.xyz"), "opaque").unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let err = load_documents(&embedder(provider), tmp.path(), &small_chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::NoIndexableContent));
    }

    #[tokio::test]
    async fn test_corrupt_pdf_is_skipped() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("broken.pdf"), "not a pdf").unwrap();
        std::fs::write(tmp.path().join("ok.md"), "# Heading\n\nBody text.").unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let (index, report) = load_documents(&embedder(provider), tmp.path(), &small_chunks())
            .await
            .unwrap();
        assert_eq!(index.len(), 1);
        assert!(matches!(report.skipped[0].1, RagError::Extraction { .. }));
    }

    #[tokio::test]
    async fn test_embedding_failure_aborts_build() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "Some text.").unwrap();

        let mut provider = ScriptedProvider::new();
        provider.fail_embeddings = true;
        let err = load_documents(&embedder(Arc::new(provider)), tmp.path(), &small_chunks())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::EmbeddingServiceUnavailable(_)));
    }

    #[tokio::test]
    async fn test_chunks_come_from_parsed_text() {
        let tmp = TempDir::new().unwrap();
        let body = "Cargo builds crates. ".repeat(30);
        std::fs::write(tmp.path().join("a.txt"), &body).unwrap();
        std::fs::write(tmp.path().join("b.md"), "# Title\n\nShort *markdown* note.").unwrap();
        std::fs::create_dir(tmp.path().join(".hidden")).unwrap();
        std::fs::write(tmp.path().join(".hidden").join("c.txt"), "secret").unwrap();

        let provider = Arc::new(ScriptedProvider::new());
        let (index, report) =
            load_documents(&embedder(provider.clone()), tmp.path(), &small_chunks())
                .await
                .unwrap();

        assert_eq!(report.files_indexed, 2);
        assert!(index.len() > 2);
        let parsed_md = crate::extract::markdown_to_text("# Title\n\nShort *markdown* note.");
        for chunk in index.chunks() {
            assert!(body.contains(&chunk.text) || parsed_md.contains(&chunk.text));
            assert_ne!(chunk.text, "secret");
        }
        assert_eq!(provider.embedded().len(), index.len());
    }
}
