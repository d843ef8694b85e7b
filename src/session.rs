//! Session orchestration.
//!
//! A [`Session`] owns everything one interactive conversation needs: the
//! selected model, the document index, and the chat history. It sequences
//! the other modules:
//!
//! ```text
//! uploads ──► loader ──► VectorIndex ─┐
//!                                     ├──► RagChain ──► PendingAnswer ──► history
//! question + history ─────────────────┘
//! ```
//!
//! # State
//!
//! | State | Meaning |
//! |-------|---------|
//! | [`NoModelSelected`](SessionState::NoModelSelected) | no generative model chosen yet |
//! | [`ModelSelected`](SessionState::ModelSelected) | model chosen, nothing indexed |
//! | [`DocumentsIndexed`](SessionState::DocumentsIndexed) | model chosen and an index exists |
//!
//! Indexing and model selection are independent. An index can be built
//! before a model is chosen, and switching models keeps both the index and
//! the history. Questions need both.
//!
//! # One question at a time
//!
//! [`Session::ask`] returns a [`PendingAnswer`] that borrows the session
//! mutably, so a second question cannot start until the first answer is
//! finished, cancelled, or dropped. The exchange is written to history when
//! the answer settles.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::catalog;
use crate::chain::{AnswerStream, RagChain};
use crate::config::{ChunkingConfig, Config, EmbeddingConfig};
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::loader::{self, LoadReport};
use crate::models::{Message, ScoredChunk, Upload};
use crate::provider::{EmbeddingHandle, ModelHandle, ModelProvider};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    NoModelSelected,
    ModelSelected,
    DocumentsIndexed,
}

/// Result of an indexing request.
#[derive(Debug)]
pub enum IndexOutcome {
    Indexed(LoadReport),
    /// The session already had an index; nothing was changed.
    AlreadyIndexed,
}

pub struct Session {
    provider: Arc<dyn ModelProvider>,
    embedding: EmbeddingConfig,
    chunking: ChunkingConfig,
    chain: RagChain,
    model: Option<ModelHandle>,
    index: Option<VectorIndex>,
    history: Vec<Message>,
}

impl Session {
    /// Create a session. If `config.chat.model` names a model it is
    /// selected straight away.
    pub fn new(provider: Arc<dyn ModelProvider>, config: &Config) -> Self {
        let model = config
            .chat
            .model
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(|name| ModelHandle::new(provider.clone(), name));

        Self {
            provider,
            embedding: config.embedding.clone(),
            chunking: config.chunking.clone(),
            chain: RagChain::new(&config.retrieval),
            model,
            index: None,
            history: Vec::new(),
        }
    }

    pub async fn available_models(&self) -> Result<Vec<String>> {
        catalog::list_models(self.provider.as_ref()).await
    }

    /// Select the generative model used for condensation and answers.
    ///
    /// Selecting the current model again does nothing.
    pub fn select_model(&mut self, name: &str) -> Result<&ModelHandle> {
        let name = name.trim();
        if name.is_empty() {
            return Err(RagError::InvalidInput("model name is empty".to_string()));
        }

        let unchanged = self.model.as_ref().is_some_and(|m| m.model() == name);
        if !unchanged {
            info!(model = name, "model selected");
            self.model = Some(ModelHandle::new(self.provider.clone(), name));
        }
        self.model.as_ref().ok_or(RagError::NoModelSelected)
    }

    pub fn model(&self) -> Option<&ModelHandle> {
        self.model.as_ref()
    }

    pub fn index(&self) -> Option<&VectorIndex> {
        self.index.as_ref()
    }

    pub fn state(&self) -> SessionState {
        match (&self.model, &self.index) {
            (None, _) => SessionState::NoModelSelected,
            (Some(_), None) => SessionState::ModelSelected,
            (Some(_), Some(_)) => SessionState::DocumentsIndexed,
        }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Stage an upload batch and index it.
    ///
    /// Skipped files are reported by their upload name. The staging
    /// directory is removed before this returns.
    pub async fn index_uploads(&mut self, uploads: &[Upload]) -> Result<IndexOutcome> {
        if self.index.is_some() {
            return Ok(self.already_indexed());
        }

        let staging = loader::stage_uploads(uploads)?;
        let outcome = self.build_index(staging.path()).await?;
        Ok(match outcome {
            IndexOutcome::Indexed(mut report) => {
                for (path, _) in report.skipped.iter_mut() {
                    if let Ok(rel) = path.strip_prefix(staging.path()) {
                        *path = rel.to_path_buf();
                    }
                }
                IndexOutcome::Indexed(report)
            }
            other => other,
        })
    }

    /// Index every supported file under `dir`.
    pub async fn index_directory(&mut self, dir: &Path) -> Result<IndexOutcome> {
        if self.index.is_some() {
            return Ok(self.already_indexed());
        }
        self.build_index(dir).await
    }

    async fn build_index(&mut self, dir: &Path) -> Result<IndexOutcome> {
        let embedder = EmbeddingHandle::new(
            self.provider.clone(),
            self.embedding.model.clone(),
            self.embedding.batch_size,
        );
        let (index, report) = loader::load_documents(&embedder, dir, &self.chunking).await?;
        self.index = Some(index);
        Ok(IndexOutcome::Indexed(report))
    }

    fn already_indexed(&self) -> IndexOutcome {
        warn!("documents are already indexed for this session; ignoring new upload");
        IndexOutcome::AlreadyIndexed
    }

    /// Start answering `question`.
    ///
    /// Errors returned here happen before any fragment exists and leave the
    /// history untouched.
    pub async fn ask(&mut self, question: &str) -> Result<PendingAnswer<'_>> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidInput("question is empty".to_string()));
        }
        let model = self.model.as_ref().ok_or(RagError::NoModelSelected)?;
        let index = self.index.as_ref().ok_or(RagError::NoDocumentsIndexed)?;

        let stream = self
            .chain
            .answer_stream(question, &self.history, model, index)
            .await?;
        debug!(
            question,
            standalone = stream.standalone_query(),
            "answer started"
        );

        Ok(PendingAnswer {
            question: question.to_string(),
            answer: String::new(),
            stream,
            settled: false,
            session: self,
        })
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .field("index", &self.index)
            .field("history", &self.history.len())
            .finish()
    }
}

/// An answer being streamed for one question.
///
/// Pull fragments with [`next_fragment`](PendingAnswer::next_fragment).
/// The exchange is appended to the session history exactly once:
/// - when the stream ends, with the full answer;
/// - when the stream fails, with the partial answer marked incomplete;
/// - on [`cancel`](PendingAnswer::cancel) or drop before the end, likewise
///   marked incomplete.
pub struct PendingAnswer<'a> {
    session: &'a mut Session,
    question: String,
    answer: String,
    stream: AnswerStream,
    settled: bool,
}

impl PendingAnswer<'_> {
    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        if self.settled {
            return None;
        }
        match self.stream.next_fragment().await {
            Some(Ok(fragment)) => {
                self.answer.push_str(&fragment);
                Some(Ok(fragment))
            }
            Some(Err(e)) => {
                warn!(error = %e, "answer interrupted");
                self.settle(false);
                Some(Err(e))
            }
            None => {
                self.settle(true);
                None
            }
        }
    }

    /// Drain the remaining fragments and return the whole answer.
    pub async fn finish(mut self) -> Result<String> {
        while let Some(fragment) = self.next_fragment().await {
            fragment?;
        }
        Ok(self.answer.clone())
    }

    /// Stop the answer here. What has been received so far is kept.
    pub fn cancel(mut self) {
        self.settle(false);
    }

    /// Text received so far.
    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Chunks the answer is grounded in, best first.
    pub fn sources(&self) -> &[ScoredChunk] {
        self.stream.sources()
    }

    pub fn is_finished(&self) -> bool {
        self.settled
    }

    fn settle(&mut self, complete: bool) {
        if self.settled {
            return;
        }
        self.settled = true;

        let mut reply = Message::assistant(self.answer.clone());
        if !complete {
            reply = reply.incomplete();
        }
        self.session.history.push(Message::user(self.question.clone()));
        self.session.history.push(reply);
        debug!(
            complete,
            chars = self.answer.len(),
            history = self.session.history.len(),
            "exchange recorded"
        );
    }
}

impl std::fmt::Debug for PendingAnswer<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingAnswer")
            .field("question", &self.question)
            .field("answer", &self.answer)
            .field("sources", &self.stream.sources().len())
            .field("settled", &self.settled)
            .finish()
    }
}

impl Drop for PendingAnswer<'_> {
    fn drop(&mut self) {
        self.settle(false);
    }
}
