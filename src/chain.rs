//! Retrieval-augmented answer chain.
//!
//! One question flows through four steps:
//!
//! 1. **Condense** the question and recent history into a standalone query
//!    (a one-shot model call; skipped when there is no history).
//! 2. **Retrieve** the top-k chunks for that query from the [`VectorIndex`],
//!    embedding it with the index's own model.
//! 3. **Assemble** the answer prompt: instructions, chunks in rank order,
//!    conversation history, the question.
//! 4. **Stream** the answer back as an [`AnswerStream`].
//!
//! An empty index never reaches the model: the stream carries a single
//! notice saying there is nothing to ground the answer in.

use futures_util::StreamExt;
use tracing::debug;

use crate::config::RetrievalConfig;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::models::{Message, Role, ScoredChunk};
use crate::provider::{FragmentStream, ModelHandle, Prompt};

pub const NO_DOCUMENTS_NOTICE: &str =
    "No documents have been indexed, so there is nothing to answer from. Upload and index documents first.";

const CONDENSE_INSTRUCTIONS: &str = "Given the following conversation and a follow-up question, \
rephrase the follow-up question to be a standalone question that can be understood without \
the conversation. Keep its original language. Reply with the standalone question only.";

const ANSWER_INSTRUCTIONS: &str = "You are a helpful research assistant. Answer the question \
clearly, using only the context excerpts provided. If the excerpts do not contain the answer, \
say that you cannot answer from the indexed documents instead of guessing. When you use an \
excerpt, mention its source file.";

pub struct RagChain {
    top_k: usize,
    history_window: usize,
}

impl RagChain {
    pub fn new(retrieval: &RetrievalConfig) -> Self {
        Self {
            top_k: retrieval.top_k.max(1),
            history_window: retrieval.history_window,
        }
    }

    /// Answer `question` against `index`, streaming the model's output.
    ///
    /// `history` holds the turns before this question. Failures in
    /// condensation or retrieval surface here, before any fragment exists.
    pub async fn answer_stream(
        &self,
        question: &str,
        history: &[Message],
        model: &ModelHandle,
        index: &VectorIndex,
    ) -> Result<AnswerStream> {
        if index.is_empty() {
            return Ok(AnswerStream::notice(question, NO_DOCUMENTS_NOTICE));
        }

        let standalone = self.condense(question, history, model).await?;
        let sources = index.query(&standalone, self.top_k).await?;
        let prompt = build_answer_prompt(question, self.recent(history), &sources);
        debug!(
            model = model.model(),
            standalone = standalone.as_str(),
            sources = sources.len(),
            "answer prompt assembled"
        );

        let inner = model.generate_stream(&prompt).await.map_err(as_generation)?;
        Ok(AnswerStream {
            inner: Some(inner),
            notice: None,
            standalone_query: standalone,
            sources,
        })
    }

    /// Rewrite a follow-up question into a standalone retrieval query.
    ///
    /// Only the most recent `history_window` messages are shown to the
    /// model. Returns the question unchanged when that window is empty or
    /// the model replies with nothing usable.
    pub async fn condense(
        &self,
        question: &str,
        history: &[Message],
        model: &ModelHandle,
    ) -> Result<String> {
        let history = self.recent(history);
        if history.is_empty() {
            return Ok(question.to_string());
        }

        let prompt = Prompt::new(format!(
            "{}\n\nChat history:\n{}\n\nFollow-up question: {}\n\nStandalone question:",
            CONDENSE_INSTRUCTIONS,
            format_history(history),
            question
        ));
        let reply = model.generate(&prompt).await.map_err(as_generation)?;

        let reply = reply.trim();
        let reply = reply
            .strip_prefix("Standalone question:")
            .map(str::trim)
            .unwrap_or(reply);
        if reply.is_empty() {
            return Ok(question.to_string());
        }
        Ok(reply.to_string())
    }

    /// The last `history_window` messages. A window that would open on an
    /// assistant reply drops it, so no answer appears without its question.
    fn recent<'a>(&self, history: &'a [Message]) -> &'a [Message] {
        let mut start = history.len().saturating_sub(self.history_window);
        if start > 0 && history.get(start).is_some_and(|m| m.role == Role::Assistant) {
            start += 1;
        }
        &history[start..]
    }
}

fn as_generation(err: RagError) -> RagError {
    match err {
        RagError::GenerationFailed(_) => err,
        other => RagError::generation(other),
    }
}

fn format_history(history: &[Message]) -> String {
    history
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            if m.complete {
                format!("{}: {}", speaker, m.content)
            } else {
                format!("{}: {} [interrupted]", speaker, m.content)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the generation prompt. Chunks keep their similarity rank order.
pub fn build_answer_prompt(question: &str, history: &[Message], sources: &[ScoredChunk]) -> Prompt {
    let mut text = String::from("Context:\n");
    for (i, hit) in sources.iter().enumerate() {
        text.push_str(&format!(
            "[{}] (source: {})\n{}\n\n",
            i + 1,
            hit.chunk.source,
            hit.chunk.text
        ));
    }
    if !history.is_empty() {
        text.push_str("Conversation so far:\n");
        text.push_str(&format_history(history));
        text.push_str("\n\n");
    }
    text.push_str("Question: ");
    text.push_str(question);

    Prompt::new(text).with_system(ANSWER_INSTRUCTIONS)
}

/// Pull-based sequence of answer fragments.
///
/// [`next_fragment`](AnswerStream::next_fragment) yields fragments in
/// emission order, at most one error, then `None` forever. Once exhausted
/// it cannot be restarted.
pub struct AnswerStream {
    inner: Option<FragmentStream>,
    notice: Option<String>,
    standalone_query: String,
    sources: Vec<ScoredChunk>,
}

impl AnswerStream {
    fn notice(question: &str, text: &str) -> Self {
        Self {
            inner: None,
            notice: Some(text.to_string()),
            standalone_query: question.to_string(),
            sources: Vec::new(),
        }
    }

    pub async fn next_fragment(&mut self) -> Option<Result<String>> {
        if let Some(notice) = self.notice.take() {
            return Some(Ok(notice));
        }

        let inner = self.inner.as_mut()?;
        loop {
            match inner.next().await {
                Some(Ok(fragment)) if fragment.is_empty() => continue,
                Some(Ok(fragment)) => return Some(Ok(fragment)),
                Some(Err(e)) => {
                    self.inner = None;
                    return Some(Err(as_generation(e)));
                }
                None => {
                    self.inner = None;
                    return None;
                }
            }
        }
    }

    /// Drain the stream into one string.
    pub async fn collect_text(mut self) -> Result<String> {
        let mut out = String::new();
        while let Some(fragment) = self.next_fragment().await {
            out.push_str(&fragment?);
        }
        Ok(out)
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_none() && self.notice.is_none()
    }

    /// Chunks the answer was grounded in, best first.
    pub fn sources(&self) -> &[ScoredChunk] {
        &self.sources
    }

    /// The query actually used for retrieval.
    pub fn standalone_query(&self) -> &str {
        &self.standalone_query
    }
}
