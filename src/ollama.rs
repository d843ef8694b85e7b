//! [`ModelProvider`] backed by an Ollama-compatible HTTP API.
//!
//! | Capability | Endpoint |
//! |------------|----------|
//! | catalog | `GET /api/tags` |
//! | embeddings | `POST /api/embed` |
//! | completion | `POST /api/generate` (`stream: false`) |
//! | streaming completion | `POST /api/generate` (`stream: true`, NDJSON) |
//!
//! # Retry Strategy
//!
//! Catalog, embedding and one-shot completion requests use exponential
//! backoff for transient errors:
//! - HTTP 429 (rate limited) and 5xx (server error) → retry
//! - HTTP 4xx (client error, not 429) → fail immediately
//! - Network errors → retry
//! - Backoff: 1s, 2s, 4s, 8s, 16s, 32s (capped at 2^5)
//!
//! Streaming requests are never retried: once fragments have reached the
//! caller a retry would duplicate them.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use tracing::debug;

use crate::config::ProviderConfig;
use crate::error::{RagError, Result};
use crate::provider::{FragmentStream, ModelProvider, Prompt};

pub struct OllamaProvider {
    url: String,
    client: reqwest::Client,
    timeout: Duration,
    max_retries: u32,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagsModel>,
}

#[derive(Deserialize)]
struct TagsModel {
    name: String,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

impl OllamaProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(30)))
            .build()
            .map_err(|e| RagError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            url: config.url.trim_end_matches('/').to_string(),
            client,
            timeout: Duration::from_secs(config.timeout_secs),
            max_retries: config.max_retries,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.url, path)
    }

    /// Send a request built by `build`, retrying transient failures.
    ///
    /// Returns the successful response or a description of the last error.
    async fn send_with_retry<F>(&self, build: F) -> std::result::Result<reqwest::Response, String>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let delay = Duration::from_secs(1 << (attempt - 1).min(5));
                tokio::time::sleep(delay).await;
            }

            match build().timeout(self.timeout).send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return Ok(response);
                    }

                    let body_text = response.text().await.unwrap_or_default();
                    let err = format!("Ollama API error {}: {}", status, body_text);
                    if status.as_u16() == 429 || status.is_server_error() {
                        last_err = Some(err);
                        continue;
                    }
                    return Err(err);
                }
                Err(e) => {
                    last_err = Some(format!(
                        "Ollama connection error (is Ollama running at {}?): {}",
                        self.url, e
                    ));
                    continue;
                }
            }
        }

        Err(last_err.unwrap_or_else(|| "Ollama request failed after retries".to_string()))
    }

    fn generate_body(model: &str, prompt: &Prompt, stream: bool) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": model,
            "prompt": prompt.text,
            "stream": stream,
        });
        if let (Some(system), Some(obj)) = (&prompt.system, body.as_object_mut()) {
            obj.insert("system".to_string(), serde_json::json!(system));
        }
        body
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn list_models(&self) -> Result<Vec<String>> {
        let url = self.endpoint("/api/tags");
        let response = self
            .send_with_retry(|| self.client.get(&url))
            .await
            .map_err(RagError::ServiceUnavailable)?;

        let tags: TagsResponse = response.json().await.map_err(RagError::service)?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }

    async fn embed(&self, model: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let url = self.endpoint("/api/embed");
        let body = serde_json::json!({
            "model": model,
            "input": texts,
        });

        let response = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await
            .map_err(RagError::EmbeddingServiceUnavailable)?;

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            RagError::EmbeddingServiceUnavailable(format!(
                "Invalid Ollama response: missing embeddings array ({})",
                e
            ))
        })?;
        Ok(parsed.embeddings)
    }

    async fn generate(&self, model: &str, prompt: &Prompt) -> Result<String> {
        let url = self.endpoint("/api/generate");
        let body = Self::generate_body(model, prompt, false);

        let response = self
            .send_with_retry(|| self.client.post(&url).json(&body))
            .await
            .map_err(RagError::GenerationFailed)?;

        let parsed: GenerateResponse = response.json().await.map_err(RagError::generation)?;
        if let Some(err) = parsed.error {
            return Err(RagError::GenerationFailed(err));
        }
        Ok(parsed.response)
    }

    async fn generate_stream(&self, model: &str, prompt: &Prompt) -> Result<FragmentStream> {
        let body = Self::generate_body(model, prompt, true);
        debug!(model, "opening generation stream");

        let response = self
            .client
            .post(self.endpoint("/api/generate"))
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                RagError::GenerationFailed(format!(
                    "Ollama connection error (is Ollama running at {}?): {}",
                    self.url, e
                ))
            })?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response.text().await.unwrap_or_default();
            return Err(RagError::GenerationFailed(format!(
                "Ollama API error {}: {}",
                status, body_text
            )));
        }

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map(|b| b.to_vec()))
            .boxed();
        Ok(ndjson_fragments(body))
    }
}

enum StreamLine {
    Skip,
    Fragment { text: String, done: bool },
}

fn parse_stream_line(line: &[u8]) -> Result<StreamLine> {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    if line.is_empty() {
        return Ok(StreamLine::Skip);
    }

    let parsed: GenerateResponse = serde_json::from_str(line)
        .map_err(|e| RagError::GenerationFailed(format!("malformed stream line: {}", e)))?;
    if let Some(err) = parsed.error {
        return Err(RagError::GenerationFailed(err));
    }
    Ok(StreamLine::Fragment {
        text: parsed.response,
        done: parsed.done,
    })
}

struct NdjsonState {
    body: BoxStream<'static, reqwest::Result<Vec<u8>>>,
    buf: Vec<u8>,
    body_ended: bool,
    finished: bool,
}

/// Turn a newline-delimited JSON body into a fragment stream.
///
/// Parsing happens as the consumer pulls; only an incomplete trailing line
/// is held between reads. The stream ends after the `done: true` line, and
/// fails if the body ends without one.
fn ndjson_fragments(body: BoxStream<'static, reqwest::Result<Vec<u8>>>) -> FragmentStream {
    let state = NdjsonState {
        body,
        buf: Vec::new(),
        body_ended: false,
        finished: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if st.finished {
                return None;
            }

            if let Some(pos) = st.buf.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                match parse_stream_line(&line) {
                    Ok(StreamLine::Skip) => continue,
                    Ok(StreamLine::Fragment { text, done }) => {
                        st.finished = done;
                        if text.is_empty() {
                            continue;
                        }
                        return Some((Ok(text), st));
                    }
                    Err(e) => {
                        st.finished = true;
                        return Some((Err(e), st));
                    }
                }
            }

            if st.body_ended {
                st.finished = true;
                return Some((
                    Err(RagError::GenerationFailed(
                        "stream ended before the model signalled completion".to_string(),
                    )),
                    st,
                ));
            }

            match st.body.next().await {
                Some(Ok(bytes)) => st.buf.extend_from_slice(&bytes),
                Some(Err(e)) => {
                    st.finished = true;
                    return Some((Err(RagError::generation(e)), st));
                }
                None => {
                    st.body_ended = true;
                    if st.buf.iter().any(|b| !b.is_ascii_whitespace()) {
                        st.buf.push(b'\n');
                    }
                }
            }
        }
    })
    .boxed()
}
