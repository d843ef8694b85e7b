//! In-process fake of the Ollama HTTP API used by the integration tests.
//!
//! Serves `/api/tags`, `/api/embed` and `/api/generate` (one-shot and
//! NDJSON streaming) on an ephemeral local port and records every request
//! body it receives.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};

pub struct FakeState {
    pub models: Vec<String>,
    /// Fragments streamed for every answer.
    pub fragments: Vec<String>,
    /// Reply to non-streaming generate calls (question condensation).
    pub condensed: String,
    pub fail_embed: bool,
    /// Emit an error line after the fragments instead of `done: true`.
    pub fail_stream: bool,
    pub requests: Mutex<Vec<(String, Value)>>,
}

impl Default for FakeState {
    fn default() -> Self {
        Self {
            models: vec!["a".to_string(), "b".to_string(), "c".to_string()],
            fragments: vec!["The ".to_string(), "answer ".to_string(), "is 4.".to_string()],
            condensed: "What does the handbook say about parental leave?".to_string(),
            fail_embed: false,
            fail_stream: false,
            requests: Mutex::new(Vec::new()),
        }
    }
}

impl FakeState {
    /// Request bodies received on `path`, oldest first.
    pub fn bodies(&self, path: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, body)| body.clone())
            .collect()
    }

    fn record(&self, path: &str, body: &Value) {
        self.requests
            .lock()
            .unwrap()
            .push((path.to_string(), body.clone()));
    }
}

pub struct FakeOllama {
    pub url: String,
    pub state: Arc<FakeState>,
}

pub async fn start(state: FakeState) -> FakeOllama {
    let state = Arc::new(state);
    let app = Router::new()
        .route("/api/tags", get(tags))
        .route("/api/embed", post(embed))
        .route("/api/generate", post(generate))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeOllama {
        url: format!("http://{}", addr),
        state,
    }
}

/// A local URL with nothing listening on it.
pub async fn dead_url() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{}", addr)
}

/// 26-dimensional letter histogram, so related texts land close together.
pub fn letter_vector(text: &str) -> Vec<f32> {
    let mut v = vec![0.0f32; 26];
    for c in text.chars().filter(|c| c.is_ascii_alphabetic()) {
        v[(c.to_ascii_lowercase() as u8 - b'a') as usize] += 1.0;
    }
    v
}

async fn tags(State(state): State<Arc<FakeState>>) -> Json<Value> {
    let models: Vec<Value> = state
        .models
        .iter()
        .map(|name| json!({ "name": name, "model": name, "size": 1 }))
        .collect();
    Json(json!({ "models": models }))
}

async fn embed(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.record("/api/embed", &body);
    if state.fail_embed {
        return (StatusCode::INTERNAL_SERVER_ERROR, "embedding model not loaded").into_response();
    }

    let inputs: Vec<String> = match &body["input"] {
        Value::String(s) => vec![s.clone()],
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().unwrap_or_default().to_string())
            .collect(),
        _ => Vec::new(),
    };
    let embeddings: Vec<Vec<f32>> = inputs.iter().map(|t| letter_vector(t)).collect();
    Json(json!({ "model": body["model"], "embeddings": embeddings })).into_response()
}

async fn generate(State(state): State<Arc<FakeState>>, Json(body): Json<Value>) -> Response {
    state.record("/api/generate", &body);

    if body["stream"] == json!(false) {
        return Json(json!({
            "model": body["model"],
            "response": state.condensed,
            "done": true,
        }))
        .into_response();
    }

    let mut ndjson = String::new();
    for fragment in &state.fragments {
        ndjson.push_str(&json!({ "response": fragment, "done": false }).to_string());
        ndjson.push('\n');
    }
    if state.fail_stream {
        ndjson.push_str(&json!({ "error": "model runner crashed" }).to_string());
    } else {
        ndjson.push_str(&json!({ "response": "", "done": true }).to_string());
    }
    ndjson.push('\n');

    ([(header::CONTENT_TYPE, "application/x-ndjson")], ndjson).into_response()
}

/// Minimal docx (ZIP) whose `word/document.xml` holds one paragraph.
pub fn minimal_docx_with_text(phrase: &str) -> Vec<u8> {
    use std::io::Write;
    let mut buf = Vec::new();
    {
        let mut zip = zip::ZipWriter::new(std::io::Cursor::new(&mut buf));
        zip.start_file(
            "word/document.xml",
            zip::write::SimpleFileOptions::default(),
        )
        .unwrap();
        let xml = format!(
            "<?xml version=\"1.0\"?><w:document xmlns:w=\"http://schemas.openxmlformats.org/wordprocessingml/2006/main\"><w:body><w:p><w:r><w:t>{}</w:t></w:r></w:p></w:body></w:document>",
            phrase
        );
        zip.write_all(xml.as_bytes()).unwrap();
        zip.finish().unwrap();
    }
    buf
}

/// Single-page PDF showing `phrase` in Helvetica. Object offsets and the
/// content stream length are computed so pdf-extract can parse it.
pub fn minimal_pdf_with_text(phrase: &str) -> Vec<u8> {
    let content = format!("BT /F1 12 Tf 100 700 Td ({}) Tj ET", phrase);
    let mut out = Vec::new();
    let mut offsets = Vec::new();
    out.extend_from_slice(b"%PDF-1.4\n");
    let objects = [
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        "<< /Type /Pages /Kids [3 0 R] /Count 1 >>".to_string(),
        "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] /Contents 4 0 R /Resources << /Font << /F1 5 0 R >> >> >>".to_string(),
        format!("<< /Length {} >>\nstream\n{}\nendstream", content.len(), content),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>".to_string(),
    ];
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.extend_from_slice(format!("{} 0 obj\n{}\nendobj\n", i + 1, body).as_bytes());
    }
    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", objects.len() + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for offset in offsets {
        out.extend_from_slice(format!("{:010} 00000 n \n", offset).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            objects.len() + 1,
            xref_start
        )
        .as_bytes(),
    );
    out
}
