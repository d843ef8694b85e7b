//! # Local RAG CLI (`ragchat`)
//!
//! Chat with a locally served model about your own documents. Documents are
//! indexed in memory for the lifetime of one command; nothing is persisted.
//!
//! ## Usage
//!
//! ```bash
//! ragchat [--config ./config/ragchat.toml] <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `ragchat models` | List the models the provider serves, in catalog order |
//! | `ragchat index <paths..>` | Build an index and report what was indexed or skipped |
//! | `ragchat ask --model M --file F "<question>"` | Answer one question, streaming the reply |
//! | `ragchat chat --model M --file F` | Interactive session with history |
//!
//! ## Examples
//!
//! ```bash
//! # See which models Ollama is serving
//! ragchat models
//!
//! # Check how a set of files will be parsed and chunked
//! ragchat index notes.md handbook.pdf
//!
//! # One-shot question, with the retrieved sources listed afterwards
//! ragchat ask --model llama3 --file handbook.pdf --sources "What is the leave policy?"
//!
//! # Conversation over a whole directory
//! ragchat chat --model llama3 --file ./docs
//! ```

mod commands;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use local_rag::config::{self, Config};
use local_rag::logging;

/// Local RAG CLI — retrieval-augmented chat over your own documents.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Without one, built-in defaults are used (Ollama on
/// `http://localhost:11434`, `nomic-embed-text` embeddings).
#[derive(Parser)]
#[command(
    name = "ragchat",
    about = "Local RAG — retrieval-augmented chat over your own documents",
    version,
    long_about = "Local RAG parses uploaded text, Markdown, PDF and DOCX files, embeds them with \
    a locally served model, and answers questions grounded in the closest passages while keeping \
    the conversation history for follow-up questions."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Optional. Provider, embedding, chunking, retrieval and default chat
    /// model settings are read from this file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level unless `RUST_LOG` says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// List available models.
    ///
    /// Queries the provider's catalog and prints model names in the order
    /// the service reports them. The configured default is marked `*`.
    Models,

    /// Index documents and report the result.
    ///
    /// Pass a single directory, or any number of files. Unsupported files
    /// are skipped and listed; the rest are chunked and embedded.
    Index {
        /// Files, or one directory, to index.
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Ask a single question about some documents.
    ///
    /// The answer is streamed to stdout as it is generated. Press Ctrl-C to
    /// stop it early.
    Ask {
        /// Generative model to answer with. Defaults to `[chat].model`.
        #[arg(long)]
        model: Option<String>,

        /// Document to index (repeatable), or a single directory.
        #[arg(long = "file", short = 'f', required = true)]
        files: Vec<PathBuf>,

        /// List the retrieved chunks after the answer.
        #[arg(long)]
        sources: bool,

        /// The question.
        question: String,
    },

    /// Start an interactive chat session.
    ///
    /// Documents may be given up front with `--file` or later with
    /// `/index`. Type `/help` inside the session for commands.
    Chat {
        /// Generative model to start with. Defaults to `[chat].model`.
        #[arg(long)]
        model: Option<String>,

        /// Document to index (repeatable), or a single directory.
        #[arg(long = "file", short = 'f')]
        files: Vec<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        logging::init_with_default("debug");
    } else {
        logging::init();
    }

    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Models => {
            commands::run_models(&cfg).await?;
        }
        Commands::Index { paths } => {
            commands::run_index(&cfg, &paths).await?;
        }
        Commands::Ask {
            model,
            files,
            sources,
            question,
        } => {
            commands::run_ask(&cfg, model.as_deref(), &files, &question, sources).await?;
        }
        Commands::Chat { model, files } => {
            commands::run_chat(&cfg, model.as_deref(), &files).await?;
        }
    }

    Ok(())
}
