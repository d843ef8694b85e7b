//! Command handlers for the `ragchat` binary.
//!
//! Each handler owns its output. Answers and listings go to stdout;
//! progress, skipped files and recoverable errors go to stderr.

use std::io::Write;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use tokio::io::{AsyncBufReadExt, BufReader};

use local_rag::config::Config;
use local_rag::models::{Role, Upload};
use local_rag::provider::create_provider;
use local_rag::{IndexOutcome, PendingAnswer, Session};

/// Build a session for `config`, selecting `model` if given.
async fn open_session(config: &Config, model: Option<&str>) -> Result<Session> {
    let provider = create_provider(&config.provider)?;
    let mut session = Session::new(provider, config);
    if let Some(name) = model {
        select_listed_model(&mut session, name).await?;
    }
    Ok(session)
}

/// Select `name` only if the provider actually serves it.
async fn select_listed_model(session: &mut Session, name: &str) -> Result<()> {
    let models = session
        .available_models()
        .await
        .context("Cannot select a model without the model catalog")?;
    if !models.iter().any(|m| m == name) {
        bail!(
            "Model '{}' is not available. Available models: {}",
            name,
            if models.is_empty() {
                "(none)".to_string()
            } else {
                models.join(", ")
            }
        );
    }
    session.select_model(name)?;
    Ok(())
}

/// Read `paths` into the session's index.
///
/// A single directory is indexed in place; otherwise every path must be a
/// file and the set is indexed as one upload batch.
async fn index_inputs(session: &mut Session, paths: &[PathBuf]) -> Result<()> {
    if paths.is_empty() {
        bail!("No documents given. Pass at least one --file.");
    }

    let outcome = match paths {
        [dir] if dir.is_dir() => session
            .index_directory(dir)
            .await
            .with_context(|| format!("Failed to index {}", dir.display()))?,
        _ => {
            let uploads = read_uploads(paths)?;
            session
                .index_uploads(&uploads)
                .await
                .context("Failed to index uploaded files")?
        }
    };

    match outcome {
        IndexOutcome::Indexed(report) => {
            eprintln!(
                "Indexed {} file(s) into {} chunk(s).",
                report.files_indexed, report.chunks
            );
            for (path, reason) in &report.skipped {
                eprintln!("  skipped {}: {}", path.display(), reason);
            }
        }
        IndexOutcome::AlreadyIndexed => {
            eprintln!("Documents are already indexed for this session.");
        }
    }
    Ok(())
}

fn read_uploads(paths: &[PathBuf]) -> Result<Vec<Upload>> {
    let mut uploads = Vec::with_capacity(paths.len());
    for path in paths {
        if path.is_dir() {
            bail!(
                "{} is a directory. Pass a single directory, or files only.",
                path.display()
            );
        }
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        uploads.push(Upload::new(filename, bytes));
    }
    Ok(uploads)
}

/// `ragchat models`
pub async fn run_models(config: &Config) -> Result<()> {
    let session = open_session(config, None).await?;
    let models = session.available_models().await?;
    if models.is_empty() {
        println!("No models available.");
        return Ok(());
    }
    for name in models {
        let marker = if config.chat.model.as_deref() == Some(name.as_str()) {
            "*"
        } else {
            " "
        };
        println!("{} {}", marker, name);
    }
    Ok(())
}

/// `ragchat index <paths..>`
pub async fn run_index(config: &Config, paths: &[PathBuf]) -> Result<()> {
    let mut session = open_session(config, None).await?;
    index_inputs(&mut session, paths).await?;

    if let Some(index) = session.index() {
        let mut per_source: Vec<(&str, usize)> = Vec::new();
        for chunk in index.chunks() {
            match per_source.last_mut() {
                Some((source, count)) if *source == chunk.source => *count += 1,
                _ => per_source.push((chunk.source.as_str(), 1)),
            }
        }
        println!("{:<40} {:>8}", "SOURCE", "CHUNKS");
        for (source, count) in per_source {
            println!("{:<40} {:>8}", source, count);
        }
    }
    Ok(())
}

/// `ragchat ask`
pub async fn run_ask(
    config: &Config,
    model: Option<&str>,
    files: &[PathBuf],
    question: &str,
    show_sources: bool,
) -> Result<()> {
    let mut session = open_session(config, model).await?;
    index_inputs(&mut session, files).await?;

    let pending = session.ask(question).await?;
    stream_answer(pending, show_sources).await
}

/// `ragchat chat`: an interactive session on stdin.
pub async fn run_chat(config: &Config, model: Option<&str>, files: &[PathBuf]) -> Result<()> {
    let mut session = open_session(config, model).await?;
    if !files.is_empty() {
        index_inputs(&mut session, files).await?;
    }
    if let Some(model) = session.model() {
        eprintln!("Chatting with {}. Type /help for commands.", model.model());
    } else {
        eprintln!("No model selected. Use /models and /model NAME.");
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else {
            println!();
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => {}
            ReplCommand::Quit => break,
            ReplCommand::Help => print_help(),
            ReplCommand::Models => match session.available_models().await {
                Ok(models) => {
                    let current = session.model().map(|m| m.model().to_string());
                    for name in models {
                        let marker = if current.as_deref() == Some(name.as_str()) {
                            "*"
                        } else {
                            " "
                        };
                        println!("{} {}", marker, name);
                    }
                }
                Err(e) => eprintln!("error: {}", e),
            },
            ReplCommand::Model(name) => match select_listed_model(&mut session, &name).await {
                Ok(()) => eprintln!("Using {}.", name),
                Err(e) => eprintln!("error: {:#}", e),
            },
            ReplCommand::Index(paths) => {
                if let Err(e) = index_inputs(&mut session, &paths).await {
                    eprintln!("error: {:#}", e);
                }
            }
            ReplCommand::History => {
                for message in session.history() {
                    let who = match message.role {
                        Role::User => "you",
                        Role::Assistant => "assistant",
                    };
                    let tail = if message.complete { "" } else { " [interrupted]" };
                    println!("{}: {}{}", who, message.content, tail);
                }
            }
            ReplCommand::Clear => {
                session.clear_history();
                eprintln!("History cleared.");
            }
            ReplCommand::Unknown(cmd) => eprintln!("Unknown command: {}. Try /help.", cmd),
            ReplCommand::Ask(question) => {
                let pending = match session.ask(&question).await {
                    Ok(pending) => pending,
                    Err(e) => {
                        eprintln!("error: {}", e);
                        continue;
                    }
                };
                if let Err(e) = stream_answer(pending, false).await {
                    eprintln!("error: {}", e);
                }
            }
        }
    }
    Ok(())
}

/// Print fragments as they arrive. Ctrl-C stops the answer early.
async fn stream_answer(mut pending: PendingAnswer<'_>, show_sources: bool) -> Result<()> {
    let mut stdout = std::io::stdout();
    loop {
        tokio::select! {
            next = pending.next_fragment() => match next {
                Some(Ok(fragment)) => {
                    print!("{}", fragment);
                    stdout.flush()?;
                }
                Some(Err(e)) => {
                    println!();
                    return Err(e.into());
                }
                None => {
                    println!();
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                println!(" [cancelled]");
                pending.cancel();
                return Ok(());
            }
        }
    }

    if show_sources && !pending.sources().is_empty() {
        println!();
        println!("Sources:");
        for (i, hit) in pending.sources().iter().enumerate() {
            println!(
                "  [{}] {} (chunk {}, score {:.3})",
                i + 1,
                hit.chunk.source,
                hit.chunk.chunk_index,
                hit.score
            );
        }
    }
    Ok(())
}

fn print_help() {
    println!("/models          list available models");
    println!("/model NAME      switch model (history and documents are kept)");
    println!("/index PATH..    index documents, once per session");
    println!("/history         show the conversation");
    println!("/clear           forget the conversation");
    println!("/quit            leave");
}

/// One line of REPL input.
#[derive(Debug, PartialEq, Eq)]
enum ReplCommand {
    Empty,
    Quit,
    Help,
    Models,
    Model(String),
    Index(Vec<PathBuf>),
    History,
    Clear,
    Unknown(String),
    Ask(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Self {
        let line = line.trim();
        if line.is_empty() {
            return ReplCommand::Empty;
        }
        let Some(rest) = line.strip_prefix('/') else {
            return ReplCommand::Ask(line.to_string());
        };

        let (cmd, arg) = match rest.split_once(char::is_whitespace) {
            Some((cmd, arg)) => (cmd, arg.trim()),
            None => (rest, ""),
        };
        match (cmd, arg) {
            ("quit" | "exit" | "q", _) => ReplCommand::Quit,
            ("help" | "?", _) => ReplCommand::Help,
            ("models", _) => ReplCommand::Models,
            ("model", name) if !name.is_empty() => ReplCommand::Model(name.to_string()),
            ("index", paths) if !paths.is_empty() => {
                ReplCommand::Index(paths.split_whitespace().map(PathBuf::from).collect())
            }
            ("history", _) => ReplCommand::History,
            ("clear", _) => ReplCommand::Clear,
            _ => ReplCommand::Unknown(format!("/{}", cmd)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_line_is_a_question() {
        assert_eq!(
            ReplCommand::parse("  What is a crate?  "),
            ReplCommand::Ask("What is a crate?".to_string())
        );
        assert_eq!(ReplCommand::parse("   "), ReplCommand::Empty);
    }

    #[test]
    fn test_slash_commands() {
        assert_eq!(ReplCommand::parse("/quit"), ReplCommand::Quit);
        assert_eq!(ReplCommand::parse("/models"), ReplCommand::Models);
        assert_eq!(
            ReplCommand::parse("/model  llama3 "),
            ReplCommand::Model("llama3".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/index a.md b.pdf"),
            ReplCommand::Index(vec![PathBuf::from("a.md"), PathBuf::from("b.pdf")])
        );
        assert_eq!(ReplCommand::parse("/history"), ReplCommand::History);
        assert_eq!(ReplCommand::parse("/clear"), ReplCommand::Clear);
    }

    #[test]
    fn test_incomplete_or_unknown_commands() {
        assert_eq!(
            ReplCommand::parse("/model"),
            ReplCommand::Unknown("/model".to_string())
        );
        assert_eq!(
            ReplCommand::parse("/frobnicate now"),
            ReplCommand::Unknown("/frobnicate".to_string())
        );
    }

    #[test]
    fn test_read_uploads_uses_file_names() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("notes.md");
        std::fs::write(&path, "# Notes").unwrap();

        let uploads = read_uploads(&[path]).unwrap();
        assert_eq!(uploads.len(), 1);
        assert_eq!(uploads[0].filename, "notes.md");
        assert_eq!(uploads[0].bytes, b"# Notes");
    }

    #[test]
    fn test_read_uploads_rejects_directories() {
        let tmp = tempfile::TempDir::new().unwrap();
        let file = tmp.path().join("a.txt");
        std::fs::write(&file, "a").unwrap();
        assert!(read_uploads(&[file, tmp.path().to_path_buf()]).is_err());
    }
}
