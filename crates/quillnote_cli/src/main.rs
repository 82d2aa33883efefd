//! Command-line entry point for the QuillNote core.
//!
//! # Responsibility
//! - Verify core linkage (`ping`) and list the assist prompt catalog.
//! - Run documents through the HTML boundary (`normalize`).
//! - Stream one assist action against the configured backend (`assist`).
//! - Add and list notes in the configured database (`notes`).

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use quillnote_core::assist::{drive, ActionKind, AssistPipeline, OllamaBackend, StreamEnd};
use quillnote_core::document::{create_document, to_html, to_plain_text, Document};
use quillnote_core::db::open_db;
use quillnote_core::{
    init_logging, CoreConfig, DocumentEditor, NoteListQuery, NoteService, Position, Range,
    SqliteNoteStore,
};
use std::cell::RefCell;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "quillnote", version, about = "QuillNote core tools")]
struct Cli {
    /// JSON config file; QUILLNOTE_* environment variables override it.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print core linkage and version.
    Ping,
    /// List assist actions and their keys.
    Prompts,
    /// Parse an HTML note and print its canonical form.
    Normalize {
        file: PathBuf,
        /// Print plain text instead of HTML.
        #[arg(long)]
        plain: bool,
    },
    /// Run one assist action and print the sanitized HTML result.
    Assist {
        /// Action key: explain, concise, improve or grammar.
        #[arg(long)]
        action: String,
        #[arg(long, conflicts_with = "file")]
        text: Option<String>,
        #[arg(long)]
        file: Option<PathBuf>,
        /// Replace the source with the result and print the whole document.
        #[arg(long)]
        apply: bool,
    },
    /// Work with notes stored in the configured database.
    Notes {
        #[command(subcommand)]
        command: NotesCommand,
    },
}

#[derive(Debug, Subcommand)]
enum NotesCommand {
    /// Store an HTML file as a new note.
    Add {
        #[arg(long)]
        title: String,
        file: PathBuf,
    },
    /// List recent notes with their previews.
    List {
        #[arg(long)]
        archived: bool,
        #[arg(long)]
        tag: Option<String>,
        #[arg(long)]
        limit: Option<u32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = CoreConfig::load(cli.config.as_deref()).context("loading configuration")?;
    if let Err(err) = init_logging(&config.log) {
        eprintln!("warning: file logging disabled: {err}");
    }

    match cli.command {
        Command::Ping => {
            println!("quillnote_core ping={}", quillnote_core::ping());
            println!("quillnote_core version={}", quillnote_core::core_version());
        }
        Command::Prompts => {
            for action in ActionKind::ALL {
                println!("{:<10} {}", action.key(), action.label());
            }
        }
        Command::Normalize { file, plain } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let document = create_document(&html);
            if plain {
                println!("{}", to_plain_text(&document));
            } else {
                println!("{}", to_html(&document));
            }
        }
        Command::Assist {
            action,
            text,
            file,
            apply,
        } => {
            let source = match (text, file) {
                (Some(text), _) => text,
                (None, Some(file)) => std::fs::read_to_string(&file)
                    .with_context(|| format!("reading {}", file.display()))?,
                (None, None) => bail!("pass the source with --text or --file"),
            };
            run_assist(&config, &action, &source, apply).await?;
        }
        Command::Notes { command } => run_notes(&config, command)?,
    }
    Ok(())
}

fn run_notes(config: &CoreConfig, command: NotesCommand) -> Result<()> {
    let mut conn = open_db(&config.database_path)
        .with_context(|| format!("opening {}", config.database_path.display()))?;
    let service = NoteService::new(SqliteNoteStore::try_new(&mut conn)?);

    match command {
        NotesCommand::Add { title, file } => {
            let html = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let note = service.create_note(title, &html, None)?;
            println!("{}", note.id);
        }
        NotesCommand::List {
            archived,
            tag,
            limit,
        } => {
            let listed = service.list_notes(NoteListQuery {
                include_archived: archived,
                tag,
                limit,
                ..NoteListQuery::default()
            })?;
            for note in listed.items {
                println!(
                    "{}  {:<24} {}",
                    note.id,
                    note.title,
                    note.preview_text.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

async fn run_assist(config: &CoreConfig, key: &str, source: &str, apply: bool) -> Result<()> {
    let action = ActionKind::parse(key)?;
    let backend = OllamaBackend::new(&config.assist)?;
    eprintln!("model={} endpoint={}", backend.model(), backend.endpoint());

    let mut editor = DocumentEditor::new(Document::from_plain_text(source));
    select_all(&mut editor)?;

    let pipeline = RefCell::new(AssistPipeline::new(Box::new(backend)));
    let pending = pipeline.borrow_mut().start_from_editor(action, &editor)?;
    let end = drive(&pipeline, pending).await;

    let mut pipeline = pipeline.into_inner();
    match end {
        StreamEnd::Completed => {}
        StreamEnd::Failed | StreamEnd::Superseded => {
            if let Some(partial) = pipeline.streamed_result().filter(|html| !html.is_empty()) {
                eprintln!("partial result:\n{partial}");
            }
            bail!(
                "assist failed: {}",
                pipeline.last_error().unwrap_or("stream ended unexpectedly")
            );
        }
    }

    if apply {
        pipeline.insert(&mut editor)?;
        println!("{}", editor.to_html());
    } else {
        println!("{}", pipeline.streamed_result().unwrap_or_default());
    }
    Ok(())
}

fn select_all(editor: &mut DocumentEditor) -> Result<()> {
    let blocks = editor.document().blocks();
    let Some(last) = blocks.len().checked_sub(1) else {
        bail!("source is empty");
    };
    let end = Position::new(last, blocks[last].len());
    editor.set_selection(Range::new(Position::new(0, 0), end))?;
    Ok(())
}
