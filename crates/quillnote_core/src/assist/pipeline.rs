//! AI assist session state machine.
//!
//! # Responsibility
//! - Own the single active assist session of one editor.
//! - Fold streamed chunks into a progressively rendered, sanitized result.
//! - Merge the result back into the document on explicit insert.
//!
//! # Invariants
//! - Every stream is tagged with the generation current at its start; chunks
//!   from any other generation are ignored.
//! - `discard`, `insert`, `stop` and starting a new action all advance the
//!   generation, so an abandoned stream can never touch the result again.
//! - Backend failures end loading and keep the partial result.
//! - The document is only mutated by `insert`, and only when the original
//!   selection still holds the captured text.

use crate::assist::backend::{BackendError, ChunkStream, CompletionBackend, CompletionRequest};
use crate::assist::prompts::{self, ActionKind, UnknownActionError};
use crate::assist::render::render_markdown;
use crate::document::parse::parse_blocks;
use crate::document::{create_document, to_plain_text, AnchoredSelection, DocumentEditor, EditError};
use futures::StreamExt;
use log::{debug, info, warn};
use std::cell::RefCell;
use std::fmt;
use thiserror::Error;

/// Token identifying one stream of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssistState {
    Idle,
    Streaming,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("the selected text changed; select it again and retry")]
pub struct StaleSelectionError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AssistError {
    #[error("select some text first")]
    EmptySource,
    #[error("there is no previous action to retry")]
    NothingToRetry,
    #[error("there is no result to insert yet")]
    NothingToInsert,
    #[error(transparent)]
    Stale(#[from] StaleSelectionError),
    #[error(transparent)]
    UnknownAction(#[from] UnknownActionError),
    #[error("could not insert the result: {0}")]
    Edit(#[from] EditError),
}

/// Transient state of one assist transformation.
#[derive(Debug, Clone)]
pub struct AssistSession {
    source: AnchoredSelection,
    action: ActionKind,
    accumulated: String,
    streamed_result: String,
    state: AssistState,
}

impl AssistSession {
    pub fn source_text(&self) -> &str {
        &self.source.text
    }

    pub fn source(&self) -> &AnchoredSelection {
        &self.source
    }

    /// Action last started; the one `retry` repeats.
    pub fn action(&self) -> ActionKind {
        self.action
    }

    /// Sanitized HTML rendered from everything received so far.
    pub fn streamed_result(&self) -> &str {
        &self.streamed_result
    }

    pub fn state(&self) -> &AssistState {
        &self.state
    }
}

/// Chunk stream bound to the generation it was opened for.
pub struct PendingStream {
    generation: Generation,
    chunks: ChunkStream,
}

impl PendingStream {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkOutcome {
    Applied,
    Stale,
}

/// How [`drive`] finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    Completed,
    Failed,
    /// The session moved on; remaining chunks were not applied.
    Superseded,
}

pub struct AssistPipeline {
    backend: Box<dyn CompletionBackend>,
    session: Option<AssistSession>,
    generation: u64,
    last_error: Option<String>,
}

impl AssistPipeline {
    pub fn new(backend: Box<dyn CompletionBackend>) -> Self {
        Self {
            backend,
            session: None,
            generation: 0,
            last_error: None,
        }
    }

    pub fn generation(&self) -> Generation {
        Generation(self.generation)
    }

    pub fn session(&self) -> Option<&AssistSession> {
        self.session.as_ref()
    }

    pub fn state(&self) -> AssistState {
        self.session
            .as_ref()
            .map_or(AssistState::Idle, |session| session.state.clone())
    }

    pub fn is_loading(&self) -> bool {
        self.state() == AssistState::Streaming
    }

    pub fn streamed_result(&self) -> Option<&str> {
        self.session.as_ref().map(AssistSession::streamed_result)
    }

    /// Short user-facing description of the last failure.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Starts `action` over an anchored selection, superseding any session.
    pub fn start_action(
        &mut self,
        action: ActionKind,
        source: AnchoredSelection,
    ) -> Result<PendingStream, AssistError> {
        if source.text.trim().is_empty() {
            return Err(self.fail(AssistError::EmptySource));
        }
        let generation = self.advance();
        let prompt = prompts::build(action, &source.text);
        let chunks = self.backend.stream_completion(CompletionRequest {
            prompt: prompt.prompt,
            system_message: Some(prompt.system_message),
        });
        info!(
            "event=assist_start module=assist status=start action={} generation={} source_len={}",
            action.key(),
            generation,
            source.text.len()
        );
        self.session = Some(AssistSession {
            source,
            action,
            accumulated: String::new(),
            streamed_result: String::new(),
            state: AssistState::Streaming,
        });
        self.last_error = None;
        Ok(PendingStream { generation, chunks })
    }

    /// Starts `action` over the editor's current selection.
    pub fn start_from_editor(
        &mut self,
        action: ActionKind,
        editor: &DocumentEditor,
    ) -> Result<PendingStream, AssistError> {
        match editor.anchor_selection() {
            Some(anchor) => self.start_action(action, anchor),
            None => Err(self.fail(AssistError::EmptySource)),
        }
    }

    /// Starts an action named by its wire key.
    pub fn start_action_by_key(
        &mut self,
        key: &str,
        source: AnchoredSelection,
    ) -> Result<PendingStream, AssistError> {
        match ActionKind::parse(key) {
            Ok(action) => self.start_action(action, source),
            Err(err) => Err(self.fail(err.into())),
        }
    }

    /// Re-runs the last action on the same source, dropping the old result.
    pub fn retry(&mut self) -> Result<PendingStream, AssistError> {
        let Some((action, source)) = self
            .session
            .as_ref()
            .map(|session| (session.action, session.source.clone()))
        else {
            return Err(self.fail(AssistError::NothingToRetry));
        };
        self.start_action(action, source)
    }

    /// Appends a chunk and re-renders the whole accumulated text.
    pub fn apply_chunk(&mut self, generation: Generation, chunk: &str) -> ChunkOutcome {
        let Some(session) = self.live_session(generation) else {
            debug!("event=assist_chunk module=assist status=skip generation={generation}");
            return ChunkOutcome::Stale;
        };
        session.accumulated.push_str(chunk);
        session.streamed_result = render_markdown(&session.accumulated);
        ChunkOutcome::Applied
    }

    /// Ends loading for `generation`. Returns `false` if it was stale.
    pub fn finish_stream(
        &mut self,
        generation: Generation,
        outcome: Result<(), BackendError>,
    ) -> bool {
        let Some(session) = self.live_session(generation) else {
            return false;
        };
        match outcome {
            Ok(()) => {
                session.state = AssistState::Ready;
                info!(
                    "event=assist_stream module=assist status=ok generation={} result_len={}",
                    generation,
                    session.streamed_result.len()
                );
            }
            Err(err) => {
                let message = err.to_string();
                warn!(
                    "event=assist_stream module=assist status=error generation={} partial_len={} error={}",
                    generation,
                    session.streamed_result.len(),
                    message
                );
                session.state = AssistState::Failed(message.clone());
                self.last_error = Some(message);
            }
        }
        true
    }

    /// Stops waiting on the current stream, keeping what arrived so far.
    pub fn stop(&mut self) {
        if !self.is_loading() {
            return;
        }
        self.advance();
        if let Some(session) = self.session.as_mut() {
            session.state = AssistState::Ready;
        }
        debug!("event=assist_stop module=assist status=ok");
    }

    /// Replaces the original selection with the current result.
    ///
    /// # Errors
    /// - `NothingToInsert` without a result that parses to at least one
    ///   block (a lone `<hr>` does not).
    /// - `Stale` when the selection no longer holds the captured text; the
    ///   session is discarded and the document is not touched.
    /// - `Edit` when the editor rejects the fragment; the session is kept.
    pub fn insert(&mut self, editor: &mut DocumentEditor) -> Result<(), AssistError> {
        let ready = self
            .session
            .as_ref()
            .filter(|session| has_insertable_content(&session.streamed_result))
            .map(|session| (session.streamed_result.clone(), session.source.clone()));
        let Some((html, anchor)) = ready else {
            return Err(self.fail(AssistError::NothingToInsert));
        };

        let Some(range) = editor.resolve_anchor(&anchor) else {
            warn!("event=assist_insert module=assist status=error reason=stale_selection");
            self.session = None;
            self.advance();
            return Err(self.fail(StaleSelectionError.into()));
        };

        let applied = editor
            .set_selection(range)
            .and_then(|()| editor.replace_selection(&html));
        if let Err(err) = applied {
            return Err(self.fail(err.into()));
        }

        info!(
            "event=assist_insert module=assist status=ok result_len={} version={}",
            html.len(),
            editor.version()
        );
        self.session = None;
        self.advance();
        self.last_error = None;
        Ok(())
    }

    /// Drops the session without touching any document.
    pub fn discard(&mut self) {
        if self.session.take().is_some() {
            debug!("event=assist_discard module=assist status=ok");
        }
        self.advance();
        self.last_error = None;
    }

    /// Clipboard payload: sanitized HTML plus its plain-text rendering.
    pub fn copy_result(&self) -> Option<(String, String)> {
        let html = self.streamed_result()?;
        if html.trim().is_empty() {
            return None;
        }
        let plain = to_plain_text(&create_document(html));
        Some((html.to_string(), plain))
    }

    fn live_session(&mut self, generation: Generation) -> Option<&mut AssistSession> {
        if generation.0 != self.generation {
            return None;
        }
        self.session
            .as_mut()
            .filter(|session| session.state == AssistState::Streaming)
    }

    fn advance(&mut self) -> Generation {
        self.generation += 1;
        Generation(self.generation)
    }

    fn fail(&mut self, err: AssistError) -> AssistError {
        self.last_error = Some(err.to_string());
        err
    }
}

/// Whether `html` yields any block to put in place of the selection.
fn has_insertable_content(html: &str) -> bool {
    !html.trim().is_empty() && parse_blocks(html).is_ok_and(|blocks| !blocks.is_empty())
}

/// Consumes `pending` into `pipeline` until it ends or is superseded.
///
/// The `RefCell` borrow is released before every await, so the UI can call
/// `discard`/`start_action` while a chunk is outstanding.
pub async fn drive(pipeline: &RefCell<AssistPipeline>, pending: PendingStream) -> StreamEnd {
    let PendingStream {
        generation,
        mut chunks,
    } = pending;

    while let Some(item) = chunks.next().await {
        match item {
            Ok(chunk) => {
                let outcome = pipeline.borrow_mut().apply_chunk(generation, &chunk);
                if outcome == ChunkOutcome::Stale {
                    return StreamEnd::Superseded;
                }
            }
            Err(err) => {
                let live = pipeline.borrow_mut().finish_stream(generation, Err(err));
                return if live {
                    StreamEnd::Failed
                } else {
                    StreamEnd::Superseded
                };
            }
        }
    }

    if pipeline.borrow_mut().finish_stream(generation, Ok(())) {
        StreamEnd::Completed
    } else {
        StreamEnd::Superseded
    }
}
