//! AI assist: prompt catalog, streaming backends, safe rendering and the
//! session pipeline that merges results back into the document.

pub mod backend;
pub mod ollama;
pub mod pipeline;
pub mod prompts;
pub mod render;
pub mod sanitize;

pub use backend::{BackendError, ChunkStream, CompletionBackend, CompletionRequest};
pub use ollama::{NdjsonDecoder, OllamaBackend};
pub use pipeline::{
    drive, AssistError, AssistPipeline, AssistSession, AssistState, ChunkOutcome, Generation,
    PendingStream, StaleSelectionError, StreamEnd,
};
pub use prompts::{build, build_for_key, ActionKind, Prompt, UnknownActionError};
pub use render::{markdown_to_html, render_markdown, strip_code_fence};
pub use sanitize::sanitize_html;
