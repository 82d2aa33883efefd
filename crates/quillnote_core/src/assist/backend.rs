//! Streaming completion backend contract.

use futures::stream::BoxStream;
use thiserror::Error;

/// Ordered text chunks; the stream ends on completion or after one error.
pub type ChunkStream = BoxStream<'static, Result<String, BackendError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub system_message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("could not reach the assistant: {0}")]
    Transport(String),
    #[error("assistant returned HTTP {0}")]
    Status(u16),
    #[error("assistant sent an unreadable response: {0}")]
    Protocol(String),
    #[error("assistant reported an error: {0}")]
    Model(String),
}

/// Language-model backend producing streamed completions.
pub trait CompletionBackend {
    fn stream_completion(&self, request: CompletionRequest) -> ChunkStream;
}
