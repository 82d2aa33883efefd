//! Ollama `/api/generate` streaming client.
//!
//! # Responsibility
//! - Issue one streamed generate request per completion.
//! - Decode the NDJSON response body into ordered text chunks.
//!
//! # Invariants
//! - Chunks are yielded in body order; a line split across network reads is
//!   buffered until its newline arrives.
//! - The stream ends after the `done` line or after the first error.
//! - A body that closes before `done` surfaces as a transport error.

use crate::assist::backend::{BackendError, ChunkStream, CompletionBackend, CompletionRequest};
use crate::config::AssistSettings;
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream};
use futures::{FutureExt, StreamExt};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

#[derive(Debug, Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateLine {
    #[serde(default)]
    response: String,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    error: Option<String>,
}

/// Incremental decoder for newline-delimited generate responses.
#[derive(Debug, Default)]
pub struct NdjsonDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl NdjsonDecoder {
    /// Feeds raw body bytes; returns every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<String, BackendError>> {
        self.buffer.extend_from_slice(bytes);
        let mut out = Vec::new();
        while let Some(newline) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline).collect();
            if let Some(item) = self.decode_line(&line) {
                out.push(item);
            }
        }
        out
    }

    /// Flushes a trailing unterminated line once the body has ended.
    pub fn finish(&mut self) -> Vec<Result<String, BackendError>> {
        let rest = std::mem::take(&mut self.buffer);
        let mut out: Vec<_> = self.decode_line(&rest).into_iter().collect();
        if !self.done && !out.iter().any(Result::is_err) {
            out.push(Err(BackendError::Transport(
                "response ended before completion".to_string(),
            )));
        }
        out
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    fn decode_line(&mut self, line: &[u8]) -> Option<Result<String, BackendError>> {
        if self.done {
            return None;
        }
        let trimmed = match std::str::from_utf8(line) {
            Ok(text) => text.trim(),
            Err(err) => return Some(Err(BackendError::Protocol(err.to_string()))),
        };
        if trimmed.is_empty() {
            return None;
        }
        let parsed: GenerateLine = match serde_json::from_str(trimmed) {
            Ok(parsed) => parsed,
            Err(err) => return Some(Err(BackendError::Protocol(err.to_string()))),
        };
        if let Some(message) = parsed.error {
            return Some(Err(BackendError::Model(message)));
        }
        if parsed.done {
            self.done = true;
        }
        (!parsed.response.is_empty()).then_some(Ok(parsed.response))
    }
}

type BodyStream = BoxStream<'static, Result<Vec<u8>, BackendError>>;

enum StreamState {
    Opening(BoxFuture<'static, Result<BodyStream, BackendError>>),
    Open {
        body: BodyStream,
        decoder: NdjsonDecoder,
        queued: VecDeque<Result<String, BackendError>>,
    },
    Draining(VecDeque<Result<String, BackendError>>),
    Done,
}

/// Completion backend talking to a local Ollama server.
#[derive(Debug, Clone)]
pub struct OllamaBackend {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaBackend {
    pub fn new(settings: &AssistSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .build()
            .map_err(|err| BackendError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint: settings.endpoint.clone(),
            model: settings.model.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

impl CompletionBackend for OllamaBackend {
    fn stream_completion(&self, request: CompletionRequest) -> ChunkStream {
        let body = GenerateRequest {
            model: self.model.clone(),
            prompt: request.prompt,
            system: request.system_message,
            stream: true,
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        debug!(
            "event=assist_request module=assist status=start model={} prompt_len={}",
            body.model,
            body.prompt.len()
        );

        let opening = async move {
            let response = client
                .post(&endpoint)
                .json(&body)
                .send()
                .await
                .map_err(|err| BackendError::Transport(err.to_string()))?;
            let status = response.status();
            if !status.is_success() {
                warn!(
                    "event=assist_request module=assist status=error http_status={}",
                    status.as_u16()
                );
                return Err(BackendError::Status(status.as_u16()));
            }
            let body: BodyStream = response
                .bytes_stream()
                .map(|item| {
                    item.map(|bytes| bytes.to_vec())
                        .map_err(|err| BackendError::Transport(err.to_string()))
                })
                .boxed();
            Ok(body)
        }
        .boxed();

        stream::unfold(StreamState::Opening(opening), next_chunk).boxed()
    }
}

async fn next_chunk(
    mut state: StreamState,
) -> Option<(Result<String, BackendError>, StreamState)> {
    loop {
        match state {
            StreamState::Opening(opening) => match opening.await {
                Ok(body) => {
                    state = StreamState::Open {
                        body,
                        decoder: NdjsonDecoder::default(),
                        queued: VecDeque::new(),
                    };
                }
                Err(err) => return Some((Err(err), StreamState::Done)),
            },
            StreamState::Open {
                mut body,
                mut decoder,
                mut queued,
            } => {
                if let Some(item) = queued.pop_front() {
                    let next = if item.is_err() {
                        StreamState::Done
                    } else {
                        StreamState::Open {
                            body,
                            decoder,
                            queued,
                        }
                    };
                    return Some((item, next));
                }
                if decoder.is_done() {
                    return None;
                }
                match body.next().await {
                    Some(Ok(bytes)) => {
                        queued.extend(decoder.push(&bytes));
                        state = StreamState::Open {
                            body,
                            decoder,
                            queued,
                        };
                    }
                    Some(Err(err)) => return Some((Err(err), StreamState::Done)),
                    None => {
                        queued.extend(decoder.finish());
                        state = StreamState::Draining(queued);
                    }
                }
            }
            StreamState::Draining(mut queued) => {
                return queued.pop_front().map(|item| {
                    let next = if item.is_err() {
                        StreamState::Done
                    } else {
                        StreamState::Draining(queued)
                    };
                    (item, next)
                });
            }
            StreamState::Done => return None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::NdjsonDecoder;
    use crate::assist::backend::BackendError;

    #[test]
    fn decodes_lines_split_across_reads() {
        let mut decoder = NdjsonDecoder::default();
        assert!(decoder.push(br#"{"response":"It was "#).is_empty());
        let first = decoder.push(b"\"}\n{\"response\":\"good.\"}\n");
        assert_eq!(
            first,
            vec![Ok("It was ".to_string()), Ok("good.".to_string())]
        );
        let last = decoder.push(b"{\"response\":\"\",\"done\":true}\n");
        assert!(last.is_empty());
        assert!(decoder.is_done());
        assert!(decoder.finish().is_empty());
    }

    #[test]
    fn early_end_is_a_transport_error() {
        let mut decoder = NdjsonDecoder::default();
        decoder.push(b"{\"response\":\"partial\"}\n");
        let tail = decoder.finish();
        assert!(matches!(tail.as_slice(), [Err(BackendError::Transport(_))]));
    }

    #[test]
    fn model_errors_and_garbage_are_reported() {
        let mut decoder = NdjsonDecoder::default();
        let items = decoder.push(b"{\"error\":\"model not found\"}\nnot json\n");
        assert_eq!(items[0], Err(BackendError::Model("model not found".to_string())));
        assert!(matches!(items[1], Err(BackendError::Protocol(_))));
    }
}
