//! Scripted backend for tests and offline runs.
//!
//! Replays queued responses in order, then falls back to an optional
//! responder function. Every request is recorded so callers can assert on
//! exactly what was sent.

use crate::backend::{LlmBackend, LlmProvider, LlmRequest, LlmResponse, ToolCallRequest};
use crate::error::LlmError;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

type Responder = dyn Fn(&LlmRequest) -> Result<LlmResponse, LlmError> + Send + Sync;

/// A backend that answers from a script instead of a model.
pub struct ScriptedBackend {
    model: String,
    script: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    responder: Option<Box<Responder>>,
    requests: Mutex<Vec<LlmRequest>>,
    delay: Option<Duration>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl ScriptedBackend {
    /// Creates an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self {
            model: "scripted".to_string(),
            script: Mutex::new(VecDeque::new()),
            responder: None,
            requests: Mutex::new(Vec::new()),
            delay: None,
        }
    }

    /// Queues a response.
    #[must_use]
    pub fn with_response(self, response: LlmResponse) -> Self {
        lock(&self.script).push_back(Ok(response));
        self
    }

    /// Queues a plain text response.
    #[must_use]
    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_response(LlmResponse::text(text))
    }

    /// Queues a response requesting one tool call.
    #[must_use]
    pub fn with_tool_call(
        self,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: serde_json::Value,
    ) -> Self {
        self.with_response(LlmResponse::tool_calls(vec![ToolCallRequest {
            id: id.into(),
            name: name.into(),
            arguments,
        }]))
    }

    /// Queues a failure.
    #[must_use]
    pub fn with_error(self, error: LlmError) -> Self {
        lock(&self.script).push_back(Err(error));
        self
    }

    /// Answers with `responder` once the queue is empty.
    #[must_use]
    pub fn with_responder<F>(mut self, responder: F) -> Self
    where
        F: Fn(&LlmRequest) -> Result<LlmResponse, LlmError> + Send + Sync + 'static,
    {
        self.responder = Some(Box::new(responder));
        self
    }

    /// Waits this long before answering each request.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Sets the reported model name.
    #[must_use]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<LlmRequest> {
        lock(&self.requests).clone()
    }

    /// Returns how many queued entries have not been consumed.
    #[must_use]
    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmBackend for ScriptedBackend {
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        lock(&self.requests).push(request.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let next = lock(&self.script).pop_front();
        let mut response = match (next, &self.responder) {
            (Some(entry), _) => entry?,
            (None, Some(responder)) => responder(request)?,
            (None, None) => {
                return Err(LlmError::RequestFailed {
                    reason: "scripted backend has no response left".to_string(),
                });
            }
        };
        if response.model.is_empty() {
            response.model.clone_from(&self.model);
        }
        Ok(response)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }
}
