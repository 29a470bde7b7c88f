//! LLM Call primitive.
//!
//! The fundamental AI operation: one request to a backend, raced against the
//! request's cancellation token and deadline. Classifiers, handlers, pipeline
//! stages and the composite patterns are all built on this primitive.

use crate::backend::{
    LlmBackend, LlmMessage, LlmRequest, LlmResponse, TokenUsage, ToolCallRequest, ToolDeclaration,
};
use crate::context::{Interruption, RequestContext};
use crate::error::LlmError;
use chrono::{DateTime, Utc};
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use switchyard_core::InvocationId;
use tracing::{debug, instrument, warn};

/// The result of an LLM Call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmCallResult {
    /// Unique identifier for this invocation.
    pub id: InvocationId,
    /// The raw text output.
    pub content: String,
    /// Tool invocations requested by the model.
    pub tool_calls: Vec<ToolCallRequest>,
    /// Token usage statistics.
    pub usage: TokenUsage,
    /// Model that generated the response.
    pub model: String,
    /// When the call completed.
    pub timestamp: DateTime<Utc>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
}

impl LlmCallResult {
    /// Creates a result from an LLM response.
    #[must_use]
    pub fn from_response(id: InvocationId, response: LlmResponse, latency_ms: u64) -> Self {
        Self {
            id,
            content: response.content,
            tool_calls: response.tool_calls,
            usage: response.usage,
            model: response.model,
            timestamp: Utc::now(),
            latency_ms,
        }
    }
}

impl From<Interruption> for LlmError {
    fn from(interruption: Interruption) -> Self {
        match interruption {
            Interruption::Cancelled => Self::Cancelled,
            Interruption::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

/// An LLM Call executor.
///
/// This is a builder: configure the messages and sampling options, then
/// [`invoke`](Self::invoke) it against a backend.
#[derive(Debug, Clone)]
pub struct LlmCall {
    name: String,
    request: LlmRequest,
}

impl LlmCall {
    /// Creates a new LLM Call with a single user message.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self::from_messages(vec![LlmMessage::user(prompt)])
    }

    /// Creates an LLM Call from a prepared message list.
    #[must_use]
    pub fn from_messages(messages: Vec<LlmMessage>) -> Self {
        Self {
            name: "llm_call".to_string(),
            request: LlmRequest::from_messages(messages),
        }
    }

    /// Names the call in log output.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Adds a system prompt ahead of the other messages.
    #[must_use]
    pub fn with_system_prompt(mut self, system: impl Into<String>) -> Self {
        self.request = self.request.with_system(system);
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.request = self.request.with_temperature(temperature);
        self
    }

    /// Sets an optional temperature, leaving the provider default when `None`.
    #[must_use]
    pub fn with_temperature_opt(mut self, temperature: Option<f32>) -> Self {
        self.request.temperature = temperature;
        self
    }

    /// Sets the max tokens.
    #[must_use]
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.request = self.request.with_max_tokens(max_tokens);
        self
    }

    /// Declares the tools the model may request.
    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolDeclaration>) -> Self {
        self.request = self.request.with_tools(tools);
        self
    }

    /// Returns the request this call will send.
    #[must_use]
    pub fn request(&self) -> &LlmRequest {
        &self.request
    }

    /// Sends the request, giving up as soon as the context is cancelled or
    /// its deadline passes.
    ///
    /// # Errors
    ///
    /// Returns the backend's [`LlmError`], or [`LlmError::Cancelled`] /
    /// [`LlmError::DeadlineExceeded`] when the call was abandoned.
    #[instrument(
        name = "llm_call",
        skip(self, backend, ctx),
        fields(call = %self.name, request_id = %ctx.request_id(), model = backend.model())
    )]
    pub async fn invoke(
        &self,
        backend: &dyn LlmBackend,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<LlmCallResult, LlmError> {
        let id = InvocationId::new();
        let started = Instant::now();
        let outcome = ctx.guard(backend.generate(&self.request)).await;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match outcome {
            Ok(Ok(response)) => {
                debug!(
                    invocation_id = %id,
                    latency_ms,
                    input_tokens = response.usage.input_tokens,
                    output_tokens = response.usage.output_tokens,
                    "LLM call completed"
                );
                Ok(LlmCallResult::from_response(id, response, latency_ms))
            }
            Ok(Err(error)) => {
                warn!(invocation_id = %id, latency_ms, %error, "LLM call failed");
                Err(Report::new(error))
            }
            Err(interruption) => {
                warn!(invocation_id = %id, latency_ms, ?interruption, "LLM call abandoned");
                Err(Report::new(LlmError::from(interruption)))
            }
        }
    }
}
