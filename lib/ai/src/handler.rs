//! Request handlers.
//!
//! A handler is the unit of work a router delegates to. Handlers either run
//! a plain function over the request or make a nested model call.

use crate::backend::LlmBackend;
use crate::context::RequestContext;
use crate::error::HandlerError;
use crate::llm_call::LlmCall;
use crate::request::{HandlerResult, Request};
use async_trait::async_trait;
use rootcause::Report;
use std::sync::Arc;
use tracing::instrument;

/// Something that can process a delegated request.
#[async_trait]
pub trait Handler: Send + Sync {
    /// Name used in results and logs.
    fn name(&self) -> &str;

    /// Processes the request.
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] if the request could not be processed.
    async fn handle(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<HandlerResult, HandlerError>;
}

type HandlerFn = dyn Fn(&Request) -> Result<String, HandlerError> + Send + Sync;

/// A handler backed by a synchronous function.
pub struct FnHandler {
    name: String,
    func: Box<HandlerFn>,
}

impl FnHandler {
    /// Creates a handler from a fallible function.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request) -> Result<String, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }

    /// Creates a handler from an infallible function.
    #[must_use]
    pub fn infallible<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request) -> String + Send + Sync + 'static,
    {
        Self::new(name, move |request| Ok(func(request)))
    }
}

#[async_trait]
impl Handler for FnHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(
        &self,
        request: &Request,
        _ctx: &RequestContext,
    ) -> switchyard_core::Result<HandlerResult, HandlerError> {
        let output = (self.func)(request).map_err(Report::new)?;
        Ok(HandlerResult::new(self.name.as_str(), output))
    }
}

/// A handler that answers with its own model call.
pub struct LlmHandler {
    name: String,
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    temperature: Option<f32>,
}

impl LlmHandler {
    /// Creates a handler with the given system instruction.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        backend: Arc<dyn LlmBackend>,
        system_prompt: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            backend,
            system_prompt: system_prompt.into(),
            temperature: None,
        }
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

#[async_trait]
impl Handler for LlmHandler {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self, request, ctx), fields(handler = %self.name, request_id = %ctx.request_id()))]
    async fn handle(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<HandlerResult, HandlerError> {
        let result = LlmCall::new(request.text())
            .with_name(self.name.as_str())
            .with_system_prompt(self.system_prompt.as_str())
            .with_temperature_opt(self.temperature)
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| {
                report.context(HandlerError::CallFailed {
                    handler: self.name.clone(),
                })
            })?;
        Ok(HandlerResult::new(self.name.as_str(), result.content))
    }
}

/// Simulated booking handler.
#[must_use]
pub fn booking_handler() -> FnHandler {
    FnHandler::infallible("booker", |request| {
        format!(
            "Booking Handler processed request: '{request}'. Result: Simulated booking action."
        )
    })
}

/// Simulated information handler.
#[must_use]
pub fn info_handler() -> FnHandler {
    FnHandler::infallible("info", |request| {
        format!(
            "Info Handler processed request: '{request}'. Result: Simulated information retrieval."
        )
    })
}

/// Handler for requests that could not be delegated.
#[must_use]
pub fn unclear_handler() -> FnHandler {
    FnHandler::infallible("unclear", |request| {
        format!("Coordinator could not delegate request: '{request}'. Please clarify.")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::scripted::ScriptedBackend;

    #[tokio::test]
    async fn stock_handlers_format_request() {
        let ctx = RequestContext::new();
        let request = Request::new("Book me a hotel in Paris.");

        let result = booking_handler().handle(&request, &ctx).await.expect("booker");
        assert_eq!(result.handler, "booker");
        assert_eq!(
            result.output,
            "Booking Handler processed request: 'Book me a hotel in Paris.'. Result: Simulated booking action."
        );

        let result = unclear_handler().handle(&request, &ctx).await.expect("unclear");
        assert_eq!(
            result.output,
            "Coordinator could not delegate request: 'Book me a hotel in Paris.'. Please clarify."
        );
    }

    #[tokio::test]
    async fn fn_handler_errors_propagate() {
        let handler = FnHandler::new("strict", |_| {
            Err(HandlerError::Failed {
                handler: "strict".to_string(),
                reason: "empty".to_string(),
            })
        });
        let err = handler
            .handle(&Request::new(""), &RequestContext::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err.current_context(), HandlerError::Failed { .. }));
    }

    #[tokio::test]
    async fn llm_handler_uses_model_output() {
        let backend = Arc::new(ScriptedBackend::new().with_text("Rome is the capital of Italy."));
        let handler = LlmHandler::new("info", backend.clone(), "Answer briefly.");
        let result = handler
            .handle(&Request::new("What is the capital of Italy?"), &RequestContext::new())
            .await
            .expect("handle");
        assert_eq!(result.output, "Rome is the capital of Italy.");
        assert_eq!(
            backend.requests()[0].system_text().as_deref(),
            Some("Answer briefly.")
        );
    }

    #[tokio::test]
    async fn llm_handler_wraps_call_failure() {
        let backend = Arc::new(ScriptedBackend::new().with_error(LlmError::Timeout));
        let handler = LlmHandler::new("info", backend, "Answer briefly.");
        let err = handler
            .handle(&Request::new("hi"), &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &HandlerError::CallFailed {
                handler: "info".to_string()
            }
        );
    }
}
