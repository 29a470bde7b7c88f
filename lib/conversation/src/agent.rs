//! Tool-calling agent loop.
//!
//! Each step sends the running history plus the registry's tool
//! declarations. Tool calls in the reply are validated and executed, their
//! outcomes appended as tool messages, and the loop repeats until the model
//! answers in plain text or the step limit is reached.

use crate::error::{AgentError, ToolError};
use crate::tool::{ToolOutcome, ToolRegistry};
use async_trait::async_trait;
use rootcause::Report;
use std::sync::Arc;
use switchyard_ai::fallback::Stage;
use switchyard_ai::{LlmBackend, LlmCall, LlmMessage, Request, RequestContext, StageError};
use tracing::{debug, info, instrument};

/// Default step limit.
pub const DEFAULT_MAX_STEPS: u32 = 5;

/// The result of an agent run.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentRun {
    /// The model's final text answer.
    pub answer: String,
    /// Number of model calls made.
    pub steps: u32,
    /// Every tool outcome, in execution order.
    pub tool_outcomes: Vec<ToolOutcome>,
}

impl AgentRun {
    /// Returns the first failed tool outcome, if any.
    #[must_use]
    pub fn first_tool_failure(&self) -> Option<&ToolOutcome> {
        self.tool_outcomes.iter().find(|o| !o.is_success())
    }
}

/// A model that may call tools from a registry.
pub struct ToolCallingAgent {
    backend: Arc<dyn LlmBackend>,
    registry: Arc<ToolRegistry>,
    system_prompt: Option<String>,
    max_steps: u32,
    temperature: Option<f32>,
}

impl ToolCallingAgent {
    /// Creates an agent with [`DEFAULT_MAX_STEPS`].
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            backend,
            registry,
            system_prompt: None,
            max_steps: DEFAULT_MAX_STEPS,
            temperature: None,
        }
    }

    /// Sets the system instruction.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Sets the step limit.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    /// Sets the sampling temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Answers `query`, calling tools as the model requests.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Interrupted`] on cancellation or deadline
    /// expiry, [`AgentError::ModelCallFailed`] if a model call fails and
    /// [`AgentError::MaxStepsExceeded`] if the model is still requesting
    /// tools after the last step.
    #[instrument(skip(self, query, ctx), fields(request_id = %ctx.request_id(), max_steps = self.max_steps))]
    pub async fn run(
        &self,
        query: &str,
        ctx: &RequestContext,
    ) -> Result<AgentRun, Report<AgentError>> {
        let mut history = Vec::new();
        if let Some(system) = &self.system_prompt {
            history.push(LlmMessage::system(system.as_str()));
        }
        history.push(LlmMessage::user(query));

        let declarations = self.registry.declarations();
        let mut tool_outcomes = Vec::new();

        for step in 1..=self.max_steps {
            let response = LlmCall::from_messages(history.clone())
                .with_name("agent")
                .with_tools(declarations.clone())
                .with_temperature_opt(self.temperature)
                .invoke(self.backend.as_ref(), ctx)
                .await
                .map_err(|report| {
                    if report.current_context().is_interruption() {
                        report.context(AgentError::Interrupted)
                    } else {
                        report.context(AgentError::ModelCallFailed { step })
                    }
                })?;

            if response.tool_calls.is_empty() {
                info!(steps = step, tools = tool_outcomes.len(), "agent answered");
                return Ok(AgentRun {
                    answer: response.content,
                    steps: step,
                    tool_outcomes,
                });
            }

            debug!(step, calls = response.tool_calls.len(), "model requested tools");
            let outcomes = ctx
                .guard(self.registry.invoke_all(&response.tool_calls))
                .await
                .map_err(|_| Report::new(AgentError::Interrupted))?;

            history.push(LlmMessage::assistant_tool_calls(
                response.content,
                response.tool_calls,
            ));
            for outcome in &outcomes {
                history.push(
                    LlmMessage::tool(outcome.tool.as_str(), outcome.to_message_content())
                        .with_tool_call_id(outcome.call_id.as_str()),
                );
            }
            tool_outcomes.extend(outcomes);
        }

        Err(Report::new(AgentError::MaxStepsExceeded {
            max_steps: self.max_steps,
        }))
    }
}

/// Runs an agent as a fallback pipeline stage.
///
/// The stage fails when the agent fails or when any tool call it made was
/// rejected or failed, so the pipeline can fall back to its secondary stage.
pub struct AgentStage {
    name: String,
    agent: ToolCallingAgent,
}

impl AgentStage {
    /// Wraps an agent.
    #[must_use]
    pub fn new(name: impl Into<String>, agent: ToolCallingAgent) -> Self {
        Self {
            name: name.into(),
            agent,
        }
    }
}

#[async_trait]
impl Stage for AgentStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError> {
        let run = self.agent.run(request.text(), ctx).await.map_err(|report| {
            report.context(StageError::CallFailed {
                stage: self.name.clone(),
            })
        })?;

        if let Some(failed) = run.first_tool_failure() {
            let reason = failed
                .error
                .as_ref()
                .map_or_else(|| "tool failed".to_string(), ToolError::to_string);
            return Err(Report::new(StageError::Failed {
                stage: self.name.clone(),
                reason,
            }));
        }
        Ok(run.answer)
    }
}
