//! Prompt chaining: each step's output feeds the next step's prompt.

use crate::backend::LlmBackend;
use crate::context::RequestContext;
use crate::error::ChainError;
use crate::llm_call::LlmCall;
use crate::prompt::{ChatPrompt, PromptTemplate, PromptVariables};
use rootcause::Report;
use std::sync::Arc;
use tracing::{debug, instrument};

/// One step of a chain.
#[derive(Debug, Clone)]
pub struct ChainStep {
    /// Step name, used in errors and logs.
    pub name: String,
    /// Prompt rendered against the accumulated variables.
    pub prompt: ChatPrompt,
    /// Variable the trimmed output is stored under.
    pub output: String,
}

impl ChainStep {
    /// Creates a step.
    #[must_use]
    pub fn new(name: impl Into<String>, prompt: ChatPrompt, output: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt,
            output: output.into(),
        }
    }
}

/// The result of running a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainOutcome {
    /// Inputs plus every step's output.
    pub variables: PromptVariables,
    /// Output of the last step.
    pub final_output: String,
}

/// An ordered sequence of model calls.
pub struct PromptChain {
    backend: Arc<dyn LlmBackend>,
    steps: Vec<ChainStep>,
    temperature: Option<f32>,
}

impl PromptChain {
    /// Creates an empty chain.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            steps: Vec::new(),
            temperature: None,
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn step(mut self, step: ChainStep) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the temperature for every step.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Runs the steps in order.
    ///
    /// # Errors
    ///
    /// Returns [`ChainError::Prompt`] if a step's prompt references a value
    /// that is not available yet, or [`ChainError::StepFailed`] if a model
    /// call fails.
    #[instrument(skip(self, inputs, ctx), fields(request_id = %ctx.request_id(), steps = self.steps.len()))]
    pub async fn run(
        &self,
        inputs: PromptVariables,
        ctx: &RequestContext,
    ) -> Result<ChainOutcome, Report<ChainError>> {
        let mut variables = inputs;
        let mut final_output = String::new();

        for step in &self.steps {
            let messages = step.prompt.render(&variables).map_err(|report| {
                report.context(ChainError::Prompt {
                    step: step.name.clone(),
                })
            })?;
            let result = LlmCall::from_messages(messages)
                .with_name(step.name.as_str())
                .with_temperature_opt(self.temperature)
                .invoke(self.backend.as_ref(), ctx)
                .await
                .map_err(|report| {
                    report.context(ChainError::StepFailed {
                        step: step.name.clone(),
                    })
                })?;

            let output = result.content.trim().to_string();
            debug!(step = %step.name, chars = output.len(), "chain step finished");
            variables.insert(step.output.clone(), output.clone());
            final_output = output;
        }

        Ok(ChainOutcome {
            variables,
            final_output,
        })
    }
}

/// Extracts technical specifications from free text and reshapes them into
/// a JSON object with `cpu`, `memory` and `storage` keys.
///
/// Input variable: `text_input`. Outputs: `specifications`, `json`.
#[must_use]
pub fn spec_extraction_chain(backend: Arc<dyn LlmBackend>) -> PromptChain {
    PromptChain::new(backend)
        .with_temperature(0.0)
        .step(ChainStep::new(
            "extract",
            ChatPrompt::user(PromptTemplate::new(
                "extract",
                "Extract the technical specifications from the following text, and output only the comma-separated specs:\n\n{{text_input}}",
            )),
            "specifications",
        ))
        .step(ChainStep::new(
            "transform",
            ChatPrompt::user(PromptTemplate::new(
                "transform",
                "Transform the following specifications into a JSON object with 'cpu', 'memory', and 'storage' as keys. Output ONLY the valid JSON object.\n\nSpecifications:\n{{specifications}}",
            )),
            "json",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::scripted::ScriptedBackend;

    fn inputs(text: &str) -> PromptVariables {
        PromptVariables::from([("text_input".to_string(), text.to_string())])
    }

    #[tokio::test]
    async fn outputs_feed_later_steps() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("  3.5 GHz octa-core, 16GB RAM, 1TB NVMe \n")
                .with_text(
                    r#"{"cpu": "3.5 GHz octa-core", "memory": "16GB", "storage": "1TB NVMe"}"#,
                ),
        );
        let outcome = spec_extraction_chain(backend.clone())
            .run(
                inputs(
                    "The new laptop has a 3.5 GHz octa-core processor, 16GB RAM and a 1TB NVMe SSD.",
                ),
                &RequestContext::new(),
            )
            .await
            .expect("chain");

        assert_eq!(
            outcome.variables.get("specifications").map(String::as_str),
            Some("3.5 GHz octa-core, 16GB RAM, 1TB NVMe")
        );
        assert!(outcome.final_output.starts_with(r#"{"cpu""#));

        let second = backend.requests()[1].last_user_text().unwrap_or_default().to_string();
        assert!(second.ends_with("Specifications:\n3.5 GHz octa-core, 16GB RAM, 1TB NVMe"));
    }

    #[tokio::test]
    async fn missing_input_fails_before_any_call() {
        let backend = Arc::new(ScriptedBackend::new().with_text("unused"));
        let err = spec_extraction_chain(backend.clone())
            .run(PromptVariables::new(), &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &ChainError::Prompt {
                step: "extract".to_string()
            }
        );
        assert!(backend.requests().is_empty());
    }

    #[tokio::test]
    async fn step_failure_is_named() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("specs")
                .with_error(LlmError::Timeout),
        );
        let err = spec_extraction_chain(backend)
            .run(inputs("text"), &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &ChainError::StepFailed {
                step: "transform".to_string()
            }
        );
    }
}
