//! Generate, critique, refine.

use crate::backend::{LlmBackend, LlmMessage};
use crate::context::RequestContext;
use crate::error::ReflectionError;
use crate::llm_call::LlmCall;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Settings for a reflection loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReflectionConfig {
    /// Upper bound on generate/critique rounds.
    pub max_iterations: u32,
    /// The critic signals convergence by including this phrase.
    pub stop_phrase: String,
    /// Optional system instruction for the generator.
    pub generator_system_prompt: Option<String>,
    /// System instruction for the critic.
    pub critic_system_prompt: String,
    /// User message asking the generator to revise.
    pub refine_instruction: String,
}

impl Default for ReflectionConfig {
    fn default() -> Self {
        Self {
            max_iterations: 3,
            stop_phrase: "CODE_IS_PERFECT".to_string(),
            generator_system_prompt: None,
            critic_system_prompt: "You are a senior software engineer and an expert in Python. \
                Your role is to perform a meticulous code review. Critically evaluate the \
                provided code based on the original task requirements. Look for bugs, style \
                issues, missing edge cases, and areas for improvement. If the code is perfect \
                and meets all requirements, respond with the single phrase 'CODE_IS_PERFECT'. \
                Otherwise, provide a bulleted list of your critiques."
                .to_string(),
            refine_instruction: "Please refine the code using the critiques provided.".to_string(),
        }
    }
}

impl ReflectionConfig {
    /// Sets the iteration bound.
    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets the critic's system instruction.
    #[must_use]
    pub fn with_critic_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.critic_system_prompt = prompt.into();
        self
    }
}

/// One round of the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionIteration {
    /// 1-based round number.
    pub iteration: u32,
    /// The generator's draft.
    pub draft: String,
    /// The critic's response to the draft.
    pub critique: String,
}

/// The result of a reflection loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReflectionOutcome {
    /// The last draft produced.
    pub final_draft: String,
    /// Every round, in order.
    pub iterations: Vec<ReflectionIteration>,
    /// True if the critic accepted a draft before the bound was reached.
    pub converged: bool,
}

/// Runs a generator and a critic against each other.
pub struct ReflectionLoop {
    backend: Arc<dyn LlmBackend>,
    config: ReflectionConfig,
}

impl ReflectionLoop {
    /// Creates a loop with default settings.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            config: ReflectionConfig::default(),
        }
    }

    /// Replaces the settings.
    #[must_use]
    pub fn with_config(mut self, config: ReflectionConfig) -> Self {
        self.config = config;
        self
    }

    /// Refines a draft for `task` until the critic accepts it or the
    /// iteration bound is reached.
    ///
    /// # Errors
    ///
    /// Returns [`ReflectionError`] naming the round whose model call failed.
    #[instrument(skip(self, task, ctx), fields(request_id = %ctx.request_id(), max_iterations = self.config.max_iterations))]
    pub async fn run(
        &self,
        task: &str,
        ctx: &RequestContext,
    ) -> Result<ReflectionOutcome, Report<ReflectionError>> {
        let mut history = Vec::new();
        if let Some(system) = &self.config.generator_system_prompt {
            history.push(LlmMessage::system(system.as_str()));
        }
        history.push(LlmMessage::user(task));

        let mut iterations = Vec::new();
        let mut final_draft = String::new();
        let mut converged = false;

        for iteration in 1..=self.config.max_iterations.max(1) {
            if iteration > 1 {
                history.push(LlmMessage::user(self.config.refine_instruction.as_str()));
            }

            let draft = LlmCall::from_messages(history.clone())
                .with_name("generator")
                .invoke(self.backend.as_ref(), ctx)
                .await
                .map_err(|report| report.context(ReflectionError::GenerationFailed { iteration }))?
                .content;
            history.push(LlmMessage::assistant(draft.as_str()));

            let critique = LlmCall::new(format!(
                "Original Task:\n{task}\n\nCode to Review:\n{draft}"
            ))
            .with_name("critic")
            .with_system_prompt(self.config.critic_system_prompt.as_str())
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| report.context(ReflectionError::CritiqueFailed { iteration }))?
            .content;

            final_draft.clone_from(&draft);
            let accepted = critique.contains(&self.config.stop_phrase);
            debug!(iteration, accepted, "reflection round finished");
            if !accepted {
                history.push(LlmMessage::user(format!(
                    "Critique of the previous code:\n{critique}"
                )));
            }
            iterations.push(ReflectionIteration {
                iteration,
                draft,
                critique,
            });
            if accepted {
                converged = true;
                break;
            }
        }

        info!(rounds = iterations.len(), converged, "reflection finished");
        Ok(ReflectionOutcome {
            final_draft,
            iterations,
            converged,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MessageRole;
    use crate::error::LlmError;
    use crate::scripted::ScriptedBackend;

    #[tokio::test]
    async fn stops_when_critic_accepts() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("def f(): pass")
                .with_text("- missing docstring")
                .with_text("def f():\n    \"\"\"Doc.\"\"\"")
                .with_text("CODE_IS_PERFECT"),
        );
        let outcome = ReflectionLoop::new(backend.clone())
            .run("Write f", &RequestContext::new())
            .await
            .expect("reflection");

        assert!(outcome.converged);
        assert_eq!(outcome.iterations.len(), 2);
        assert_eq!(outcome.final_draft, "def f():\n    \"\"\"Doc.\"\"\"");

        let requests = backend.requests();
        let second_generation = &requests[2].messages;
        assert_eq!(second_generation.len(), 4);
        assert_eq!(second_generation[1].role, MessageRole::Assistant);
        assert_eq!(
            second_generation[2].content,
            "Critique of the previous code:\n- missing docstring"
        );
        assert_eq!(
            second_generation[3].content,
            "Please refine the code using the critiques provided."
        );
        assert_eq!(
            requests[1].last_user_text(),
            Some("Original Task:\nWrite f\n\nCode to Review:\ndef f(): pass")
        );
    }

    #[tokio::test]
    async fn respects_iteration_bound() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|request| {
            if request.system_text().is_some() {
                Ok(crate::backend::LlmResponse::text("- still wrong"))
            } else {
                Ok(crate::backend::LlmResponse::text("draft"))
            }
        }));
        let outcome = ReflectionLoop::new(backend.clone())
            .with_config(ReflectionConfig::default().with_max_iterations(2))
            .run("Write f", &RequestContext::new())
            .await
            .expect("reflection");

        assert!(!outcome.converged);
        assert_eq!(outcome.iterations.len(), 2);
        assert_eq!(backend.requests().len(), 4);
    }

    #[tokio::test]
    async fn critic_failure_names_round() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text("draft")
                .with_error(LlmError::Timeout),
        );
        let err = ReflectionLoop::new(backend)
            .run("Write f", &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &ReflectionError::CritiqueFailed { iteration: 1 }
        );
    }
}
