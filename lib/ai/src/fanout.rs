//! Parallel fan-out over one topic, then a synthesis call.

use crate::backend::LlmBackend;
use crate::context::RequestContext;
use crate::error::FanOutError;
use crate::llm_call::LlmCall;
use crate::prompt::{ChatPrompt, PromptTemplate, PromptVariables};
use futures::future::try_join_all;
use rootcause::Report;
use std::sync::Arc;
use tracing::{info, instrument};

/// A branch: a system instruction applied to the topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    /// Branch name; its output is available to the synthesis prompt under
    /// this name.
    pub name: String,
    /// System instruction for the branch call.
    pub system_prompt: String,
}

impl Branch {
    /// Creates a branch.
    #[must_use]
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
        }
    }
}

/// The result of a fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanOutOutcome {
    /// `(branch name, output)` in branch order.
    pub branches: Vec<(String, String)>,
    /// The synthesized answer.
    pub answer: String,
}

/// Runs branches concurrently and merges their outputs.
pub struct FanOut {
    backend: Arc<dyn LlmBackend>,
    branches: Vec<Branch>,
    synthesis: ChatPrompt,
}

impl FanOut {
    /// Creates a fan-out with the given synthesis prompt. The prompt sees
    /// every branch output by name plus `topic`.
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>, synthesis: ChatPrompt) -> Self {
        Self {
            backend,
            branches: Vec::new(),
            synthesis,
        }
    }

    /// Adds a branch.
    #[must_use]
    pub fn branch(mut self, branch: Branch) -> Self {
        self.branches.push(branch);
        self
    }

    /// Runs every branch on `topic`, then the synthesis.
    ///
    /// # Errors
    ///
    /// Fails with [`FanOutError::BranchFailed`] as soon as any branch fails.
    #[instrument(skip(self, topic, ctx), fields(request_id = %ctx.request_id(), branches = self.branches.len()))]
    pub async fn run(
        &self,
        topic: &str,
        ctx: &RequestContext,
    ) -> Result<FanOutOutcome, Report<FanOutError>> {
        if self.branches.is_empty() {
            return Err(Report::new(FanOutError::NoBranches));
        }

        let calls = self.branches.iter().map(|branch| async move {
            let result = LlmCall::new(topic)
                .with_name(branch.name.as_str())
                .with_system_prompt(branch.system_prompt.as_str())
                .invoke(self.backend.as_ref(), ctx)
                .await
                .map_err(|report| {
                    report.context(FanOutError::BranchFailed {
                        branch: branch.name.clone(),
                    })
                })?;
            Ok::<_, Report<FanOutError>>((branch.name.clone(), result.content.trim().to_string()))
        });
        let branches = try_join_all(calls).await?;

        let mut variables: PromptVariables = branches.iter().cloned().collect();
        variables.insert("topic".to_string(), topic.to_string());
        let messages = self
            .synthesis
            .render(&variables)
            .map_err(|report| report.context(FanOutError::Prompt))?;
        let answer = LlmCall::from_messages(messages)
            .with_name("synthesis")
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| report.context(FanOutError::SynthesisFailed))?
            .content;

        info!(branches = branches.len(), "fan-out synthesized");
        Ok(FanOutOutcome { branches, answer })
    }
}

/// Summary, questions and key terms about a topic, synthesized into one
/// answer.
#[must_use]
pub fn research_fanout(backend: Arc<dyn LlmBackend>) -> FanOut {
    let synthesis =
        ChatPrompt::user(PromptTemplate::new("synthesis_user", "Original topic: {{topic}}"))
            .with_system(PromptTemplate::new(
                "synthesis_system",
                "Based on the following information:\n Summary: {{summary}}\n Related Questions: {{questions}}\n Key Terms: {{key_terms}}\n Synthesize a comprehensive answer.",
            ));
    FanOut::new(backend, synthesis)
        .branch(Branch::new("summary", "Summarize the following topic concisely:"))
        .branch(Branch::new(
            "questions",
            "Generate three interesting questions about the following topic:",
        ))
        .branch(Branch::new(
            "key_terms",
            "Identify 5-10 key terms from the following topic, separated by commas:",
        ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::LlmResponse;
    use crate::error::LlmError;
    use crate::scripted::ScriptedBackend;

    fn branch_responder(request: &crate::backend::LlmRequest) -> Result<LlmResponse, LlmError> {
        let system = request.system_text().unwrap_or_default();
        let text = if system.starts_with("Summarize") {
            "A summary."
        } else if system.starts_with("Generate three") {
            "Q1? Q2? Q3?"
        } else if system.starts_with("Identify") {
            "ownership, borrowing"
        } else {
            "Synthesized."
        };
        Ok(LlmResponse::text(text))
    }

    #[tokio::test]
    async fn branches_feed_synthesis() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(branch_responder));
        let outcome = research_fanout(backend.clone())
            .run("The Rust borrow checker", &RequestContext::new())
            .await
            .expect("fan-out");

        assert_eq!(outcome.answer, "Synthesized.");
        let names: Vec<&str> = outcome.branches.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["summary", "questions", "key_terms"]);

        let requests = backend.requests();
        assert_eq!(requests.len(), 4);
        let synthesis = requests
            .iter()
            .find(|r| r.last_user_text() == Some("Original topic: The Rust borrow checker"))
            .expect("synthesis request");
        let system = synthesis.system_text().unwrap_or_default();
        assert!(system.contains("Summary: A summary."));
        assert!(system.contains("Key Terms: ownership, borrowing"));
    }

    #[tokio::test]
    async fn branch_failure_fails_fanout() {
        let backend = Arc::new(ScriptedBackend::new().with_responder(|request| {
            if request
                .system_text()
                .is_some_and(|s| s.starts_with("Generate three"))
            {
                Err(LlmError::Timeout)
            } else {
                Ok(LlmResponse::text("ok"))
            }
        }));
        let err = research_fanout(backend)
            .run("topic", &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &FanOutError::BranchFailed {
                branch: "questions".to_string()
            }
        );
    }

    #[tokio::test]
    async fn empty_fanout_is_rejected() {
        let backend = Arc::new(ScriptedBackend::new());
        let fanout = FanOut::new(
            backend,
            ChatPrompt::user(PromptTemplate::new("s", "{{topic}}")),
        );
        let err = fanout
            .run("topic", &RequestContext::new())
            .await
            .expect_err("should fail");
        assert_eq!(err.current_context(), &FanOutError::NoBranches);
    }
}
