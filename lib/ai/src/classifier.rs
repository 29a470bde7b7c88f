//! LLM-backed classification into a closed label set.

use crate::backend::LlmBackend;
use crate::context::RequestContext;
use crate::error::ClassifyError;
use crate::label::LabelSet;
use crate::llm_call::LlmCall;
use crate::request::Request;
use rootcause::Report;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Default instruction placed before the label list.
pub const DEFAULT_PREAMBLE: &str =
    "Analyze the user's request and determine which specialist handler should process it.";

/// The outcome of classifying one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification<L> {
    /// The selected label.
    pub label: L,
    /// The raw model output.
    pub raw: String,
    /// False when the output matched no label and the fallback was used.
    pub matched: bool,
}

/// Classifies requests into `L` with a single model call.
pub struct Classifier<L> {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
    _labels: PhantomData<fn() -> L>,
}

impl<L: LabelSet> Classifier<L> {
    /// Creates a classifier using [`DEFAULT_PREAMBLE`].
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            system_prompt: instruction_for::<L>(DEFAULT_PREAMBLE),
            _labels: PhantomData,
        }
    }

    /// Replaces the text placed before the label list.
    #[must_use]
    pub fn with_preamble(mut self, preamble: &str) -> Self {
        self.system_prompt = instruction_for::<L>(preamble);
        self
    }

    /// Returns the full system instruction sent to the model.
    #[must_use]
    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Classifies `request`.
    ///
    /// Output outside the label set is not an error: it yields
    /// [`LabelSet::FALLBACK`] with `matched == false`.
    ///
    /// # Errors
    ///
    /// Returns [`ClassifyError::Interrupted`] when the request is cancelled
    /// or runs out of time, and [`ClassifyError::CallFailed`] for any other
    /// model call failure.
    #[instrument(skip(self, request, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn classify(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<Classification<L>, Report<ClassifyError>> {
        let request_id = ctx.request_id();
        let result = LlmCall::new(request.text())
            .with_name("classifier")
            .with_system_prompt(self.system_prompt.as_str())
            .with_temperature(0.0)
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| {
                if report.current_context().is_interruption() {
                    report.context(ClassifyError::Interrupted { request_id })
                } else {
                    report.context(ClassifyError::CallFailed { request_id })
                }
            })?;

        let (label, matched) = L::parse_or_fallback(&result.content);
        if !matched {
            warn!(
                raw = %result.content,
                fallback = label.as_str(),
                "classifier output outside label set"
            );
        }
        info!(
            label = label.as_str(),
            matched,
            latency_ms = result.latency_ms,
            "request classified"
        );
        Ok(Classification {
            label,
            raw: result.content,
            matched,
        })
    }
}

/// Builds the system instruction for a label set.
#[must_use]
pub fn instruction_for<L: LabelSet>(preamble: &str) -> String {
    let mut prompt = String::from(preamble.trim());
    for label in L::ALL {
        prompt.push_str(&format!(
            "\n- If {}, output '{}'.",
            label.description(),
            label.as_str()
        ));
    }
    prompt.push_str("\nONLY output one word: ");
    prompt.push_str(&quoted_list(L::ALL.iter().map(LabelSet::as_str)));
    prompt.push('.');
    prompt
}

fn quoted_list<'a>(items: impl Iterator<Item = &'a str>) -> String {
    let quoted: Vec<String> = items.map(|item| format!("'{item}'")).collect();
    match quoted.as_slice() {
        [] => String::new(),
        [one] => one.clone(),
        [a, b] => format!("{a} or {b}"),
        [rest @ .., last] => format!("{}, or {last}", rest.join(", ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MessageRole;
    use crate::error::LlmError;
    use crate::label::CoordinatorLabel;
    use crate::scripted::ScriptedBackend;

    fn classifier(backend: &Arc<ScriptedBackend>) -> Classifier<CoordinatorLabel> {
        Classifier::new(backend.clone())
    }

    #[test]
    fn instruction_lists_every_label() {
        let prompt = instruction_for::<CoordinatorLabel>(DEFAULT_PREAMBLE);
        assert!(prompt.starts_with(DEFAULT_PREAMBLE));
        assert!(prompt.contains(
            "- If the request is related to booking flights or hotels, output 'booker'."
        ));
        assert!(prompt.ends_with("ONLY output one word: 'booker', 'info', or 'unclear'."));
    }

    #[test]
    fn quoted_list_shapes() {
        assert_eq!(quoted_list(["a"].into_iter()), "'a'");
        assert_eq!(quoted_list(["a", "b"].into_iter()), "'a' or 'b'");
    }

    #[tokio::test]
    async fn exact_label_is_matched() {
        let backend = Arc::new(ScriptedBackend::new().with_text("booker"));
        let result = classifier(&backend)
            .classify(&Request::new("Book me a flight to London."), &RequestContext::new())
            .await
            .expect("classify");
        assert_eq!(result.label, CoordinatorLabel::Booker);
        assert!(result.matched);

        let sent = &backend.requests()[0];
        assert_eq!(sent.temperature, Some(0.0));
        assert_eq!(sent.messages[0].role, MessageRole::System);
        assert_eq!(sent.last_user_text(), Some("Book me a flight to London."));
    }

    #[tokio::test]
    async fn padded_output_is_normalized() {
        let backend = Arc::new(ScriptedBackend::new().with_text("  Info \n"));
        let result = classifier(&backend)
            .classify(&Request::new("What is the capital of Italy?"), &RequestContext::new())
            .await
            .expect("classify");
        assert_eq!(result.label, CoordinatorLabel::Info);
        assert_eq!(result.raw, "  Info \n");
    }

    #[tokio::test]
    async fn unknown_output_uses_fallback_label() {
        let backend = Arc::new(ScriptedBackend::new().with_text("xyz"));
        let result = classifier(&backend)
            .classify(&Request::new("Tell me about quantum physics."), &RequestContext::new())
            .await
            .expect("ambiguity is not an error");
        assert_eq!(result.label, CoordinatorLabel::Unclear);
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn call_failure_is_an_error() {
        let backend = Arc::new(ScriptedBackend::new().with_error(LlmError::Timeout));
        let ctx = RequestContext::new();
        let err = classifier(&backend)
            .classify(&Request::new("hi"), &ctx)
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &ClassifyError::CallFailed {
                request_id: ctx.request_id()
            }
        );
    }

    #[tokio::test]
    async fn cancellation_is_distinguished() {
        let backend = Arc::new(ScriptedBackend::new().with_text("booker"));
        let ctx = RequestContext::new();
        ctx.cancellation_token().cancel();
        let err = classifier(&backend)
            .classify(&Request::new("hi"), &ctx)
            .await
            .expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            ClassifyError::Interrupted { .. }
        ));
    }
}
