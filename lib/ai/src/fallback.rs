//! Sequential fallback pipeline.
//!
//! Three stages run strictly in order over one [`FallbackState`]:
//!
//! 1. **primary** attempts the main action. Failure is recorded in the state
//!    and never aborts the run.
//! 2. **secondary** always runs as a step, but only performs its fallback
//!    action when the primary failed.
//! 3. **presentation** turns the result into user-facing text, emitting a
//!    fixed apology when there is no result.
//!
//! Cancellation and deadline expiry are the only ways a run fails, and then
//! no partial state is returned.

use crate::backend::LlmBackend;
use crate::context::{Interruption, RequestContext};
use crate::error::{FallbackError, StageError};
use crate::llm_call::LlmCall;
use crate::request::Request;
use async_trait::async_trait;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Apology emitted when neither stage produced a result.
pub const DEFAULT_APOLOGY: &str = "I'm sorry, I could not retrieve the location information.";

/// Where a pipeline run is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    /// The primary stage is running.
    Primary,
    /// The primary failed and the secondary performed its fallback action.
    SecondaryRun,
    /// The primary succeeded and the secondary was a no-op.
    SecondarySkipped,
    /// Presentation finished.
    Done,
}

/// Request-scoped state shared by the stages.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FallbackState {
    /// Set when the primary stage failed.
    pub primary_failed: bool,
    /// The best result produced so far.
    pub result: Option<String>,
    /// Phases visited, in order.
    pub phases: Vec<PipelinePhase>,
    /// Stage failures, recorded as data.
    pub stage_errors: Vec<StageError>,
}

impl FallbackState {
    fn enter(&mut self, phase: PipelinePhase) {
        self.phases.push(phase);
    }

    /// Returns the current phase.
    #[must_use]
    pub fn phase(&self) -> PipelinePhase {
        self.phases.last().copied().unwrap_or(PipelinePhase::Primary)
    }

    /// Returns the result if it contains any non-whitespace text.
    #[must_use]
    pub fn usable_result(&self) -> Option<&str> {
        self.result.as_deref().filter(|r| !r.trim().is_empty())
    }
}

/// A pipeline stage producing a result text.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Name used in errors and logs.
    fn name(&self) -> &str;

    /// Runs the stage.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] when no result could be produced.
    async fn run(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError>;
}

/// Formats a result for the user.
#[async_trait]
pub trait Presenter: Send + Sync {
    /// Formats a non-empty result.
    ///
    /// # Errors
    ///
    /// Returns a [`StageError`] if formatting fails; the pipeline then shows
    /// the result unformatted.
    async fn present(
        &self,
        request: &Request,
        result: &str,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError>;
}

type StageFn = dyn Fn(&Request) -> Result<String, StageError> + Send + Sync;

/// A stage backed by a synchronous function.
pub struct FnStage {
    name: String,
    func: Box<StageFn>,
}

impl FnStage {
    /// Creates a stage.
    #[must_use]
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Request) -> Result<String, StageError> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Stage for FnStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        request: &Request,
        _ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError> {
        (self.func)(request).map_err(Report::new)
    }
}

/// A stage that answers with a model call.
pub struct LlmStage {
    name: String,
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
}

impl LlmStage {
    /// Creates a stage with the given system instruction.
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
        }
    }
}

#[async_trait]
impl Stage for LlmStage {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError> {
        let result = LlmCall::new(request.text())
            .with_name(self.name.as_str())
            .with_system_prompt(self.system_prompt.as_str())
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| {
                report.context(StageError::CallFailed {
                    stage: self.name.clone(),
                })
            })?;
        Ok(result.content)
    }
}

/// Presents the result unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct VerbatimPresenter;

#[async_trait]
impl Presenter for VerbatimPresenter {
    async fn present(
        &self,
        _request: &Request,
        result: &str,
        _ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError> {
        Ok(result.to_string())
    }
}

/// Asks a model to phrase the result for the user.
pub struct LlmPresenter {
    backend: Arc<dyn LlmBackend>,
    system_prompt: String,
}

impl LlmPresenter {
    /// Default instruction for the presentation call.
    pub const DEFAULT_SYSTEM_PROMPT: &'static str =
        "Present the retrieved information to the user clearly and concisely. Do not add facts that are not in it.";

    /// Creates a presenter with [`Self::DEFAULT_SYSTEM_PROMPT`].
    #[must_use]
    pub fn new(backend: Arc<dyn LlmBackend>) -> Self {
        Self {
            backend,
            system_prompt: Self::DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    /// Replaces the system instruction.
    #[must_use]
    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }
}

#[async_trait]
impl Presenter for LlmPresenter {
    async fn present(
        &self,
        request: &Request,
        result: &str,
        ctx: &RequestContext,
    ) -> switchyard_core::Result<String, StageError> {
        let prompt = format!("User request: {request}\n\nRetrieved information: {result}");
        let response = LlmCall::new(prompt)
            .with_name("presentation")
            .with_system_prompt(self.system_prompt.as_str())
            .invoke(self.backend.as_ref(), ctx)
            .await
            .map_err(|report| {
                report.context(StageError::CallFailed {
                    stage: "presentation".to_string(),
                })
            })?;
        Ok(response.content)
    }
}

/// The outcome of a completed pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackOutcome {
    /// Text shown to the user.
    pub output: String,
    /// Final shared state.
    pub state: FallbackState,
    /// True when the output is the apology.
    pub apologized: bool,
}

/// Primary, conditional secondary, presentation.
pub struct FallbackPipeline {
    primary: Arc<dyn Stage>,
    secondary: Arc<dyn Stage>,
    presenter: Arc<dyn Presenter>,
    apology: String,
}

impl FallbackPipeline {
    /// Creates a pipeline that presents results verbatim.
    #[must_use]
    pub fn new(primary: Arc<dyn Stage>, secondary: Arc<dyn Stage>) -> Self {
        Self {
            primary,
            secondary,
            presenter: Arc::new(VerbatimPresenter),
            apology: DEFAULT_APOLOGY.to_string(),
        }
    }

    /// Replaces the presenter.
    #[must_use]
    pub fn with_presenter(mut self, presenter: Arc<dyn Presenter>) -> Self {
        self.presenter = presenter;
        self
    }

    /// Replaces the apology text.
    #[must_use]
    pub fn with_apology(mut self, apology: impl Into<String>) -> Self {
        self.apology = apology.into();
        self
    }

    /// Runs all three stages.
    ///
    /// # Errors
    ///
    /// Returns [`FallbackError::Cancelled`] or
    /// [`FallbackError::DeadlineExceeded`] if the request is abandoned at any
    /// point. Stage failures are never errors.
    #[instrument(skip(self, request, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn run(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<FallbackOutcome, Report<FallbackError>> {
        let mut state = FallbackState::default();

        state.enter(PipelinePhase::Primary);
        check(ctx)?;
        match self.primary.run(request, ctx).await {
            Ok(result) => {
                state.primary_failed = false;
                state.result = Some(result);
            }
            Err(report) => {
                check(ctx)?;
                warn!(stage = self.primary.name(), error = %report, "primary stage failed");
                state.primary_failed = true;
                state.result = None;
                state.stage_errors.push(report.current_context().clone());
            }
        }

        if state.primary_failed {
            state.enter(PipelinePhase::SecondaryRun);
            check(ctx)?;
            match self.secondary.run(request, ctx).await {
                Ok(result) => state.result = Some(result),
                Err(report) => {
                    check(ctx)?;
                    warn!(stage = self.secondary.name(), error = %report, "secondary stage failed");
                    state.stage_errors.push(report.current_context().clone());
                }
            }
        } else {
            state.enter(PipelinePhase::SecondarySkipped);
        }

        check(ctx)?;
        let usable = state.usable_result().map(str::to_string);
        let (output, apologized) = match usable {
            None => (self.apology.clone(), true),
            Some(result) => match self.presenter.present(request, &result, ctx).await {
                Ok(text) if !text.trim().is_empty() => (text, false),
                Ok(_) => {
                    warn!("presentation was blank, showing raw result");
                    (result, false)
                }
                Err(report) => {
                    check(ctx)?;
                    warn!(error = %report, "presentation failed, showing raw result");
                    state.stage_errors.push(report.current_context().clone());
                    (result, false)
                }
            },
        };
        state.enter(PipelinePhase::Done);

        info!(
            primary_failed = state.primary_failed,
            apologized,
            "fallback pipeline finished"
        );
        Ok(FallbackOutcome {
            output,
            state,
            apologized,
        })
    }
}

fn check(ctx: &RequestContext) -> Result<(), Report<FallbackError>> {
    let request_id = ctx.request_id();
    match ctx.interruption() {
        None => Ok(()),
        Some(Interruption::Cancelled) => Err(Report::new(FallbackError::Cancelled { request_id })),
        Some(Interruption::DeadlineExceeded) => {
            Err(Report::new(FallbackError::DeadlineExceeded { request_id }))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::scripted::ScriptedBackend;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LOCATION: &str = "123 Main St, NY";

    fn failing(name: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, move |_| {
            Err(StageError::Failed {
                stage: name.to_string(),
                reason: "tool failed".to_string(),
            })
        }))
    }

    fn succeeding(name: &'static str, text: &'static str) -> Arc<dyn Stage> {
        Arc::new(FnStage::new(name, move |_| Ok(text.to_string())))
    }

    async fn run(pipeline: &FallbackPipeline) -> FallbackOutcome {
        pipeline
            .run(&Request::new("Where is the office?"), &RequestContext::new())
            .await
            .expect("pipeline never fails without cancellation")
    }

    #[tokio::test]
    async fn primary_failure_runs_secondary() {
        let pipeline = FallbackPipeline::new(
            failing("primary"),
            succeeding("secondary", "General information for New York"),
        );
        let outcome = run(&pipeline).await;
        assert!(outcome.state.primary_failed);
        assert_eq!(outcome.output, "General information for New York");
        assert_eq!(
            outcome.state.phases,
            vec![
                PipelinePhase::Primary,
                PipelinePhase::SecondaryRun,
                PipelinePhase::Done
            ]
        );
        assert_eq!(outcome.state.stage_errors.len(), 1);
    }

    #[tokio::test]
    async fn primary_success_skips_secondary() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let secondary: Arc<dyn Stage> = Arc::new(FnStage::new("secondary", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("should not be used".to_string())
        }));

        let pipeline = FallbackPipeline::new(succeeding("primary", LOCATION), secondary);
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, LOCATION);
        assert!(!outcome.state.primary_failed);
        assert_eq!(outcome.state.phase(), PipelinePhase::Done);
        assert!(outcome.state.phases.contains(&PipelinePhase::SecondarySkipped));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_result_emits_apology() {
        let pipeline = FallbackPipeline::new(failing("primary"), failing("secondary"));
        let outcome = run(&pipeline).await;
        assert!(outcome.apologized);
        assert_eq!(outcome.output, DEFAULT_APOLOGY);
        assert_eq!(outcome.state.result, None);
        assert_eq!(outcome.state.stage_errors.len(), 2);
    }

    #[tokio::test]
    async fn blank_result_emits_custom_apology() {
        let pipeline = FallbackPipeline::new(succeeding("primary", "  \n"), failing("secondary"))
            .with_apology("Nothing found.");
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, "Nothing found.");
        assert!(outcome.apologized);
    }

    #[tokio::test]
    async fn llm_presenter_formats_result() {
        let backend =
            Arc::new(ScriptedBackend::new().with_text("The office is at 123 Main St, NY."));
        let pipeline = FallbackPipeline::new(succeeding("primary", LOCATION), failing("secondary"))
            .with_presenter(Arc::new(LlmPresenter::new(backend.clone())));
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, "The office is at 123 Main St, NY.");
        assert!(
            backend.requests()[0]
                .last_user_text()
                .is_some_and(|text| text.contains(LOCATION))
        );
    }

    #[tokio::test]
    async fn presenter_failure_shows_raw_result() {
        let backend = Arc::new(ScriptedBackend::new().with_error(LlmError::Timeout));
        let pipeline = FallbackPipeline::new(succeeding("primary", LOCATION), failing("secondary"))
            .with_presenter(Arc::new(LlmPresenter::new(backend)));
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, LOCATION);
        assert!(!outcome.apologized);
    }

    #[tokio::test]
    async fn blank_presentation_shows_raw_result() {
        let backend = Arc::new(ScriptedBackend::new().with_text("   "));
        let pipeline = FallbackPipeline::new(succeeding("primary", LOCATION), failing("secondary"))
            .with_presenter(Arc::new(LlmPresenter::new(backend)));
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, LOCATION);
        assert!(!outcome.apologized);
        assert_eq!(outcome.state.phase(), PipelinePhase::Done);
    }

    #[tokio::test]
    async fn llm_stage_failure_degrades_to_secondary() {
        let backend = Arc::new(ScriptedBackend::new().with_error(LlmError::Timeout));
        let primary: Arc<dyn Stage> =
            Arc::new(LlmStage::new("primary", backend, "Find the precise location."));
        let pipeline = FallbackPipeline::new(primary, succeeding("secondary", "General area"));
        let outcome = run(&pipeline).await;
        assert_eq!(outcome.output, "General area");
        assert_eq!(
            outcome.state.stage_errors[0],
            StageError::CallFailed {
                stage: "primary".to_string()
            }
        );
    }

    #[tokio::test]
    async fn cancellation_fails_the_run() {
        let backend = Arc::new(ScriptedBackend::new().with_text(LOCATION));
        let primary: Arc<dyn Stage> =
            Arc::new(LlmStage::new("primary", backend, "Find the precise location."));
        let pipeline = FallbackPipeline::new(primary, succeeding("secondary", "General area"));
        let ctx = RequestContext::new();
        ctx.cancellation_token().cancel();

        let err = pipeline
            .run(&Request::new("Where is the office?"), &ctx)
            .await
            .expect_err("should fail");
        assert_eq!(
            err.current_context(),
            &FallbackError::Cancelled {
                request_id: ctx.request_id()
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_during_primary_fails_the_run() {
        let backend = Arc::new(
            ScriptedBackend::new()
                .with_text(LOCATION)
                .with_delay(std::time::Duration::from_secs(30)),
        );
        let primary: Arc<dyn Stage> =
            Arc::new(LlmStage::new("primary", backend, "Find the precise location."));
        let pipeline = FallbackPipeline::new(primary, succeeding("secondary", "General area"));
        let ctx = RequestContext::new().with_timeout(std::time::Duration::from_secs(1));

        let err = pipeline
            .run(&Request::new("Where is the office?"), &ctx)
            .await
            .expect_err("should fail");
        assert!(matches!(
            err.current_context(),
            FallbackError::DeadlineExceeded { .. }
        ));
    }
}
