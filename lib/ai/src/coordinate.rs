//! Classify-and-delegate coordination.
//!
//! The coordinator runs one classification call, maps the label to exactly
//! one handler through its [`Router`], and returns that handler's result.
//! Classification failure is fatal; an unmatched label is not, since it
//! routes to the fallback handler.

use crate::backend::LlmBackend;
use crate::classifier::{Classification, Classifier};
use crate::context::RequestContext;
use crate::error::CoordinatorError;
use crate::handler::{booking_handler, info_handler, unclear_handler};
use crate::label::{CoordinatorLabel, LabelSet};
use crate::request::{HandlerResult, Request};
use crate::router::Router;
use chrono::{DateTime, Utc};
use rootcause::Report;
use std::sync::Arc;
use tracing::{info, instrument};

/// The result of delegating one request.
#[derive(Debug, Clone)]
pub struct Delegation<L> {
    /// How the request was classified.
    pub classification: Classification<L>,
    /// The selected handler's output.
    pub result: HandlerResult,
    /// When coordination started.
    pub started_at: DateTime<Utc>,
    /// When the handler finished.
    pub finished_at: DateTime<Utc>,
}

impl<L> Delegation<L> {
    /// Returns the total duration of the delegation.
    #[must_use]
    pub fn duration(&self) -> chrono::Duration {
        self.finished_at - self.started_at
    }
}

/// Classifies requests and delegates each to one handler.
pub struct Coordinator<L> {
    classifier: Classifier<L>,
    router: Router<L>,
}

impl<L: LabelSet> Coordinator<L> {
    /// Creates a coordinator from a classifier and a router over the same
    /// label set.
    #[must_use]
    pub fn new(classifier: Classifier<L>, router: Router<L>) -> Self {
        Self { classifier, router }
    }

    /// Returns the router.
    #[must_use]
    pub fn router(&self) -> &Router<L> {
        &self.router
    }

    /// Classifies `request` and runs the selected handler.
    ///
    /// # Errors
    ///
    /// Returns [`CoordinatorError::Interrupted`] on cancellation or deadline
    /// expiry, [`CoordinatorError::Classification`] if the classifier call
    /// fails and [`CoordinatorError::Handler`] if the handler fails.
    #[instrument(skip(self, request, ctx), fields(request_id = %ctx.request_id()))]
    pub async fn handle(
        &self,
        request: &Request,
        ctx: &RequestContext,
    ) -> Result<Delegation<L>, Report<CoordinatorError>> {
        let request_id = ctx.request_id();
        let started_at = Utc::now();

        let classification = self
            .classifier
            .classify(request, ctx)
            .await
            .map_err(|report| {
                if ctx.interruption().is_some() {
                    report.context(CoordinatorError::Interrupted { request_id })
                } else {
                    report.context(CoordinatorError::Classification { request_id })
                }
            })?;

        let handler = self.router.route(classification.label);
        let result = handler.handle(request, ctx).await.map_err(|report| {
            if ctx.interruption().is_some() {
                report.context(CoordinatorError::Interrupted { request_id })
            } else {
                report.context(CoordinatorError::Handler {
                    request_id,
                    handler: handler.name().to_string(),
                })
            }
        })?;

        info!(
            label = classification.label.as_str(),
            handler = %result.handler,
            "request delegated"
        );
        Ok(Delegation {
            classification,
            result,
            started_at,
            finished_at: Utc::now(),
        })
    }
}

/// The booking/info coordinator with simulated handlers.
#[must_use]
pub fn booking_coordinator(backend: Arc<dyn LlmBackend>) -> Coordinator<CoordinatorLabel> {
    let router = Router::builder()
        .route(CoordinatorLabel::Booker, booking_handler())
        .route(CoordinatorLabel::Info, info_handler())
        .fallback(unclear_handler());
    Coordinator::new(Classifier::new(backend), router)
}
