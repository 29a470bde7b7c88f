//! Request-scoped execution context.
//!
//! A `RequestContext` travels with one request from the first model call to
//! the last. It carries the request id used in log fields, the caller's
//! cancellation token and an optional deadline. Every model call races the
//! token and the deadline, so abandoning a request stops whatever stage is
//! currently waiting on the network.

use std::future::Future;
use std::time::Duration;
use switchyard_core::RequestId;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why an in-flight operation was abandoned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interruption {
    /// The cancellation token fired.
    Cancelled,
    /// The deadline passed.
    DeadlineExceeded,
}

/// Context for a single request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: RequestId,
    cancel: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context with a fresh request id, no deadline and its own
    /// cancellation token.
    #[must_use]
    pub fn new() -> Self {
        Self {
            request_id: RequestId::new(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Uses the given token for cancellation.
    ///
    /// Pass a child of a process-wide token to cancel all requests at once.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Sets a deadline relative to now.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Sets an absolute deadline.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the request id.
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the cancellation token.
    #[must_use]
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Reports whether the request has already been abandoned.
    #[must_use]
    pub fn interruption(&self) -> Option<Interruption> {
        if self.cancel.is_cancelled() {
            Some(Interruption::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(Interruption::DeadlineExceeded)
        } else {
            None
        }
    }

    /// Drives `future` to completion unless the request is cancelled or
    /// its deadline passes first.
    ///
    /// # Errors
    ///
    /// Returns the interruption that won the race.
    pub async fn guard<F>(&self, future: F) -> Result<F::Output, Interruption>
    where
        F: Future,
    {
        if let Some(interruption) = self.interruption() {
            return Err(interruption);
        }

        tokio::select! {
            biased;
            () = self.cancel.cancelled() => Err(Interruption::Cancelled),
            () = wait_for(self.deadline) => Err(Interruption::DeadlineExceeded),
            output = future => Ok(output),
        }
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
