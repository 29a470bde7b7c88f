//! Request payloads and handler results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An opaque request text. Immutable once created.
///
/// The request id used for log correlation lives in the
/// [`RequestContext`](crate::context::RequestContext) that accompanies it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Request(String);

impl Request {
    /// Creates a request.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Returns the request text.
    #[must_use]
    pub fn text(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Request {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for Request {
    fn from(text: String) -> Self {
        Self(text)
    }
}

/// Text produced by a handler, tagged with the handler's name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandlerResult {
    /// Name of the handler that ran.
    pub handler: String,
    /// The handler's output.
    pub output: String,
}

impl HandlerResult {
    /// Creates a handler result.
    #[must_use]
    pub fn new(handler: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            handler: handler.into(),
            output: output.into(),
        }
    }
}
