//! Error types for the AI crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `LlmError`: Low-level model backend operations
//! - `PromptError`: Prompt template rendering
//! - `ClassifyError`: Label classification
//! - `HandlerError`: Delegated handler execution
//! - `CoordinatorError`: Classify-and-delegate requests
//! - `StageError` / `FallbackError`: Sequential fallback pipelines
//! - `ReflectionError`, `ChainError`, `FanOutError`: Composite patterns

use std::fmt;
use switchyard_core::RequestId;

/// Errors from LLM backend operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    /// Provider is unavailable.
    ProviderUnavailable { provider: String, reason: String },
    /// Request failed.
    RequestFailed { reason: String },
    /// Response parsing failed.
    ResponseParseFailed { reason: String },
    /// Timeout waiting for response.
    Timeout,
    /// Rate limit exceeded.
    RateLimited { retry_after_secs: Option<u64> },
    /// Invalid configuration.
    InvalidConfig { reason: String },
    /// The caller cancelled the request while the call was in flight.
    Cancelled,
    /// The request deadline passed while the call was in flight.
    DeadlineExceeded,
}

impl LlmError {
    /// Returns true if the call was abandoned by the caller rather than
    /// failing upstream.
    #[must_use]
    pub fn is_interruption(&self) -> bool {
        matches!(self, Self::Cancelled | Self::DeadlineExceeded)
    }
}

impl fmt::Display for LlmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ProviderUnavailable { provider, reason } => {
                write!(f, "LLM provider '{provider}' unavailable: {reason}")
            }
            Self::RequestFailed { reason } => {
                write!(f, "LLM request failed: {reason}")
            }
            Self::ResponseParseFailed { reason } => {
                write!(f, "failed to parse LLM response: {reason}")
            }
            Self::Timeout => write!(f, "LLM request timed out"),
            Self::RateLimited { retry_after_secs } => {
                if let Some(secs) = retry_after_secs {
                    write!(f, "rate limited, retry after {secs}s")
                } else {
                    write!(f, "rate limited")
                }
            }
            Self::InvalidConfig { reason } => {
                write!(f, "invalid LLM configuration: {reason}")
            }
            Self::Cancelled => write!(f, "LLM request cancelled"),
            Self::DeadlineExceeded => write!(f, "request deadline exceeded during LLM call"),
        }
    }
}

impl std::error::Error for LlmError {}

/// Errors from prompt operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptError {
    /// Missing required variable.
    MissingVariable { template: String, variable: String },
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingVariable { template, variable } => {
                write!(
                    f,
                    "missing required variable '{variable}' in template '{template}'"
                )
            }
        }
    }
}

impl std::error::Error for PromptError {}

/// Errors from label classification.
///
/// Ambiguous model output is not represented here: it resolves to the
/// fallback label instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifyError {
    /// The model call itself failed, so no label could be produced.
    CallFailed { request_id: RequestId },
    /// The request was cancelled or ran out of time during classification.
    Interrupted { request_id: RequestId },
}

impl fmt::Display for ClassifyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallFailed { request_id } => {
                write!(f, "could not classify request {request_id}")
            }
            Self::Interrupted { request_id } => {
                write!(f, "classification of request {request_id} was interrupted")
            }
        }
    }
}

impl std::error::Error for ClassifyError {}

/// Errors from handler execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// The handler's nested model call failed.
    CallFailed { handler: String },
    /// The handler rejected or could not process the request.
    Failed { handler: String, reason: String },
}

impl fmt::Display for HandlerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallFailed { handler } => {
                write!(f, "handler '{handler}' model call failed")
            }
            Self::Failed { handler, reason } => {
                write!(f, "handler '{handler}' failed: {reason}")
            }
        }
    }
}

impl std::error::Error for HandlerError {}

/// Errors from a classify-and-delegate request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    /// No label could be produced for the request.
    Classification { request_id: RequestId },
    /// The selected handler failed.
    Handler {
        request_id: RequestId,
        handler: String,
    },
    /// The request was cancelled or ran out of time.
    Interrupted { request_id: RequestId },
}

impl fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Classification { request_id } => {
                write!(f, "request {request_id} could not be classified")
            }
            Self::Handler {
                request_id,
                handler,
            } => {
                write!(f, "request {request_id} failed in handler '{handler}'")
            }
            Self::Interrupted { request_id } => {
                write!(f, "request {request_id} was interrupted")
            }
        }
    }
}

impl std::error::Error for CoordinatorError {}

/// Errors raised by an individual fallback pipeline stage.
///
/// The pipeline records these as data; they never abort a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageError {
    /// The stage's model call failed.
    CallFailed { stage: String },
    /// The stage's action did not produce a result.
    Failed { stage: String, reason: String },
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CallFailed { stage } => write!(f, "stage '{stage}' model call failed"),
            Self::Failed { stage, reason } => write!(f, "stage '{stage}' failed: {reason}"),
        }
    }
}

impl std::error::Error for StageError {}

/// Errors that abort a fallback pipeline run as a unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FallbackError {
    /// The caller cancelled the request.
    Cancelled { request_id: RequestId },
    /// The request deadline passed.
    DeadlineExceeded { request_id: RequestId },
}

impl fmt::Display for FallbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cancelled { request_id } => write!(f, "request {request_id} cancelled"),
            Self::DeadlineExceeded { request_id } => {
                write!(f, "request {request_id} exceeded its deadline")
            }
        }
    }
}

impl std::error::Error for FallbackError {}

/// Errors from the reflection loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReflectionError {
    /// The generator call failed.
    GenerationFailed { iteration: u32 },
    /// The critic call failed.
    CritiqueFailed { iteration: u32 },
}

impl fmt::Display for ReflectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GenerationFailed { iteration } => {
                write!(f, "generation failed in reflection iteration {iteration}")
            }
            Self::CritiqueFailed { iteration } => {
                write!(f, "critique failed in reflection iteration {iteration}")
            }
        }
    }
}

impl std::error::Error for ReflectionError {}

/// Errors from prompt chains.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// A step's prompt could not be rendered.
    Prompt { step: String },
    /// A step's model call failed.
    StepFailed { step: String },
}

impl fmt::Display for ChainError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prompt { step } => write!(f, "could not render prompt for chain step '{step}'"),
            Self::StepFailed { step } => write!(f, "chain step '{step}' failed"),
        }
    }
}

impl std::error::Error for ChainError {}

/// Errors from parallel fan-out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FanOutError {
    /// A fan-out was configured without branches.
    NoBranches,
    /// A branch call failed.
    BranchFailed { branch: String },
    /// The synthesis prompt could not be rendered.
    Prompt,
    /// The synthesis call failed.
    SynthesisFailed,
}

impl fmt::Display for FanOutError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoBranches => write!(f, "fan-out has no branches"),
            Self::BranchFailed { branch } => write!(f, "fan-out branch '{branch}' failed"),
            Self::Prompt => write!(f, "could not render synthesis prompt"),
            Self::SynthesisFailed => write!(f, "fan-out synthesis failed"),
        }
    }
}

impl std::error::Error for FanOutError {}
