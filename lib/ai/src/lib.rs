//! AI primitives for switchyard.
//!
//! Everything here is built on one primitive, the **LLM Call**: a single
//! request to an [`LlmBackend`], raced against the request's cancellation
//! token and deadline. On top of it sit:
//!
//! - **Classify and route**: [`Classifier`] maps a request to one label of a
//!   closed [`LabelSet`], a [`Router`] maps the label to a [`Handler`], and
//!   the [`Coordinator`] ties both together.
//! - **Sequential fallback**: [`FallbackPipeline`] runs a primary stage, a
//!   secondary stage only if the primary failed, then a presentation stage.
//! - **Composite patterns**: reflection, prompt chaining and parallel
//!   fan-out.

pub mod backend;
pub mod chain;
pub mod classifier;
pub mod context;
pub mod coordinate;
pub mod error;
pub mod fallback;
pub mod fanout;
pub mod gemini;
mod http;
pub mod handler;
pub mod label;
pub mod llm_call;
pub mod ollama;
pub mod prompt;
pub mod reflection;
pub mod request;
pub mod router;
pub mod scripted;

pub use backend::{
    LlmBackend, LlmBackendConfig, LlmMessage, LlmProvider, LlmRequest, LlmResponse, MessageRole,
    ToolCallRequest, ToolDeclaration, connect,
};
pub use chain::{ChainOutcome, ChainStep, PromptChain};
pub use classifier::{Classification, Classifier};
pub use context::{Interruption, RequestContext};
pub use coordinate::{Coordinator, Delegation};
pub use error::{
    ChainError, ClassifyError, CoordinatorError, FallbackError, FanOutError, HandlerError,
    LlmError, PromptError, ReflectionError, StageError,
};
pub use fallback::{
    FallbackOutcome, FallbackPipeline, FallbackState, PipelinePhase, Presenter, Stage,
};
pub use fanout::{Branch, FanOut, FanOutOutcome};
pub use handler::{FnHandler, Handler, LlmHandler};
pub use label::{CoordinatorLabel, LabelSet};
pub use llm_call::{LlmCall, LlmCallResult};
pub use prompt::{ChatPrompt, PromptTemplate, PromptVariables};
pub use reflection::{ReflectionConfig, ReflectionLoop, ReflectionOutcome};
pub use request::{HandlerResult, Request};
pub use router::Router;
pub use scripted::ScriptedBackend;
