//! Tool calling and conversation memory for switchyard.
//!
//! This crate provides:
//!
//! - **Tool Registry**: tools with argument schemas, validated before they run
//! - **Tool-Calling Agent**: the call-tools-until-answered loop, also usable
//!   as a fallback pipeline stage
//! - **Conversation**: a buffered multi-turn chat

pub mod agent;
pub mod buffer;
pub mod error;
pub mod tool;

pub use agent::{AgentRun, AgentStage, ToolCallingAgent};
pub use buffer::Conversation;
pub use error::{AgentError, ConversationError, ToolError};
pub use tool::{FnTool, Tool, ToolDefinition, ToolOutcome, ToolRegistry};
