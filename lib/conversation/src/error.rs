//! Error types for the conversation crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `ToolError`: Errors from tool lookup, argument validation and execution
//! - `AgentError`: Errors from the tool-calling loop
//! - `ConversationError`: Errors from buffered conversations

use std::fmt;
use switchyard_core::ConversationId;

/// Errors from tool execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// Tool not found.
    NotFound { name: String },
    /// Arguments did not match the tool's input schema.
    InvalidInput { name: String, reason: String },
    /// Tool execution failed.
    ExecutionFailed { name: String, reason: String },
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { name } => write!(f, "tool not found: {name}"),
            Self::InvalidInput { name, reason } => {
                write!(f, "invalid input for tool '{name}': {reason}")
            }
            Self::ExecutionFailed { name, reason } => {
                write!(f, "tool '{name}' execution failed: {reason}")
            }
        }
    }
}

impl std::error::Error for ToolError {}

/// Errors from the tool-calling agent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentError {
    /// The model call for a step failed.
    ModelCallFailed { step: u32 },
    /// The model kept requesting tools past the step limit.
    MaxStepsExceeded { max_steps: u32 },
    /// The request was cancelled or ran out of time.
    Interrupted,
}

impl fmt::Display for AgentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelCallFailed { step } => write!(f, "model call failed at agent step {step}"),
            Self::MaxStepsExceeded { max_steps } => {
                write!(f, "agent did not finish within {max_steps} steps")
            }
            Self::Interrupted => write!(f, "agent run was interrupted"),
        }
    }
}

impl std::error::Error for AgentError {}

/// High-level conversation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationError {
    /// A turn could not be completed; history is unchanged.
    PredictFailed { conversation_id: ConversationId },
}

impl fmt::Display for ConversationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PredictFailed { conversation_id } => {
                write!(f, "conversation turn failed for {conversation_id}")
            }
        }
    }
}

impl std::error::Error for ConversationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_error_display() {
        let err = ToolError::ExecutionFailed {
            name: "get_precise_location_info".to_string(),
            reason: "geocoder unavailable".to_string(),
        };
        assert!(err.to_string().contains("get_precise_location_info"));
        assert!(err.to_string().contains("geocoder unavailable"));
    }

    #[test]
    fn agent_error_display() {
        let err = AgentError::MaxStepsExceeded { max_steps: 4 };
        assert_eq!(err.to_string(), "agent did not finish within 4 steps");
    }

    #[test]
    fn conversation_error_names_conversation() {
        let id = ConversationId::new();
        let err = ConversationError::PredictFailed { conversation_id: id };
        assert!(err.to_string().contains(&id.to_string()));
    }
}
