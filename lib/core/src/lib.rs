//! Core types shared by every switchyard crate.
//!
//! This crate provides the rootcause `Result` alias and the strongly-typed
//! identifiers used to correlate requests, model invocations and tool calls
//! across log lines.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{ConversationId, InvocationId, ParseIdError, RequestId, ToolCallId};
