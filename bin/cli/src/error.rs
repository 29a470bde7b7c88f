//! Error context for the command-line front end.

use std::fmt;

/// Top-level CLI failures. Library reports are attached beneath these.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded or is incomplete.
    Config { reason: String },
    /// The LLM backend could not be constructed.
    Backend,
    /// A subcommand failed.
    Command { command: &'static str },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { reason } => write!(f, "invalid configuration: {reason}"),
            Self::Backend => write!(f, "failed to set up the LLM backend"),
            Self::Command { command } => write!(f, "'{command}' failed"),
        }
    }
}

impl std::error::Error for CliError {}
