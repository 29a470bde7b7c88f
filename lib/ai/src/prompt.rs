//! Prompt templates.
//!
//! Templates use `{{variable_name}}` placeholders. Rendering is strict: a
//! placeholder with no value and no default is an error rather than a silent
//! hole in the prompt sent to the model.

use crate::backend::LlmMessage;
use crate::error::PromptError;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Variables used when rendering a template.
pub type PromptVariables = HashMap<String, String>;

/// Definition of a template variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariableDefinition {
    /// Description of what this variable is for.
    pub description: String,
    /// Whether this variable is required.
    pub required: bool,
    /// Default value if not provided.
    pub default: Option<String>,
}

impl VariableDefinition {
    /// Creates a required variable definition.
    #[must_use]
    pub fn required(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: true,
            default: None,
        }
    }

    /// Creates an optional variable definition. Unset optional variables
    /// render as the empty string.
    #[must_use]
    pub fn optional(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            required: false,
            default: None,
        }
    }

    /// Sets a default value.
    #[must_use]
    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// A named prompt template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Template name, used in error reports.
    pub name: String,
    /// Template content with placeholders.
    pub content: String,
    /// Declared variables. Undeclared placeholders are treated as required.
    #[serde(default)]
    pub variables: HashMap<String, VariableDefinition>,
}

impl PromptTemplate {
    /// Creates a new prompt template.
    #[must_use]
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            content: content.into(),
            variables: HashMap::new(),
        }
    }

    /// Adds a variable definition.
    #[must_use]
    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        definition: VariableDefinition,
    ) -> Self {
        self.variables.insert(name.into(), definition);
        self
    }

    /// Returns the placeholder names in order of first appearance.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        let mut names = Vec::new();
        let mut rest = self.content.as_str();
        while let Some((_, name, after)) = next_placeholder(rest) {
            if !names.contains(&name) {
                names.push(name);
            }
            rest = after;
        }
        names
    }

    /// Renders the template with the given variables.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError::MissingVariable`] for the first placeholder
    /// that has neither a value nor a default and is not optional.
    pub fn render(
        &self,
        variables: &PromptVariables,
    ) -> switchyard_core::Result<String, PromptError> {
        let mut out = String::with_capacity(self.content.len());
        let mut rest = self.content.as_str();
        while let Some((before, name, after)) = next_placeholder(rest) {
            out.push_str(before);
            out.push_str(&self.resolve(name, variables)?);
            rest = after;
        }
        out.push_str(rest);
        Ok(out)
    }

    fn resolve(
        &self,
        name: &str,
        variables: &PromptVariables,
    ) -> Result<String, Report<PromptError>> {
        if let Some(value) = variables.get(name) {
            return Ok(value.clone());
        }
        match self.variables.get(name) {
            Some(VariableDefinition {
                default: Some(default),
                ..
            }) => Ok(default.clone()),
            Some(def) if !def.required => Ok(String::new()),
            _ => Err(Report::new(PromptError::MissingVariable {
                template: self.name.clone(),
                variable: name.to_string(),
            })),
        }
    }
}

/// Splits `text` around its first complete `{{name}}` placeholder.
fn next_placeholder(text: &str) -> Option<(&str, &str, &str)> {
    let start = text.find("{{")?;
    let inner = &text[start + 2..];
    let end = inner.find("}}")?;
    Some((&text[..start], inner[..end].trim(), &inner[end + 2..]))
}

/// A system + user template pair rendered into a message list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPrompt {
    /// Optional system instruction.
    pub system: Option<PromptTemplate>,
    /// User message template.
    pub user: PromptTemplate,
}

impl ChatPrompt {
    /// Creates a prompt with only a user message.
    #[must_use]
    pub fn user(user: PromptTemplate) -> Self {
        Self { system: None, user }
    }

    /// Adds a system instruction.
    #[must_use]
    pub fn with_system(mut self, system: PromptTemplate) -> Self {
        self.system = Some(system);
        self
    }

    /// Renders both templates into messages.
    ///
    /// # Errors
    ///
    /// Returns an error if either template is missing a variable.
    pub fn render(
        &self,
        variables: &PromptVariables,
    ) -> switchyard_core::Result<Vec<LlmMessage>, PromptError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &self.system {
            messages.push(LlmMessage::system(system.render(variables)?));
        }
        messages.push(LlmMessage::user(self.user.render(variables)?));
        Ok(messages)
    }
}
