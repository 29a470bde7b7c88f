//! Tool registry for tool-calling conversations.
//!
//! Tools declare a JSON object schema for their arguments. The registry
//! checks every model-produced call against that schema before the tool
//! runs, and turns every outcome (including rejection) into a
//! [`ToolOutcome`] attributed to the originating call id.

use crate::error::ToolError;
use async_trait::async_trait;
use futures::future::join_all;
use jsonschema::JSONSchema;
use rootcause::Report;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use switchyard_ai::{ToolCallRequest, ToolDeclaration};
use tracing::{debug, warn};

/// Definition of a tool available to the model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON schema for input parameters.
    pub input_schema: JsonValue,
}

impl ToolDefinition {
    /// Creates a new tool definition that takes no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    /// Sets the input schema.
    #[must_use]
    pub fn with_input_schema(mut self, schema: JsonValue) -> Self {
        self.input_schema = schema;
        self
    }

    /// Declares a required string parameter.
    #[must_use]
    pub fn with_string_param(mut self, name: &str, description: &str) -> Self {
        if let Some(schema) = self.input_schema.as_object_mut() {
            let properties = schema
                .entry("properties")
                .or_insert_with(|| serde_json::json!({}));
            if let Some(properties) = properties.as_object_mut() {
                properties.insert(
                    name.to_string(),
                    serde_json::json!({"type": "string", "description": description}),
                );
            }
            let required = schema
                .entry("required")
                .or_insert_with(|| serde_json::json!([]));
            if let Some(required) = required.as_array_mut() {
                required.push(JsonValue::String(name.to_string()));
            }
        }
        self
    }

    /// Converts the definition to what backends advertise to the model.
    #[must_use]
    pub fn to_declaration(&self) -> ToolDeclaration {
        ToolDeclaration {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.input_schema.clone(),
        }
    }

    /// Checks `arguments` against the input schema.
    ///
    /// The schema is compiled with `jsonschema`, so every JSON Schema
    /// keyword applies: `enum`, `minLength`, `pattern`, `minimum`, nested
    /// `items` and so on, not only `type` and `required`.
    ///
    /// # Errors
    ///
    /// Returns every violation, joined with `; `, or a description of why
    /// the schema itself does not compile.
    pub fn validate(&self, arguments: &JsonValue) -> Result<(), String> {
        let schema = JSONSchema::compile(&self.input_schema)
            .map_err(|e| format!("invalid input schema: {e}"))?;

        let violations = match schema.validate(arguments) {
            Ok(()) => return Ok(()),
            Err(errors) => errors
                .map(|error| {
                    let path = error.instance_path.to_string();
                    if path.is_empty() {
                        error.to_string()
                    } else {
                        format!("{path}: {error}")
                    }
                })
                .collect::<Vec<String>>(),
        };
        Err(violations.join("; "))
    }
}

/// Trait for tool execution.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Returns the tool definition.
    fn definition(&self) -> &ToolDefinition;

    /// Executes the tool with already-validated input.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ExecutionFailed`] when the tool cannot produce a
    /// result.
    async fn execute(&self, input: JsonValue) -> switchyard_core::Result<JsonValue, ToolError>;
}

type ToolFn = dyn Fn(&JsonValue) -> Result<JsonValue, ToolError> + Send + Sync;

/// A tool backed by a synchronous function.
pub struct FnTool {
    definition: ToolDefinition,
    func: Box<ToolFn>,
}

impl FnTool {
    /// Creates a tool.
    #[must_use]
    pub fn new<F>(definition: ToolDefinition, func: F) -> Self
    where
        F: Fn(&JsonValue) -> Result<JsonValue, ToolError> + Send + Sync + 'static,
    {
        Self {
            definition,
            func: Box::new(func),
        }
    }
}

#[async_trait]
impl Tool for FnTool {
    fn definition(&self) -> &ToolDefinition {
        &self.definition
    }

    async fn execute(&self, input: JsonValue) -> switchyard_core::Result<JsonValue, ToolError> {
        (self.func)(&input).map_err(Report::new)
    }
}

/// Result of a tool invocation, attributed to the call that requested it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    /// Id of the originating tool call.
    pub call_id: String,
    /// Requested tool name.
    pub tool: String,
    /// Result data (if successful).
    pub data: Option<JsonValue>,
    /// Error (if rejected or failed).
    pub error: Option<ToolError>,
    /// Execution time in milliseconds.
    pub execution_time_ms: u64,
}

impl ToolOutcome {
    /// Returns whether the invocation succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Text sent back to the model as the tool result.
    #[must_use]
    pub fn to_message_content(&self) -> String {
        match (&self.data, &self.error) {
            (_, Some(error)) => serde_json::json!({"error": error.to_string()}).to_string(),
            (Some(JsonValue::String(text)), None) => text.clone(),
            (Some(data), None) => data.to_string(),
            (None, None) => String::new(),
        }
    }
}

/// Registry of available tools.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    /// Creates a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
        }
    }

    /// Registers a tool, replacing any tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    /// Registers a shared tool.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.definition().name.clone(), tool);
    }

    /// Adds a tool, builder style.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Gets a tool definition by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|tool| tool.definition())
    }

    /// Returns declarations for every tool, sorted by name.
    #[must_use]
    pub fn declarations(&self) -> Vec<ToolDeclaration> {
        let mut declarations: Vec<ToolDeclaration> = self
            .tools
            .values()
            .map(|tool| tool.definition().to_declaration())
            .collect();
        declarations.sort_by(|a, b| a.name.cmp(&b.name));
        declarations
    }

    /// Returns the number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Returns whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Validates and runs one tool call. Never fails: problems are reported
    /// in the returned outcome.
    pub async fn invoke(&self, call: &ToolCallRequest) -> ToolOutcome {
        let started = Instant::now();
        let result = self.try_invoke(call).await;
        let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        match result {
            Ok(data) => {
                debug!(call_id = %call.id, tool = %call.name, execution_time_ms, "tool succeeded");
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    data: Some(data),
                    error: None,
                    execution_time_ms,
                }
            }
            Err(report) => {
                warn!(
                    call_id = %call.id,
                    tool = %call.name,
                    error = %report,
                    "tool call rejected or failed"
                );
                ToolOutcome {
                    call_id: call.id.clone(),
                    tool: call.name.clone(),
                    data: None,
                    error: Some(report.current_context().clone()),
                    execution_time_ms,
                }
            }
        }
    }

    /// Runs several calls concurrently; outcomes keep the order of `calls`.
    pub async fn invoke_all(&self, calls: &[ToolCallRequest]) -> Vec<ToolOutcome> {
        join_all(calls.iter().map(|call| self.invoke(call))).await
    }

    async fn try_invoke(
        &self,
        call: &ToolCallRequest,
    ) -> switchyard_core::Result<JsonValue, ToolError> {
        let tool = self.tools.get(&call.name).ok_or_else(|| {
            Report::new(ToolError::NotFound {
                name: call.name.clone(),
            })
        })?;
        tool.definition().validate(&call.arguments).map_err(|reason| {
            Report::new(ToolError::InvalidInput {
                name: call.name.clone(),
                reason,
            })
        })?;
        tool.execute(call.arguments.clone()).await
    }
}
