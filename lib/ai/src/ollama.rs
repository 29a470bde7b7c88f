//! Ollama backend using the non-streaming `/api/chat` endpoint.

use crate::backend::{
    LlmBackend, LlmBackendConfig, LlmMessage, LlmProvider, LlmRequest, LlmResponse,
    MessageRole, TokenUsage, ToolCallRequest,
};
use crate::error::LlmError;
use crate::http;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use switchyard_core::ToolCallId;
use tracing::{debug, instrument};

/// Backend for an Ollama server.
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl OllamaBackend {
    /// Creates a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::InvalidConfig`] if the HTTP client cannot be built.
    pub fn new(config: LlmBackendConfig) -> Result<Self, LlmError> {
        let base_url = config.normalized_base_url();
        let base_url = base_url.strip_suffix("/api").unwrap_or(base_url).to_string();
        Ok(Self {
            client: http::build_client(config.timeout())?,
            base_url,
            api_key: config.api_key.filter(|k| !k.trim().is_empty()),
            model: config.model,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    stream: bool,
    #[serde(skip_serializing_if = "Options::is_empty")]
    options: Options,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<JsonValue>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OutgoingToolCall>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct OutgoingToolCall {
    function: OutgoingFunction,
}

#[derive(Debug, Serialize)]
struct OutgoingFunction {
    name: String,
    arguments: JsonValue,
}

#[derive(Debug, Default, Serialize)]
struct Options {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

impl Options {
    fn is_empty(&self) -> bool {
        self.temperature.is_none() && self.num_predict.is_none()
    }
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    message: ResponseMessage,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<IncomingToolCall>,
}

#[derive(Debug, Deserialize)]
struct IncomingToolCall {
    #[serde(default)]
    id: Option<String>,
    function: IncomingFunction,
}

#[derive(Debug, Deserialize)]
struct IncomingFunction {
    name: String,
    #[serde(default)]
    arguments: JsonValue,
}

fn role_name(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
        MessageRole::Tool => "tool",
    }
}

fn convert_message(message: &LlmMessage) -> Message {
    Message {
        role: role_name(message.role),
        content: message.content.clone(),
        tool_calls: message
            .tool_calls
            .iter()
            .map(|call| OutgoingToolCall {
                function: OutgoingFunction {
                    name: call.name.clone(),
                    arguments: call.arguments.clone(),
                },
            })
            .collect(),
        tool_name: message.tool_name.clone(),
        tool_call_id: message.tool_call_id.clone(),
    }
}

fn build_request<'a>(model: &'a str, request: &LlmRequest) -> ChatRequest<'a> {
    ChatRequest {
        model,
        messages: request.messages.iter().map(convert_message).collect(),
        stream: false,
        options: Options {
            temperature: request.temperature,
            num_predict: request.max_tokens,
        },
        tools: request
            .tools
            .iter()
            .map(|tool| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": tool.name,
                        "description": tool.description,
                        "parameters": tool.parameters,
                    }
                })
            })
            .collect(),
    }
}

// Some models return arguments as a JSON-encoded string instead of an object.
fn normalize_arguments(arguments: JsonValue) -> JsonValue {
    match arguments {
        JsonValue::String(raw) => {
            serde_json::from_str(&raw).unwrap_or(JsonValue::String(raw))
        }
        JsonValue::Null => JsonValue::Object(serde_json::Map::new()),
        other => other,
    }
}

fn parse_response(raw: ChatResponse, model: &str) -> LlmResponse {
    let tool_calls = raw
        .message
        .tool_calls
        .into_iter()
        .map(|call| ToolCallRequest {
            id: call.id.unwrap_or_else(|| ToolCallId::new().to_string()),
            name: call.function.name,
            arguments: normalize_arguments(call.function.arguments),
        })
        .collect();

    LlmResponse {
        content: raw.message.content,
        tool_calls,
        usage: TokenUsage {
            input_tokens: raw.prompt_eval_count.unwrap_or(0),
            output_tokens: raw.eval_count.unwrap_or(0),
        },
        model: raw.model.unwrap_or_else(|| model.to_string()),
    }
}

#[async_trait]
impl LlmBackend for OllamaBackend {
    #[instrument(skip(self, request), fields(model = %self.model, messages = request.messages.len()))]
    async fn generate(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        let body = build_request(&self.model, request);
        let mut builder = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .json(&body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| http::transport_error(LlmProvider::Ollama, &e))?;
        let response = http::check_status(LlmProvider::Ollama, response).await?;
        let raw: ChatResponse =
            response
                .json()
                .await
                .map_err(|e| LlmError::ResponseParseFailed {
                    reason: e.to_string(),
                })?;

        let parsed = parse_response(raw, &self.model);
        debug!(
            tool_calls = parsed.tool_calls.len(),
            output_tokens = parsed.usage.output_tokens,
            "ollama response received"
        );
        Ok(parsed)
    }

    fn provider(&self) -> LlmProvider {
        LlmProvider::Ollama
    }

    fn model(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn strips_api_suffix_from_base_url() {
        let backend =
            OllamaBackend::new(LlmBackendConfig::ollama("http://localhost:11434/api/", "llama3"))
                .expect("backend");
        assert_eq!(backend.base_url, "http://localhost:11434");
    }

    #[test]
    fn string_arguments_are_decoded() {
        let args = normalize_arguments(JsonValue::String(r#"{"city":"Paris"}"#.to_string()));
        assert_eq!(args, json!({"city": "Paris"}));
        assert_eq!(normalize_arguments(JsonValue::Null), json!({}));
    }

    #[test]
    fn request_carries_tool_history() {
        let request = LlmRequest::from_messages(vec![
            LlmMessage::user("Where is the office?"),
            LlmMessage::assistant_tool_calls(
                "",
                vec![ToolCallRequest {
                    id: "c1".to_string(),
                    name: "get_general_area_info".to_string(),
                    arguments: json!({"city": "New York"}),
                }],
            ),
            LlmMessage::tool("get_general_area_info", "General information for New York")
                .with_tool_call_id("c1"),
        ]);
        let wire = serde_json::to_value(build_request("llama3", &request)).expect("serialize");
        assert_eq!(wire["stream"], false);
        assert!(wire.get("options").is_none());
        assert_eq!(
            wire["messages"][1]["tool_calls"][0]["function"]["name"],
            "get_general_area_info"
        );
        assert_eq!(wire["messages"][2]["role"], "tool");
        assert_eq!(wire["messages"][2]["tool_name"], "get_general_area_info");
        assert_eq!(wire["messages"][2]["tool_call_id"], "c1");
        assert!(wire["messages"][0].get("tool_call_id").is_none());
    }

    #[tokio::test]
    async fn generate_returns_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/chat"))
            .and(body_partial_json(json!({"model": "llama3", "stream": false})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "model": "llama3",
                "message": {"role": "assistant", "content": "booker"},
                "prompt_eval_count": 30,
                "eval_count": 2,
                "done": true
            })))
            .mount(&server)
            .await;

        let backend =
            OllamaBackend::new(LlmBackendConfig::ollama(server.uri(), "llama3")).expect("backend");
        let response = backend
            .generate(&LlmRequest::new("Book me a hotel in Paris."))
            .await
            .expect("response");
        assert_eq!(response.content, "booker");
        assert_eq!(response.usage.total(), 32);
    }

    #[tokio::test]
    async fn server_error_is_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
            .mount(&server)
            .await;

        let backend =
            OllamaBackend::new(LlmBackendConfig::ollama(server.uri(), "llama3")).expect("backend");
        let err = backend
            .generate(&LlmRequest::new("hi"))
            .await
            .expect_err("should fail");
        assert!(matches!(err, LlmError::ProviderUnavailable { .. }));
    }
}
