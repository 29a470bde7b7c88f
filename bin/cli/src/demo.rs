//! Demo tools, the location pipeline and the offline model.

use serde_json::{Value as JsonValue, json};
use std::sync::Arc;
use switchyard_ai::classifier::DEFAULT_PREAMBLE;
use switchyard_ai::fallback::LlmPresenter;
use switchyard_ai::{
    FallbackPipeline, LlmBackend, LlmError, LlmRequest, LlmResponse, MessageRole,
    ScriptedBackend, ToolCallRequest,
};
use switchyard_conversation::{
    AgentStage, FnTool, ToolCallingAgent, ToolDefinition, ToolError, ToolRegistry,
};

/// Canned answers for [`search_information_tool`].
const SEARCH_ANSWERS: &[(&str, &str)] = &[
    (
        "weather in london",
        "The weather in London is currently cloudy with a temperature of 15°C.",
    ),
    ("capital of france", "The capital of France is Paris."),
    (
        "population of earth",
        "The estimated population of Earth is around 8 billion people.",
    ),
    (
        "tallest mountain",
        "Mount Everest is the tallest mountain above sea level.",
    ),
];

/// Address returned by the precise location tool.
pub const PRECISE_LOCATION: &str = "123 Main St, NY";

const PRIMARY_PROMPT: &str = "Get precise location information using the user's provided address.";
const SECONDARY_PROMPT: &str =
    "The precise location lookup failed. Extract the user's city from their query and use the general area tool.";
const PRESENTER_PROMPT: &str =
    "Review the retrieved location information and present it to the user clearly and concisely.";

/// Simulated web search over a handful of known facts.
#[must_use]
pub fn search_information_tool() -> FnTool {
    FnTool::new(
        ToolDefinition::new(
            "search_information",
            "Provides factual information on a given topic.",
        )
        .with_string_param("query", "The topic to look up"),
        |input| {
            let query = input["query"].as_str().unwrap_or_default();
            Ok(JsonValue::String(search_answer(query)))
        },
    )
}

fn search_answer(query: &str) -> String {
    let normalized = query.trim().to_lowercase();
    SEARCH_ANSWERS
        .iter()
        .find(|(key, _)| *key == normalized)
        .map_or_else(
            || {
                format!(
                    "Simulated search result for '{query}': No specific information found, but the topic seems interesting."
                )
            },
            |(_, answer)| (*answer).to_string(),
        )
}

/// Precise geocoding. When `available` is false every call fails, which
/// sends the location pipeline to its secondary stage.
#[must_use]
pub fn precise_location_tool(available: bool) -> FnTool {
    FnTool::new(
        ToolDefinition::new(
            "get_precise_location_info",
            "Looks up precise location details for a street address.",
        )
        .with_string_param("address", "The street address"),
        move |_| {
            if available {
                Ok(json!({"status": "success", "location": PRECISE_LOCATION}))
            } else {
                Err(ToolError::ExecutionFailed {
                    name: "get_precise_location_info".to_string(),
                    reason: "geocoding service unavailable".to_string(),
                })
            }
        },
    )
}

/// Coarse, city-level lookup.
#[must_use]
pub fn general_area_tool() -> FnTool {
    FnTool::new(
        ToolDefinition::new(
            "get_general_area_info",
            "Looks up general information about a city.",
        )
        .with_string_param("city", "The city name"),
        |input| {
            let city = input["city"].as_str().unwrap_or_default();
            Ok(json!({"status": "success", "area": format!("General information for {city}")}))
        },
    )
}

/// Precise lookup first, city-level lookup only if that fails, then a
/// presentation call.
#[must_use]
pub fn location_pipeline(
    backend: Arc<dyn LlmBackend>,
    max_steps: u32,
    precise_available: bool,
) -> FallbackPipeline {
    let primary = ToolCallingAgent::new(
        backend.clone(),
        Arc::new(ToolRegistry::new().with_tool(precise_location_tool(precise_available))),
    )
    .with_system_prompt(PRIMARY_PROMPT)
    .with_max_steps(max_steps);
    let secondary = ToolCallingAgent::new(
        backend.clone(),
        Arc::new(ToolRegistry::new().with_tool(general_area_tool())),
    )
    .with_system_prompt(SECONDARY_PROMPT)
    .with_max_steps(max_steps);

    FallbackPipeline::new(
        Arc::new(AgentStage::new("precise_location", primary)),
        Arc::new(AgentStage::new("general_area", secondary)),
    )
    .with_presenter(Arc::new(
        LlmPresenter::new(backend).with_system_prompt(PRESENTER_PROMPT),
    ))
}

/// A backend that answers without a network, for trying commands out.
#[must_use]
pub fn offline_backend() -> ScriptedBackend {
    ScriptedBackend::new()
        .with_model("offline")
        .with_responder(offline_response)
}

/// Keyword heuristics standing in for a real model.
fn offline_response(request: &LlmRequest) -> Result<LlmResponse, LlmError> {
    let system = request.system_text().unwrap_or_default();
    let user = request.last_user_text().unwrap_or_default();

    if system.starts_with(DEFAULT_PREAMBLE) {
        return Ok(LlmResponse::text(offline_label(user)));
    }

    if let Some(tool) = request.tools.first() {
        let last = request.messages.last();
        if let Some(message) = last.filter(|m| m.role == MessageRole::Tool) {
            return Ok(LlmResponse::text(summarize_tool_result(&message.content)));
        }
        let arguments = match tool.name.as_str() {
            "search_information" => json!({"query": offline_search_query(user)}),
            "get_precise_location_info" => json!({"address": user}),
            "get_general_area_info" => json!({"city": offline_city(user)}),
            _ => json!({}),
        };
        return Ok(LlmResponse::tool_calls(vec![ToolCallRequest {
            id: "offline_1".to_string(),
            name: tool.name.clone(),
            arguments,
        }]));
    }

    if system.contains("CODE_IS_PERFECT") {
        return Ok(LlmResponse::text("CODE_IS_PERFECT"));
    }
    if system == PRESENTER_PROMPT || system == LlmPresenter::DEFAULT_SYSTEM_PROMPT {
        let retrieved = user
            .split_once("Retrieved information: ")
            .map_or(user, |(_, info)| info);
        return Ok(LlmResponse::text(retrieved));
    }
    Ok(LlmResponse::text(format!("[offline] {user}")))
}

fn offline_label(request: &str) -> &'static str {
    let lower = request.to_lowercase();
    if ["book", "flight", "hotel", "reserve"]
        .iter()
        .any(|keyword| lower.contains(keyword))
    {
        "booker"
    } else if lower.trim_end().ends_with('?') {
        "info"
    } else {
        "unclear"
    }
}

fn offline_search_query(request: &str) -> String {
    let lower = request.to_lowercase();
    SEARCH_ANSWERS
        .iter()
        .map(|(key, _)| *key)
        .find(|key| lower.contains(key))
        .map_or_else(|| request.trim().to_string(), str::to_string)
}

fn offline_city(request: &str) -> String {
    request
        .rsplit(',')
        .next()
        .unwrap_or(request)
        .trim()
        .trim_end_matches(['?', '.', '!'])
        .to_string()
}

fn summarize_tool_result(content: &str) -> String {
    match serde_json::from_str::<JsonValue>(content) {
        Ok(value) => ["location", "area", "error"]
            .iter()
            .find_map(|key| value.get(*key).and_then(JsonValue::as_str))
            .map_or_else(|| content.to_string(), str::to_string),
        Err(_) => content.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchyard_ai::{Request, RequestContext};
    use switchyard_conversation::Tool;

    #[tokio::test]
    async fn search_knows_a_few_facts() {
        let tool = search_information_tool();
        let known = tool
            .execute(json!({"query": "Capital of France"}))
            .await
            .expect("search");
        assert_eq!(known, json!("The capital of France is Paris."));

        let unknown = tool
            .execute(json!({"query": "rust lifetimes"}))
            .await
            .expect("search");
        assert!(
            unknown
                .as_str()
                .is_some_and(|s| s.starts_with("Simulated search result for 'rust lifetimes'"))
        );
    }

    #[tokio::test]
    async fn general_area_names_the_city() {
        let area = general_area_tool()
            .execute(json!({"city": "Boston"}))
            .await
            .expect("area");
        assert_eq!(area["area"], "General information for Boston");
    }

    #[test]
    fn offline_labels() {
        assert_eq!(offline_label("Book me a flight to London."), "booker");
        assert_eq!(offline_label("What is the capital of Italy?"), "info");
        assert_eq!(offline_label("Tell me about quantum physics."), "unclear");
    }

    #[test]
    fn offline_city_takes_last_segment() {
        assert_eq!(offline_city("1600 Amphitheatre Pkwy, Mountain View?"), "Mountain View");
        assert_eq!(offline_city("Paris"), "Paris");
    }

    #[tokio::test]
    async fn offline_location_lookup_uses_precise_result() {
        let backend: Arc<dyn LlmBackend> = Arc::new(offline_backend());
        let outcome = location_pipeline(backend, 3, true)
            .run(&Request::new("221B Baker Street, London"), &RequestContext::new())
            .await
            .expect("pipeline");
        assert!(!outcome.state.primary_failed);
        assert_eq!(outcome.output, PRECISE_LOCATION);
    }

    #[tokio::test]
    async fn offline_location_lookup_falls_back_to_area() {
        let backend: Arc<dyn LlmBackend> = Arc::new(offline_backend());
        let outcome = location_pipeline(backend, 3, false)
            .run(&Request::new("221B Baker Street, London"), &RequestContext::new())
            .await
            .expect("pipeline");
        assert!(outcome.state.primary_failed);
        assert_eq!(outcome.output, "General information for London");
    }

    #[tokio::test]
    async fn offline_coordinator_routes_by_keyword() {
        let backend: Arc<dyn LlmBackend> = Arc::new(offline_backend());
        let delegation = switchyard_ai::coordinate::booking_coordinator(backend)
            .handle(&Request::new("Book me a hotel in Paris."), &RequestContext::new())
            .await
            .expect("delegation");
        assert_eq!(delegation.result.handler, "booker");
    }
}
