use super::AppState;
use crate::agent::{Agent, Task};
use crate::providers::{create_provider, TokenUsage, UserContent};
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json},
};
use serde::Deserialize;
use serde_json::Value;
use uuid::Uuid;

const DEFINE_SYSTEM_PROMPT: &str = "\
You define structured data schemas. From the conversation below, produce a schema \
definition as a single strict JSON object of the form \
{\"name\": string, \"fields\": {field_name: type_or_enum_values}}. \
Reply with the JSON object only, no markdown and no extra text.";

const PARSE_SYSTEM_PROMPT: &str = "\
You extract structured data. Given a schema definition and a conversation, reply \
with a single strict JSON object conforming to the schema. No markdown, no extra text.";

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize)]
pub struct DefineSchemaRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

#[derive(Debug, Deserialize)]
pub struct ParseDataRequest {
    pub messages: Vec<ChatMessage>,
    pub definition: Value,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// Extract the bearer token; the gateway forwards it as the provider API key,
/// so credentials never live in gateway state.
pub(super) fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
}

/// First http(s) URL in free-form text, trailing punctuation trimmed.
pub(super) fn extract_first_url(text: &str) -> Option<String> {
    text.split_whitespace()
        .find(|token| token.starts_with("http://") || token.starts_with("https://"))
        .map(|token| token.trim_end_matches(['.', ',', ')', ']', '"', '\'']).to_string())
}

fn render_messages(messages: &[ChatMessage]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role, m.content))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip an optional markdown fence so a well-meaning model reply still
/// parses as JSON.
fn unfence(reply: &str) -> &str {
    let trimmed = reply.trim();
    let Some(body) = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
    else {
        return trimmed;
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

struct SchemaCall<'a> {
    system_prompt: &'a str,
    user_text: String,
    model: Option<String>,
    temperature: Option<f64>,
    max_tokens: Option<u32>,
    max_attempts: u32,
}

/// Shared attempt loop behind `/define` and `/parse`: call the provider up
/// to `max_attempts` times until the reply parses as a JSON object, summing
/// token usage across attempts.
async fn generate_schema_data(
    state: &AppState,
    api_key: &str,
    call: SchemaCall<'_>,
) -> Result<(Value, TokenUsage), (StatusCode, String)> {
    let provider = create_provider(&state.config.provider.0, Some(api_key))
        .map_err(|e| (StatusCode::BAD_REQUEST, e.to_string()))?;

    let mut params = state.config.model.clone();
    if let Some(model) = call.model {
        params.name = model;
    }
    if let Some(temperature) = call.temperature {
        params.temperature = temperature;
    }
    if let Some(max_tokens) = call.max_tokens {
        params.max_tokens = max_tokens;
    }

    let user = UserContent::text(call.user_text);
    let mut usage = TokenUsage::default();
    let mut last_error = String::new();
    for attempt in 1..=call.max_attempts.max(1) {
        let completion = provider
            .complete(call.system_prompt, &user, &params)
            .await
            .map_err(|e| (StatusCode::BAD_GATEWAY, e.to_string()))?;
        if let Some(u) = completion.usage {
            usage.prompt_tokens += u.prompt_tokens;
            usage.completion_tokens += u.completion_tokens;
        }
        match serde_json::from_str::<Value>(unfence(&completion.text)) {
            Ok(value @ Value::Object(_)) => return Ok((value, usage)),
            Ok(other) => last_error = format!("expected a JSON object, got {other}"),
            Err(e) => last_error = e.to_string(),
        }
        tracing::warn!(attempt, error = %last_error, "schema generation attempt failed");
    }
    Err((
        StatusCode::UNPROCESSABLE_ENTITY,
        format!("no valid schema after {} attempts: {last_error}", call.max_attempts.max(1)),
    ))
}

fn schema_response(result: Result<(Value, TokenUsage), (StatusCode, String)>) -> impl IntoResponse {
    match result {
        Ok((data, usage)) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "data": data,
                "usage": {
                    "prompt_tokens": usage.prompt_tokens,
                    "completion_tokens": usage.completion_tokens,
                },
            })),
        ),
        Err((status, message)) => (status, Json(serde_json::json!({ "error": message }))),
    }
}

/// POST /define — generate a schema definition from a message list.
pub(super) async fn handle_define(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<DefineSchemaRequest>,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing bearer credentials" })),
        )
            .into_response();
    };
    let call = SchemaCall {
        system_prompt: DEFINE_SYSTEM_PROMPT,
        user_text: render_messages(&request.messages),
        model: request.model,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        max_attempts: request.max_attempts,
    };
    schema_response(generate_schema_data(&state, token, call).await).into_response()
}

/// POST /parse — generate data conforming to a provided schema definition.
pub(super) async fn handle_parse(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ParseDataRequest>,
) -> impl IntoResponse {
    let Some(token) = bearer_token(&headers) else {
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "missing bearer credentials" })),
        )
            .into_response();
    };
    let call = SchemaCall {
        system_prompt: PARSE_SYSTEM_PROMPT,
        user_text: format!(
            "Schema definition:\n{}\n\nConversation:\n{}",
            request.definition,
            render_messages(&request.messages)
        ),
        model: request.model,
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        max_attempts: request.max_attempts,
    };
    schema_response(generate_schema_data(&state, token, call).await).into_response()
}

/// POST /chat — spawn a detached agent against the first URL found in the
/// last message and hand back a session id immediately.
pub(super) async fn handle_chat(
    State(state): State<AppState>,
    Json(request): Json<DefineSchemaRequest>,
) -> impl IntoResponse {
    let Some(last) = request.messages.last() else {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({ "error": "empty message list" })),
        );
    };

    let session_id = Uuid::new_v4();
    if let Some(url) = extract_first_url(&last.content) {
        let task = Task::new(last.content.clone(), serde_json::Map::new());
        let sessions = state.sessions.clone();
        let config = state.config.clone();
        tokio::spawn(async move {
            let provider = match create_provider(&config.provider.0, None) {
                Ok(provider) => provider,
                Err(e) => {
                    tracing::error!(%session_id, error = %e, "agent spawn failed");
                    return;
                }
            };
            let agent = Agent::new(provider, sessions, &config);
            match agent.run(&url, &task, config.agent.max_actions).await {
                Ok((status, _output)) => {
                    tracing::info!(%session_id, %status, "detached agent finished");
                }
                Err(e) => tracing::error!(%session_id, error = %e, "detached agent failed"),
            }
        });
    }

    (
        StatusCode::OK,
        Json(serde_json::json!({ "session_id": session_id.to_string() })),
    )
}
