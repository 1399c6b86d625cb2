//! OpenAI-compatible provider implementation.
//!
//! Works with DeepInfra, OpenRouter, OpenAI, Ollama and any endpoint exposing
//! `/chat/completions` with tool calling. Each completed round is replayed as
//! an assistant message carrying `tool_calls` followed by one `tool` message
//! per result.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stridecoach_core::error::ProviderError;
use stridecoach_core::message::Role;
use stridecoach_core::provider::*;
use tracing::{debug, warn};

/// An OpenAI-compatible LLM provider.
pub struct OpenAiCompatProvider {
    name: String,
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    /// Create a new OpenAI-compatible provider.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            default_model: String::new(),
            client,
        }
    }

    /// Create a DeepInfra provider (convenience constructor).
    pub fn deepinfra(api_key: impl Into<String>) -> Self {
        Self::new("deepinfra", "https://api.deepinfra.com/v1/openai", api_key)
    }

    /// Create an OpenRouter provider (convenience constructor).
    pub fn openrouter(api_key: impl Into<String>) -> Self {
        Self::new("openrouter", "https://openrouter.ai/api/v1", api_key)
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    /// Convert a request into OpenAI chat messages.
    fn to_api_messages(request: &ModelRequest) -> Vec<ApiMessage> {
        let mut messages = Vec::new();

        if !request.system_instruction.is_empty() {
            messages.push(ApiMessage::text("system", &request.system_instruction));
        }

        for msg in &request.history {
            let role = match msg.role {
                Role::User => "user",
                Role::Assistant => "assistant",
            };
            messages.push(ApiMessage::text(role, &msg.content));
        }

        messages.push(ApiMessage::text("user", &request.utterance));

        for round in &request.rounds {
            messages.push(ApiMessage {
                role: "assistant".into(),
                content: None,
                tool_calls: Some(
                    round
                        .calls
                        .iter()
                        .map(|call| {
                            let raw = call.to_requested();
                            ApiToolCall {
                                id: raw.id,
                                r#type: "function".into(),
                                function: ApiFunction {
                                    name: raw.name,
                                    arguments: raw.arguments,
                                },
                            }
                        })
                        .collect(),
                ),
                tool_call_id: None,
            });

            for result in &round.results {
                messages.push(ApiMessage {
                    role: "tool".into(),
                    content: Some(result.payload.to_string()),
                    tool_calls: None,
                    tool_call_id: Some(result.call_id.clone()),
                });
            }
        }

        messages
    }

    /// Convert tool definitions to OpenAI API format.
    fn to_api_tools(tools: &[ToolDescriptor]) -> Vec<ApiToolDefinition> {
        tools
            .iter()
            .map(|t| ApiToolDefinition {
                r#type: "function".into(),
                function: ApiToolFunction {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                },
            })
            .collect()
    }

    fn build_body(request: &ModelRequest) -> serde_json::Value {
        let mut body = serde_json::json!({
            "model": request.model,
            "messages": Self::to_api_messages(request),
            "temperature": request.temperature,
            "stream": false,
        });

        if let Some(top_p) = request.top_p {
            body["top_p"] = serde_json::json!(top_p);
        }

        if let Some(max_tokens) = request.max_output_tokens {
            body["max_tokens"] = serde_json::json!(max_tokens);
        }

        if !request.tools.is_empty() {
            body["tools"] = serde_json::json!(Self::to_api_tools(&request.tools));
        }

        body
    }

    fn parse_response(api_response: ApiResponse) -> ModelResponse {
        let usage = api_response.usage.map(|u| Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        let candidate = api_response.choices.into_iter().next().map(|choice| {
            let mut parts = Vec::new();
            if let Some(text) = choice.message.content.filter(|t| !t.is_empty()) {
                parts.push(ResponsePart::Text(text));
            }
            for tc in choice.message.tool_calls.unwrap_or_default() {
                parts.push(ResponsePart::FunctionCall(RequestedCall {
                    id: tc.id,
                    name: tc.function.name,
                    arguments: tc.function.arguments,
                }));
            }
            Candidate {
                parts,
                finish_reason: choice.finish_reason,
                safety_ratings: Vec::new(),
            }
        });

        ModelResponse {
            candidate,
            usage,
            model: api_response.model,
        }
    }
}

#[async_trait]
impl Provider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(format!("no API key for provider '{}'", self.name)));
        }

        let url = format!("{}/chat/completions", self.base_url);
        let body = Self::build_body(&request);

        debug!(provider = %self.name, model = %request.model, rounds = request.rounds.len(), "Sending completion request");

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ProviderError::Timeout(e.to_string())
                } else {
                    ProviderError::Network(e.to_string())
                }
            })?;

        let status = response.status().as_u16();

        if status == 429 {
            return Err(ProviderError::RateLimited {
                retry_after_secs: 5,
            });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, body = %error_body, "Provider returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let api_response: ApiResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Ok(Self::parse_response(api_response))
    }
}

// --- OpenAI API types (internal) ---

#[derive(Debug, Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ApiToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl ApiMessage {
    fn text(role: &str, content: &str) -> Self {
        Self {
            role: role.into(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolCall {
    id: String,
    r#type: String,
    function: ApiFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiFunction {
    name: String,
    arguments: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolDefinition {
    r#type: String,
    function: ApiToolFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiToolFunction {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(default)]
    model: String,
    #[serde(default)]
    choices: Vec<ApiChoice>,
    usage: Option<ApiUsage>,
}

#[derive(Debug, Deserialize)]
struct ApiChoice {
    message: ApiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}
