//! Google Gemini provider (`generateContent`).
//!
//! Maps the function-calling exchange onto Gemini's wire format:
//! - prior messages become `user` / `model` contents
//! - each completed round becomes a `model` content of `functionCall` parts
//!   followed by a `user` content with one `functionResponse` per result
//! - consecutive contents with the same role are merged, since Gemini
//!   expects roles to alternate

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use stridecoach_core::error::ProviderError;
use stridecoach_core::message::Role;
use stridecoach_core::provider::*;
use tracing::{debug, warn};

/// Base URL for the Gemini API
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Model used when none is configured
pub const DEFAULT_MODEL: &str = "gemini-2.0-flash-exp";

/// Finish reason Gemini reports when it could not produce a valid call.
const MALFORMED_FUNCTION_CALL: &str = "MALFORMED_FUNCTION_CALL";

pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    default_model: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            base_url: DEFAULT_BASE_URL.into(),
            api_key: api_key.into(),
            default_model: DEFAULT_MODEL.into(),
            client,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    fn build_url(&self, model: &str) -> String {
        format!("{}/models/{model}:generateContent?key={}", self.base_url, self.api_key)
    }

    fn convert_role(role: Role) -> &'static str {
        match role {
            Role::User => "user",
            Role::Assistant => "model",
        }
    }

    /// Build the wire request.
    fn build_request(request: &ModelRequest) -> GeminiRequest {
        let mut contents: Vec<GeminiContent> = Vec::new();

        for msg in &request.history {
            push_merged(&mut contents, Self::convert_role(msg.role), ContentPart::text(&msg.content));
        }
        push_merged(&mut contents, "user", ContentPart::text(&request.utterance));

        for round in &request.rounds {
            for call in &round.calls {
                push_merged(
                    &mut contents,
                    "model",
                    ContentPart::FunctionCall {
                        function_call: GeminiFunctionCall {
                            name: call.name.clone(),
                            args: serde_json::Value::Object(call.arguments.clone()),
                        },
                    },
                );
            }
            for result in &round.results {
                push_merged(
                    &mut contents,
                    "user",
                    ContentPart::FunctionResponse {
                        function_response: GeminiFunctionResponse {
                            name: result.name.clone(),
                            response: response_object(&result.payload),
                        },
                    },
                );
            }
        }

        let system_instruction = (!request.system_instruction.is_empty()).then(|| GeminiContent {
            role: None,
            parts: vec![ContentPart::text(&request.system_instruction)],
        });

        let tools = (!request.tools.is_empty()).then(|| {
            vec![GeminiTool {
                function_declarations: request
                    .tools
                    .iter()
                    .map(|t| FunctionDeclaration {
                        name: t.name.clone(),
                        description: t.description.clone(),
                        parameters: t.parameters.clone(),
                    })
                    .collect(),
            }]
        });

        GeminiRequest {
            contents,
            system_instruction,
            tools,
            generation_config: GenerationConfig {
                temperature: Some(request.temperature),
                top_p: request.top_p,
                top_k: request.top_k,
                max_output_tokens: request.max_output_tokens,
            },
        }
    }

    /// Convert the wire response into a provider-neutral one.
    fn parse_response(response: GeminiResponse, model: &str) -> Result<ModelResponse, ProviderError> {
        if let Some(error) = response.error {
            return Err(ProviderError::ApiError {
                status_code: 200,
                message: error.message,
            });
        }

        let usage = response.usage_metadata.map(|u| Usage {
            prompt_tokens: u.prompt.unwrap_or(0),
            completion_tokens: u.candidates.unwrap_or(0),
            total_tokens: u.total.unwrap_or(0),
        });

        let first = response.candidates.and_then(|c| c.into_iter().next());

        let candidate = match first {
            Some(raw) => {
                let parts: Vec<ResponsePart> = raw
                    .content
                    .map(|c| c.parts)
                    .unwrap_or_default()
                    .into_iter()
                    .enumerate()
                    .filter_map(|(i, part)| match part {
                        ContentPart::Text { text } => Some(ResponsePart::Text(text)),
                        ContentPart::FunctionCall { function_call } => {
                            Some(ResponsePart::FunctionCall(RequestedCall {
                                id: format!("call_{i}_{}", function_call.name),
                                name: function_call.name,
                                arguments: function_call.args.to_string(),
                            }))
                        }
                        ContentPart::FunctionResponse { .. } | ContentPart::Other(_) => None,
                    })
                    .collect();

                if parts.is_empty() && raw.finish_reason.as_deref() == Some(MALFORMED_FUNCTION_CALL) {
                    return Err(ProviderError::MalformedFunctionCall(
                        "model emitted a function call that could not be parsed".into(),
                    ));
                }

                Some(Candidate {
                    parts,
                    finish_reason: raw.finish_reason,
                    safety_ratings: convert_ratings(raw.safety_ratings),
                })
            }
            // A blocked prompt has no candidates, only feedback
            None => response.prompt_feedback.and_then(|feedback| {
                feedback.block_reason.map(|reason| Candidate {
                    parts: Vec::new(),
                    finish_reason: Some(format!("PROMPT_BLOCKED: {reason}")),
                    safety_ratings: convert_ratings(feedback.safety_ratings),
                })
            }),
        };

        Ok(ModelResponse {
            candidate,
            usage,
            model: model.to_string(),
        })
    }

    /// Map a non-success HTTP status onto a provider error.
    fn map_api_error(status: u16, body: &str) -> ProviderError {
        let message = serde_json::from_str::<GeminiResponse>(body)
            .ok()
            .and_then(|r| r.error)
            .map_or_else(|| body.to_string(), |e| e.message);

        match status {
            429 => ProviderError::RateLimited {
                retry_after_secs: retry_after(&message).unwrap_or(5),
            },
            401 | 403 => ProviderError::AuthenticationFailed(message),
            400 if message.contains("API key not valid") => ProviderError::AuthenticationFailed(message),
            _ => ProviderError::ApiError {
                status_code: status,
                message,
            },
        }
    }
}

/// Gemini requires function responses to be JSON objects.
fn response_object(payload: &serde_json::Value) -> serde_json::Value {
    if payload.is_object() {
        payload.clone()
    } else {
        serde_json::json!({ "result": payload })
    }
}

fn push_merged(contents: &mut Vec<GeminiContent>, role: &str, part: ContentPart) {
    match contents.last_mut() {
        Some(last) if last.role.as_deref() == Some(role) => last.parts.push(part),
        _ => contents.push(GeminiContent {
            role: Some(role.to_string()),
            parts: vec![part],
        }),
    }
}

fn convert_ratings(ratings: Vec<GeminiSafetyRating>) -> Vec<SafetyRating> {
    ratings
        .into_iter()
        .map(|r| SafetyRating {
            category: r.category,
            probability: r.probability,
            blocked: r.blocked,
        })
        .collect()
}

/// Extract the delay from "Please retry in 6.4s."
fn retry_after(message: &str) -> Option<u64> {
    let rest = &message[message.find("Please retry in ")? + "Please retry in ".len()..];
    let secs: f64 = rest[..rest.find('s')?].parse().ok()?;
    Some(secs.ceil() as u64)
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    async fn generate(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "no Gemini API key (set GEMINI_API_KEY or api_key in config)".into(),
            ));
        }

        let body = Self::build_request(&request);

        debug!(
            provider = "gemini",
            model = %request.model,
            contents = body.contents.len(),
            rounds = request.rounds.len(),
            "Sending generateContent request"
        );

        let response = self
            .client
            .post(self.build_url(&request.model))
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
        let text = response
            .text()
            .await
            .map_err(|e| ProviderError::Network(e.to_string()))?;

        if !(200..300).contains(&status) {
            warn!(status, "Gemini returned error");
            return Err(Self::map_api_error(status, &text));
        }

        let parsed: GeminiResponse = serde_json::from_str(&text)
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        Self::parse_response(parsed, &request.model)
    }
}

impl std::fmt::Debug for GeminiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("default_model", &self.default_model)
            .finish()
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<GeminiTool>>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum ContentPart {
    Text {
        text: String,
    },
    FunctionCall {
        #[serde(rename = "functionCall")]
        function_call: GeminiFunctionCall,
    },
    FunctionResponse {
        #[serde(rename = "functionResponse")]
        function_response: GeminiFunctionResponse,
    },
    /// Part kinds the coach does not use (inline data, code execution, ...)
    Other(serde_json::Value),
}

impl ContentPart {
    fn text(text: &str) -> Self {
        Self::Text { text: text.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GeminiFunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponse {
    #[serde(default)]
    candidates: Option<Vec<GeminiCandidate>>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    error: Option<GeminiError>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiContent>,
    #[serde(default)]
    finish_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<GeminiSafetyRating>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
    #[serde(default)]
    safety_ratings: Vec<GeminiSafetyRating>,
}

#[derive(Debug, Deserialize)]
struct GeminiSafetyRating {
    category: String,
    probability: String,
    #[serde(default)]
    blocked: bool,
}

#[derive(Debug, Deserialize)]
struct UsageMetadata {
    #[serde(rename = "promptTokenCount")]
    prompt: Option<u32>,
    #[serde(rename = "candidatesTokenCount")]
    candidates: Option<u32>,
    #[serde(rename = "totalTokenCount")]
    total: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    message: String,
}
