//! Provider trait — the abstraction over the remote language model.
//!
//! The request/response types model a function-calling exchange in a
//! wire-format-agnostic way: a request carries the system instruction, the
//! tool declarations, prior conversation history and the current input (the
//! user's utterance, or the results of the last function-calling round).
//! A response carries at most one candidate holding text parts and/or
//! function-call requests.
//!
//! Implementations: Gemini `generateContent`, OpenAI-compatible endpoints.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use crate::error::ProviderError;
use crate::message::Message;

/// A tool declaration sent to the model so it knows what it can call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Unique tool name
    pub name: String,

    /// Description of what the tool does
    pub description: String,

    /// JSON Schema describing the tool's parameters
    pub parameters: serde_json::Value,
}

/// A function call exactly as the model emitted it.
///
/// `arguments` is the raw JSON text; decoding it is the orchestrator's job so
/// that an undecodable payload surfaces as a classified turn failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestedCall {
    /// Call ID (provider-assigned or synthesized)
    pub id: String,

    /// Name of the requested function
    pub name: String,

    /// Arguments as raw JSON text
    pub arguments: String,
}

/// A decoded function call, ready to run against the capability registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub id: String,
    pub name: String,
    pub arguments: serde_json::Map<String, serde_json::Value>,
}

impl FunctionCall {
    /// Decode a raw call. Empty argument text is treated as `{}`.
    pub fn decode(raw: &RequestedCall) -> Result<Self, ProviderError> {
        let text = raw.arguments.trim();
        let value: serde_json::Value = if text.is_empty() {
            serde_json::Value::Object(serde_json::Map::new())
        } else {
            serde_json::from_str(text).map_err(|e| {
                ProviderError::MalformedFunctionCall(format!(
                    "arguments for '{}' are not valid JSON: {e}",
                    raw.name
                ))
            })?
        };

        match value {
            serde_json::Value::Object(arguments) => Ok(Self {
                id: raw.id.clone(),
                name: raw.name.clone(),
                arguments,
            }),
            other => Err(ProviderError::MalformedFunctionCall(format!(
                "arguments for '{}' must be an object, got {other}",
                raw.name
            ))),
        }
    }

    /// Raw JSON form (what providers re-send when replaying a round).
    pub fn to_requested(&self) -> RequestedCall {
        RequestedCall {
            id: self.id.clone(),
            name: self.name.clone(),
            arguments: serde_json::Value::Object(self.arguments.clone()).to_string(),
        }
    }
}

/// The result of executing a [`FunctionCall`] against the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionResult {
    /// The call this result answers
    pub call_id: String,

    /// Function name
    pub name: String,

    /// Structured payload; failures are `{"error": message}`
    pub payload: serde_json::Value,
}

impl FunctionResult {
    pub fn ok(call_id: impl Into<String>, name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            payload,
        }
    }

    pub fn error(call_id: impl Into<String>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            name: name.into(),
            payload: serde_json::json!({ "error": message.into() }),
        }
    }

    /// Whether the payload is an error wrapper produced by the registry.
    pub fn is_error(&self) -> bool {
        self.payload
            .as_object()
            .is_some_and(|obj| obj.len() == 1 && obj.contains_key("error"))
    }
}

/// One completed function-calling round within a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRound {
    pub calls: Vec<FunctionCall>,
    pub results: Vec<FunctionResult>,
}

/// The current input of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ModelInput<'a> {
    Text(&'a str),
    FunctionResults(&'a [FunctionResult]),
}

/// Everything the model needs for one invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelRequest {
    /// The model to use (e.g., "gemini-2.0-flash-exp")
    pub model: String,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,

    /// Maximum tokens to generate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,

    /// System instruction (coach persona and rules)
    pub system_instruction: String,

    /// Declared tools
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tools: Vec<ToolDescriptor>,

    /// Prior messages, oldest first
    #[serde(default)]
    pub history: Vec<Message>,

    /// The utterance that opened this turn
    pub utterance: String,

    /// Function-calling rounds already completed in this turn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rounds: Vec<ToolRound>,
}

fn default_temperature() -> f32 {
    0.7
}

impl ModelRequest {
    /// A bare request with no tools, history or rounds.
    pub fn simple(model: impl Into<String>, utterance: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            temperature: default_temperature(),
            top_p: None,
            top_k: None,
            max_output_tokens: None,
            system_instruction: String::new(),
            tools: Vec::new(),
            history: Vec::new(),
            utterance: utterance.into(),
            rounds: Vec::new(),
        }
    }

    /// The logical input of this invocation.
    pub fn input(&self) -> ModelInput<'_> {
        match self.rounds.last() {
            Some(round) => ModelInput::FunctionResults(&round.results),
            None => ModelInput::Text(&self.utterance),
        }
    }
}

/// A part of a candidate's content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponsePart {
    Text(String),
    FunctionCall(RequestedCall),
}

/// A safety signal attached to a candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyRating {
    pub category: String,
    pub probability: String,
    #[serde(default)]
    pub blocked: bool,
}

/// The single candidate of a model response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub parts: Vec<ResponsePart>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
}

impl Candidate {
    /// All function-call parts, in emission order.
    pub fn function_calls(&self) -> Vec<&RequestedCall> {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::FunctionCall(call) => Some(call),
                ResponsePart::Text(_) => None,
            })
            .collect()
    }

    /// Concatenation of all text parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                ResponsePart::Text(t) => Some(t.as_str()),
                ResponsePart::FunctionCall(_) => None,
            })
            .collect()
    }
}

/// A complete response from a provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelResponse {
    /// `None` when the model returned no candidate at all
    pub candidate: Option<Candidate>,

    /// Token usage statistics
    pub usage: Option<Usage>,

    /// Which model actually responded
    pub model: String,
}

impl ModelResponse {
    pub fn text(model: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            candidate: Some(Candidate {
                parts: vec![ResponsePart::Text(text.into())],
                finish_reason: Some("STOP".into()),
                safety_ratings: Vec::new(),
            }),
            usage: None,
            model: model.into(),
        }
    }

    pub fn calls(model: impl Into<String>, calls: Vec<RequestedCall>) -> Self {
        Self {
            candidate: Some(Candidate {
                parts: calls.into_iter().map(ResponsePart::FunctionCall).collect(),
                finish_reason: Some("STOP".into()),
                safety_ratings: Vec::new(),
            }),
            usage: None,
            model: model.into(),
        }
    }

    pub fn empty(model: impl Into<String>) -> Self {
        Self {
            candidate: None,
            usage: None,
            model: model.into(),
        }
    }
}

/// Token usage information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// Prompt used by the default connectivity check.
pub const HEALTH_CHECK_PROMPT: &str = "Reply only: OK";

/// The core Provider trait.
///
/// The orchestrator owns deadlines; implementations should not rely on their
/// HTTP client's timeout to bound a turn.
#[async_trait]
pub trait Provider: Send + Sync {
    /// A human-readable name for this provider (e.g., "gemini", "deepinfra").
    fn name(&self) -> &str;

    /// The model used when the caller does not pick one.
    fn default_model(&self) -> &str;

    /// Send a request and get a complete response.
    async fn generate(&self, request: ModelRequest) -> std::result::Result<ModelResponse, ProviderError>;

    /// Lightweight connectivity check: a one-line generation with no tools.
    async fn health_check(&self) -> std::result::Result<bool, ProviderError> {
        let request = ModelRequest::simple(self.default_model(), HEALTH_CHECK_PROMPT);
        let response = self.generate(request).await?;
        Ok(response
            .candidate
            .is_some_and(|c| !c.text().trim().is_empty()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, args: &str) -> RequestedCall {
        RequestedCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: args.into(),
        }
    }

    #[test]
    fn decode_valid_arguments() {
        let call = FunctionCall::decode(&raw("get_recent_activities", r#"{"days": 7}"#)).unwrap();
        assert_eq!(call.name, "get_recent_activities");
        assert_eq!(call.arguments["days"], 7);
    }

    #[test]
    fn decode_empty_arguments_as_object() {
        let call = FunctionCall::decode(&raw("get_current_plan", "  ")).unwrap();
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn decode_rejects_broken_json() {
        let err = FunctionCall::decode(&raw("update_workout", r#"{"workout_id": "#)).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedFunctionCall(_)));
    }

    #[test]
    fn decode_rejects_non_object() {
        let err = FunctionCall::decode(&raw("get_weekly_stats", "[1, 2]")).unwrap_err();
        assert!(matches!(err, ProviderError::MalformedFunctionCall(_)));
    }

    #[test]
    fn request_input_switches_to_results() {
        let mut req = ModelRequest::simple("m", "how was my week?");
        assert_eq!(req.input(), ModelInput::Text("how was my week?"));

        let call = FunctionCall::decode(&raw("get_weekly_stats", "{}")).unwrap();
        let result = FunctionResult::ok("call_get_weekly_stats", "get_weekly_stats", serde_json::json!({"total_weeks": 0}));
        req.rounds.push(ToolRound {
            calls: vec![call],
            results: vec![result.clone()],
        });
        assert_eq!(req.input(), ModelInput::FunctionResults(&[result]));
    }

    #[test]
    fn error_result_is_detected() {
        let err = FunctionResult::error("c1", "nope", "unknown function");
        assert!(err.is_error());
        assert_eq!(err.payload, serde_json::json!({"error": "unknown function"}));

        let ok = FunctionResult::ok("c1", "get_runner_profile", serde_json::json!({"profile": null, "message": "x"}));
        assert!(!ok.is_error());
    }

    #[test]
    fn candidate_text_concatenates_parts() {
        let candidate = Candidate {
            parts: vec![
                ResponsePart::Text("Easy ".into()),
                ResponsePart::FunctionCall(raw("get_current_plan", "{}")),
                ResponsePart::Text("week.".into()),
            ],
            finish_reason: None,
            safety_ratings: vec![],
        };
        assert_eq!(candidate.text(), "Easy week.");
        assert_eq!(candidate.function_calls().len(), 1);
    }
}
