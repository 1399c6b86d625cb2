//! Shared test helpers for orchestrator tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use stridecoach_core::error::ProviderError;
use stridecoach_core::provider::{ModelRequest, ModelResponse, Provider, RequestedCall};

/// One scripted reaction to a `generate` call.
#[derive(Debug, Clone)]
pub enum Step {
    Respond(ModelResponse),
    Fail(ProviderError),
    /// Sleep before answering (drives deadline tests).
    Stall(Duration, ModelResponse),
}

/// A mock provider that plays back a script and records every request.
///
/// Once the script runs out it repeats `fallback` if set, otherwise panics.
pub struct ScriptedProvider {
    script: Mutex<VecDeque<Step>>,
    fallback: Option<Step>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            script: Mutex::new(steps.into()),
            fallback: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn responses(responses: Vec<ModelResponse>) -> Self {
        Self::new(responses.into_iter().map(Step::Respond).collect())
    }

    /// Answers every call with `response`.
    pub fn repeating(response: ModelResponse) -> Self {
        Self {
            fallback: Some(Step::Respond(response)),
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    fn default_model(&self) -> &str {
        "scripted-model"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let step = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .or_else(|| self.fallback.clone())
            .unwrap_or_else(|| panic!("ScriptedProvider: no more responses (call #{call})"));

        match step {
            Step::Respond(response) => Ok(response),
            Step::Fail(err) => Err(err),
            Step::Stall(delay, response) => {
                tokio::time::sleep(delay).await;
                Ok(response)
            }
        }
    }
}

pub fn text(answer: &str) -> ModelResponse {
    ModelResponse::text("scripted-model", answer)
}

/// A response requesting each `(name, arguments)` in order.
pub fn calls(requested: &[(&str, serde_json::Value)]) -> ModelResponse {
    ModelResponse::calls(
        "scripted-model",
        requested
            .iter()
            .enumerate()
            .map(|(i, (name, args))| raw_call(&format!("call_{i}_{name}"), name, &args.to_string()))
            .collect(),
    )
}

pub fn raw_call(id: &str, name: &str, arguments: &str) -> RequestedCall {
    RequestedCall {
        id: id.into(),
        name: name.into(),
        arguments: arguments.into(),
    }
}
