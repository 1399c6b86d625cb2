//! Runner profile capability.

use crate::args::Args;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use stridecoach_core::error::ToolError;
use stridecoach_core::tool::Capability;
use stridecoach_core::training::TrainingStore;

pub struct RunnerProfileLookup {
    store: Arc<dyn TrainingStore>,
}

impl RunnerProfileLookup {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for RunnerProfileLookup {
    fn name(&self) -> &str {
        "get_runner_profile"
    }

    fn description(&self) -> &str {
        "Get the runner's full profile (anthropometrics, PRs, goals, training philosophy). Call it at the start of a conversation to personalise advice."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn invoke(&self, _arguments: Args) -> Result<Value, ToolError> {
        Ok(match self.store.runner_profile().await? {
            Some(profile) => json!({"profile": profile, "has_profile": true}),
            None => json!({
                "profile": null,
                "message": "No runner profile configured yet."
            }),
        })
    }
}
