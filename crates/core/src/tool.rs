//! Capability registry — the named functions the model may ask to run.
//!
//! The registry is built once at startup. Invocation never fails from the
//! caller's point of view: unknown names, capability errors and even panics
//! come back as a [`FunctionResult`] carrying an `{"error": message}` payload,
//! so the orchestrator can feed every outcome back to the model uniformly.

use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use crate::error::{Error, ToolError};
use crate::provider::{FunctionCall, FunctionResult, ToolDescriptor};

/// Payload message for a function name that is not registered.
pub const UNKNOWN_FUNCTION: &str = "unknown function";

/// A named, statically-typed handler the model can invoke.
#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name (what the model calls).
    fn name(&self) -> &str;

    /// Description sent to the model.
    fn description(&self) -> &str;

    /// JSON Schema describing the parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Run the capability. Logical "not found" outcomes are `Ok` values;
    /// `Err` is reserved for unexpected failures.
    async fn invoke(
        &self,
        arguments: serde_json::Map<String, serde_json::Value>,
    ) -> std::result::Result<serde_json::Value, ToolError>;

    /// Declaration sent to the model.
    fn descriptor(&self) -> ToolDescriptor {
        ToolDescriptor {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// Why an invocation produced an error payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InvocationFailure {
    /// The requested name is not registered.
    UnknownCapability,
    /// The capability returned an error or panicked.
    CapabilityFailed(String),
}

/// A traced invocation: the result fed back to the model plus diagnostics.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub result: FunctionResult,
    pub failure: Option<InvocationFailure>,
    pub duration: Duration,
}

/// A fixed mapping from tool name to handler.
pub struct CapabilityRegistry {
    capabilities: HashMap<String, Arc<dyn Capability>>,
    order: Vec<String>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            capabilities: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a capability. Names must be unique.
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> std::result::Result<(), ToolError> {
        let name = capability.name().to_string();
        if self.capabilities.contains_key(&name) {
            return Err(ToolError::DuplicateName(name));
        }
        self.order.push(name.clone());
        self.capabilities.insert(name, capability);
        Ok(())
    }

    /// Look up a capability by name.
    pub fn resolve(&self, name: &str) -> std::result::Result<Arc<dyn Capability>, ToolError> {
        self.capabilities
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Declarations in registration order.
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.order
            .iter()
            .filter_map(|name| self.capabilities.get(name))
            .map(|c| c.descriptor())
            .collect()
    }

    /// Registered names in registration order.
    pub fn names(&self) -> Vec<&str> {
        self.order.iter().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Check that every declared name resolves. A miss is a configuration
    /// error and must stop startup.
    pub fn validate<S: AsRef<str>>(&self, declared: &[S]) -> crate::error::Result<()> {
        let missing: Vec<&str> = declared
            .iter()
            .map(|s| s.as_ref())
            .filter(|name| !self.contains(name))
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::Config {
                message: format!("declared tools not registered: {}", missing.join(", ")),
            })
        }
    }

    /// Keep only the named capabilities, in the given order.
    ///
    /// An empty list keeps everything.
    pub fn restrict<S: AsRef<str>>(self, names: &[S]) -> crate::error::Result<Self> {
        if names.is_empty() {
            return Ok(self);
        }
        self.validate(names)?;
        let mut restricted = Self::new();
        for name in names {
            if let Some(cap) = self.capabilities.get(name.as_ref()) {
                restricted
                    .register(Arc::clone(cap))
                    .map_err(|e| Error::Config { message: e.to_string() })?;
            }
        }
        Ok(restricted)
    }

    /// Execute a call and record how it went.
    pub async fn invoke_traced(&self, call: &FunctionCall) -> Invocation {
        let start = Instant::now();

        let Some(capability) = self.capabilities.get(&call.name) else {
            warn!(tool = %call.name, "Model requested an unregistered function");
            return Invocation {
                result: FunctionResult::error(&call.id, &call.name, UNKNOWN_FUNCTION),
                failure: Some(InvocationFailure::UnknownCapability),
                duration: start.elapsed(),
            };
        };

        let outcome = AssertUnwindSafe(capability.invoke(call.arguments.clone()))
            .catch_unwind()
            .await;

        let (result, failure) = match outcome {
            Ok(Ok(payload)) => (FunctionResult::ok(&call.id, &call.name, payload), None),
            Ok(Err(e)) => {
                let message = format!("error executing {}: {e}", call.name);
                warn!(tool = %call.name, error = %e, "Capability failed");
                (
                    FunctionResult::error(&call.id, &call.name, &message),
                    Some(InvocationFailure::CapabilityFailed(message)),
                )
            }
            Err(panic) => {
                let reason = panic_message(panic.as_ref());
                let message = format!("error executing {}: {reason}", call.name);
                warn!(tool = %call.name, %reason, "Capability panicked");
                (
                    FunctionResult::error(&call.id, &call.name, &message),
                    Some(InvocationFailure::CapabilityFailed(message)),
                )
            }
        };

        let duration = start.elapsed();
        debug!(tool = %call.name, ok = failure.is_none(), duration_ms = duration.as_millis() as u64, "Capability invoked");
        Invocation { result, failure, duration }
    }

    /// Execute a call. Never fails; see [`Self::invoke_traced`].
    pub async fn invoke(&self, call: &FunctionCall) -> FunctionResult {
        self.invoke_traced(call).await.result
    }

    /// Execute a whole batch. Results come back in request order.
    pub async fn invoke_all(&self, calls: &[FunctionCall]) -> Vec<Invocation> {
        futures::future::join_all(calls.iter().map(|c| self.invoke_traced(c))).await
    }
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "capability panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct EchoCapability;

    #[async_trait]
    impl Capability for EchoCapability {
        fn name(&self) -> &str { "echo" }
        fn description(&self) -> &str { "Echoes back the input" }
        fn parameters_schema(&self) -> serde_json::Value {
            json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn invoke(
            &self,
            arguments: serde_json::Map<String, serde_json::Value>,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            let text = arguments
                .get("text")
                .and_then(|v| v.as_str())
                .ok_or_else(|| ToolError::InvalidArguments("missing 'text'".into()))?;
            Ok(json!({ "echo": text }))
        }
    }

    struct PanickingCapability;

    #[async_trait]
    impl Capability for PanickingCapability {
        fn name(&self) -> &str { "explode" }
        fn description(&self) -> &str { "Always panics" }
        fn parameters_schema(&self) -> serde_json::Value { json!({"type": "object"}) }
        async fn invoke(
            &self,
            _arguments: serde_json::Map<String, serde_json::Value>,
        ) -> std::result::Result<serde_json::Value, ToolError> {
            panic!("query helper blew up")
        }
    }

    fn call(name: &str, args: serde_json::Value) -> FunctionCall {
        FunctionCall {
            id: format!("call_{name}"),
            name: name.into(),
            arguments: args.as_object().cloned().unwrap_or_default(),
        }
    }

    fn registry() -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        registry.register(Arc::new(EchoCapability)).unwrap();
        registry.register(Arc::new(PanickingCapability)).unwrap();
        registry
    }

    #[test]
    fn register_and_resolve() {
        let registry = registry();
        assert!(registry.resolve("echo").is_ok());
        assert!(matches!(registry.resolve("nope"), Err(ToolError::NotFound(_))));
        assert_eq!(registry.names(), vec!["echo", "explode"]);
    }

    #[test]
    fn duplicate_registration_rejected() {
        let mut registry = registry();
        let err = registry.register(Arc::new(EchoCapability)).unwrap_err();
        assert!(matches!(err, ToolError::DuplicateName(_)));
    }

    #[test]
    fn validate_reports_missing_names() {
        let registry = registry();
        assert!(registry.validate(&["echo"]).is_ok());
        let err = registry.validate(&["echo", "get_weekly_stats"]).unwrap_err();
        assert!(err.to_string().contains("get_weekly_stats"));
    }

    #[test]
    fn restrict_keeps_requested_subset() {
        let restricted = registry().restrict(&["explode"]).unwrap();
        assert_eq!(restricted.names(), vec!["explode"]);
        assert!(registry().restrict(&["missing"]).is_err());
        assert_eq!(registry().restrict::<&str>(&[]).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invoke_success() {
        let result = registry().invoke(&call("echo", json!({"text": "hi"}))).await;
        assert!(!result.is_error());
        assert_eq!(result.payload, json!({"echo": "hi"}));
        assert_eq!(result.call_id, "call_echo");
    }

    #[tokio::test]
    async fn unknown_function_is_idempotent_and_never_raises() {
        let registry = registry();
        let first = registry.invoke_traced(&call("missing", json!({"a": 1}))).await;
        let second = registry.invoke_traced(&call("missing", json!({"a": 1}))).await;
        assert_eq!(first.result, second.result);
        assert_eq!(first.result.payload, json!({"error": UNKNOWN_FUNCTION}));
        assert_eq!(first.failure, Some(InvocationFailure::UnknownCapability));
    }

    #[tokio::test]
    async fn capability_error_is_wrapped() {
        let invocation = registry().invoke_traced(&call("echo", json!({}))).await;
        assert!(invocation.result.is_error());
        let message = invocation.result.payload["error"].as_str().unwrap();
        assert!(message.contains("error executing echo"));
        assert!(matches!(invocation.failure, Some(InvocationFailure::CapabilityFailed(_))));
    }

    #[tokio::test]
    async fn capability_panic_is_caught() {
        let invocation = registry().invoke_traced(&call("explode", json!({}))).await;
        assert!(invocation.result.is_error());
        assert!(invocation.result.payload["error"]
            .as_str()
            .unwrap()
            .contains("query helper blew up"));
    }

    #[tokio::test]
    async fn batch_preserves_request_order() {
        let calls = vec![
            call("echo", json!({"text": "one"})),
            call("missing", json!({})),
            call("echo", json!({"text": "two"})),
        ];
        let results = registry().invoke_all(&calls).await;
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].result.payload["echo"], "one");
        assert!(results[1].result.is_error());
        assert_eq!(results[2].result.payload["echo"], "two");
    }
}
