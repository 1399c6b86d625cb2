//! Error classifier — maps raw failures onto a closed taxonomy.
//!
//! Every failure is scoped to one turn. Two kinds never end a turn:
//! `UnknownCapability` and `CapabilityFailure` are fed back to the model as
//! error payloads so it can correct itself.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use stridecoach_core::error::ProviderError;
use stridecoach_core::provider::{Candidate, FunctionResult, SafetyRating};
use stridecoach_core::tool::InvocationFailure;

/// The closed set of turn-level failure kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnErrorKind {
    /// The model call exceeded its deadline.
    ModelTimeout,
    /// The model returned no usable content.
    EmptyResponse,
    /// A function call or response could not be decoded.
    MalformedFunctionCall,
    /// The model asked for a name the registry does not hold.
    UnknownCapability,
    /// A registered capability failed while running.
    CapabilityFailure,
    /// The iteration ceiling was reached without an answer.
    CeilingExhausted,
    /// The provider rejected or could not serve the request.
    ProviderUnavailable,
}

impl TurnErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ModelTimeout => "model_timeout",
            Self::EmptyResponse => "empty_response",
            Self::MalformedFunctionCall => "malformed_function_call",
            Self::UnknownCapability => "unknown_capability",
            Self::CapabilityFailure => "capability_failure",
            Self::CeilingExhausted => "ceiling_exhausted",
            Self::ProviderUnavailable => "provider_unavailable",
        }
    }

    /// Whether this kind terminates the turn.
    pub fn ends_turn(&self) -> bool {
        !matches!(self, Self::UnknownCapability | Self::CapabilityFailure)
    }

    pub fn default_recovery(&self) -> Recovery {
        match self {
            Self::ModelTimeout => Recovery::CheckNetwork,
            Self::EmptyResponse => Recovery::Retry,
            Self::MalformedFunctionCall => Recovery::Rephrase,
            Self::UnknownCapability | Self::CapabilityFailure => Recovery::FedBackToModel,
            Self::CeilingExhausted => Recovery::Simplify,
            Self::ProviderUnavailable => Recovery::Retry,
        }
    }
}

impl std::fmt::Display for TurnErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the user (or caller) should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recovery {
    /// Same input, try again.
    Retry,
    /// Transient infrastructure trouble; check the network path.
    CheckNetwork,
    /// Same intent, different wording.
    Rephrase,
    /// Ask for less in one go.
    Simplify,
    /// Credentials or provider settings are wrong.
    CheckConfiguration,
    /// Nothing for the user to do; the model saw the error.
    FedBackToModel,
}

impl Recovery {
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Retry => "Try again in a moment.",
            Self::CheckNetwork => {
                "Try again; if it keeps happening, check your connection and disable any proxy or VPN."
            }
            Self::Rephrase => "Try rephrasing your question.",
            Self::Simplify => "Please simplify the request or split it into smaller questions.",
            Self::CheckConfiguration => "Check the API key and provider settings (see `stridecoach onboard`).",
            Self::FedBackToModel => "Reported to the model so it can adjust.",
        }
    }

    /// Whether resubmitting the same utterance is reasonable.
    pub fn same_input_ok(&self) -> bool {
        matches!(self, Self::Retry | Self::CheckNetwork)
    }
}

/// Verbose context for optional display.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub safety_ratings: Vec<SafetyRating>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl Diagnostic {
    pub fn detail(detail: impl Into<String>) -> Self {
        Self {
            detail: Some(detail.into()),
            ..Self::default()
        }
    }

    pub fn from_candidate(candidate: &Candidate) -> Self {
        Self {
            finish_reason: candidate.finish_reason.clone(),
            safety_ratings: candidate.safety_ratings.clone(),
            detail: None,
        }
    }

    /// Whether a safety filter suppressed the answer.
    pub fn blocked(&self) -> bool {
        self.safety_ratings.iter().any(|r| r.blocked)
            || self.finish_reason.as_deref() == Some("SAFETY")
    }
}

/// A classified, terminal turn failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnFailure {
    pub kind: TurnErrorKind,
    pub recovery: Recovery,
    /// User-facing explanation.
    pub message: String,
    pub diagnostic: Diagnostic,
    /// Function results gathered before the failure, for best-effort display.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fallback: Vec<FunctionResult>,
    #[serde(default)]
    pub functions_executed: Vec<String>,
}

impl TurnFailure {
    pub fn new(kind: TurnErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            recovery: kind.default_recovery(),
            message: message.into(),
            diagnostic: Diagnostic::default(),
            fallback: Vec::new(),
            functions_executed: Vec::new(),
        }
    }

    pub fn with_recovery(mut self, recovery: Recovery) -> Self {
        self.recovery = recovery;
        self
    }

    pub fn with_diagnostic(mut self, diagnostic: Diagnostic) -> Self {
        self.diagnostic = diagnostic;
        self
    }

    /// Attach what the turn managed before it failed.
    pub fn with_partial(mut self, functions_executed: Vec<String>, fallback: Vec<FunctionResult>) -> Self {
        self.functions_executed = functions_executed;
        self.fallback = fallback;
        self
    }

    pub fn timeout(limit: Duration) -> Self {
        Self::new(
            TurnErrorKind::ModelTimeout,
            format!("The model did not answer within {}s.", limit.as_secs()),
        )
    }

    pub fn empty(diagnostic: Diagnostic) -> Self {
        let failure = if diagnostic.blocked() {
            Self::new(TurnErrorKind::EmptyResponse, "The model's answer was blocked by its safety filters.")
                .with_recovery(Recovery::Rephrase)
        } else {
            Self::new(TurnErrorKind::EmptyResponse, "The model produced no answer.")
        };
        failure.with_diagnostic(diagnostic)
    }

    pub fn ceiling(max_iterations: u32) -> Self {
        Self::new(
            TurnErrorKind::CeilingExhausted,
            format!("The coach is having trouble with this request (no answer after {max_iterations} rounds)."),
        )
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(
            TurnErrorKind::MalformedFunctionCall,
            "The model produced a function call that could not be decoded.",
        )
        .with_diagnostic(Diagnostic::detail(detail))
    }

    pub fn from_provider_error(err: &ProviderError) -> Self {
        let (kind, recovery) = classify_provider_error(err);
        let message = match kind {
            TurnErrorKind::ModelTimeout => "The model did not answer in time.".to_string(),
            TurnErrorKind::MalformedFunctionCall => {
                "The model produced a function call that could not be decoded.".to_string()
            }
            _ => format!("The model provider could not serve the request: {err}"),
        };
        Self::new(kind, message)
            .with_recovery(recovery)
            .with_diagnostic(Diagnostic::detail(err.to_string()))
    }

    /// Whether partial results are available to show instead.
    pub fn has_fallback(&self) -> bool {
        !self.fallback.is_empty()
    }
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.message, self.recovery.hint())
    }
}

/// Kind and recovery for a provider-side failure.
pub fn classify_provider_error(err: &ProviderError) -> (TurnErrorKind, Recovery) {
    match err {
        ProviderError::Timeout(_) => (TurnErrorKind::ModelTimeout, Recovery::CheckNetwork),
        ProviderError::MalformedFunctionCall(_) | ProviderError::InvalidResponse(_) => {
            (TurnErrorKind::MalformedFunctionCall, Recovery::Rephrase)
        }
        ProviderError::Network(_) => (TurnErrorKind::ProviderUnavailable, Recovery::CheckNetwork),
        ProviderError::RateLimited { .. } => (TurnErrorKind::ProviderUnavailable, Recovery::Retry),
        ProviderError::ApiError { status_code, .. } if *status_code >= 500 => {
            (TurnErrorKind::ProviderUnavailable, Recovery::Retry)
        }
        ProviderError::ApiError { .. }
        | ProviderError::AuthenticationFailed(_)
        | ProviderError::NotConfigured(_) => (TurnErrorKind::ProviderUnavailable, Recovery::CheckConfiguration),
    }
}

/// Kind of a fed-back capability failure.
pub fn classify_invocation(failure: &InvocationFailure) -> TurnErrorKind {
    match failure {
        InvocationFailure::UnknownCapability => TurnErrorKind::UnknownCapability,
        InvocationFailure::CapabilityFailed(_) => TurnErrorKind::CapabilityFailure,
    }
}
