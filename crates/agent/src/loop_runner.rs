//! The turn orchestrator — a bounded model ↔ capability loop.
//!
//! States per iteration: `AwaitingModel → {HasFunctionCalls, HasFinalText,
//! Empty}`. Function calls loop back to `AwaitingModel`; everything else is
//! terminal, as are `CeilingExhausted` and `Failed`.

use crate::classify::{Diagnostic, TurnFailure, classify_invocation};
use crate::context::words::truncate_chars;
use crate::context::{ContextAssembler, ContextBudget, ContextPackage};
use crate::deadline::{Deadline, DeadlineError};
use crate::session::{SessionState, ToolFault, TurnAnswer, TurnOutcome, TurnReport, summarize_exchange};
use chrono::{Local, Utc};
use std::sync::Arc;
use std::time::{Duration, Instant};
use stridecoach_config::AppConfig;
use stridecoach_core::error::ProviderError;
use stridecoach_core::event::{DomainEvent, EventBus};
use stridecoach_core::history::{ChatHistoryStore, ChatRecord};
use stridecoach_core::memory::{MemoryStore, kind};
use stridecoach_core::message::Message;
use stridecoach_core::provider::{FunctionCall, FunctionResult, ModelRequest, ModelResponse, Provider, ToolRound};
use stridecoach_core::tool::{CapabilityRegistry, InvocationFailure};
use stridecoach_core::training::TrainingStore;
use tracing::{debug, info, warn};

/// Coach persona used unless the config overrides it.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are \"Coach\", an elite running coach, sports scientist and strategist.
Principles:
1) Reverse, polarized periodization according to the time left to the fixed objective.
2) Base every analysis and recommendation EXCLUSIVELY on the context package, memory and function results provided.
3) Prioritize sustainability and injury prevention (weekly progression of 10-15% at most).
4) Communicate clearly in Markdown (headings, lists, bold).
5) Talk in paces and zones, not only distances.
6) Call the available functions when the package is not enough or the runner asks to change the plan; confirm every plan change.";

/// Working memory of one turn. Discarded when the turn ends.
#[derive(Debug, Default)]
struct TurnState {
    iteration: u32,
    functions_executed: Vec<String>,
    gathered: Vec<FunctionResult>,
    faults: Vec<ToolFault>,
}

impl TurnState {
    /// Attach partial progress to a terminal failure.
    fn fail(&self, failure: TurnFailure) -> TurnFailure {
        failure.with_partial(self.functions_executed.clone(), self.gathered.clone())
    }
}

/// Drives one user utterance to a final answer or a classified failure.
pub struct TurnOrchestrator {
    provider: Arc<dyn Provider>,
    registry: Arc<CapabilityRegistry>,
    training: Arc<dyn TrainingStore>,
    memory: Arc<dyn MemoryStore>,

    /// Optional persisted chat history
    history: Option<Arc<dyn ChatHistoryStore>>,

    event_bus: Arc<EventBus>,
    assembler: ContextAssembler,

    model: String,
    system_prompt: String,
    temperature: f32,
    top_p: Option<f32>,
    top_k: Option<u32>,
    max_output_tokens: Option<u32>,

    /// Maximum model calls per turn
    max_iterations: u32,

    generation_deadline: Deadline,
    health_check_deadline: Deadline,

    /// Conversation messages replayed each turn
    history_window: usize,
}

impl TurnOrchestrator {
    pub fn new(
        provider: Arc<dyn Provider>,
        registry: Arc<CapabilityRegistry>,
        training: Arc<dyn TrainingStore>,
        memory: Arc<dyn MemoryStore>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        let model = provider.default_model().to_string();
        Self {
            provider,
            registry,
            training,
            memory,
            history: None,
            event_bus,
            assembler: ContextAssembler::default(),
            model,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            temperature: 0.7,
            top_p: None,
            top_k: None,
            max_output_tokens: None,
            max_iterations: 5,
            generation_deadline: Deadline::from_secs(30),
            health_check_deadline: Deadline::from_secs(10),
            history_window: 10,
        }
    }

    /// Apply sampling, coach and context settings.
    pub fn with_config(mut self, config: &AppConfig) -> Self {
        self.temperature = config.temperature;
        self.top_p = Some(config.top_p);
        self.top_k = Some(config.top_k);
        self.max_output_tokens = Some(config.max_output_tokens);
        self.max_iterations = config.coach.max_iterations;
        self.generation_deadline = Deadline::from_secs(config.coach.generation_timeout_secs);
        self.health_check_deadline = Deadline::from_secs(config.coach.health_check_timeout_secs);
        self.history_window = config.coach.history_window;
        if let Some(prompt) = &config.coach.system_prompt {
            self.system_prompt = prompt.clone();
        }
        self.assembler = ContextAssembler::new(ContextBudget::from(&config.context));
        self
    }

    /// Persist finished exchanges to a chat-history store.
    pub fn with_history(mut self, history: Arc<dyn ChatHistoryStore>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    /// Set the maximum number of model calls per turn.
    pub fn with_max_iterations(mut self, max: u32) -> Self {
        self.max_iterations = max;
        self
    }

    pub fn with_generation_timeout(mut self, limit: Duration) -> Self {
        self.generation_deadline = Deadline::new(limit);
        self
    }

    pub fn with_health_check_timeout(mut self, limit: Duration) -> Self {
        self.health_check_deadline = Deadline::new(limit);
        self
    }

    pub fn with_history_window(mut self, messages: usize) -> Self {
        self.history_window = messages;
        self
    }

    pub fn with_context_budget(mut self, budget: ContextBudget) -> Self {
        self.assembler = ContextAssembler::new(budget);
        self
    }

    pub fn registry(&self) -> &CapabilityRegistry {
        &self.registry
    }

    pub fn max_iterations(&self) -> u32 {
        self.max_iterations
    }

    /// The package the next turn would send.
    pub async fn preview_context(&self) -> ContextPackage {
        self.assembler
            .gather(self.training.as_ref(), self.memory.as_ref(), Local::now().naive_local())
            .await
    }

    /// Run one turn. The session comes back in the report whatever happens;
    /// a failed turn leaves its conversation untouched.
    pub async fn run_turn(&self, mut session: SessionState, utterance: &str) -> TurnReport {
        let conversation_id = session.conversation.id.to_string();
        self.event_bus.publish(DomainEvent::TurnStarted {
            conversation_id: conversation_id.clone(),
            utterance_preview: truncate_chars(utterance, 80, "..."),
            timestamp: Utc::now(),
        });

        let package = self.preview_context().await;
        debug!(
            conversation = %conversation_id,
            context_words = package.metadata.word_count,
            records = package.metadata.records_included,
            "Context package ready"
        );
        let request = self.build_request(&session, &package, utterance);

        let outcome = match self.drive(request).await {
            Ok(answer) => {
                self.commit(&mut session, utterance, &answer).await;
                info!(
                    conversation = %conversation_id,
                    iterations = answer.iterations,
                    functions = ?answer.functions_executed,
                    "Turn answered"
                );
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    conversation_id,
                    model: answer.model.clone(),
                    iterations: answer.iterations,
                    functions_executed: answer.functions_executed.clone(),
                    timestamp: Utc::now(),
                });
                TurnOutcome::Answered(answer)
            }
            Err(failure) => {
                session.last_failure = Some(failure.kind);
                warn!(
                    conversation = %conversation_id,
                    kind = %failure.kind,
                    recovery = ?failure.recovery,
                    functions = ?failure.functions_executed,
                    "Turn failed"
                );
                self.event_bus.publish(DomainEvent::TurnFailed {
                    conversation_id,
                    kind: failure.kind.as_str().to_string(),
                    message: failure.message.clone(),
                    timestamp: Utc::now(),
                });
                TurnOutcome::Failed(failure)
            }
        };

        TurnReport { session, outcome }
    }

    /// Connectivity check under the health-check deadline.
    pub async fn ping(&self) -> Result<Duration, TurnFailure> {
        let provider = Arc::clone(&self.provider);
        let started = Instant::now();
        let outcome = self
            .health_check_deadline
            .run(async move { provider.health_check().await })
            .await;

        match settle(outcome) {
            Ok(true) => Ok(started.elapsed()),
            Ok(false) => Err(TurnFailure::empty(Diagnostic::detail("health check returned no text"))),
            Err(failure) => Err(failure),
        }
    }

    // --- Turn internals ---

    fn build_request(&self, session: &SessionState, package: &ContextPackage, utterance: &str) -> ModelRequest {
        let window = session.conversation.window(self.history_window);
        let mut history = Vec::with_capacity(window.len() + 1);
        history.push(Message::user(package.text.clone()));
        history.extend(window.iter().cloned());

        ModelRequest {
            model: self.model.clone(),
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
            max_output_tokens: self.max_output_tokens,
            system_instruction: self.system_prompt.clone(),
            tools: self.registry.descriptors(),
            history,
            utterance: utterance.to_string(),
            rounds: Vec::new(),
        }
    }

    async fn drive(&self, mut request: ModelRequest) -> Result<TurnAnswer, TurnFailure> {
        let mut turn = TurnState::default();

        loop {
            turn.iteration += 1;
            if turn.iteration > self.max_iterations {
                warn!(
                    max_iterations = self.max_iterations,
                    functions = ?turn.functions_executed,
                    "Max iterations reached without an answer"
                );
                return Err(turn.fail(TurnFailure::ceiling(self.max_iterations)));
            }

            debug!(iteration = turn.iteration, rounds = request.rounds.len(), "Calling model");
            let started = Instant::now();
            let response = self.call_model(request.clone()).await.map_err(|f| turn.fail(f))?;
            debug!(
                iteration = turn.iteration,
                model = %response.model,
                duration_ms = started.elapsed().as_millis() as u64,
                "Model responded"
            );

            let model = if response.model.is_empty() { request.model.clone() } else { response.model };
            let Some(candidate) = response.candidate else {
                return Err(turn.fail(TurnFailure::empty(Diagnostic::default())));
            };

            let requested = candidate.function_calls();
            if !requested.is_empty() {
                let calls = requested
                    .into_iter()
                    .map(FunctionCall::decode)
                    .collect::<Result<Vec<_>, ProviderError>>()
                    .map_err(|e| {
                        warn!(error = %e, "Undecodable function call");
                        turn.fail(TurnFailure::from_provider_error(&e))
                    })?;

                let results = self.execute_batch(&mut turn, &calls).await;
                request.rounds.push(ToolRound { calls, results });
                continue;
            }

            let text = candidate.text();
            if text.trim().is_empty() {
                return Err(turn.fail(TurnFailure::empty(Diagnostic::from_candidate(&candidate))));
            }

            return Ok(TurnAnswer {
                text,
                functions_executed: turn.functions_executed,
                iterations: turn.iteration,
                model,
                tool_faults: turn.faults,
            });
        }
    }

    /// Run every call of one response. Results keep request order.
    async fn execute_batch(&self, turn: &mut TurnState, calls: &[FunctionCall]) -> Vec<FunctionResult> {
        let invocations = self.registry.invoke_all(calls).await;
        let mut results = Vec::with_capacity(invocations.len());

        for (call, invocation) in calls.iter().zip(invocations) {
            let success = invocation.failure.is_none();
            self.event_bus.publish(DomainEvent::ToolExecuted {
                tool_name: call.name.clone(),
                success,
                duration_ms: invocation.duration.as_millis() as u64,
                timestamp: Utc::now(),
            });

            match &invocation.failure {
                Some(failure) => {
                    let kind = classify_invocation(failure);
                    debug!(tool = %call.name, %kind, "Capability failure fed back to model");
                    turn.faults.push(ToolFault {
                        name: call.name.clone(),
                        kind,
                        message: invocation.result.payload["error"].as_str().unwrap_or_default().to_string(),
                    });
                    if !matches!(failure, InvocationFailure::UnknownCapability) {
                        turn.functions_executed.push(call.name.clone());
                    }
                }
                None => turn.functions_executed.push(call.name.clone()),
            }

            turn.gathered.push(invocation.result.clone());
            results.push(invocation.result);
        }

        results
    }

    async fn call_model(&self, request: ModelRequest) -> Result<ModelResponse, TurnFailure> {
        let provider = Arc::clone(&self.provider);
        let outcome = self
            .generation_deadline
            .run(async move { provider.generate(request).await })
            .await;
        settle(outcome)
    }

    /// Append the exchange to the session, chat history and session memory.
    async fn commit(&self, session: &mut SessionState, utterance: &str, answer: &TurnAnswer) {
        let user = Message::user(utterance);
        let assistant = Message::assistant(&answer.text);

        if let Some(history) = &self.history {
            for message in [&user, &assistant] {
                if let Err(e) = history.append(ChatRecord::from(message)).await {
                    warn!(backend = history.name(), error = %e, "Failed to persist chat message");
                }
            }
        }

        session.conversation.push(user);
        session.conversation.push(assistant);
        session.functions_log.extend(answer.functions_executed.iter().cloned());
        session.turns_completed += 1;
        session.last_failure = None;

        let summary = summarize_exchange(utterance, &answer.text, &answer.functions_executed);
        match self.memory.append(kind::CHAT, &summary).await {
            Ok(entry) => self.event_bus.publish(DomainEvent::MemoryAppended {
                kind: entry.kind,
                timestamp: entry.timestamp,
            }),
            Err(e) => warn!(backend = self.memory.name(), error = %e, "Failed to append session memory"),
        }
    }
}

/// Fold a deadline-bounded provider call into a turn failure.
fn settle<T>(outcome: Result<Result<T, ProviderError>, DeadlineError>) -> Result<T, TurnFailure> {
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            warn!(error = %e, "Model call failed");
            Err(TurnFailure::from_provider_error(&e))
        }
        Err(DeadlineError::Elapsed(limit)) => Err(TurnFailure::timeout(limit)),
        Err(DeadlineError::Aborted(reason)) => Err(TurnFailure::malformed(reason)),
    }
}
