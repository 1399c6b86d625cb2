//! End-to-end turn scenarios for the StrideCoach orchestrator.
//!
//! These tests run the full pipeline from utterance to answer: context
//! assembly, model calls, capability execution, chat history and session
//! memory, against a scripted model.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{Duration as ChronoDuration, Local, NaiveDate};
use serde_json::json;
use stridecoach_agent::{ContextBudget, Recovery, SessionState, TurnErrorKind, TurnOrchestrator, TurnReport, count_words};
use stridecoach_core::error::{ProviderError, ToolError};
use stridecoach_core::event::EventBus;
use stridecoach_core::history::ChatHistoryStore;
use stridecoach_core::memory::{FixedProfile, MemoryStore};
use stridecoach_core::provider::{ModelRequest, ModelResponse, Provider, RequestedCall};
use stridecoach_core::tool::Capability;
use stridecoach_core::training::{Activity, Split};
use stridecoach_memory::{InMemoryChatHistory, InMemorySessionMemory};
use stridecoach_tools::{CAPABILITY_NAMES, InMemoryTrainingStore, coach_registry};

// ── Mock Provider ────────────────────────────────────────────────────────

enum Scripted {
    Reply(ModelResponse),
    Fail(ProviderError),
    Hang(Duration),
}

/// A mock model that plays back scripted replies and records every request.
struct ScriptedProvider {
    script: Mutex<VecDeque<Scripted>>,
    repeat: Option<ModelResponse>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedProvider {
    fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            repeat: None,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn replies(replies: Vec<ModelResponse>) -> Self {
        Self::new(replies.into_iter().map(Scripted::Reply).collect())
    }

    fn forever(reply: ModelResponse) -> Self {
        Self {
            repeat: Some(reply),
            ..Self::new(vec![])
        }
    }

    fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    fn request(&self, i: usize) -> ModelRequest {
        self.requests.lock().unwrap()[i].clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    fn default_model(&self) -> &str {
        "e2e-model"
    }

    async fn generate(&self, request: ModelRequest) -> Result<ModelResponse, ProviderError> {
        let call = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request);
            requests.len()
        };
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Scripted::Reply(reply)) => Ok(reply),
            Some(Scripted::Fail(err)) => Err(err),
            Some(Scripted::Hang(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(answer("late"))
            }
            None => match &self.repeat {
                Some(reply) => Ok(reply.clone()),
                None => panic!("ScriptedProvider exhausted at call #{call}"),
            },
        }
    }
}

fn answer(text: &str) -> ModelResponse {
    ModelResponse::text("e2e-model", text)
}

fn call(id: &str, name: &str, args: serde_json::Value) -> RequestedCall {
    RequestedCall {
        id: id.into(),
        name: name.into(),
        arguments: args.to_string(),
    }
}

fn calls(requested: Vec<RequestedCall>) -> ModelResponse {
    ModelResponse::calls("e2e-model", requested)
}

// ── Fixtures ─────────────────────────────────────────────────────────────

fn profile() -> FixedProfile {
    FixedProfile {
        runner_since: "early 2025".into(),
        sessions_per_week: 3,
        race_name: "Barcelona Half Marathon".into(),
        race_date: NaiveDate::from_ymd_opt(2027, 2, 14).unwrap(),
        race_distance_km: 21.0975,
        target_time: "1:34:56".into(),
        safety_rule: "weekly load progression 10-15% max".into(),
    }
}

fn run(days_ago: i64, km: f64) -> Activity {
    Activity {
        id: format!("run-{days_ago}"),
        name: "Run".into(),
        start_date: Local::now().naive_local() - ChronoDuration::days(days_ago) - ChronoDuration::hours(1),
        distance_km: km,
        moving_time_secs: (km * 330.0) as u64,
        average_heartrate: Some(152.0),
        total_elevation_gain: Some(20.0),
        description: None,
        private_note: None,
        laps: vec![],
        splits: vec![],
    }
}

fn detailed_run(days_ago: i64) -> Activity {
    Activity {
        description: Some(
            "Long run by the river with the club, steady first half then progressive to marathon pace over the last five".into(),
        ),
        private_note: Some("calves tight after the bridge, hydration fine".into()),
        splits: (1..=21)
            .map(|i| Split {
                split: i,
                distance_km: 1.0,
                moving_time_secs: 310,
                average_heartrate: Some(150.0),
            })
            .collect(),
        ..run(days_ago, 21.1)
    }
}

struct Coach {
    model: Arc<ScriptedProvider>,
    history: Arc<InMemoryChatHistory>,
    memory: Arc<InMemorySessionMemory>,
    orchestrator: TurnOrchestrator,
}

fn coach(model: ScriptedProvider, activities: Vec<Activity>) -> Coach {
    let model = Arc::new(model);
    let store = Arc::new(InMemoryTrainingStore::new().with_activities(activities));
    let registry = Arc::new(coach_registry(store.clone()).unwrap());
    let history = Arc::new(InMemoryChatHistory::new());
    let memory = Arc::new(InMemorySessionMemory::new(profile()));
    let orchestrator = TurnOrchestrator::new(
        model.clone(),
        registry,
        store,
        memory.clone(),
        Arc::new(EventBus::default()),
    )
    .with_history(history.clone());
    Coach { model, history, memory, orchestrator }
}

fn week() -> Vec<Activity> {
    vec![run(1, 8.0), run(3, 12.0), run(5, 6.0)]
}

fn answered(report: &TurnReport) -> &stridecoach_agent::TurnAnswer {
    report.outcome.answer().expect("turn should be answered")
}

fn failed(report: &TurnReport) -> &stridecoach_agent::TurnFailure {
    report.outcome.failure().expect("turn should fail")
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_simple_question_and_answer() {
    let c = coach(ScriptedProvider::replies(vec![answer("Keep your easy runs easy.")]), week());

    let report = c.orchestrator.run_turn(SessionState::new(), "any advice?").await;

    let a = answered(&report);
    assert_eq!(a.text, "Keep your easy runs easy.");
    assert_eq!(a.iterations, 1);
    assert_eq!(c.model.calls(), 1);
    assert_eq!(report.session.conversation.len(), 2);
    assert_eq!(c.history.count().await.unwrap(), 2);
    assert_eq!(c.memory.count().await.unwrap(), 1);

    let request = c.model.request(0);
    assert_eq!(request.utterance, "any advice?");
    assert!(request.history[0].content.contains("--- TRAINING HISTORY ---"));
    assert!(request.history[0].content.contains("Barcelona Half Marathon"));
}

#[tokio::test]
async fn e2e_single_tool_round() {
    let c = coach(
        ScriptedProvider::replies(vec![
            calls(vec![call("c1", "get_recent_activities", json!({"days": 7}))]),
            answer("Three runs this week for 26 km."),
        ]),
        week(),
    );

    let report = c.orchestrator.run_turn(SessionState::new(), "how was my week?").await;

    let a = answered(&report);
    assert_eq!(a.functions_executed, vec!["get_recent_activities"]);
    assert_eq!(a.iterations, 2);
    assert_eq!(c.model.calls(), 2);

    let second = c.model.request(1);
    let result = &second.rounds[0].results[0];
    assert_eq!(result.call_id, "c1");
    assert_eq!(result.payload["count"], 3);
    assert_eq!(result.payload["total_km"], 26.0);

    let memory = c.memory.recent(1).await.unwrap();
    assert!(memory[0].content.ends_with("| functions: get_recent_activities"));
}

#[tokio::test(start_paused = true)]
async fn e2e_stalled_model_times_out_cleanly() {
    let c = coach(ScriptedProvider::new(vec![Scripted::Hang(Duration::from_secs(600))]), week());

    let report = c.orchestrator.run_turn(SessionState::new(), "are you there?").await;

    let f = failed(&report);
    assert_eq!(f.kind, TurnErrorKind::ModelTimeout);
    assert_eq!(f.recovery, Recovery::CheckNetwork);
    assert!(report.session.conversation.is_empty());
    assert_eq!(c.history.count().await.unwrap(), 0);
    assert_eq!(c.memory.count().await.unwrap(), 0);
}

#[tokio::test]
async fn e2e_large_history_fits_word_budget() {
    let activities: Vec<Activity> = (0..500).map(detailed_run).collect();
    let c = coach(ScriptedProvider::replies(vec![answer("Solid block.")]), activities);
    let orchestrator = c.orchestrator.with_context_budget(ContextBudget {
        word_budget: 1000,
        safety_margin: 200,
        ..ContextBudget::default()
    });

    let preview = orchestrator.preview_context().await;
    assert!(preview.metadata.word_count <= 1000, "{} words", preview.metadata.word_count);
    assert!(preview.metadata.records_included <= 10);
    assert!(preview.text.contains("of 500 sessions]"));

    let report = orchestrator.run_turn(SessionState::new(), "summarize my training").await;
    assert!(report.outcome.answer().is_some());
    let package = &c.model.request(0).history[0].content;
    assert!(package.contains("[history truncated: showing"));
}

#[tokio::test]
async fn e2e_sent_context_payload_stays_within_word_budget() {
    let activities: Vec<Activity> = (0..200).map(detailed_run).collect();
    let c = coach(ScriptedProvider::replies(vec![answer("Noted.")]), activities);
    let orchestrator = c.orchestrator.with_context_budget(ContextBudget {
        word_budget: 300,
        safety_margin: 0,
        ..ContextBudget::default()
    });

    let report = orchestrator.run_turn(SessionState::new(), "how am I doing?").await;
    assert!(report.outcome.answer().is_some());

    let sent = c.model.request(0).history[0].content.clone();
    let words = count_words(&sent);
    assert!(words <= 300, "sent context payload has {words} words > budget 300");
    assert!(sent.starts_with("Context package for this session."));
}

#[tokio::test]
async fn e2e_iteration_ceiling_bounds_model_calls() {
    let c = coach(
        ScriptedProvider::forever(calls(vec![call("c", "get_weekly_stats", json!({"weeks": 4}))])),
        week(),
    );
    let orchestrator = c.orchestrator.with_max_iterations(5);

    let report = orchestrator.run_turn(SessionState::new(), "keep checking").await;

    let f = failed(&report);
    assert_eq!(f.kind, TurnErrorKind::CeilingExhausted);
    assert_eq!(c.model.calls(), 5);
    assert_eq!(f.functions_executed.len(), 5);
    assert!(f.has_fallback());
    assert!(report.session.conversation.is_empty());
}

#[tokio::test]
async fn e2e_batch_is_executed_completely() {
    let c = coach(
        ScriptedProvider::replies(vec![
            calls(vec![
                call("a", "get_recent_activities", json!({"days": 7})),
                call("b", "get_weekly_stats", json!({"weeks": 2})),
                call("c", "predict_race_times", json!({
                    "current_race_distance_km": 10.0,
                    "current_time_minutes": 45.0,
                    "target_race_distance_km": 21.0975
                })),
            ]),
            answer("All three checked."),
        ]),
        week(),
    );

    let report = c.orchestrator.run_turn(SessionState::new(), "full review").await;

    assert_eq!(
        answered(&report).functions_executed,
        vec!["get_recent_activities", "get_weekly_stats", "predict_race_times"]
    );
    let round = &c.model.request(1).rounds[0];
    let ids: Vec<&str> = round.results.iter().map(|r| r.call_id.as_str()).collect();
    assert_eq!(ids, ["a", "b", "c"]);
    assert!(round.results.iter().all(|r| !r.is_error()));
}

#[tokio::test]
async fn e2e_failed_turn_does_not_leak_into_next() {
    let c = coach(
        ScriptedProvider::new(vec![
            Scripted::Fail(ProviderError::Network("connection reset".into())),
            Scripted::Reply(answer("Back online. Rest day tomorrow.")),
        ]),
        week(),
    );

    let first = c.orchestrator.run_turn(SessionState::new(), "plan tomorrow").await;
    assert_eq!(failed(&first).kind, TurnErrorKind::ProviderUnavailable);
    assert_eq!(first.session.last_failure, Some(TurnErrorKind::ProviderUnavailable));
    assert_eq!(c.history.count().await.unwrap(), 0);

    let second = c.orchestrator.run_turn(first.session, "plan tomorrow").await;
    assert!(second.outcome.answer().is_some());
    assert_eq!(second.session.conversation.len(), 2);
    assert_eq!(second.session.last_failure, None);

    // the retried turn sees no trace of the failed one
    let retry = c.model.request(1);
    assert_eq!(retry.history.len(), 1);
    assert!(retry.rounds.is_empty());
}

#[tokio::test]
async fn e2e_unknown_capability_is_idempotent() {
    let unknown = || calls(vec![call("x", "get_weather", json!({"city": "Girona"}))]);
    let c = coach(
        ScriptedProvider::replies(vec![
            unknown(),
            answer("I can't see the weather."),
            unknown(),
            answer("Still no weather access."),
        ]),
        week(),
    );

    let first = c.orchestrator.run_turn(SessionState::new(), "weather?").await;
    let second = c.orchestrator.run_turn(first.session.clone(), "weather?").await;

    for report in [&first, &second] {
        let a = answered(report);
        assert!(a.functions_executed.is_empty());
        assert_eq!(a.tool_faults.len(), 1);
        assert_eq!(a.tool_faults[0].kind, TurnErrorKind::UnknownCapability);
    }
    assert_eq!(c.model.request(1).rounds[0].results[0].payload, json!({"error": "unknown function"}));
    assert_eq!(c.model.request(3).rounds[0].results[0].payload, json!({"error": "unknown function"}));
    assert_eq!(c.orchestrator.registry().names(), CAPABILITY_NAMES.to_vec());
}

/// A capability that always panics mid-query.
struct BrokenQuery;

#[async_trait::async_trait]
impl Capability for BrokenQuery {
    fn name(&self) -> &str {
        "get_sleep_data"
    }

    fn description(&self) -> &str {
        "Sleep data (always broken)"
    }

    fn parameters_schema(&self) -> serde_json::Value {
        json!({"type": "object", "properties": {}})
    }

    async fn invoke(
        &self,
        _arguments: serde_json::Map<String, serde_json::Value>,
    ) -> Result<serde_json::Value, ToolError> {
        panic!("sleep table is corrupt")
    }
}

#[tokio::test]
async fn e2e_crashing_capability_is_contained() {
    let model = Arc::new(ScriptedProvider::replies(vec![
        calls(vec![call("s1", "get_sleep_data", json!({}))]),
        answer("Sleep data is unavailable right now."),
        answer("Your easy pace is 5:30/km."),
    ]));
    let store = Arc::new(InMemoryTrainingStore::new().with_activities(week()));
    let mut registry = coach_registry(store.clone()).unwrap();
    registry.register(Arc::new(BrokenQuery)).unwrap();
    let orchestrator = TurnOrchestrator::new(
        model.clone(),
        Arc::new(registry),
        store,
        Arc::new(InMemorySessionMemory::new(profile())),
        Arc::new(EventBus::default()),
    );

    let first = orchestrator.run_turn(SessionState::new(), "how did I sleep?").await;
    let a = answered(&first);
    assert_eq!(a.functions_executed, vec!["get_sleep_data"]);
    assert_eq!(a.tool_faults[0].kind, TurnErrorKind::CapabilityFailure);
    let fed_back = &model.request(1).rounds[0].results[0];
    assert!(fed_back.is_error());
    assert!(fed_back.payload["error"].as_str().unwrap().contains("sleep table is corrupt"));

    let second = orchestrator.run_turn(first.session, "what's my easy pace?").await;
    assert_eq!(answered(&second).text, "Your easy pace is 5:30/km.");
    assert!(answered(&second).tool_faults.is_empty());
    assert_eq!(second.session.turns_completed, 2);
}
