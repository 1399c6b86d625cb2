//! Running-coach capabilities for StrideCoach.
//!
//! Twelve functions the model may call, all backed by a
//! [`TrainingStore`]: activity lookups, plan management, the runner profile
//! and deterministic analytics (trends, Riegel predictions, load checks).

pub mod activities;
pub mod analytics;
pub mod args;
pub mod insights;
pub mod plan;
pub mod profile;
pub mod store;

use chrono::NaiveDateTime;
use std::sync::Arc;
use stridecoach_core::error::ToolError;
use stridecoach_core::tool::{Capability, CapabilityRegistry};
use stridecoach_core::training::TrainingStore;

pub use store::{InMemoryTrainingStore, TrainingExport};

/// Every capability name, in registration order.
pub const CAPABILITY_NAMES: [&str; 12] = [
    "get_recent_activities",
    "get_weekly_stats",
    "get_activity_details",
    "get_current_plan",
    "create_training_plan",
    "update_workout",
    "add_workout_to_current_plan",
    "delete_workout",
    "get_runner_profile",
    "analyze_performance_trends",
    "predict_race_times",
    "analyze_training_load_advanced",
];

/// Local wall-clock time; activity timestamps are local too.
pub(crate) fn now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// Build the registry with every coach capability.
pub fn coach_registry(store: Arc<dyn TrainingStore>) -> Result<CapabilityRegistry, ToolError> {
    let capabilities: Vec<Arc<dyn Capability>> = vec![
        Arc::new(activities::RecentActivities::new(store.clone())),
        Arc::new(activities::WeeklyStats::new(store.clone())),
        Arc::new(activities::ActivityDetails::new(store.clone())),
        Arc::new(plan::CurrentPlan::new(store.clone())),
        Arc::new(plan::CreateTrainingPlan::new(store.clone())),
        Arc::new(plan::UpdateWorkout::new(store.clone())),
        Arc::new(plan::AddWorkout::new(store.clone())),
        Arc::new(plan::DeleteWorkout::new(store.clone())),
        Arc::new(profile::RunnerProfileLookup::new(store.clone())),
        Arc::new(insights::PerformanceTrends::new(store.clone())),
        Arc::new(insights::PredictRaceTimes),
        Arc::new(insights::TrainingLoad::new(store)),
    ];

    let mut registry = CapabilityRegistry::new();
    for capability in capabilities {
        registry.register(capability)?;
    }
    Ok(registry)
}

#[cfg(test)]
pub(crate) mod testing {
    use chrono::Duration;
    use stridecoach_core::training::Activity;

    /// A run `days` ago at the given distance and pace (min/km), no HR.
    pub fn run_days_ago(id: &str, days: i64, km: f64, pace: f64) -> Activity {
        Activity {
            id: id.into(),
            name: format!("Run {id}"),
            start_date: super::now() - Duration::days(days),
            distance_km: km,
            moving_time_secs: (km * pace * 60.0).round() as u64,
            average_heartrate: None,
            total_elevation_gain: None,
            description: None,
            private_note: None,
            laps: vec![],
            splits: vec![],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_has_every_capability_in_order() {
        let registry = coach_registry(Arc::new(InMemoryTrainingStore::new())).unwrap();
        assert_eq!(registry.names(), CAPABILITY_NAMES.to_vec());
        for descriptor in registry.descriptors() {
            assert_eq!(descriptor.parameters["type"], "object", "{}", descriptor.name);
            assert!(!descriptor.description.is_empty());
        }
    }

    #[tokio::test]
    async fn failing_capability_comes_back_as_error_payload() {
        let registry = coach_registry(Arc::new(InMemoryTrainingStore::new())).unwrap();
        let call = stridecoach_core::provider::FunctionCall {
            id: "c1".into(),
            name: "predict_race_times".into(),
            arguments: json!({"current_race_distance_km": 0, "current_time_minutes": 40, "target_race_distance_km": 10})
                .as_object()
                .cloned()
                .unwrap(),
        };
        let result = registry.invoke(&call).await;
        assert!(result.is_error());
    }
}
