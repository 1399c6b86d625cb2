//! Analytics capabilities: performance trends, race prediction, load check.

use crate::analytics;
use crate::args::{self, Args};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use stridecoach_core::error::ToolError;
use stridecoach_core::tool::Capability;
use stridecoach_core::training::TrainingStore;

/// Weeks of history the load analysis looks at.
pub const LOAD_WINDOW_WEEKS: i64 = 6;

// --- analyze_performance_trends ---

pub struct PerformanceTrends {
    store: Arc<dyn TrainingStore>,
}

impl PerformanceTrends {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for PerformanceTrends {
    fn name(&self) -> &str {
        "analyze_performance_trends"
    }

    fn description(&self) -> &str {
        "Analyse heart rate versus pace trends to detect aerobic improvement or fatigue. Use it to judge current form before planning."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "weeks": {"type": "integer", "description": "How many weeks back to analyse. Defaults to 4."}
            },
            "required": []
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let weeks = args::int_or(&arguments, "weeks", 4)?;
        let mut runs = self
            .store
            .activities_since(args::weeks_back(weeks)?)
            .await?;
        runs.reverse();
        Ok(analytics::performance_trends(&runs, weeks))
    }
}

// --- predict_race_times ---

pub struct PredictRaceTimes;

#[async_trait]
impl Capability for PredictRaceTimes {
    fn name(&self) -> &str {
        "predict_race_times"
    }

    fn description(&self) -> &str {
        "Predict a race time with the Riegel formula (T2 = T1 * (D2/D1)^1.06) from a real result at another distance. Example: 10K in 43:20 to a half marathon."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "current_race_distance_km": {
                    "type": "number",
                    "description": "Distance of the known result in km (e.g. 10.0, 21.0975)"
                },
                "current_time_minutes": {
                    "type": "number",
                    "description": "Time of the known result in decimal minutes (e.g. 43.33 for 43:20)"
                },
                "target_race_distance_km": {
                    "type": "number",
                    "description": "Distance to predict in km (e.g. 21.0975 for a half marathon)"
                }
            },
            "required": ["current_race_distance_km", "current_time_minutes", "target_race_distance_km"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        analytics::predict_race(
            args::required_f64(&arguments, "current_race_distance_km")?,
            args::required_f64(&arguments, "current_time_minutes")?,
            args::required_f64(&arguments, "target_race_distance_km")?,
        )
    }
}

// --- analyze_training_load_advanced ---

pub struct TrainingLoad {
    store: Arc<dyn TrainingStore>,
}

impl TrainingLoad {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for TrainingLoad {
    fn name(&self) -> &str {
        "analyze_training_load_advanced"
    }

    fn description(&self) -> &str {
        "Advanced training load analysis with overtraining detection: weekly volume progression, heart rate drift and fatigue keywords in private notes. Use it before proposing demanding plans."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn invoke(&self, _arguments: Args) -> Result<Value, ToolError> {
        let runs = self
            .store
            .activities_since(args::weeks_back(LOAD_WINDOW_WEEKS)?)
            .await?;
        Ok(analytics::training_load(&analytics::weekly_stats(&runs)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTrainingStore;
    use crate::testing::run_days_ago;

    #[tokio::test]
    async fn trends_insufficient_without_hr() {
        let store = InMemoryTrainingStore::new().with_activities(vec![
            run_days_ago("a", 1, 8.0, 5.5),
            run_days_ago("b", 3, 8.0, 5.5),
            run_days_ago("c", 5, 8.0, 5.5),
        ]);
        let out = PerformanceTrends::new(Arc::new(store)).invoke(Args::new()).await.unwrap();
        assert_eq!(out["status"], "insufficient_data");
    }

    #[tokio::test]
    async fn trends_order_oldest_first() {
        let mut runs = Vec::new();
        for (i, (days, hr)) in [(20, 150.0), (16, 150.0), (6, 140.0), (2, 140.0)].into_iter().enumerate() {
            let mut r = run_days_ago(&i.to_string(), days, 8.0, 5.6);
            r.average_heartrate = Some(hr);
            runs.push(r);
        }
        let store = InMemoryTrainingStore::new().with_activities(runs);
        let out = PerformanceTrends::new(Arc::new(store)).invoke(Args::new()).await.unwrap();
        assert_eq!(out["easy_runs_analysis"]["first_half_avg_hr"], 150.0);
        assert_eq!(out["trends"][0]["type"], "positive");
    }

    #[tokio::test]
    async fn predict_requires_all_arguments() {
        let mut a = Args::new();
        a.insert("current_race_distance_km".into(), json!(10));
        let err = PredictRaceTimes.invoke(a).await;
        assert!(matches!(err, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn load_needs_two_weeks() {
        let store = InMemoryTrainingStore::new().with_activities(vec![run_days_ago("a", 0, 8.0, 5.5)]);
        let out = TrainingLoad::new(Arc::new(store)).invoke(Args::new()).await.unwrap();
        assert_eq!(out["status"], "insufficient_data");
    }
}
