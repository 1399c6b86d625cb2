//! Activity capabilities: recent runs, weekly aggregates, single-run detail.

use crate::analytics::weekly_stats;
use crate::args::{self, Args, round};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use stridecoach_core::error::ToolError;
use stridecoach_core::tool::Capability;
use stridecoach_core::training::{Activity, Lap, TrainingStore};

/// Compact row used in activity listings.
pub fn activity_row(a: &Activity) -> Value {
    json!({
        "id": a.id,
        "name": a.name,
        "start_date_local": a.start_date,
        "distance_km": round(a.distance_km, 2),
        "moving_time_min": round(a.moving_time_secs as f64 / 60.0, 1),
        "pace_min_km": a.pace_min_km().map(|p| round(p, 2)),
        "average_heartrate": a.average_heartrate,
        "total_elevation_gain": a.total_elevation_gain,
        "description": a.description,
        "private_note": a.private_note,
    })
}

fn lap_row(lap: &Lap) -> Value {
    let average_speed = (lap.moving_time_secs > 0)
        .then(|| round(lap.distance_km * 1000.0 / lap.moving_time_secs as f64, 2));
    json!({
        "lap_index": lap.lap_index,
        "name": lap.name,
        "distance_km": round(lap.distance_km, 2),
        "moving_time": lap.moving_time_secs,
        "elapsed_time": lap.elapsed_time_secs,
        "average_speed": average_speed,
        "max_speed": lap.max_speed,
        "total_elevation_gain": lap.total_elevation_gain,
    })
}

// --- get_recent_activities ---

pub struct RecentActivities {
    store: Arc<dyn TrainingStore>,
}

impl RecentActivities {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for RecentActivities {
    fn name(&self) -> &str {
        "get_recent_activities"
    }

    fn description(&self) -> &str {
        "Get the runs from the last N days with their statistics (distance, pace, heart rate, notes)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "days": {
                    "type": "integer",
                    "description": "How many days back to look. Defaults to 7."
                }
            },
            "required": []
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let days = args::int_or(&arguments, "days", 7)?;
        let since = args::days_back(days)?;
        let runs = self.store.activities_since(since).await?;

        if runs.is_empty() {
            return Ok(json!({"activities": [], "count": 0, "total_km": 0}));
        }

        let total_km: f64 = runs.iter().map(|a| a.distance_km).sum();
        let paces: Vec<f64> = runs.iter().filter_map(|a| a.pace_min_km()).collect();
        let avg_pace = (!paces.is_empty()).then(|| round(paces.iter().sum::<f64>() / paces.len() as f64, 2));

        Ok(json!({
            "activities": runs.iter().map(activity_row).collect::<Vec<_>>(),
            "count": runs.len(),
            "total_km": round(total_km, 2),
            "avg_pace": avg_pace,
        }))
    }
}

// --- get_weekly_stats ---

pub struct WeeklyStats {
    store: Arc<dyn TrainingStore>,
}

impl WeeklyStats {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for WeeklyStats {
    fn name(&self) -> &str {
        "get_weekly_stats"
    }

    fn description(&self) -> &str {
        "Get per-week aggregates for the last N weeks (total km, number of runs, average pace and heart rate)."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "weeks": {
                    "type": "integer",
                    "description": "How many weeks back to analyse. Defaults to 4."
                }
            },
            "required": []
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let weeks = args::int_or(&arguments, "weeks", 4)?;
        let since = args::weeks_back(weeks)?;
        let runs = self.store.activities_since(since).await?;

        let mut stats = weekly_stats(&runs);
        if stats.is_empty() {
            return Ok(json!({"weeks": [], "total_weeks": 0}));
        }
        stats.reverse();

        let avg_weekly_km = stats.iter().map(|w| w.total_km).sum::<f64>() / stats.len() as f64;
        let rows: Vec<Value> = stats
            .iter()
            .map(|w| {
                json!({
                    "week": w.week,
                    "num_runs": w.num_runs,
                    "total_km": round(w.total_km, 2),
                    "avg_pace_min_km": w.avg_pace_min_km.map(|p| round(p, 2)),
                    "avg_hr": w.avg_hr.map(|h| round(h, 1)),
                })
            })
            .collect();

        Ok(json!({
            "weeks": rows,
            "total_weeks": stats.len(),
            "avg_weekly_km": round(avg_weekly_km, 2),
        }))
    }
}

// --- get_activity_details ---

pub struct ActivityDetails {
    store: Arc<dyn TrainingStore>,
}

impl ActivityDetails {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for ActivityDetails {
    fn name(&self) -> &str {
        "get_activity_details"
    }

    fn description(&self) -> &str {
        "Get full details of one run including every lap (intervals, repetitions, warm-up). Use the exact ID, as a string, returned by get_recent_activities."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "activity_id": {
                    "type": "string",
                    "description": "Activity ID as returned by get_recent_activities (string, to preserve precision)"
                }
            },
            "required": ["activity_id"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let id = args::required_id(&arguments, "activity_id")?;

        let Some(activity) = self.store.activity(&id).await? else {
            return Ok(json!({"error": format!("Activity {id} not found")}));
        };

        let mut info = activity_row(&activity);
        info["moving_time"] = json!(activity.moving_time_secs);
        if !activity.splits.is_empty() {
            info["splits"] = json!(activity
                .splits
                .iter()
                .map(|s| json!({
                    "split": s.split,
                    "distance_km": round(s.distance_km, 2),
                    "pace_min_km": s.pace_min_km().map(|p| round(p, 2)),
                    "average_heartrate": s.average_heartrate,
                }))
                .collect::<Vec<_>>());
        }
        let laps: Vec<Value> = activity.laps.iter().map(lap_row).collect();

        Ok(json!({
            "activity": info,
            "num_laps": laps.len(),
            "laps": laps,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTrainingStore;
    use crate::testing::run_days_ago;

    fn store(activities: Vec<Activity>) -> Arc<dyn TrainingStore> {
        Arc::new(InMemoryTrainingStore::new().with_activities(activities))
    }

    fn no_args() -> Args {
        Args::new()
    }

    #[tokio::test]
    async fn recent_activities_window_and_totals() {
        let s = store(vec![
            run_days_ago("a", 1, 8.0, 5.5),
            run_days_ago("b", 3, 10.0, 5.0),
            run_days_ago("c", 20, 12.0, 5.0),
        ]);
        let out = RecentActivities::new(s).invoke(no_args()).await.unwrap();
        assert_eq!(out["count"], 2);
        assert_eq!(out["total_km"], 18.0);
        assert_eq!(out["activities"][0]["id"], "a");
        assert_eq!(out["avg_pace"], 5.25);
    }

    #[tokio::test]
    async fn recent_activities_empty() {
        let out = RecentActivities::new(store(vec![])).invoke(no_args()).await.unwrap();
        assert_eq!(out, json!({"activities": [], "count": 0, "total_km": 0}));
    }

    #[tokio::test]
    async fn oversized_look_back_is_invalid_arguments() {
        let mut a = Args::new();
        a.insert("days".into(), json!(1e12));
        let err = RecentActivities::new(store(vec![])).invoke(a).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));

        let mut a = Args::new();
        a.insert("weeks".into(), json!(1e15));
        let err = WeeklyStats::new(store(vec![])).invoke(a).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn weekly_stats_newest_week_first() {
        let s = store(vec![run_days_ago("a", 0, 8.0, 5.5), run_days_ago("b", 14, 10.0, 5.0)]);
        let mut a = Args::new();
        a.insert("weeks".into(), json!(4));
        let out = WeeklyStats::new(s).invoke(a).await.unwrap();
        assert_eq!(out["total_weeks"], 2);
        assert_eq!(out["weeks"][0]["total_km"], 8.0);
        assert_eq!(out["avg_weekly_km"], 9.0);
    }

    #[tokio::test]
    async fn activity_details_not_found_is_a_value() {
        let mut a = Args::new();
        a.insert("activity_id".into(), json!(999));
        let out = ActivityDetails::new(store(vec![])).invoke(a).await.unwrap();
        assert_eq!(out["error"], "Activity 999 not found");
    }

    #[tokio::test]
    async fn activity_details_includes_laps() {
        let mut run = run_days_ago("77", 2, 10.0, 4.5);
        run.laps = vec![Lap {
            lap_index: 1,
            name: Some("Rep 1".into()),
            distance_km: 1.0,
            moving_time_secs: 240,
            elapsed_time_secs: Some(245),
            max_speed: Some(4.6),
            total_elevation_gain: None,
        }];
        let mut a = Args::new();
        a.insert("activity_id".into(), json!("77"));
        let out = ActivityDetails::new(store(vec![run])).invoke(a).await.unwrap();
        assert_eq!(out["num_laps"], 1);
        assert_eq!(out["laps"][0]["average_speed"], 4.17);
    }
}
