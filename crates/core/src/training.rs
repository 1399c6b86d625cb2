//! Training data — the external collaborator behind the coach capabilities.
//!
//! The orchestrator never touches this directly; capabilities and the context
//! assembler read activities, plans and the runner profile through the
//! [`TrainingStore`] trait. Logical "not found" outcomes are `Ok(None)` or
//! `Ok(false)`; `Err` is reserved for unexpected failures.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::StoreError;

/// A recorded run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Activity ID (string to preserve large upstream IDs)
    pub id: String,

    pub name: String,

    /// Local start time
    pub start_date: NaiveDateTime,

    pub distance_km: f64,

    pub moving_time_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heartrate: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_elevation_gain: Option<f64>,

    /// Public description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Private note (how the run felt)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_note: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub laps: Vec<Lap>,

    /// Per-km splits
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub splits: Vec<Split>,
}

impl Activity {
    /// Average pace in minutes per km.
    pub fn pace_min_km(&self) -> Option<f64> {
        pace(self.moving_time_secs, self.distance_km)
    }

    pub fn date(&self) -> NaiveDate {
        self.start_date.date()
    }
}

/// A lap (interval, warm-up, recovery, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lap {
    pub lap_index: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub distance_km: f64,

    pub moving_time_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub elapsed_time_secs: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_speed: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_elevation_gain: Option<f64>,
}

/// A per-km split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Split {
    /// 1-based split number
    pub split: u32,

    pub distance_km: f64,

    pub moving_time_secs: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub average_heartrate: Option<f64>,
}

impl Split {
    pub fn pace_min_km(&self) -> Option<f64> {
        pace(self.moving_time_secs, self.distance_km)
    }
}

fn pace(moving_time_secs: u64, distance_km: f64) -> Option<f64> {
    (distance_km > 0.0).then(|| moving_time_secs as f64 / 60.0 / distance_km)
}

/// Lifecycle of a weekly plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Active,
    Completed,
}

/// A weekly training plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingPlan {
    pub id: u64,
    pub week_start_date: NaiveDate,
    /// ISO week number of `week_start_date`
    pub week_number: u32,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    pub status: PlanStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkoutStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
}

impl std::str::FromStr for WorkoutStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown workout status '{other}'")),
        }
    }
}

/// A workout scheduled inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedWorkout {
    pub id: u64,
    pub plan_id: u64,
    pub date: NaiveDate,
    pub workout_type: String,
    pub distance_km: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pace_objective: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub status: WorkoutStatus,
    #[serde(default)]
    pub linked_activity_id: Option<String>,
}

fn default_workout_type() -> String {
    "easy".into()
}

/// A workout to be added to a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewWorkout {
    pub date: NaiveDate,
    #[serde(default = "default_workout_type")]
    pub workout_type: String,
    pub distance_km: f64,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pace_objective: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A plan to be created; replaces the active plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPlan {
    pub week_start_date: NaiveDate,
    pub workouts: Vec<NewWorkout>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// IDs assigned when a plan is created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatedPlan {
    pub plan_id: u64,
    pub workout_ids: Vec<u64>,
}

/// A partial update of a planned workout. Unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkoutChanges {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workout_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub distance_km: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pace_objective: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkoutStatus>,
}

impl WorkoutChanges {
    /// Names of the fields this update sets.
    pub fn fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.date.is_some() { fields.push("date"); }
        if self.workout_type.is_some() { fields.push("workout_type"); }
        if self.distance_km.is_some() { fields.push("distance_km"); }
        if self.description.is_some() { fields.push("description"); }
        if self.pace_objective.is_some() { fields.push("pace_objective"); }
        if self.notes.is_some() { fields.push("notes"); }
        if self.status.is_some() { fields.push("status"); }
        fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }

    /// Apply the set fields to `workout`.
    pub fn apply(&self, workout: &mut PlannedWorkout) {
        if let Some(date) = self.date { workout.date = date; }
        if let Some(t) = &self.workout_type { workout.workout_type = t.clone(); }
        if let Some(d) = self.distance_km { workout.distance_km = d; }
        if let Some(d) = &self.description { workout.description = Some(d.clone()); }
        if let Some(p) = &self.pace_objective { workout.pace_objective = Some(p.clone()); }
        if let Some(n) = &self.notes { workout.notes = Some(n.clone()); }
        if let Some(s) = self.status { workout.status = s; }
    }
}

/// Anthropometrics, PRs and training philosophy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunnerProfile {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub age: Option<u32>,
    #[serde(default)]
    pub height_cm: Option<f64>,
    #[serde(default)]
    pub weight_kg: Option<f64>,
    #[serde(default)]
    pub vo2max_estimate: Option<f64>,
    #[serde(default)]
    pub threshold_pace: Option<String>,
    #[serde(default)]
    pub easy_pace_min: Option<String>,
    #[serde(default)]
    pub easy_pace_max: Option<String>,
    #[serde(default)]
    pub training_philosophy: Option<String>,
    #[serde(default)]
    pub current_goal: Option<String>,
    #[serde(default)]
    pub pr_5k: Option<String>,
    #[serde(default)]
    pub pr_10k: Option<String>,
    #[serde(default)]
    pub pr_half: Option<String>,
    #[serde(default)]
    pub pr_marathon: Option<String>,
}

/// Read/write access to activities, plans and the runner profile.
#[async_trait]
pub trait TrainingStore: Send + Sync {
    /// The backend name.
    fn name(&self) -> &str;

    /// Every activity, newest first.
    async fn all_activities(&self) -> Result<Vec<Activity>, StoreError>;

    /// Activities starting at or after `since`, newest first.
    async fn activities_since(&self, since: NaiveDateTime) -> Result<Vec<Activity>, StoreError>;

    /// One activity with its laps.
    async fn activity(&self, id: &str) -> Result<Option<Activity>, StoreError>;

    /// The active plan and its workouts ordered by date.
    async fn active_plan(&self) -> Result<Option<(TrainingPlan, Vec<PlannedWorkout>)>, StoreError>;

    /// Create a plan, completing any previously active plan.
    async fn create_plan(&self, plan: NewPlan) -> Result<CreatedPlan, StoreError>;

    /// Update a workout. `Ok(false)` if it does not exist.
    async fn update_workout(&self, id: u64, changes: &WorkoutChanges) -> Result<bool, StoreError>;

    /// Delete a workout. `Ok(false)` if it does not exist.
    async fn delete_workout(&self, id: u64) -> Result<bool, StoreError>;

    /// Add a workout to the active plan, returning `(plan_id, workout_id)`.
    /// `Ok(None)` when there is no active plan.
    async fn add_workout(&self, workout: NewWorkout) -> Result<Option<(u64, u64)>, StoreError>;

    async fn runner_profile(&self) -> Result<Option<RunnerProfile>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workout() -> PlannedWorkout {
        PlannedWorkout {
            id: 1,
            plan_id: 1,
            date: NaiveDate::from_ymd_opt(2025, 10, 6).unwrap(),
            workout_type: "easy".into(),
            distance_km: 8.0,
            description: None,
            pace_objective: None,
            notes: None,
            status: WorkoutStatus::Pending,
            linked_activity_id: None,
        }
    }

    #[test]
    fn activity_pace() {
        let activity: Activity = serde_json::from_value(serde_json::json!({
            "id": "123",
            "name": "Morning Run",
            "start_date": "2025-10-01T07:30:00",
            "distance_km": 10.0,
            "moving_time_secs": 3000
        }))
        .unwrap();
        assert_eq!(activity.pace_min_km(), Some(5.0));
        assert!(activity.splits.is_empty());
    }

    #[test]
    fn zero_distance_has_no_pace() {
        let split = Split { split: 1, distance_km: 0.0, moving_time_secs: 10, average_heartrate: None };
        assert_eq!(split.pace_min_km(), None);
    }

    #[test]
    fn changes_ignore_unknown_fields() {
        let changes: WorkoutChanges =
            serde_json::from_value(serde_json::json!({"color": "red"})).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn changes_apply_set_fields() {
        let changes: WorkoutChanges = serde_json::from_value(serde_json::json!({
            "distance_km": 12.5,
            "status": "skipped"
        }))
        .unwrap();
        assert_eq!(changes.fields(), vec!["distance_km", "status"]);

        let mut w = workout();
        changes.apply(&mut w);
        assert_eq!(w.distance_km, 12.5);
        assert_eq!(w.status, WorkoutStatus::Skipped);
        assert_eq!(w.workout_type, "easy");
    }

    #[test]
    fn new_workout_defaults_type() {
        let w: NewWorkout = serde_json::from_value(serde_json::json!({
            "date": "2025-10-08",
            "distance_km": 6
        }))
        .unwrap();
        assert_eq!(w.workout_type, "easy");
    }
}
