//! In-memory training store, optionally seeded from a JSON export.
//!
//! The export file mirrors the store contents:
//!
//! ```json
//! { "activities": [...], "plans": [...], "workouts": [...], "profile": {...} }
//! ```
//!
//! Plan and workout mutations stay in memory; the export is read-only.

use async_trait::async_trait;
use chrono::{Datelike, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use stridecoach_core::error::StoreError;
use stridecoach_core::training::{
    Activity, CreatedPlan, NewPlan, NewWorkout, PlanStatus, PlannedWorkout, RunnerProfile,
    TrainingPlan, TrainingStore, WorkoutChanges, WorkoutStatus,
};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// On-disk shape of a training data export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingExport {
    #[serde(default)]
    pub activities: Vec<Activity>,
    #[serde(default)]
    pub plans: Vec<TrainingPlan>,
    #[serde(default)]
    pub workouts: Vec<PlannedWorkout>,
    #[serde(default)]
    pub profile: Option<RunnerProfile>,
}

#[derive(Debug, Default)]
struct State {
    activities: Vec<Activity>,
    plans: Vec<TrainingPlan>,
    workouts: Vec<PlannedWorkout>,
    profile: Option<RunnerProfile>,
    next_plan_id: u64,
    next_workout_id: u64,
}

impl State {
    fn from_export(export: TrainingExport) -> Self {
        let next_plan_id = export.plans.iter().map(|p| p.id).max().unwrap_or(0) + 1;
        let next_workout_id = export.workouts.iter().map(|w| w.id).max().unwrap_or(0) + 1;
        let mut activities = export.activities;
        activities.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Self {
            activities,
            plans: export.plans,
            workouts: export.workouts,
            profile: export.profile,
            next_plan_id,
            next_workout_id,
        }
    }

    fn insert_workout(&mut self, plan_id: u64, workout: NewWorkout) -> u64 {
        let id = self.next_workout_id;
        self.next_workout_id += 1;
        self.workouts.push(PlannedWorkout {
            id,
            plan_id,
            date: workout.date,
            workout_type: workout.workout_type,
            distance_km: workout.distance_km,
            description: workout.description,
            pace_objective: workout.pace_objective,
            notes: workout.notes,
            status: WorkoutStatus::Pending,
            linked_activity_id: None,
        });
        id
    }

    fn active_plan(&self) -> Option<&TrainingPlan> {
        self.plans
            .iter()
            .filter(|p| p.status == PlanStatus::Active)
            .max_by_key(|p| p.week_start_date)
    }
}

/// A `TrainingStore` held entirely in memory.
pub struct InMemoryTrainingStore {
    state: RwLock<State>,
}

impl InMemoryTrainingStore {
    pub fn new() -> Self {
        Self::from_export(TrainingExport::default())
    }

    pub fn from_export(export: TrainingExport) -> Self {
        Self {
            state: RwLock::new(State::from_export(export)),
        }
    }

    /// Load a JSON export. A missing file is an `Unavailable` error.
    pub fn from_json_file(path: &Path) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            StoreError::Unavailable(format!("cannot read {}: {e}", path.display()))
        })?;
        let export: TrainingExport = serde_json::from_str(&content)
            .map_err(|e| StoreError::Invalid(format!("{}: {e}", path.display())))?;
        info!(
            path = %path.display(),
            activities = export.activities.len(),
            plans = export.plans.len(),
            "Training data loaded"
        );
        Ok(Self::from_export(export))
    }

    pub fn with_activities(self, activities: Vec<Activity>) -> Self {
        let mut state = self.state.into_inner();
        state.activities = activities;
        state.activities.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Self { state: RwLock::new(state) }
    }

    pub fn with_profile(self, profile: RunnerProfile) -> Self {
        let mut state = self.state.into_inner();
        state.profile = Some(profile);
        Self { state: RwLock::new(state) }
    }
}

impl Default for InMemoryTrainingStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrainingStore for InMemoryTrainingStore {
    fn name(&self) -> &str {
        "memory"
    }

    async fn all_activities(&self) -> Result<Vec<Activity>, StoreError> {
        Ok(self.state.read().await.activities.clone())
    }

    async fn activities_since(&self, since: NaiveDateTime) -> Result<Vec<Activity>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .activities
            .iter()
            .filter(|a| a.start_date >= since)
            .cloned()
            .collect())
    }

    async fn activity(&self, id: &str) -> Result<Option<Activity>, StoreError> {
        let state = self.state.read().await;
        Ok(state.activities.iter().find(|a| a.id == id).cloned())
    }

    async fn active_plan(&self) -> Result<Option<(TrainingPlan, Vec<PlannedWorkout>)>, StoreError> {
        let state = self.state.read().await;
        let Some(plan) = state.active_plan() else {
            return Ok(None);
        };
        let mut workouts: Vec<PlannedWorkout> = state
            .workouts
            .iter()
            .filter(|w| w.plan_id == plan.id)
            .cloned()
            .collect();
        workouts.sort_by_key(|w| w.date);
        Ok(Some((plan.clone(), workouts)))
    }

    async fn create_plan(&self, plan: NewPlan) -> Result<CreatedPlan, StoreError> {
        let mut state = self.state.write().await;

        for existing in state.plans.iter_mut().filter(|p| p.status == PlanStatus::Active) {
            existing.status = PlanStatus::Completed;
        }

        let plan_id = state.next_plan_id;
        state.next_plan_id += 1;
        state.plans.push(TrainingPlan {
            id: plan_id,
            week_start_date: plan.week_start_date,
            week_number: plan.week_start_date.iso_week().week(),
            goal: plan.goal,
            notes: plan.notes,
            status: PlanStatus::Active,
            created_at: Utc::now(),
        });

        let workout_ids = plan
            .workouts
            .into_iter()
            .map(|w| state.insert_workout(plan_id, w))
            .collect();

        debug!(plan_id, "Training plan created");
        Ok(CreatedPlan { plan_id, workout_ids })
    }

    async fn update_workout(&self, id: u64, changes: &WorkoutChanges) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        match state.workouts.iter_mut().find(|w| w.id == id) {
            Some(workout) => {
                changes.apply(workout);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_workout(&self, id: u64) -> Result<bool, StoreError> {
        let mut state = self.state.write().await;
        let before = state.workouts.len();
        state.workouts.retain(|w| w.id != id);
        Ok(state.workouts.len() < before)
    }

    async fn add_workout(&self, workout: NewWorkout) -> Result<Option<(u64, u64)>, StoreError> {
        let mut state = self.state.write().await;
        let Some(plan_id) = state.active_plan().map(|p| p.id) else {
            return Ok(None);
        };
        let workout_id = state.insert_workout(plan_id, workout);
        Ok(Some((plan_id, workout_id)))
    }

    async fn runner_profile(&self) -> Result<Option<RunnerProfile>, StoreError> {
        Ok(self.state.read().await.profile.clone())
    }
}
