//! Training plan capabilities: read, create, edit, delete, extend.

use crate::args::{self, Args};
use async_trait::async_trait;
use serde_json::{Value, json};
use std::sync::Arc;
use stridecoach_core::error::ToolError;
use stridecoach_core::tool::Capability;
use stridecoach_core::training::{NewPlan, NewWorkout, TrainingStore, WorkoutChanges};

const WORKOUT_TYPES: &str = "'quality', 'long_run', 'easy', 'recovery', 'tempo', 'intervals'";

fn workout_properties() -> Value {
    json!({
        "date": {"type": "string", "description": "Workout date, YYYY-MM-DD"},
        "workout_type": {"type": "string", "description": format!("Workout type: {WORKOUT_TYPES}")},
        "distance_km": {"type": "number", "description": "Planned distance in km"},
        "description": {"type": "string", "description": "Detailed description (goal, structure)"},
        "pace_objective": {"type": "string", "description": "Target pace in min/km (e.g. '5:00' or '4:30-5:00')"},
        "notes": {"type": "string", "description": "Additional notes"}
    })
}

/// Workout IDs are numeric; anything else is reported back as a value.
fn workout_id(arguments: &Args) -> Result<Result<u64, Value>, ToolError> {
    let raw = args::required_id(arguments, "workout_id")?;
    Ok(raw
        .parse::<u64>()
        .map_err(|_| json!({"success": false, "error": format!("Invalid ID: {raw}")})))
}

// --- get_current_plan ---

pub struct CurrentPlan {
    store: Arc<dyn TrainingStore>,
}

impl CurrentPlan {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for CurrentPlan {
    fn name(&self) -> &str {
        "get_current_plan"
    }

    fn description(&self) -> &str {
        "Get the active training plan with all its planned workouts (pending, completed, skipped)."
    }

    fn parameters_schema(&self) -> Value {
        json!({"type": "object", "properties": {}, "required": []})
    }

    async fn invoke(&self, _arguments: Args) -> Result<Value, ToolError> {
        let Some((plan, workouts)) = self.store.active_plan().await? else {
            return Ok(json!({"plan": null, "workouts": [], "message": "No active plan found"}));
        };

        let mut rows = Vec::with_capacity(workouts.len());
        for workout in &workouts {
            let mut row = serde_json::to_value(workout)
                .map_err(|e| ToolError::ExecutionFailed { tool_name: self.name().into(), reason: e.to_string() })?;
            if let Some(id) = &workout.linked_activity_id {
                let activity = self.store.activity(id).await?;
                row["activity_name"] = json!(activity.map(|a| a.name));
            }
            rows.push(row);
        }

        Ok(json!({
            "plan": plan,
            "num_workouts": rows.len(),
            "workouts": rows,
        }))
    }
}

// --- create_training_plan ---

pub struct CreateTrainingPlan {
    store: Arc<dyn TrainingStore>,
}

impl CreateTrainingPlan {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for CreateTrainingPlan {
    fn name(&self) -> &str {
        "create_training_plan"
    }

    fn description(&self) -> &str {
        "Create a new weekly training plan with the given workouts. Any previously active plan is marked completed. Use it when the runner asks to plan their training."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "week_start_date": {
                    "type": "string",
                    "description": "Monday of the planned week, YYYY-MM-DD"
                },
                "workouts": {
                    "type": "array",
                    "description": "Workouts in the plan",
                    "items": {
                        "type": "object",
                        "properties": workout_properties(),
                        "required": ["date", "workout_type", "distance_km"]
                    }
                },
                "goal": {"type": "string", "description": "Plan goal (e.g. 'Half marathon build', 'Maintenance')"},
                "notes": {"type": "string", "description": "Notes about the whole plan"}
            },
            "required": ["week_start_date", "workouts"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let plan: NewPlan = args::decode(arguments)?;
        let week_start = plan.week_start_date;
        let created = self.store.create_plan(plan).await?;
        let count = created.workout_ids.len();

        Ok(json!({
            "success": true,
            "plan_id": created.plan_id,
            "workout_ids": created.workout_ids,
            "num_workouts": count,
            "message": format!("Plan created for week starting {week_start} with {count} workouts"),
        }))
    }
}

// --- update_workout ---

pub struct UpdateWorkout {
    store: Arc<dyn TrainingStore>,
}

impl UpdateWorkout {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for UpdateWorkout {
    fn name(&self) -> &str {
        "update_workout"
    }

    fn description(&self) -> &str {
        "Change an existing planned workout: date, distance, pace or any other field."
    }

    fn parameters_schema(&self) -> Value {
        let mut changes = workout_properties();
        changes["status"] = json!({"type": "string", "description": "New status: 'pending', 'completed', 'skipped'"});
        json!({
            "type": "object",
            "properties": {
                "workout_id": {"type": "string", "description": "ID of the planned workout (as a string)"},
                "changes": {
                    "type": "object",
                    "description": "Fields to update",
                    "properties": changes
                }
            },
            "required": ["workout_id", "changes"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let id = match workout_id(&arguments)? {
            Ok(id) => id,
            Err(value) => return Ok(value),
        };
        let changes: WorkoutChanges = match arguments.get("changes") {
            Some(Value::Object(map)) => args::decode(map.clone())?,
            _ => return Err(ToolError::InvalidArguments("'changes' must be an object".into())),
        };

        if changes.is_empty() {
            return Ok(json!({"success": false, "message": "No valid fields to update"}));
        }

        if !self.store.update_workout(id, &changes).await? {
            return Ok(json!({"success": false, "error": format!("Workout {id} not found")}));
        }

        Ok(json!({
            "success": true,
            "workout_id": id,
            "updated_fields": changes.fields(),
            "message": format!("Workout {id} updated successfully"),
        }))
    }
}

// --- delete_workout ---

pub struct DeleteWorkout {
    store: Arc<dyn TrainingStore>,
}

impl DeleteWorkout {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for DeleteWorkout {
    fn name(&self) -> &str {
        "delete_workout"
    }

    fn description(&self) -> &str {
        "Delete one planned workout from the current plan. Get the ID from get_current_plan."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "workout_id": {"type": "string", "description": "ID of the workout to delete (as a string)"}
            },
            "required": ["workout_id"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let id = match workout_id(&arguments)? {
            Ok(id) => id,
            Err(value) => return Ok(value),
        };

        if !self.store.delete_workout(id).await? {
            return Ok(json!({"success": false, "error": format!("Workout {id} not found")}));
        }

        Ok(json!({
            "success": true,
            "workout_id": id,
            "message": format!("Workout {id} deleted"),
        }))
    }
}

// --- add_workout_to_current_plan ---

pub struct AddWorkout {
    store: Arc<dyn TrainingStore>,
}

impl AddWorkout {
    pub fn new(store: Arc<dyn TrainingStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl Capability for AddWorkout {
    fn name(&self) -> &str {
        "add_workout_to_current_plan"
    }

    fn description(&self) -> &str {
        "Add ONE workout to the existing active plan without creating a new plan. Do not use it to build a plan from scratch; use create_training_plan for that."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": workout_properties(),
            "required": ["date", "workout_type", "distance_km"]
        })
    }

    async fn invoke(&self, arguments: Args) -> Result<Value, ToolError> {
        let workout: NewWorkout = args::decode(arguments)?;

        match self.store.add_workout(workout).await? {
            Some((plan_id, workout_id)) => Ok(json!({
                "success": true,
                "workout_id": workout_id,
                "plan_id": plan_id,
                "message": format!("Workout added to the active plan (workout_id: {workout_id})"),
            })),
            None => Ok(json!({
                "success": false,
                "error": "There is no active plan. Use create_training_plan to create one first.",
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryTrainingStore;

    fn args(v: Value) -> Args {
        v.as_object().cloned().unwrap()
    }

    fn store() -> Arc<dyn TrainingStore> {
        Arc::new(InMemoryTrainingStore::new())
    }

    async fn seed_plan(store: &Arc<dyn TrainingStore>) -> Value {
        CreateTrainingPlan::new(store.clone())
            .invoke(args(json!({
                "week_start_date": "2025-10-13",
                "goal": "Half marathon build",
                "workouts": [
                    {"date": "2025-10-14", "workout_type": "easy", "distance_km": 8},
                    {"date": "2025-10-16", "workout_type": "tempo", "distance_km": 10, "pace_objective": "4:30"},
                    {"date": "2025-10-19", "workout_type": "long_run", "distance_km": 16}
                ]
            })))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn no_active_plan_is_a_value() {
        let out = CurrentPlan::new(store()).invoke(Args::new()).await.unwrap();
        assert_eq!(out["plan"], Value::Null);
        assert_eq!(out["message"], "No active plan found");
    }

    #[tokio::test]
    async fn create_then_read_plan() {
        let s = store();
        let created = seed_plan(&s).await;
        assert_eq!(created["success"], true);
        assert_eq!(created["num_workouts"], 3);

        let out = CurrentPlan::new(s).invoke(Args::new()).await.unwrap();
        assert_eq!(out["num_workouts"], 3);
        assert_eq!(out["plan"]["goal"], "Half marathon build");
        assert_eq!(out["workouts"][1]["workout_type"], "tempo");
        assert_eq!(out["workouts"][0]["status"], "pending");
    }

    #[tokio::test]
    async fn create_rejects_bad_dates() {
        let err = CreateTrainingPlan::new(store())
            .invoke(args(json!({"week_start_date": "next monday", "workouts": []})))
            .await;
        assert!(matches!(err, Err(ToolError::InvalidArguments(_))));
    }

    #[tokio::test]
    async fn update_workout_outcomes() {
        let s = store();
        let created = seed_plan(&s).await;
        let id = created["workout_ids"][0].as_u64().unwrap();
        let update = UpdateWorkout::new(s);

        let out = update
            .invoke(args(json!({"workout_id": id.to_string(), "changes": {"distance_km": 9.5, "colour": "red"}})))
            .await
            .unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["updated_fields"], json!(["distance_km"]));

        let out = update.invoke(args(json!({"workout_id": id, "changes": {"colour": "red"}}))).await.unwrap();
        assert_eq!(out["message"], "No valid fields to update");

        let out = update.invoke(args(json!({"workout_id": "4242", "changes": {"notes": "x"}}))).await.unwrap();
        assert_eq!(out["success"], false);
        assert!(out["error"].as_str().unwrap().contains("4242"));

        let out = update.invoke(args(json!({"workout_id": "abc", "changes": {"notes": "x"}}))).await.unwrap();
        assert_eq!(out["error"], "Invalid ID: abc");
    }

    #[tokio::test]
    async fn delete_workout_twice() {
        let s = store();
        let created = seed_plan(&s).await;
        let id = created["workout_ids"][2].clone();
        let delete = DeleteWorkout::new(s);

        let first = delete.invoke(args(json!({"workout_id": id}))).await.unwrap();
        assert_eq!(first["success"], true);
        let second = delete.invoke(args(json!({"workout_id": id}))).await.unwrap();
        assert_eq!(second["success"], false);
    }

    #[tokio::test]
    async fn add_workout_needs_a_plan() {
        let s = store();
        let add = AddWorkout::new(s.clone());
        let body = json!({"date": "2025-10-18", "workout_type": "recovery", "distance_km": 5});

        let out = add.invoke(args(body.clone())).await.unwrap();
        assert_eq!(out["success"], false);

        let created = seed_plan(&s).await;
        let out = add.invoke(args(body)).await.unwrap();
        assert_eq!(out["success"], true);
        assert_eq!(out["plan_id"], created["plan_id"]);
    }
}
