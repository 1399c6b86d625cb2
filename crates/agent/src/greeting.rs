//! Opening line for a new chat, based on recent training and the active plan.

use chrono::{Duration, NaiveDateTime};
use stridecoach_core::training::{TrainingStore, WorkoutStatus};
use tracing::warn;

const FALLBACK: &str = "Hi! I'm here to help with your training.";

/// A short greeting reflecting what the runner has been up to.
pub async fn contextual_greeting(store: &dyn TrainingStore, now: NaiveDateTime) -> String {
    let mut parts = Vec::new();

    match store.activities_since(now - Duration::days(7)).await {
        Ok(week) => {
            let today = week.iter().filter(|a| a.start_date >= now - Duration::days(1)).count();
            if today > 0 {
                parts.push("I see you trained today! 💪".to_string());
            } else if week.is_empty() {
                parts.push("How's it going? I haven't seen you train in a few days.".to_string());
            } else {
                parts.push(format!("Hi! You've logged {} sessions this week.", week.len()));
            }
        }
        Err(e) => {
            warn!(error = %e, "Could not read recent activities for greeting");
            parts.push("Hi! How can I help with your training today?".to_string());
        }
    }

    match store.active_plan().await {
        Ok(Some((_, workouts))) => {
            let pending = workouts.iter().filter(|w| w.status == WorkoutStatus::Pending).count();
            if pending > 0 {
                parts.push(format!("You have {pending} pending workouts in your plan."));
            }
        }
        Ok(None) => {}
        Err(e) => warn!(error = %e, "Could not read active plan for greeting"),
    }

    if parts.is_empty() { FALLBACK.to_string() } else { parts.join(" ") }
}
