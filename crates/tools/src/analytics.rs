//! Deterministic training analytics over activity lists.
//!
//! Everything here is pure: callers pass the activities (already filtered to
//! the window they care about) and get plain values back.

use crate::args::round;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use stridecoach_core::error::ToolError;
use stridecoach_core::training::Activity;

/// Pace boundary above which a run counts as easy (min/km).
pub const EASY_PACE_MIN_KM: f64 = 5.0;

/// Pace boundary below which a run counts as quality work (min/km).
pub const QUALITY_PACE_MIN_KM: f64 = 4.75;

/// Riegel fatigue exponent.
pub const RIEGEL_EXPONENT: f64 = 1.06;

const FATIGUE_KEYWORDS: [&str; 6] = ["tired", "heavy", "hard", "bad", "fatigue", "exhausted"];

fn mean(values: impl IntoIterator<Item = f64>) -> Option<f64> {
    let (sum, n) = values.into_iter().fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    (n > 0).then(|| sum / n as f64)
}

// --- Weekly aggregation ---

/// Aggregates for one calendar week (`%Y-%W`, Monday-first).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeeklyStat {
    pub week: String,
    pub num_runs: usize,
    pub total_km: f64,
    pub avg_pace_min_km: Option<f64>,
    pub avg_hr: Option<f64>,
    #[serde(skip)]
    pub notes: Vec<String>,
}

/// Group activities by week, oldest week first.
pub fn weekly_stats(activities: &[Activity]) -> Vec<WeeklyStat> {
    let mut groups: BTreeMap<String, Vec<&Activity>> = BTreeMap::new();
    for activity in activities {
        groups
            .entry(activity.start_date.format("%Y-%W").to_string())
            .or_default()
            .push(activity);
    }

    groups
        .into_iter()
        .map(|(week, runs)| WeeklyStat {
            week,
            num_runs: runs.len(),
            total_km: runs.iter().map(|a| a.distance_km).sum(),
            avg_pace_min_km: mean(runs.iter().filter_map(|a| a.pace_min_km())),
            avg_hr: mean(runs.iter().filter_map(|a| a.average_heartrate)),
            notes: runs.iter().filter_map(|a| a.private_note.clone()).collect(),
        })
        .collect()
}

// --- Performance trends ---

fn trend(hr_change: f64, pace_change: f64, first: (f64, f64), second: (f64, f64)) -> Option<Value> {
    let (hr1, pace1) = first;
    let (hr2, pace2) = second;
    let (kind, message) = if hr_change < -3.0 && pace_change < -2.0 {
        (
            "positive",
            format!(
                "Clear aerobic improvement: HR fell from {hr1:.1} to {hr2:.1} bpm ({hr_change:+.1}%) while pace improved from {pace1:.2} to {pace2:.2} min/km ({pace_change:+.1}%)"
            ),
        )
    } else if hr_change < -3.0 && pace_change.abs() < 2.0 {
        (
            "positive",
            format!(
                "Better efficiency: HR fell from {hr1:.1} to {hr2:.1} bpm ({hr_change:+.1}%) at a steady ~{pace1:.2} min/km"
            ),
        )
    } else if hr_change > 3.0 && pace_change > 2.0 {
        (
            "warning",
            format!(
                "Possible fatigue: HR rose from {hr1:.1} to {hr2:.1} bpm ({hr_change:+.1}%) while pace slowed from {pace1:.2} to {pace2:.2} min/km ({pace_change:+.1}%). Consider a recovery week."
            ),
        )
    } else if hr_change > 3.0 && pace_change.abs() < 2.0 {
        (
            "warning",
            format!(
                "Elevated HR: up from {hr1:.1} to {hr2:.1} bpm ({hr_change:+.1}%) at ~{pace1:.2} min/km. Possible accumulated fatigue."
            ),
        )
    } else if hr_change.abs() < 2.0 && pace_change.abs() < 2.0 {
        (
            "neutral",
            format!("Stable form: HR ~{hr1:.1} bpm and pace ~{pace1:.2} min/km are consistent"),
        )
    } else {
        return None;
    };
    Some(json!({"type": kind, "message": message}))
}

/// HR-versus-pace trends over `runs` (oldest first).
///
/// Only runs with heart rate and longer than 3 km count. Easy runs are split
/// into a first and second half and compared; quality runs are summarized.
pub fn performance_trends(runs: &[Activity], weeks: i64) -> Value {
    let runs: Vec<(&Activity, f64, f64)> = runs
        .iter()
        .filter(|a| a.distance_km > 3.0)
        .filter_map(|a| Some((a, a.pace_min_km()?, a.average_heartrate?)))
        .collect();

    if runs.len() < 3 {
        return json!({
            "status": "insufficient_data",
            "message": "At least 3 runs with heart rate are needed in the analysed weeks"
        });
    }

    let mut analysis = json!({
        "total_runs": runs.len(),
        "weeks_analyzed": weeks,
        "trends": [],
    });

    let easy: Vec<_> = runs.iter().filter(|(_, pace, _)| *pace > EASY_PACE_MIN_KM).collect();
    if easy.len() >= 3 {
        let (first, second) = easy.split_at(easy.len() / 2);
        let hr1 = mean(first.iter().map(|r| r.2)).unwrap_or_default();
        let hr2 = mean(second.iter().map(|r| r.2)).unwrap_or_default();
        let pace1 = mean(first.iter().map(|r| r.1)).unwrap_or_default();
        let pace2 = mean(second.iter().map(|r| r.1)).unwrap_or_default();

        let hr_change = (hr2 - hr1) / hr1 * 100.0;
        let pace_change = (pace2 - pace1) / pace1 * 100.0;

        analysis["easy_runs_analysis"] = json!({
            "first_half_avg_hr": round(hr1, 1),
            "second_half_avg_hr": round(hr2, 1),
            "first_half_avg_pace": round(pace1, 2),
            "second_half_avg_pace": round(pace2, 2),
            "hr_change_pct": round(hr_change, 1),
            "pace_change_pct": round(pace_change, 1),
            "num_runs_analyzed": easy.len(),
            "first_half_runs": first.len(),
            "second_half_runs": second.len(),
        });

        if let Some(t) = trend(hr_change, pace_change, (hr1, pace1), (hr2, pace2)) {
            analysis["trends"] = json!([t]);
        }
    }

    let quality: Vec<_> = runs.iter().filter(|(_, pace, _)| *pace < QUALITY_PACE_MIN_KM).collect();
    if quality.len() >= 2 {
        analysis["quality_runs_count"] = json!(quality.len());
        analysis["avg_quality_pace"] = json!(round(mean(quality.iter().map(|r| r.1)).unwrap_or_default(), 2));
        if let Some((last, pace, hr)) = quality.last() {
            analysis["last_quality"] = json!({
                "date": last.date().to_string(),
                "pace": round(*pace, 2),
                "avg_hr": round(*hr, 1),
            });
        }
    }

    analysis
}

// --- Race prediction ---

/// Known race distances and their display names.
const NAMED_DISTANCES: [(f64, &str); 5] = [
    (5.0, "5K"),
    (10.0, "10K"),
    (15.0, "15K"),
    (21.0975, "Half Marathon"),
    (42.195, "Marathon"),
];

pub fn distance_name(km: f64) -> String {
    NAMED_DISTANCES
        .iter()
        .find(|(d, _)| (d - km).abs() < 1e-6)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| format!("{km}km"))
}

/// `H:MM:SS` from fractional minutes, to the nearest second.
pub fn format_duration(minutes: f64) -> String {
    let total = (minutes * 60.0).round() as u64;
    format!("{}:{:02}:{:02}", total / 3600, (total % 3600) / 60, total % 60)
}

/// `M:SS` from fractional minutes per km, to the nearest second.
pub fn format_pace(min_per_km: f64) -> String {
    let total = (min_per_km * 60.0).round() as u64;
    format!("{}:{:02}", total / 60, total % 60)
}

/// Riegel prediction: `T2 = T1 * (D2 / D1) ^ 1.06`.
pub fn riegel(current_km: f64, current_minutes: f64, target_km: f64) -> f64 {
    current_minutes * (target_km / current_km).powf(RIEGEL_EXPONENT)
}

pub fn predict_race(current_km: f64, current_minutes: f64, target_km: f64) -> Result<Value, ToolError> {
    if current_km <= 0.0 || current_minutes <= 0.0 || target_km <= 0.0 {
        return Err(ToolError::InvalidArguments(
            "distances and time must be positive".into(),
        ));
    }

    let predicted = riegel(current_km, current_minutes, target_km);

    Ok(json!({
        "current_race": {
            "distance": distance_name(current_km),
            "time": format_duration(current_minutes),
            "pace_per_km": format_pace(current_minutes / current_km),
        },
        "predicted_race": {
            "distance": distance_name(target_km),
            "predicted_time": format_duration(predicted),
            "predicted_pace_per_km": format_pace(predicted / target_km),
            "predicted_time_minutes": round(predicted, 2),
        },
        "analysis": {
            "formula": "Riegel (exponent 1.06)",
            "note": "Assumes training specific to the target distance",
        },
    }))
}

// --- Training load ---

/// Load, HR drift and fatigue-note analysis over weekly aggregates
/// (oldest week first).
pub fn training_load(weeks: &[WeeklyStat]) -> Value {
    if weeks.len() < 2 {
        return json!({
            "status": "insufficient_data",
            "message": "At least 2 weeks of data are needed"
        });
    }

    let km: Vec<f64> = weeks.iter().map(|w| w.total_km).collect();
    let current = km[km.len() - 1];
    let previous = km[km.len() - 2];
    let avg_previous = mean(km[..km.len() - 1].iter().copied()).unwrap_or(current);
    let load_increase = if previous > 0.0 { (current - previous) / previous * 100.0 } else { 0.0 };

    let mut warnings: Vec<Value> = Vec::new();
    let mut recommendations: Vec<&str> = Vec::new();

    if load_increase > 15.0 {
        warnings.push(json!({
            "level": "high",
            "message": format!("Very large volume increase ({load_increase:.1}%). Injury risk is elevated."),
        }));
        recommendations.push("Consider cutting volume by 10-15% this week");
    } else if load_increase > 10.0 {
        warnings.push(json!({
            "level": "medium",
            "message": format!("Moderately high volume increase ({load_increase:.1}%). Watch how you feel."),
        }));
        recommendations.push("Make sure easy runs are truly easy (Z2)");
    }

    if weeks.len() >= 3 {
        let split = weeks.len() - 2;
        let recent = mean(weeks[split..].iter().filter_map(|w| w.avg_hr));
        let older = mean(weeks[..split].iter().filter_map(|w| w.avg_hr));
        if let (Some(recent), Some(older)) = (recent, older) {
            let hr_change = (recent - older) / older * 100.0;
            if hr_change > 3.0 {
                warnings.push(json!({
                    "level": "medium",
                    "message": format!("Average HR trending up ({hr_change:.1}%). Possible accumulated fatigue."),
                }));
                recommendations.push("Prioritise recovery and sleep this week");
            }
        }
    }

    let notes = weeks
        .iter()
        .flat_map(|w| w.notes.iter())
        .map(|n| n.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");
    let fatigue_mentions = FATIGUE_KEYWORDS.iter().filter(|k| notes.contains(*k)).count();
    if fatigue_mentions >= 2 {
        warnings.push(json!({
            "level": "medium",
            "message": format!("Several mentions of fatigue in your notes ({fatigue_mentions} references)"),
        }));
        recommendations.push("Consider a recovery week (reduce volume 20-30%)");
    }

    let (status, summary) = if warnings.is_empty() {
        ("good", "Training load under control. Carry on with the plan.")
    } else if warnings.iter().any(|w| w["level"] == "high") {
        ("high_risk", "High overtraining risk. Act now.")
    } else {
        ("caution", "Fatigue signals detected. Monitor and adjust if needed.")
    };

    json!({
        "weeks_analyzed": weeks.len(),
        "current_week_km": round(current, 1),
        "previous_week_km": round(previous, 1),
        "avg_last_weeks_km": round(avg_previous, 1),
        "load_increase_pct": round(load_increase, 1),
        "warnings": warnings,
        "recommendations": recommendations,
        "status": status,
        "summary": summary,
    })
}

/// Outcome of the week-over-baseline load check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Ok,
    Warning,
    Low,
    InsufficientData,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoadProgression {
    pub status: LoadStatus,
    pub current_week_km: f64,
    pub avg_previous_weeks_km: f64,
    pub increase_pct: f64,
    pub warning: Option<String>,
}

/// Compare the current week against the mean of the previous weeks
/// (oldest week first). More than +15% warns; below -20% reads as a
/// recovery week.
pub fn load_progression(weeks: &[WeeklyStat]) -> LoadProgression {
    let Some((current, previous)) = weeks.split_last().filter(|(_, prev)| !prev.is_empty()) else {
        return LoadProgression {
            status: LoadStatus::InsufficientData,
            current_week_km: weeks.last().map(|w| w.total_km).unwrap_or_default(),
            avg_previous_weeks_km: 0.0,
            increase_pct: 0.0,
            warning: None,
        };
    };

    let baseline = mean(previous.iter().map(|w| w.total_km)).unwrap_or_default();
    let increase = if baseline > 0.0 { (current.total_km - baseline) / baseline * 100.0 } else { 0.0 };

    let (status, warning) = if increase > 15.0 {
        (
            LoadStatus::Warning,
            Some(format!("Volume up {increase:.1}%. Recommended: at most 10-15% per week.")),
        )
    } else if increase < -20.0 {
        (
            LoadStatus::Low,
            Some(format!("Volume down {:.1}%. Recovery week?", increase.abs())),
        )
    } else {
        (LoadStatus::Ok, None)
    };

    LoadProgression {
        status,
        current_week_km: round(current.total_km, 1),
        avg_previous_weeks_km: round(baseline, 1),
        increase_pct: round(increase, 1),
        warning,
    }
}
