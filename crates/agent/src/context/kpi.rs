//! Progress KPIs and training phase.
//!
//! Pure aggregation over the supplied activities; nothing here talks to the
//! model or the store.

use chrono::{Datelike, Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stridecoach_core::training::Activity;
use stridecoach_tools::analytics::format_pace;

/// Runs longer than this count towards "best performance".
pub const BEST_PERFORMANCE_MIN_KM: f64 = 10.0;

/// Aggregates over a recent window plus a few all-time markers.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub window_weeks: u32,
    /// Mean over the ISO weeks that had at least one run
    pub avg_weekly_km: f64,
    pub avg_sessions_per_week: f64,
    pub longest_run_km_all_time: f64,
    pub longest_run_km_recent: f64,
    /// `(distance_km, pace_min_km)` of the fastest run over 10 km
    pub best_over_10k: Option<(f64, f64)>,
}

impl Kpis {
    /// Compute KPIs for the `window_weeks` ending at `now`.
    pub fn compute(activities: &[Activity], now: NaiveDateTime, window_weeks: u32) -> Self {
        let since = now - Duration::weeks(i64::from(window_weeks));
        let recent: Vec<&Activity> = activities.iter().filter(|a| a.start_date >= since).collect();

        let mut weeks: BTreeMap<(i32, u32), (f64, usize)> = BTreeMap::new();
        for a in &recent {
            let iso = a.start_date.iso_week();
            let slot = weeks.entry((iso.year(), iso.week())).or_default();
            slot.0 += a.distance_km;
            slot.1 += 1;
        }

        let (avg_weekly_km, avg_sessions_per_week) = if weeks.is_empty() {
            (0.0, 0.0)
        } else {
            let n = weeks.len() as f64;
            (
                weeks.values().map(|(km, _)| km).sum::<f64>() / n,
                weeks.values().map(|(_, runs)| *runs as f64).sum::<f64>() / n,
            )
        };

        let best_over_10k = activities
            .iter()
            .filter(|a| a.distance_km > BEST_PERFORMANCE_MIN_KM)
            .filter_map(|a| a.pace_min_km().map(|p| (a.distance_km, p)))
            .min_by(|a, b| a.1.total_cmp(&b.1));

        Self {
            window_weeks,
            avg_weekly_km,
            avg_sessions_per_week,
            longest_run_km_all_time: longest(activities.iter()),
            longest_run_km_recent: longest(recent.iter().copied()),
            best_over_10k,
        }
    }

    /// One markdown bullet per KPI.
    pub fn render(&self) -> String {
        let w = self.window_weeks;
        let mut lines = vec![
            format!("- Avg weekly volume ({w}w): {:.1} km/week", self.avg_weekly_km),
            format!("- Avg sessions ({w}w): {:.1} /week", self.avg_sessions_per_week),
            format!("- Longest run (all time): {:.1} km", self.longest_run_km_all_time),
            format!("- Longest run ({w}w): {:.1} km", self.longest_run_km_recent),
        ];
        lines.push(match self.best_over_10k {
            Some((km, pace)) => format!("- Best performance (>10 km): {km:.1} km at {}/km", format_pace(pace)),
            None => "- Best performance (>10 km): not enough data".to_string(),
        });
        lines.join("\n")
    }
}

fn longest<'a>(activities: impl Iterator<Item = &'a Activity>) -> f64 {
    activities.map(|a| a.distance_km).fold(0.0, f64::max)
}

/// Periodization phase derived from days left to the target race.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrainingPhase {
    Base,
    Build,
    Peak,
    Taper,
}

impl TrainingPhase {
    pub fn for_days_left(days_left: i64) -> Self {
        match days_left {
            d if d > 120 => Self::Base,
            d if d > 60 => Self::Build,
            d if d > 14 => Self::Peak,
            _ => Self::Taper,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Base => "Base (more than 4 months out)",
            Self::Build => "Build (2-4 months out)",
            Self::Peak => "Peak (1-2 months out)",
            Self::Taper => "Taper / race (final 2 weeks)",
        }
    }
}
