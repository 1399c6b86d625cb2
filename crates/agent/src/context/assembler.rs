//! Context package assembly — what the coach knows at the start of a turn.
//!
//! The package is rebuilt from scratch every turn out of four blocks:
//!
//! | Block | Source | Trim strategy |
//! |-------|--------|---------------|
//! | Fixed profile | Memory store + runner profile | Never trimmed |
//! | Training history | Training store, newest first | Records cut to a floor, then commentary dropped, then records cut to one |
//! | KPIs | Aggregates over the recent window | Never trimmed |
//! | Session memory | Last K memory entries | Each entry clipped; oldest lines dropped as a last resort |
//!
//! The text opens with a one-line preamble for the model and is sent as-is,
//! so the preamble counts toward the budget like any other block.
//!
//! The total word count never exceeds the configured budget. When even the
//! minimal package is too large the text is cut and tagged `[truncated]`.
//!
//! # Determinism
//!
//! `build` is a pure function of its input: the clock is part of
//! [`AssemblyInput`], never read inside.

use crate::context::kpi::{Kpis, TrainingPhase};
use crate::context::words::{count_words, cut_to_words, normalize_whitespace, truncate_chars};
use chrono::{Local, NaiveDateTime};
use serde::{Deserialize, Serialize};
use stridecoach_config::ContextConfig;
use stridecoach_core::memory::{FixedProfile, MemoryStore, SessionMemoryEntry};
use stridecoach_core::training::{Activity, RunnerProfile, TrainingStore};
use stridecoach_tools::analytics::format_pace;
use tracing::{debug, warn};

pub const PACKAGE_PREAMBLE: &str = "Context package for this session. Use it as the ground truth about the runner:";
pub const PROFILE_HEADER: &str = "--- FIXED PROFILE ---";
pub const HISTORY_HEADER: &str = "--- TRAINING HISTORY ---";
pub const MEMORY_HEADER: &str = "--- SESSION MEMORY ---";
pub const END_MARKER: &str = "--- END OF PACKAGE ---";

pub const NO_TRAINING_DATA: &str = "No training data available.";
pub const COMMENTARY_OMITTED: &str = "[commentary omitted to fit budget]";
pub const TRUNCATED_TAIL: &str = "[truncated]";

const MISSING: &str = "–";

fn kpi_header(weeks: u32) -> String {
    format!("--- KPIs ({weeks} weeks) ---")
}

// ── Types ─────────────────────────────────────────────────────────────────

/// Word budget and per-block limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Hard ceiling on the package's word count.
    pub word_budget: usize,
    /// Headroom kept free while sizing the history.
    pub safety_margin: usize,
    /// History records to start from.
    pub target_records: usize,
    /// Record floor; below it commentary goes first.
    pub min_records: usize,
    pub memory_items: usize,
    pub memory_entry_chars: usize,
    pub commentary_chars: usize,
    pub kpi_window_weeks: u32,
}

impl From<&ContextConfig> for ContextBudget {
    fn from(config: &ContextConfig) -> Self {
        Self {
            word_budget: config.word_budget,
            safety_margin: config.safety_margin,
            target_records: config.target_records,
            min_records: config.min_records,
            memory_items: config.memory_items,
            memory_entry_chars: config.memory_entry_chars,
            commentary_chars: config.commentary_chars,
            kpi_window_weeks: config.kpi_window_weeks,
        }
    }
}

impl Default for ContextBudget {
    fn default() -> Self {
        Self::from(&ContextConfig::default())
    }
}

/// Everything the assembler reads for one package.
pub struct AssemblyInput<'a> {
    pub profile: &'a FixedProfile,
    pub runner: Option<&'a RunnerProfile>,
    /// Activity history, newest first.
    pub activities: &'a [Activity],
    /// Session memory, oldest first.
    pub memory: &'a [SessionMemoryEntry],
    /// Local wall-clock time the package is built for.
    pub now: NaiveDateTime,
}

/// The rendered package plus how it was sized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPackage {
    pub text: String,
    pub metadata: AssemblyMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssemblyMetadata {
    pub word_count: usize,
    pub budget: usize,
    pub records_included: usize,
    pub records_total: usize,
    pub commentary_dropped: bool,
    pub memory_items_included: usize,
    pub memory_items_total: usize,
    /// Set when the last-resort word cut was applied.
    pub truncated: bool,
    pub per_section: Vec<SectionStats>,
}

/// Word count of one block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionStats {
    pub name: String,
    pub words: usize,
}

// ── Assembler ─────────────────────────────────────────────────────────────

/// Builds context packages. Stateless — create one and reuse it.
pub struct ContextAssembler {
    budget: ContextBudget,
}

impl ContextAssembler {
    pub fn new(budget: ContextBudget) -> Self {
        Self { budget }
    }

    pub fn budget(&self) -> &ContextBudget {
        &self.budget
    }

    /// Read the collaborators and build a package.
    ///
    /// Never fails: an unavailable store is logged and treated as empty.
    pub async fn gather(
        &self,
        training: &dyn TrainingStore,
        memory: &dyn MemoryStore,
        now: NaiveDateTime,
    ) -> ContextPackage {
        let activities = training.all_activities().await.unwrap_or_else(|e| {
            warn!(store = training.name(), error = %e, "Training history unavailable, assembling without it");
            Vec::new()
        });

        let runner = match training.runner_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                warn!(store = training.name(), error = %e, "Runner profile unavailable");
                None
            }
        };

        let entries = memory.recent(self.budget.memory_items).await.unwrap_or_else(|e| {
            warn!(backend = memory.name(), error = %e, "Session memory unavailable");
            Vec::new()
        });

        self.build(&AssemblyInput {
            profile: memory.fixed_profile(),
            runner: runner.as_ref(),
            activities: &activities,
            memory: &entries,
            now,
        })
    }

    /// Render the package under the word budget.
    ///
    /// # Algorithm
    ///
    /// 1. Render profile, KPIs and the last K memory entries (each clipped)
    /// 2. Start the history at `target_records` and, while the package
    ///    exceeds `word_budget - safety_margin`, cut records using the
    ///    observed words-per-record, down to `min_records`
    /// 3. At the floor, drop per-record commentary and splits
    /// 4. Keep cutting records, never below one while any exist
    /// 5. Still over `word_budget`: drop memory lines oldest first, then cut
    ///    the text and append `[truncated]`
    pub fn build(&self, input: &AssemblyInput<'_>) -> ContextPackage {
        let b = &self.budget;
        let profile = render_profile(input.profile, input.runner, input.now);
        let kpi_header = kpi_header(b.kpi_window_weeks);
        let kpis = Kpis::compute(input.activities, input.now, b.kpi_window_weeks).render();

        let shown = input.memory.len().min(b.memory_items);
        let mut memory_lines: Vec<String> = input.memory[input.memory.len() - shown..]
            .iter()
            .map(|e| render_memory_line(e, b.memory_entry_chars))
            .collect();

        let total = input.activities.len();
        let floor = b.min_records.max(1).min(total);
        let mut records = b.target_records.max(floor).min(total);
        let mut detail = true;
        let ceiling = b.word_budget.saturating_sub(b.safety_margin);

        let compose = |history: &str, memory_lines: &[String]| {
            let memory = if memory_lines.is_empty() {
                if shown > 0 { "- (omitted to fit budget)".to_string() } else { "- (empty)".to_string() }
            } else {
                memory_lines.join("\n")
            };
            [
                PACKAGE_PREAMBLE,
                "",
                PROFILE_HEADER,
                profile.as_str(),
                HISTORY_HEADER,
                history,
                kpi_header.as_str(),
                kpis.as_str(),
                MEMORY_HEADER,
                memory.as_str(),
                END_MARKER,
            ]
            .join("\n")
        };

        let mut history = render_history(input.activities, records, detail, b.commentary_chars);
        let mut text = compose(&history, &memory_lines);
        let mut words = count_words(&text);

        // ── History sizing against the soft ceiling ───────────────────────
        while words > ceiling {
            if records > floor {
                records = shrink(records, floor, words - ceiling, count_words(&history));
            } else if detail && has_detail(&input.activities[..records]) {
                detail = false;
            } else if records > 1 {
                records = shrink(records, 1, words - ceiling, count_words(&history));
            } else {
                break;
            }
            history = render_history(input.activities, records, detail, b.commentary_chars);
            text = compose(&history, &memory_lines);
            words = count_words(&text);
        }

        // ── Hard budget: memory lines, then the word cut ──────────────────
        while words > b.word_budget && !memory_lines.is_empty() {
            memory_lines.remove(0);
            text = compose(&history, &memory_lines);
            words = count_words(&text);
        }

        let mut truncated = false;
        if words > b.word_budget {
            truncated = true;
            text = match b.word_budget {
                0 => String::new(),
                n => format!("{}\n{TRUNCATED_TAIL}", cut_to_words(&text, n - 1)),
            };
            words = count_words(&text);
        }

        let memory_words = count_words(&memory_lines.join("\n"));
        let metadata = AssemblyMetadata {
            word_count: words,
            budget: b.word_budget,
            records_included: records,
            records_total: total,
            commentary_dropped: !detail,
            memory_items_included: memory_lines.len(),
            memory_items_total: input.memory.len(),
            truncated,
            per_section: vec![
                SectionStats { name: "profile".into(), words: count_words(&profile) },
                SectionStats { name: "history".into(), words: count_words(&history) },
                SectionStats { name: "kpis".into(), words: count_words(&kpis) },
                SectionStats { name: "memory".into(), words: memory_words },
            ],
        };

        debug!(
            word_count = metadata.word_count,
            budget = metadata.budget,
            records_included = records,
            records_total = total,
            commentary_dropped = metadata.commentary_dropped,
            truncated,
            "Context package assembled"
        );

        ContextPackage { text, metadata }
    }
}

impl Default for ContextAssembler {
    fn default() -> Self {
        Self::new(ContextBudget::default())
    }
}

/// Fewer records, estimated from the current words-per-record.
fn shrink(records: usize, floor: usize, excess: usize, history_words: usize) -> usize {
    let per_record = history_words.div_ceil(records.max(1)).max(1);
    let cut = excess.div_ceil(per_record).max(1);
    records.saturating_sub(cut).max(floor)
}

fn has_detail(activities: &[Activity]) -> bool {
    activities
        .iter()
        .any(|a| !a.splits.is_empty() || commentary(a, usize::MAX).is_some())
}

// ── Block renderers ───────────────────────────────────────────────────────

fn render_profile(profile: &FixedProfile, runner: Option<&RunnerProfile>, now: NaiveDateTime) -> String {
    let today = now.date();
    let days_left = profile.days_left(today);
    let required_pace = profile
        .required_pace_min_km()
        .map(|p| format!("{}/km", format_pace(p)))
        .unwrap_or_else(|| "unknown".into());

    let mut lines = vec![
        format!("- Runner since: {}", profile.runner_since),
        format!("- Preferred frequency: {} sessions/week", profile.sessions_per_week),
        format!(
            "- Objective: {} ({}), {:.1} km in {}",
            profile.race_name, profile.race_date, profile.race_distance_km, profile.target_time
        ),
        format!("- Required pace: {required_pace}"),
        format!("- Days left: {days_left} (as of {today})"),
        format!("- Training phase: {}", TrainingPhase::for_days_left(days_left).label()),
        format!("- Safety rule: {}", profile.safety_rule),
    ];

    if let Some(runner) = runner {
        lines.extend(render_runner(runner));
    }
    lines.join("\n")
}

fn render_runner(runner: &RunnerProfile) -> Vec<String> {
    let mut lines = Vec::new();

    let athlete: Vec<String> = [
        runner.name.clone(),
        runner.age.map(|a| format!("{a} years")),
        runner.height_cm.map(|h| format!("{h:.0} cm")),
        runner.weight_kg.map(|w| format!("{w:.1} kg")),
        runner.vo2max_estimate.map(|v| format!("VO2max {v:.0}")),
    ]
    .into_iter()
    .flatten()
    .collect();
    if !athlete.is_empty() {
        lines.push(format!("- Athlete: {}", athlete.join(", ")));
    }

    let prs: Vec<String> = [
        ("5k", &runner.pr_5k),
        ("10k", &runner.pr_10k),
        ("half", &runner.pr_half),
        ("marathon", &runner.pr_marathon),
    ]
    .into_iter()
    .filter_map(|(label, pr)| pr.as_ref().map(|t| format!("{label} {t}")))
    .collect();
    if !prs.is_empty() {
        lines.push(format!("- PRs: {}", prs.join(", ")));
    }

    if let Some(threshold) = &runner.threshold_pace {
        lines.push(format!("- Threshold pace: {threshold}/km"));
    }
    if let (Some(min), Some(max)) = (&runner.easy_pace_min, &runner.easy_pace_max) {
        lines.push(format!("- Easy pace: {min}-{max}/km"));
    }
    if let Some(goal) = &runner.current_goal {
        lines.push(format!("- Current goal: {}", normalize_whitespace(goal)));
    }
    if let Some(philosophy) = &runner.training_philosophy {
        lines.push(format!("- Training philosophy: {}", normalize_whitespace(philosophy)));
    }
    lines
}

fn render_history(activities: &[Activity], records: usize, detail: bool, commentary_chars: usize) -> String {
    if activities.is_empty() {
        return NO_TRAINING_DATA.to_string();
    }

    let mut lines = Vec::new();
    for activity in activities.iter().take(records) {
        lines.push(record_line(activity));
        if detail {
            if let Some(comment) = commentary(activity, commentary_chars) {
                lines.push(format!("  - {comment}"));
            }
            if !activity.splits.is_empty() {
                lines.push(format!("  - {}", splits_line(activity)));
            }
        }
    }

    if records < activities.len() {
        lines.push(format!(
            "[history truncated: showing {records} of {} sessions]",
            activities.len()
        ));
    }
    if !detail {
        lines.push(COMMENTARY_OMITTED.to_string());
    }
    lines.join("\n")
}

fn record_line(a: &Activity) -> String {
    let pace = a
        .pace_min_km()
        .map(|p| format!("{}/km", format_pace(p)))
        .unwrap_or_else(|| MISSING.into());
    let hr = a
        .average_heartrate
        .map(|hr| format!("{hr:.0} bpm"))
        .unwrap_or_else(|| MISSING.into());
    let elev = a
        .total_elevation_gain
        .map(|e| format!("{e:.0} m"))
        .unwrap_or_else(|| MISSING.into());
    format!(
        "- **{}** | {:.2} km | {pace} | HR: {hr} | Elev: {elev}",
        a.date(),
        a.distance_km
    )
}

/// Description and private note, whitespace-normalized and clipped.
fn commentary(a: &Activity, max_chars: usize) -> Option<String> {
    let parts: Vec<String> = [&a.description, &a.private_note]
        .into_iter()
        .flatten()
        .map(|s| normalize_whitespace(s))
        .filter(|s| !s.is_empty())
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(truncate_chars(&parts.join(" | "), max_chars, "…"))
}

fn splits_line(a: &Activity) -> String {
    let splits: Vec<String> = a
        .splits
        .iter()
        .map(|s| {
            let pace = s.pace_min_km().map(format_pace).unwrap_or_else(|| MISSING.into());
            format!("Km{}: {pace}", s.split)
        })
        .collect();
    format!("Splits: [{}]", splits.join(", "))
}

fn render_memory_line(entry: &SessionMemoryEntry, max_chars: usize) -> String {
    let content = truncate_chars(&normalize_whitespace(&entry.content), max_chars, "...");
    format!(
        "- [{}] {}: {content}",
        entry.timestamp.with_timezone(&Local).format("%Y-%m-%d %H:%M"),
        entry.kind
    )
}
