//! The shared tabular intermediate every export format consumes.
//!
//! All column order, row order and value formatting decisions live here,
//! once, so preview and documents cannot drift apart. Scores display at
//! three decimals; the full-precision values never pass through this
//! module's output back into ranking.

use chrono::TimeZone;

use crate::snapshot::Snapshot;
use crate::state::{ClampVec, ExperimentSettings, RunningUpdate, ScoreRecord};

pub const NO_CONFIG: &str = "No configuration provided.";
pub const NO_SCORES: &str = "No score data available.";
pub const NO_UPDATES: &str = "No updates available.";
pub const NO_OVERLAY: &str = "Overlay image not available.";
pub const NO_VARIANT_GRAPHS: &str = "No individual graphs available.";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(header: &[&str]) -> Self {
        Self {
            header: header.iter().map(|h| (*h).to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn push(&mut self, row: Vec<String>) {
        debug_assert_eq!(row.len(), self.header.len());
        self.rows.push(row);
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Three-decimal display for scores (ranking upstream stays full f64).
pub fn fmt3(value: f64) -> String {
    format!("{:.3}", value)
}

/// HH:MM:SS (UTC) from epoch milliseconds.
pub fn fmt_time(epoch_ms: i64) -> String {
    match chrono::Utc.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%H:%M:%S").to_string(),
        None => "??:??:??".to_string(),
    }
}

/// Date + time (UTC) for report headers.
pub fn fmt_datetime(epoch_ms: i64) -> String {
    match chrono::Utc.timestamp_millis_opt(epoch_ms).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        None => "unknown time".to_string(),
    }
}

fn na() -> String {
    "N/A".to_string()
}

fn opt_str(v: &Option<String>) -> String {
    match v {
        Some(s) if !s.is_empty() => s.clone(),
        _ => na(),
    }
}

fn opt_num<T: ToString>(v: &Option<T>) -> String {
    v.as_ref().map_or_else(na, ToString::to_string)
}

fn join_or_na(items: &[String], sep: &str) -> String {
    if items.is_empty() {
        na()
    } else {
        items.join(sep)
    }
}

fn yes_no(v: bool) -> String {
    (if v { "Yes" } else { "No" }).to_string()
}

fn clamp_cell(clamp: Option<&ClampVec>) -> String {
    clamp.map_or_else(na, |c| format!("x: {}, y: {}, z: {}", c.x, c.y, c.z))
}

/// Two-column configuration table, label/value, fixed row set. Missing
/// settings render an empty table (the exporter substitutes the section
/// placeholder).
pub fn config_table(settings: Option<&ExperimentSettings>) -> Table {
    let mut table = Table::new(&["Setting", "Value"]);
    let Some(s) = settings else {
        return table;
    };
    let movement = s.movement.as_ref();
    let translation = movement.and_then(|m| m.translation.as_ref()).and_then(|t| t.clamp.as_ref());
    let rotation = movement.and_then(|m| m.rotation.as_ref()).and_then(|r| r.clamp.as_ref());
    let lifespan = movement
        .and_then(|m| m.max_lifespan_seconds)
        .map_or_else(na, |secs| format!("{}s", secs));
    let scoring = s.scoring.as_ref().map(|sc| opt_str(&sc.notes)).unwrap_or_else(na);

    let rows: Vec<(&str, String)> = vec![
        ("Name", opt_str(&s.name)),
        ("Description", opt_str(&s.description)),
        ("Episodes", opt_num(&s.episodes)),
        ("Modes", join_or_na(&s.modes, ", ")),
        ("Numerical Types", join_or_na(&s.numerical_types, ", ")),
        ("Planets", join_or_na(&s.planets, " / ")),
        ("Spectrum Steps", opt_num(&s.spectrum_steps)),
        ("Max Std Dev", opt_num(&s.spectrum_max_stddev)),
        ("Auto Launch", yes_no(s.auto_launch)),
        ("Auto State", yes_no(s.auto_state)),
        ("Translation Clamp", clamp_cell(translation)),
        ("Rotation Clamp", clamp_cell(rotation)),
        ("Max Lifespan", lifespan),
        ("Scoring Method", scoring),
    ];
    for (label, value) in rows {
        table.push(vec![label.to_string(), value]);
    }
    table
}

/// Leaderboard table: one row per `(num_type, mode)` group best, already
/// sorted descending by the aggregator.
pub fn best_score_table(best: &[ScoreRecord]) -> Table {
    let mut table = Table::new(&["Numerical Type", "Mode", "Variant", "Generation", "Best Score"]);
    for record in best {
        table.push(vec![
            record.num_type.clone(),
            record.mode.clone(),
            record.variant_index.to_string(),
            record.generation.to_string(),
            fmt3(record.mean_progress),
        ]);
    }
    table
}

/// Raw score set, one row per record, input order.
pub fn score_summary_table(scores: &[ScoreRecord]) -> Table {
    let mut table = Table::new(&["Gen", "Type", "Mode", "Var", "Mean Progress"]);
    for record in scores {
        table.push(vec![
            record.generation.to_string(),
            record.num_type.clone(),
            record.mode.clone(),
            record.variant_index.to_string(),
            fmt3(record.mean_progress),
        ]);
    }
    table
}

/// Running-update log, arrival order.
pub fn updates_table(updates: &[RunningUpdate]) -> Table {
    let mut table = Table::new(&["Time", "Gen", "Type", "Mode", "Var", "Stage", "Message"]);
    for update in updates {
        table.push(vec![
            fmt_time(update.timestamp),
            update.generation.to_string(),
            update.num_type.clone(),
            update.mode.clone(),
            update.variant.to_string(),
            update.stage.as_str().to_string(),
            update.message.clone(),
        ]);
    }
    table
}

/// All four tables for one snapshot, built in one place.
#[derive(Debug, Clone, PartialEq)]
pub struct Tables {
    pub config: Table,
    pub best: Table,
    pub summary: Table,
    pub updates: Table,
}

pub fn build_tables(snapshot: &Snapshot) -> Tables {
    Tables {
        config: config_table(snapshot.settings.as_ref()),
        best: best_score_table(&snapshot.best_by_type_mode),
        summary: score_summary_table(&snapshot.scores),
        updates: updates_table(&snapshot.updates),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ClampSpec, MovementSettings, ScoringSettings, Stage};

    #[test]
    fn fmt3_rounds_for_display_only() {
        assert_eq!(fmt3(0.5004), "0.500");
        assert_eq!(fmt3(0.9995), "1.000");
        assert_eq!(fmt3(0.95), "0.950");
    }

    #[test]
    fn fmt_time_is_utc_clock() {
        // 1970-01-01T01:02:03Z
        assert_eq!(fmt_time(3_723_000), "01:02:03");
    }

    #[test]
    fn config_table_substitutes_na() {
        let settings = ExperimentSettings {
            name: Some("spectrum-sweep".to_string()),
            modes: vec!["solo".to_string(), "duo".to_string()],
            auto_state: true,
            ..Default::default()
        };
        let table = config_table(Some(&settings));
        assert_eq!(table.rows.len(), 14);
        let get = |label: &str| {
            table
                .rows
                .iter()
                .find(|r| r[0] == label)
                .map(|r| r[1].clone())
                .unwrap()
        };
        assert_eq!(get("Name"), "spectrum-sweep");
        assert_eq!(get("Modes"), "solo, duo");
        assert_eq!(get("Episodes"), "N/A");
        assert_eq!(get("Planets"), "N/A");
        assert_eq!(get("Auto Launch"), "No");
        assert_eq!(get("Auto State"), "Yes");
        assert_eq!(get("Translation Clamp"), "N/A");
    }

    #[test]
    fn config_table_formats_clamps_and_lifespan() {
        let settings = ExperimentSettings {
            movement: Some(MovementSettings {
                translation: Some(ClampSpec {
                    clamp: Some(ClampVec { x: 1.0, y: 2.0, z: 3.0 }),
                }),
                rotation: None,
                max_lifespan_seconds: Some(90),
            }),
            scoring: Some(ScoringSettings {
                notes: Some("mean progress over episodes".to_string()),
            }),
            ..Default::default()
        };
        let table = config_table(Some(&settings));
        let get = |label: &str| {
            table
                .rows
                .iter()
                .find(|r| r[0] == label)
                .map(|r| r[1].clone())
                .unwrap()
        };
        assert_eq!(get("Translation Clamp"), "x: 1, y: 2, z: 3");
        assert_eq!(get("Rotation Clamp"), "N/A");
        assert_eq!(get("Max Lifespan"), "90s");
        assert_eq!(get("Scoring Method"), "mean progress over episodes");
    }

    #[test]
    fn missing_settings_yield_empty_table() {
        assert!(config_table(None).is_empty());
    }

    #[test]
    fn updates_table_preserves_arrival_order() {
        let update = |ts: i64, stage: Stage| RunningUpdate {
            timestamp: ts,
            generation: 1,
            num_type: "f32".to_string(),
            mode: "solo".to_string(),
            variant: 0,
            stage,
            message: "m".to_string(),
        };
        let table = updates_table(&[
            update(1_000, Stage::Generating),
            update(2_000, Stage::Running),
        ]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0][5], "generating");
        assert_eq!(table.rows[1][5], "running");
    }

    #[test]
    fn score_tables_share_display_formatting() {
        let record = ScoreRecord {
            generation: 4,
            num_type: "f64".to_string(),
            mode: "duo".to_string(),
            variant_index: 1,
            mean_progress: 0.95,
        };
        let summary = score_summary_table(std::slice::from_ref(&record));
        let best = best_score_table(std::slice::from_ref(&record));
        assert_eq!(summary.rows[0][4], "0.950");
        assert_eq!(best.rows[0][4], "0.950");
    }
}
