//! Domain records and the single mutable store behind the dashboard.
//!
//! Mutation policy per entity is explicit, not inferred from call sites:
//!
//! | entity              | message             | policy            |
//! |---------------------|---------------------|-------------------|
//! | status snapshot     | `status_update`     | replace-wholesale |
//! | experiment settings | `experiment_config` | replace-wholesale |
//! | score set           | `scores_overview`   | replace-wholesale |
//! | update log          | `running_update`    | append-only batch |
//! | heartbeat timestamp | `heartbeat`         | last-write-wins   |

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};

use crate::logging::{log, obj, v_num, Domain, Level};
use crate::protocol::StreamMessage;

#[derive(Clone)]
pub struct Config {
    pub ws_url: String,
    pub sqlite_path: String,
    /// Rotation cap for the running-update log. The stream never stops
    /// appending, so the store evicts the oldest entries past this bound.
    pub max_update_log: usize,
    pub export_secs: u64,
    pub export_dir: String,
    pub channel_capacity: usize,
    /// Send `run` once after the first successful connect.
    pub autorun: bool,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            ws_url: std::env::var("STATUS_WS_URL")
                .unwrap_or_else(|_| "ws://127.0.0.1:8080/ws/status".to_string()),
            sqlite_path: std::env::var("SQLITE_PATH").unwrap_or_else(|_| "./flukeboard.sqlite".to_string()),
            max_update_log: std::env::var("MAX_UPDATE_LOG").ok().and_then(|v| v.parse().ok()).unwrap_or(5000),
            export_secs: std::env::var("EXPORT_SECS").ok().and_then(|v| v.parse().ok()).unwrap_or(300),
            export_dir: std::env::var("EXPORT_DIR").unwrap_or_else(|_| "./reports".to_string()),
            channel_capacity: std::env::var("STREAM_CHANNEL_CAP").ok().and_then(|v| v.parse().ok()).unwrap_or(256),
            autorun: matches!(
                std::env::var("EXPERIMENT_AUTORUN").as_deref(),
                Ok("1") | Ok("true")
            ),
        }
    }
}

// =============================================================================
// Wire-level domain records
// =============================================================================

/// One simulation host, addressed by name when it has one, else host:port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    #[serde(default)]
    pub name: Option<String>,
    pub host: String,
    pub port: u16,
    #[serde(default)]
    pub pos: [f64; 3],
}

impl Planet {
    /// Identity key: `name` if present, else `host:port`. Unique within one
    /// status snapshot; duplicates resolve last-wins downstream.
    pub fn identity(&self) -> String {
        match &self.name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => format!("{}:{}", self.host, self.port),
        }
    }
}

/// Whole-cluster status, replaced on every `status_update`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    #[serde(default)]
    pub timestamp: i64,
    #[serde(default)]
    pub total_cubes: u64,
    #[serde(default)]
    pub total_planets: u64,
    #[serde(default)]
    pub planets: Vec<Planet>,
    #[serde(default)]
    pub cube_hosts: BTreeMap<String, u64>,
}

/// One scored variant at one generation. Identity is the full
/// `(num_type, mode, variant_index, generation)` tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub generation: u32,
    pub num_type: String,
    pub mode: String,
    #[serde(rename = "variantIndex")]
    pub variant_index: u32,
    pub mean_progress: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    #[serde(alias = "Generating")]
    Generating,
    #[serde(alias = "SpawningAgents")]
    SpawningAgents,
    #[serde(alias = "Running")]
    Running,
    #[serde(alias = "Finished")]
    Finished,
    #[serde(alias = "Cleaned")]
    Cleaned,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Generating => "generating",
            Stage::SpawningAgents => "spawning_agents",
            Stage::Running => "running",
            Stage::Finished => "finished",
            Stage::Cleaned => "cleaned",
        }
    }
}

/// One progress line from the experiment runner. Appended, never merged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningUpdate {
    pub timestamp: i64,
    pub generation: u32,
    pub num_type: String,
    pub mode: String,
    pub variant: u32,
    pub stage: Stage,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ClampVec {
    #[serde(default)]
    pub x: f64,
    #[serde(default)]
    pub y: f64,
    #[serde(default)]
    pub z: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ClampSpec {
    #[serde(default)]
    pub clamp: Option<ClampVec>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MovementSettings {
    #[serde(default)]
    pub translation: Option<ClampSpec>,
    #[serde(default)]
    pub rotation: Option<ClampSpec>,
    #[serde(default)]
    pub max_lifespan_seconds: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoringSettings {
    #[serde(default)]
    pub notes: Option<String>,
}

/// Experiment configuration, replaced on every `experiment_config`.
/// Every field is optional on the wire; display substitutes "N/A".
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExperimentSettings {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub episodes: Option<u64>,
    #[serde(default)]
    pub modes: Vec<String>,
    #[serde(default)]
    pub numerical_types: Vec<String>,
    #[serde(default)]
    pub planets: Vec<String>,
    #[serde(default)]
    pub spectrum_steps: Option<u64>,
    #[serde(default)]
    pub spectrum_max_stddev: Option<f64>,
    #[serde(default)]
    pub auto_launch: bool,
    #[serde(default)]
    pub auto_state: bool,
    #[serde(default)]
    pub movement: Option<MovementSettings>,
    #[serde(default)]
    pub scoring: Option<ScoringSettings>,
}

// =============================================================================
// DashState — the store
// =============================================================================

/// What a single `apply` did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Applied {
    StatusReplaced,
    SettingsReplaced,
    ScoresReplaced { count: usize },
    UpdatesAppended { count: usize, evicted: usize },
    Heartbeat,
    Ignored,
}

/// The single mutable source of truth. All mutation happens through
/// [`DashState::apply`] on one logical task; readers between applies see a
/// complete, point-in-time view.
#[derive(Debug, Clone)]
pub struct DashState {
    status: Option<StatusSnapshot>,
    settings: Option<ExperimentSettings>,
    updates: VecDeque<RunningUpdate>,
    scores: Vec<ScoreRecord>,
    last_heartbeat: Option<i64>,
    max_update_log: usize,
    /// Change token: bumped on every state-changing apply so consumers can
    /// re-derive on version change instead of comparing references.
    version: u64,
    applied: u64,
    ignored_unknown: u64,
}

impl DashState {
    pub fn new(max_update_log: usize) -> Self {
        Self {
            status: None,
            settings: None,
            updates: VecDeque::new(),
            scores: Vec::new(),
            last_heartbeat: None,
            max_update_log: max_update_log.max(1),
            version: 0,
            applied: 0,
            ignored_unknown: 0,
        }
    }

    /// Fold one decoded stream message into the store. Unknown message
    /// kinds are counted no-ops; nothing here fails.
    pub fn apply(&mut self, msg: StreamMessage) -> Applied {
        let applied = match msg {
            StreamMessage::Status(status) => {
                self.status = Some(status);
                Applied::StatusReplaced
            }
            StreamMessage::Config(settings) => {
                self.settings = Some(settings);
                Applied::SettingsReplaced
            }
            StreamMessage::Scores(scores) => {
                let count = scores.len();
                self.scores = scores;
                Applied::ScoresReplaced { count }
            }
            StreamMessage::Running(batch) => {
                let count = batch.len();
                self.updates.extend(batch);
                let evicted = self.rotate_updates();
                Applied::UpdatesAppended { count, evicted }
            }
            StreamMessage::Heartbeat(hb) => {
                self.last_heartbeat = Some(hb.timestamp.unwrap_or_else(crate::logging::ts_epoch_ms));
                Applied::Heartbeat
            }
            StreamMessage::Unrecognized { .. } => {
                self.ignored_unknown += 1;
                return Applied::Ignored;
            }
        };
        self.version += 1;
        self.applied += 1;
        applied
    }

    fn rotate_updates(&mut self) -> usize {
        let mut evicted = 0;
        while self.updates.len() > self.max_update_log {
            self.updates.pop_front();
            evicted += 1;
        }
        if evicted > 0 {
            log(
                Level::Warn,
                Domain::State,
                "update_log_rotated",
                obj(&[
                    ("evicted", v_num(evicted as f64)),
                    ("cap", v_num(self.max_update_log as f64)),
                ]),
            );
        }
        evicted
    }

    pub fn status(&self) -> Option<&StatusSnapshot> {
        self.status.as_ref()
    }

    pub fn settings(&self) -> Option<&ExperimentSettings> {
        self.settings.as_ref()
    }

    /// Running updates in arrival order, oldest first.
    pub fn updates(&self) -> impl Iterator<Item = &RunningUpdate> {
        self.updates.iter()
    }

    pub fn update_count(&self) -> usize {
        self.updates.len()
    }

    /// The score set, verbatim from the most recent `scores_overview`.
    pub fn scores(&self) -> &[ScoreRecord] {
        &self.scores
    }

    pub fn last_heartbeat(&self) -> Option<i64> {
        self.last_heartbeat
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn applied(&self) -> u64 {
        self.applied
    }

    pub fn ignored_unknown(&self) -> u64 {
        self.ignored_unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Heartbeat;

    fn update(ts: i64, stage: Stage) -> RunningUpdate {
        RunningUpdate {
            timestamp: ts,
            generation: 1,
            num_type: "f32".to_string(),
            mode: "solo".to_string(),
            variant: 0,
            stage,
            message: String::new(),
        }
    }

    #[test]
    fn status_is_replaced_wholesale() {
        let mut state = DashState::new(100);
        let first = StatusSnapshot {
            timestamp: 1,
            total_cubes: 10,
            ..Default::default()
        };
        let second = StatusSnapshot {
            timestamp: 2,
            total_planets: 3,
            ..Default::default()
        };
        state.apply(StreamMessage::Status(first));
        state.apply(StreamMessage::Status(second.clone()));
        // No field-level merge: total_cubes from the first must be gone.
        assert_eq!(state.status(), Some(&second));
        assert_eq!(state.status().unwrap().total_cubes, 0);
    }

    #[test]
    fn running_updates_append_in_arrival_order() {
        let mut state = DashState::new(100);
        state.apply(StreamMessage::Running(vec![update(1, Stage::Generating)]));
        state.apply(StreamMessage::Running(vec![update(2, Stage::Running)]));
        let stages: Vec<Stage> = state.updates().map(|u| u.stage).collect();
        assert_eq!(stages, vec![Stage::Generating, Stage::Running]);
        assert_eq!(state.update_count(), 2);
    }

    #[test]
    fn update_log_rotates_oldest_first() {
        let mut state = DashState::new(3);
        let batch: Vec<RunningUpdate> =
            (0..5).map(|i| update(i, Stage::Running)).collect();
        let applied = state.apply(StreamMessage::Running(batch));
        assert_eq!(applied, Applied::UpdatesAppended { count: 5, evicted: 2 });
        let kept: Vec<i64> = state.updates().map(|u| u.timestamp).collect();
        assert_eq!(kept, vec![2, 3, 4]);
    }

    #[test]
    fn scores_replace_not_merge() {
        let mut state = DashState::new(100);
        let a = ScoreRecord {
            generation: 1,
            num_type: "f32".to_string(),
            mode: "solo".to_string(),
            variant_index: 0,
            mean_progress: 0.5,
        };
        let b = ScoreRecord {
            generation: 2,
            num_type: "f64".to_string(),
            mode: "duo".to_string(),
            variant_index: 1,
            mean_progress: 0.7,
        };
        state.apply(StreamMessage::Scores(vec![a.clone(), b.clone()]));
        state.apply(StreamMessage::Scores(vec![b.clone()]));
        assert_eq!(state.scores(), &[b]);
    }

    #[test]
    fn unknown_kind_is_counted_noop() {
        let mut state = DashState::new(100);
        let before = state.version();
        let applied = state.apply(StreamMessage::Unrecognized {
            kind: "telemetry_v2".to_string(),
        });
        assert_eq!(applied, Applied::Ignored);
        assert_eq!(state.version(), before);
        assert_eq!(state.ignored_unknown(), 1);
    }

    #[test]
    fn version_bumps_on_every_change() {
        let mut state = DashState::new(100);
        state.apply(StreamMessage::Status(StatusSnapshot::default()));
        state.apply(StreamMessage::Heartbeat(Heartbeat { timestamp: Some(5) }));
        assert_eq!(state.version(), 2);
        assert_eq!(state.last_heartbeat(), Some(5));
    }

    #[test]
    fn planet_identity_prefers_name() {
        let named = Planet {
            name: Some("kepler".to_string()),
            host: "10.0.0.1".to_string(),
            port: 7000,
            pos: [0.0, 0.0, 0.0],
        };
        let unnamed = Planet {
            name: None,
            host: "10.0.0.2".to_string(),
            port: 7001,
            pos: [0.0, 0.0, 0.0],
        };
        assert_eq!(named.identity(), "kepler");
        assert_eq!(unnamed.identity(), "10.0.0.2:7001");
    }
}
