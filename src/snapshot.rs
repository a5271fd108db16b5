//! Point-in-time capture of store contents plus derived aggregates.
//!
//! Capture is synchronous and copy-everything: once built, a snapshot
//! shares nothing with the live store, so an export can take as long as
//! it likes while the stream keeps mutating state underneath.

use crate::aggregate::{
    best_by_type_mode, overall_best, overlay_series, trend_by_group, OverlaySeries, TrendSeries,
};
use crate::logging::{log, obj, ts_epoch_ms, v_num, Domain, Level};
use crate::state::{DashState, ExperimentSettings, RunningUpdate, ScoreRecord, StatusSnapshot};

/// Frozen dashboard state. Immutable by construction: all fields are
/// owned copies taken in one pass, between stream applies.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Epoch ms at capture time.
    pub taken_at: i64,
    /// Store version the capture saw, for superseded-export bookkeeping.
    pub state_version: u64,
    pub status: Option<StatusSnapshot>,
    pub settings: Option<ExperimentSettings>,
    pub updates: Vec<RunningUpdate>,
    pub scores: Vec<ScoreRecord>,
    pub best_by_type_mode: Vec<ScoreRecord>,
    pub overall_best: Option<ScoreRecord>,
    /// Shared x-axis: distinct generations ascending.
    pub generations: Vec<u32>,
    pub overlay: Vec<OverlaySeries>,
    pub trends: Vec<TrendSeries>,
}

/// Capture the store and run every derivation once. No I/O, no awaiting;
/// rendering against the result happens strictly afterwards.
pub fn capture(state: &DashState) -> Snapshot {
    let scores: Vec<ScoreRecord> = state.scores().to_vec();
    let (generations, overlay) = overlay_series(&scores);
    let snapshot = Snapshot {
        taken_at: ts_epoch_ms(),
        state_version: state.version(),
        status: state.status().cloned(),
        settings: state.settings().cloned(),
        updates: state.updates().cloned().collect(),
        best_by_type_mode: best_by_type_mode(&scores),
        overall_best: overall_best(&scores),
        trends: trend_by_group(&scores),
        generations,
        overlay,
        scores,
    };
    log(
        Level::Debug,
        Domain::Export,
        "captured",
        obj(&[
            ("state_version", v_num(snapshot.state_version as f64)),
            ("scores", v_num(snapshot.scores.len() as f64)),
            ("updates", v_num(snapshot.updates.len() as f64)),
            ("series", v_num(snapshot.overlay.len() as f64)),
        ]),
    );
    snapshot
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::StreamMessage;
    use crate::state::{RunningUpdate, ScoreRecord, Stage, StatusSnapshot};

    fn seeded_state() -> DashState {
        let mut state = DashState::new(100);
        state.apply(StreamMessage::Status(StatusSnapshot {
            timestamp: 10,
            total_cubes: 4,
            ..Default::default()
        }));
        state.apply(StreamMessage::Scores(vec![ScoreRecord {
            generation: 1,
            num_type: "f32".to_string(),
            mode: "solo".to_string(),
            variant_index: 0,
            mean_progress: 0.4,
        }]));
        state.apply(StreamMessage::Running(vec![RunningUpdate {
            timestamp: 11,
            generation: 1,
            num_type: "f32".to_string(),
            mode: "solo".to_string(),
            variant: 0,
            stage: Stage::Running,
            message: "tick".to_string(),
        }]));
        state
    }

    #[test]
    fn capture_copies_and_derives() {
        let state = seeded_state();
        let snap = capture(&state);
        assert_eq!(snap.state_version, state.version());
        assert_eq!(snap.scores.len(), 1);
        assert_eq!(snap.updates.len(), 1);
        assert_eq!(snap.best_by_type_mode.len(), 1);
        assert_eq!(snap.overall_best.as_ref().unwrap().mean_progress, 0.4);
        assert_eq!(snap.generations, vec![1]);
        assert_eq!(snap.overlay.len(), 1);
    }

    #[test]
    fn snapshot_is_isolated_from_later_mutation() {
        let mut state = seeded_state();
        let snap = capture(&state);
        let frozen = snap.clone();

        // Mutate every entity after capture.
        state.apply(StreamMessage::Status(StatusSnapshot::default()));
        state.apply(StreamMessage::Scores(Vec::new()));
        state.apply(StreamMessage::Running(vec![RunningUpdate {
            timestamp: 99,
            generation: 9,
            num_type: "f64".to_string(),
            mode: "duo".to_string(),
            variant: 1,
            stage: Stage::Finished,
            message: String::new(),
        }]));

        assert_eq!(snap, frozen, "captured snapshot changed under mutation");
        assert_eq!(snap.scores.len(), 1);
        assert_eq!(snap.updates.len(), 1);
    }

    #[test]
    fn capture_of_empty_state_is_empty_not_error() {
        let snap = capture(&DashState::new(10));
        assert!(snap.status.is_none());
        assert!(snap.settings.is_none());
        assert!(snap.scores.is_empty());
        assert!(snap.best_by_type_mode.is_empty());
        assert!(snap.overall_best.is_none());
        assert!(snap.generations.is_empty());
    }
}
