//! Pure derivations over the score set and planet list.
//!
//! Everything here is a function of its input slice: no accumulators, no
//! caches, safe to re-run on every state version bump. Ranking and
//! tie-breaks compare full-precision `mean_progress`; rounding happens
//! only at the presentation edge.
//!
//! Defensive duplicate policy: the score set is replaced wholesale by the
//! stream, so duplicate identities should not occur — but if one payload
//! does repeat an identity, the last occurrence wins, uniformly across
//! every derivation.

use std::collections::HashMap;

use serde::Serialize;

use crate::state::{Planet, ScoreRecord, StatusSnapshot};

/// Composite grouping key. A proper tuple type instead of the delimiter-
/// joined string the wire format suggests, so field values containing `_`
/// cannot collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupKey {
    pub num_type: String,
    pub mode: String,
}

impl GroupKey {
    pub fn of(record: &ScoreRecord) -> Self {
        Self { num_type: record.num_type.clone(), mode: record.mode.clone() }
    }

    /// Display label, e.g. `f32/solo`.
    pub fn label(&self) -> String {
        format!("{}/{}", self.num_type, self.mode)
    }
}

/// One overlay line: a group key plus a variant index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SeriesKey {
    pub num_type: String,
    pub mode: String,
    pub variant_index: u32,
}

impl SeriesKey {
    pub fn of(record: &ScoreRecord) -> Self {
        Self {
            num_type: record.num_type.clone(),
            mode: record.mode.clone(),
            variant_index: record.variant_index,
        }
    }

    pub fn group(&self) -> GroupKey {
        GroupKey { num_type: self.num_type.clone(), mode: self.mode.clone() }
    }

    /// Display label, e.g. `f32/solo v2`.
    pub fn label(&self) -> String {
        format!("{}/{} v{}", self.num_type, self.mode, self.variant_index)
    }
}

/// One variant trend aligned to the shared generation axis. `None` marks
/// a generation with no record for this series — a gap, never a zero.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlaySeries {
    pub key: SeriesKey,
    pub values: Vec<Option<f64>>,
}

/// Mean progress per generation within one `(num_type, mode)` group.
/// Generations with no records are omitted, not zeroed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrendSeries {
    pub key: GroupKey,
    pub points: Vec<(u32, f64)>,
}

fn identity(r: &ScoreRecord) -> (&str, &str, u32, u32) {
    (&r.num_type, &r.mode, r.variant_index, r.generation)
}

/// Collapse duplicate identities, last occurrence wins. Survivors keep the
/// input order of their final occurrence.
pub fn dedupe_last(scores: &[ScoreRecord]) -> Vec<ScoreRecord> {
    let mut last_index: HashMap<(&str, &str, u32, u32), usize> = HashMap::new();
    for (i, record) in scores.iter().enumerate() {
        last_index.insert(identity(record), i);
    }
    scores
        .iter()
        .enumerate()
        .filter(|(i, record)| last_index[&identity(record)] == *i)
        .map(|(_, record)| record.clone())
        .collect()
}

/// Best record per `(num_type, mode)` group: maximum `mean_progress`,
/// earliest occurrence wins ties. Output sorted descending by score
/// (stable, so tied groups keep input order).
pub fn best_by_type_mode(scores: &[ScoreRecord]) -> Vec<ScoreRecord> {
    let scores = dedupe_last(scores);
    let mut order: Vec<GroupKey> = Vec::new();
    let mut best: HashMap<GroupKey, ScoreRecord> = HashMap::new();
    for record in scores {
        let key = GroupKey::of(&record);
        match best.get(&key) {
            // Strict greater-than keeps the earliest record on ties.
            Some(current) if record.mean_progress <= current.mean_progress => {}
            Some(_) => {
                best.insert(key, record);
            }
            None => {
                order.push(key.clone());
                best.insert(key, record);
            }
        }
    }
    let mut out: Vec<ScoreRecord> = order
        .into_iter()
        .filter_map(|key| best.remove(&key))
        .collect();
    out.sort_by(|a, b| {
        b.mean_progress
            .partial_cmp(&a.mean_progress)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    out
}

/// The single globally best record; `None` on empty input, earliest wins
/// ties.
pub fn overall_best(scores: &[ScoreRecord]) -> Option<ScoreRecord> {
    let mut best: Option<ScoreRecord> = None;
    for record in dedupe_last(scores) {
        match &best {
            Some(current) if record.mean_progress <= current.mean_progress => {}
            _ => best = Some(record),
        }
    }
    best
}

/// Distinct generation values across the whole input, ascending. This is
/// the shared x-axis for every overlay series.
pub fn generation_axis(scores: &[ScoreRecord]) -> Vec<u32> {
    let mut gens: Vec<u32> = scores.iter().map(|s| s.generation).collect();
    gens.sort_unstable();
    gens.dedup();
    gens
}

/// Generation-aligned overlay: one series per `(num_type, mode, variant)`,
/// one slot per axis generation. Series appear in first-occurrence order.
pub fn overlay_series(scores: &[ScoreRecord]) -> (Vec<u32>, Vec<OverlaySeries>) {
    let scores = dedupe_last(scores);
    let axis = generation_axis(&scores);

    let mut order: Vec<SeriesKey> = Vec::new();
    let mut by_series: HashMap<SeriesKey, HashMap<u32, f64>> = HashMap::new();
    for record in &scores {
        let key = SeriesKey::of(record);
        let entry = by_series.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            HashMap::new()
        });
        entry.insert(record.generation, record.mean_progress);
    }

    let series = order
        .into_iter()
        .map(|key| {
            let points = &by_series[&key];
            let values = axis.iter().map(|gen| points.get(gen).copied()).collect();
            OverlaySeries { key, values }
        })
        .collect();
    (axis, series)
}

/// Per-group mean trend: arithmetic mean of `mean_progress` across all
/// records sharing a generation within the group.
pub fn trend_by_group(scores: &[ScoreRecord]) -> Vec<TrendSeries> {
    let scores = dedupe_last(scores);

    let mut order: Vec<GroupKey> = Vec::new();
    let mut by_group: HashMap<GroupKey, HashMap<u32, (f64, u32)>> = HashMap::new();
    for record in &scores {
        let key = GroupKey::of(record);
        let entry = by_group.entry(key.clone()).or_insert_with(|| {
            order.push(key);
            HashMap::new()
        });
        let (sum, n) = entry.entry(record.generation).or_insert((0.0, 0));
        *sum += record.mean_progress;
        *n += 1;
    }

    order
        .into_iter()
        .map(|key| {
            let buckets = &by_group[&key];
            let mut points: Vec<(u32, f64)> = buckets
                .iter()
                .map(|(gen, (sum, n))| (*gen, sum / f64::from(*n)))
                .collect();
            points.sort_unstable_by_key(|(gen, _)| *gen);
            TrendSeries { key, points }
        })
        .collect()
}

/// Planets sorted by identity key; duplicate identities collapse to the
/// last occurrence in the snapshot's list.
pub fn sorted_planets(status: &StatusSnapshot) -> Vec<Planet> {
    let mut last: HashMap<String, &Planet> = HashMap::new();
    for planet in &status.planets {
        last.insert(planet.identity(), planet);
    }
    let mut planets: Vec<Planet> = last.into_values().cloned().collect();
    planets.sort_by_key(Planet::identity);
    planets
}

/// Case-insensitive substring filter on the planet identity key.
pub fn filter_planets(planets: &[Planet], term: &str) -> Vec<Planet> {
    let needle = term.to_lowercase();
    planets
        .iter()
        .filter(|p| p.identity().to_lowercase().contains(&needle))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(gen: u32, num_type: &str, mode: &str, var: u32, progress: f64) -> ScoreRecord {
        ScoreRecord {
            generation: gen,
            num_type: num_type.to_string(),
            mode: mode.to_string(),
            variant_index: var,
            mean_progress: progress,
        }
    }

    // The worked example from the dashboard's acceptance notes.
    fn example() -> Vec<ScoreRecord> {
        vec![
            score(1, "f32", "A", 0, 0.4),
            score(1, "f32", "A", 1, 0.9),
            score(2, "f64", "B", 0, 0.95),
        ]
    }

    #[test]
    fn best_by_type_mode_example() {
        let best = best_by_type_mode(&example());
        assert_eq!(best.len(), 2);
        assert_eq!(best[0].num_type, "f64");
        assert_eq!(best[0].mean_progress, 0.95);
        assert_eq!(best[1].num_type, "f32");
        assert_eq!(best[1].variant_index, 1);
        assert_eq!(best[1].mean_progress, 0.9);
    }

    #[test]
    fn best_is_one_per_group_and_group_max() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.1),
            score(2, "f32", "A", 0, 0.8),
            score(3, "f32", "B", 0, 0.3),
            score(1, "f64", "A", 1, 0.5),
        ];
        let best = best_by_type_mode(&scores);
        assert_eq!(best.len(), 3);
        for record in &best {
            let group_max = scores
                .iter()
                .filter(|s| s.num_type == record.num_type && s.mode == record.mode)
                .map(|s| s.mean_progress)
                .fold(f64::NEG_INFINITY, f64::max);
            assert_eq!(record.mean_progress, group_max);
        }
    }

    #[test]
    fn best_tie_keeps_earliest() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.7),
            score(2, "f32", "A", 1, 0.7),
        ];
        let best = best_by_type_mode(&scores);
        assert_eq!(best.len(), 1);
        assert_eq!(best[0].variant_index, 0);
        assert_eq!(best[0].generation, 1);
    }

    #[test]
    fn best_is_idempotent() {
        let once = best_by_type_mode(&example());
        let twice = best_by_type_mode(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn ranking_uses_full_precision_not_display_rounding() {
        // Both display as "0.500" at three decimals; ranking must still
        // pick the larger raw value.
        let scores = vec![
            score(1, "f32", "A", 0, 0.5001),
            score(2, "f32", "A", 1, 0.5004),
        ];
        let best = best_by_type_mode(&scores);
        assert_eq!(best[0].variant_index, 1);
    }

    #[test]
    fn overall_best_example_and_empty() {
        let best = overall_best(&example()).unwrap();
        assert_eq!(best.num_type, "f64");
        assert_eq!(best.mode, "B");
        assert_eq!(best.mean_progress, 0.95);
        assert_eq!(overall_best(&[]), None);
    }

    #[test]
    fn overall_best_tie_keeps_first() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.9),
            score(1, "f64", "B", 0, 0.9),
        ];
        assert_eq!(overall_best(&scores).unwrap().num_type, "f32");
    }

    #[test]
    fn overlay_aligns_every_series_to_shared_axis() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.1),
            score(3, "f32", "A", 0, 0.3),
            score(2, "f64", "B", 0, 0.2),
        ];
        let (axis, series) = overlay_series(&scores);
        assert_eq!(axis, vec![1, 2, 3]);
        assert_eq!(series.len(), 2);
        for s in &series {
            assert_eq!(s.values.len(), axis.len());
        }
        // Gap marker where a series has no record, never zero.
        assert_eq!(series[0].values, vec![Some(0.1), None, Some(0.3)]);
        assert_eq!(series[1].values, vec![None, Some(0.2), None]);
    }

    #[test]
    fn overlay_empty_input() {
        let (axis, series) = overlay_series(&[]);
        assert!(axis.is_empty());
        assert!(series.is_empty());
    }

    #[test]
    fn duplicate_identity_last_occurrence_wins() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.2),
            score(1, "f32", "A", 0, 0.6),
        ];
        let deduped = dedupe_last(&scores);
        assert_eq!(deduped.len(), 1);
        assert_eq!(deduped[0].mean_progress, 0.6);

        let (_, series) = overlay_series(&scores);
        assert_eq!(series[0].values, vec![Some(0.6)]);
    }

    #[test]
    fn trend_averages_within_group_per_generation() {
        let scores = vec![
            score(1, "f32", "A", 0, 0.2),
            score(1, "f32", "A", 1, 0.4),
            score(2, "f32", "A", 0, 0.9),
            score(1, "f64", "B", 0, 0.5),
        ];
        let trends = trend_by_group(&scores);
        assert_eq!(trends.len(), 2);
        let f32_trend = &trends[0];
        assert_eq!(f32_trend.key.label(), "f32/A");
        assert_eq!(f32_trend.points.len(), 2);
        assert_eq!(f32_trend.points[0].0, 1);
        assert!((f32_trend.points[0].1 - 0.3).abs() < 1e-12);
        assert_eq!(f32_trend.points[1], (2, 0.9));
        // Generation 2 has no f64/B records: omitted, not zeroed.
        assert_eq!(trends[1].points, vec![(1, 0.5)]);
    }

    #[test]
    fn planets_sort_by_identity_with_last_wins_duplicates() {
        let planet = |name: Option<&str>, host: &str, port: u16, x: f64| Planet {
            name: name.map(str::to_string),
            host: host.to_string(),
            port,
            pos: [x, 0.0, 0.0],
        };
        let status = StatusSnapshot {
            planets: vec![
                planet(Some("zeta"), "10.0.0.1", 7000, 1.0),
                planet(None, "10.0.0.2", 7001, 2.0),
                planet(Some("zeta"), "10.0.0.3", 7002, 3.0),
            ],
            ..Default::default()
        };
        let sorted = sorted_planets(&status);
        assert_eq!(sorted.len(), 2);
        assert_eq!(sorted[0].identity(), "10.0.0.2:7001");
        assert_eq!(sorted[1].identity(), "zeta");
        // Duplicate "zeta" resolved to the later entry.
        assert_eq!(sorted[1].pos[0], 3.0);

        let hits = filter_planets(&sorted, "ZE");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].identity(), "zeta");
    }
}
