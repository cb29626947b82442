//! Fusion Engine: validates, deduplicates and scores citation candidates.

use std::ops::AddAssign;

use citemark_core::{BBox, Bibliography, CitationCandidate, FusionConfig, Occurrence};
use serde::{Deserialize, Serialize};

/// Counters describing what fusion did to a page's candidates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FusionStats {
    /// Candidates received from all channels.
    pub candidates: usize,
    /// Candidates whose every ID exceeded the bound.
    pub out_of_bound: usize,
    /// IDs removed from otherwise valid candidates.
    pub stripped_ids: usize,
    /// Per-ID occurrences collapsed into an existing one.
    pub merged: usize,
    /// Merges that joined two different channels.
    pub corroborated: usize,
    /// Unlinked occurrences penalized against a reliable bibliography.
    pub penalized: usize,
    /// Occurrences dropped under `min_confidence`.
    pub below_floor: usize,
}

impl AddAssign for FusionStats {
    fn add_assign(&mut self, other: Self) {
        self.candidates += other.candidates;
        self.out_of_bound += other.out_of_bound;
        self.stripped_ids += other.stripped_ids;
        self.merged += other.merged;
        self.corroborated += other.corroborated;
        self.penalized += other.penalized;
        self.below_floor += other.below_floor;
    }
}

/// Largest plausible ID, or `None` when the bibliography is too weak to
/// bound anything.
pub fn id_bound(bibliography: &Bibliography, config: &FusionConfig) -> Option<f64> {
    bibliography
        .is_reliable(config.min_bib_entries)
        .then(|| f64::from(bibliography.max_id()) * config.max_id_multiplier)
}

fn same_location(a: &BBox, b: &BBox, distance: f64) -> bool {
    a.overlaps_x(b) || (a.mid_x() - b.mid_x()).abs() <= distance
}

/// Drop occurrences under `floor`, returning how many went.
fn apply_floor(occurrences: &mut Vec<Occurrence>, floor: f64) -> usize {
    let before = occurrences.len();
    occurrences.retain(|o| o.confidence >= floor);
    before - occurrences.len()
}

/// Fuse one page's candidates into occurrences.
///
/// 1. IDs above `max_id * max_id_multiplier` are stripped; a candidate left
///    with no IDs is discarded.
/// 2. Each remaining ID becomes one provisional occurrence.
/// 3. Occurrences with the same line, ID and location collapse; the
///    higher-confidence source wins and a second channel adds
///    `corroboration_boost`.
/// 4. Anything whose detection confidence is under `min_confidence` is
///    dropped.
/// 5. Against a reliable bibliography, unlinked occurrences lose
///    `unlinked_penalty` but are kept. With `floor_after_penalty` the floor
///    is applied after this step instead, so the penalty can drop them.
///
/// The output is in reading order.
pub fn fuse_page(
    candidates: Vec<CitationCandidate>,
    bibliography: &Bibliography,
    config: &FusionConfig,
) -> (Vec<Occurrence>, FusionStats) {
    let mut stats = FusionStats {
        candidates: candidates.len(),
        ..FusionStats::default()
    };
    let bound = id_bound(bibliography, config);
    let reliable = bibliography.is_reliable(config.min_bib_entries);

    let mut occurrences: Vec<Occurrence> = Vec::new();
    for candidate in candidates {
        let ids: Vec<u32> = match bound {
            Some(limit) => candidate.ids.iter().copied().filter(|id| f64::from(*id) <= limit).collect(),
            None => candidate.ids.clone(),
        };
        if ids.is_empty() {
            stats.out_of_bound += 1;
            tracing::trace!(page = candidate.page, raw = %candidate.raw, "candidate out of bound");
            continue;
        }
        stats.stripped_ids += candidate.ids.len() - ids.len();

        for id in ids {
            let existing = occurrences.iter_mut().find(|o| {
                o.line == candidate.line
                    && o.cited_id == id
                    && same_location(&o.bbox, &candidate.bbox, config.dedup_distance)
            });
            match existing {
                Some(o) => {
                    stats.merged += 1;
                    let new_channel = !o.channels.contains(&candidate.channel);
                    if candidate.confidence > o.confidence {
                        o.confidence = candidate.confidence;
                        o.bbox = candidate.bbox;
                        o.raw = candidate.raw.clone();
                        o.anchor_left = candidate.anchor_left.clone();
                    }
                    if new_channel {
                        stats.corroborated += 1;
                        o.channels.push(candidate.channel);
                        o.channels.sort_unstable();
                        o.confidence = (o.confidence + config.corroboration_boost).min(1.0);
                    }
                }
                None => occurrences.push(Occurrence {
                    cited_id: id,
                    entry_id: bibliography.contains(id).then_some(id),
                    page: candidate.page,
                    line: candidate.line,
                    bbox: candidate.bbox,
                    confidence: candidate.confidence,
                    channels: vec![candidate.channel],
                    raw: candidate.raw.clone(),
                    anchor_left: candidate.anchor_left.clone(),
                }),
            }
        }
    }

    if !config.floor_after_penalty {
        stats.below_floor = apply_floor(&mut occurrences, config.min_confidence);
    }
    if reliable {
        for o in occurrences.iter_mut().filter(|o| !o.is_linked()) {
            o.confidence = (o.confidence - config.unlinked_penalty).max(0.0);
            stats.penalized += 1;
        }
    }
    if config.floor_after_penalty {
        stats.below_floor = apply_floor(&mut occurrences, config.min_confidence);
    }

    occurrences.sort_by(|a, b| {
        a.line
            .cmp(&b.line)
            .then(a.bbox.x0.total_cmp(&b.bbox.x0))
            .then(a.cited_id.cmp(&b.cited_id))
    });
    (occurrences, stats)
}
