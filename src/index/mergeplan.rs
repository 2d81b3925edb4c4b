//! Cost-based tiered merge planner
//!
//! Segments are grouped into size tiers; a tier holding more than
//! `segments_per_tier` members yields a candidate merge of its smallest
//! segments. Candidates are scored by a cost function balancing write
//! amplification against the benefit of reducing segment count, and the
//! winners are emitted as disjoint tasks.

use serde::{Deserialize, Serialize};

/// Tunable parameters for the merge planner
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MergePlanOptions {
    /// Minimum number of segments combined by one task
    pub min_segments_per_merge: usize,
    /// Maximum number of segments combined by one task
    pub max_segments_per_merge: usize,
    /// Segments below this size are always eligible for merging
    pub floor_segment_size: u64,
    /// Never produce a merged segment larger than this
    pub max_segment_size: u64,
    /// Target members per size tier before a merge is planned
    pub segments_per_tier: usize,
}

impl Default for MergePlanOptions {
    fn default() -> Self {
        Self {
            min_segments_per_merge: 2,
            max_segments_per_merge: 10,
            floor_segment_size: 2 * 1024 * 1024,
            max_segment_size: 5 * 1024 * 1024 * 1024,
            segments_per_tier: 10,
        }
    }
}

/// Planner's view of one segment
#[derive(Clone, Debug)]
pub struct SegmentDescription {
    pub id: u64,
    pub size_bytes: u64,
    pub delete_ratio: f64,
}

/// One planned merge over disjoint source segments
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeTask {
    pub segment_ids: Vec<u64>,
}

#[derive(Clone, Debug)]
struct Candidate {
    segments: Vec<SegmentDescription>,
    score: f64,
}

impl Candidate {
    fn total_size(&self) -> u64 {
        self.segments.iter().map(|s| s.size_bytes).sum()
    }
}

/// Compute zero or more disjoint merge tasks for the given segments
pub fn plan(segments: &[SegmentDescription], options: &MergePlanOptions) -> Vec<MergeTask> {
    if segments.len() < options.min_segments_per_merge {
        return Vec::new();
    }

    // segments at or past the cap are done growing
    let eligible: Vec<SegmentDescription> = segments
        .iter()
        .filter(|s| s.size_bytes < options.max_segment_size)
        .cloned()
        .collect();

    let mut candidates = Vec::new();

    // undersized segments are always worth combining
    let small: Vec<SegmentDescription> = eligible
        .iter()
        .filter(|s| s.size_bytes < options.floor_segment_size)
        .cloned()
        .collect();
    if small.len() >= options.min_segments_per_merge {
        if let Some(candidate) = make_candidate(small, options) {
            candidates.push(candidate);
        }
    }

    // tier overflow
    for tier in group_by_tier(&eligible, options) {
        if tier.len() <= options.segments_per_tier {
            continue;
        }
        let mut sorted = tier;
        sorted.sort_by_key(|s| s.size_bytes);
        let take = sorted
            .len()
            .saturating_sub(options.segments_per_tier)
            .saturating_add(1)
            .clamp(options.min_segments_per_merge, options.max_segments_per_merge);
        let selected: Vec<SegmentDescription> = sorted.into_iter().take(take).collect();
        if selected.len() >= options.min_segments_per_merge {
            if let Some(candidate) = make_candidate(selected, options) {
                candidates.push(candidate);
            }
        }
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    // emit best-first, dropping overlaps so tasks stay disjoint
    let mut used: Vec<u64> = Vec::new();
    let mut tasks = Vec::new();
    for candidate in candidates {
        if candidate
            .segments
            .iter()
            .any(|s| used.contains(&s.id))
        {
            continue;
        }
        used.extend(candidate.segments.iter().map(|s| s.id));
        tasks.push(MergeTask {
            segment_ids: candidate.segments.iter().map(|s| s.id).collect(),
        });
    }
    tasks
}

/// Trim a selection to the size cap and count limits, then score it.
///
/// Score rewards segment-count reduction and reclaimable deletions, and
/// charges the rewrite cost (write amplification scales with merged size).
fn make_candidate(
    mut segments: Vec<SegmentDescription>,
    options: &MergePlanOptions,
) -> Option<Candidate> {
    segments.sort_by_key(|s| s.size_bytes);
    segments.truncate(options.max_segments_per_merge);
    while segments.len() >= options.min_segments_per_merge {
        let total: u64 = segments.iter().map(|s| s.size_bytes).sum();
        if total <= options.max_segment_size {
            break;
        }
        segments.pop();
    }
    if segments.len() < options.min_segments_per_merge {
        return None;
    }

    let total: u64 = segments.iter().map(|s| s.size_bytes).sum();
    let count_benefit = (segments.len() as f64 - 1.0) * 10.0;
    let delete_benefit: f64 = segments.iter().map(|s| s.delete_ratio).sum::<f64>() * 100.0;
    let write_cost = total as f64 / options.max_segment_size as f64 * 50.0;

    Some(Candidate {
        score: count_benefit + delete_benefit - write_cost,
        segments,
    })
}

fn group_by_tier(
    segments: &[SegmentDescription],
    options: &MergePlanOptions,
) -> Vec<Vec<SegmentDescription>> {
    const MAX_TIER: usize = 10;
    let floor = options.floor_segment_size.max(1);
    let ratio = options.segments_per_tier.max(2) as u64;

    let mut tiers: Vec<Vec<SegmentDescription>> = vec![Vec::new(); MAX_TIER];
    for segment in segments {
        let mut tier = 0;
        let mut tier_max = floor.saturating_mul(ratio);
        while segment.size_bytes.max(floor) > tier_max && tier < MAX_TIER - 1 {
            tier += 1;
            tier_max = tier_max.saturating_mul(ratio);
        }
        tiers[tier].push(segment.clone());
    }
    while tiers.last().map(|t| t.is_empty()).unwrap_or(false) {
        tiers.pop();
    }
    tiers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(id: u64, size_bytes: u64) -> SegmentDescription {
        SegmentDescription {
            id,
            size_bytes,
            delete_ratio: 0.0,
        }
    }

    #[test]
    fn test_no_plan_for_single_segment() {
        let options = MergePlanOptions::default();
        assert!(plan(&[desc(1, 1024)], &options).is_empty());
    }

    #[test]
    fn test_small_segments_always_eligible() {
        let options = MergePlanOptions::default();
        let segments: Vec<_> = (0..4).map(|i| desc(i, 16 * 1024)).collect();
        let tasks = plan(&segments, &options);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].segment_ids.len(), 4);
    }

    #[test]
    fn test_tier_overflow_triggers_merge() {
        let options = MergePlanOptions {
            floor_segment_size: 1024,
            segments_per_tier: 3,
            ..Default::default()
        };
        // five segments in the same tier, above floor size
        let segments: Vec<_> = (0..5).map(|i| desc(i, 2048 + i)).collect();
        let tasks = plan(&segments, &options);
        assert_eq!(tasks.len(), 1);
        assert!(tasks[0].segment_ids.len() >= options.min_segments_per_merge);
    }

    #[test]
    fn test_tasks_are_disjoint() {
        let options = MergePlanOptions {
            floor_segment_size: 1024 * 1024,
            segments_per_tier: 2,
            ..Default::default()
        };
        let mut segments: Vec<_> = (0..4).map(|i| desc(i, 16 * 1024)).collect();
        segments.extend((4..8).map(|i| desc(i, 8 * 1024 * 1024)));
        let tasks = plan(&segments, &options);

        let mut seen = Vec::new();
        for task in &tasks {
            for id in &task.segment_ids {
                assert!(!seen.contains(id), "segment {} in two tasks", id);
                seen.push(*id);
            }
        }
    }

    #[test]
    fn test_max_segment_size_respected() {
        let options = MergePlanOptions {
            floor_segment_size: 10 * 1024 * 1024,
            max_segment_size: 16 * 1024 * 1024,
            ..Default::default()
        };
        let segments: Vec<_> = (0..4).map(|i| desc(i, 6 * 1024 * 1024)).collect();
        let tasks = plan(&segments, &options);
        for task in &tasks {
            let total: u64 = task
                .segment_ids
                .iter()
                .map(|id| segments[*id as usize].size_bytes)
                .sum();
            assert!(total <= options.max_segment_size);
        }
    }

    #[test]
    fn test_oversized_segments_left_alone() {
        let options = MergePlanOptions {
            floor_segment_size: 1024,
            max_segment_size: 1024 * 1024,
            segments_per_tier: 2,
            ..Default::default()
        };
        let segments = vec![
            desc(1, 2 * 1024 * 1024),
            desc(2, 2 * 1024 * 1024),
            desc(3, 2 * 1024 * 1024),
        ];
        assert!(plan(&segments, &options).is_empty());
    }
}
