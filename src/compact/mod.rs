//! # Compaction
//!
//! Keeps a node's bucket set bounded. When a node holds more buckets than
//! the threshold, a generalization of at least two buckets of one type and
//! direction replaces every bucket it covers, carrying their summed count,
//! until the set fits or nothing more can be merged.
//!
//! A merge target is widened until no bucket of its group partially
//! overlaps it, so the buckets of a group always stay mutually exclusive
//! and every literal shape has at most one covering bucket. Merging loses
//! the split between buckets but never the total.
//!
//! Which generalization is merged next is a [`GeneralizationStrategy`]:
//! [`MostSpecificGeneralization`] by default, [`AverageCardinality`] to
//! wildcard high-cardinality keys first.

mod strategy;

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::cache::BucketSet;
use crate::description::RelationshipDescription;

pub use strategy::{AverageCardinality, GeneralizationStrategy, MostSpecificGeneralization};

/// Bucket count above which a node is compacted.
pub const DEFAULT_THRESHOLD: usize = 20;

/// Strategy reducing a bucket set in place.
pub trait CompactionStrategy: Send + Sync {
    /// Compact `buckets`. Returns `false` if the set is still above the
    /// target size because nothing more could be merged.
    fn compact(&self, buckets: &mut BucketSet) -> bool;
}

/// Merges buckets while the node holds more than `threshold` of them.
#[derive(Clone)]
pub struct ThresholdCompactor {
    threshold: usize,
    generalization: Arc<dyn GeneralizationStrategy>,
}

impl ThresholdCompactor {
    /// `threshold` must be positive; configuration validates it.
    pub fn new(threshold: usize) -> Self {
        Self::with_generalization(threshold, Arc::new(MostSpecificGeneralization))
    }

    pub fn with_generalization(threshold: usize, generalization: Arc<dyn GeneralizationStrategy>) -> Self {
        Self { threshold, generalization }
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }
}

impl Default for ThresholdCompactor {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

impl fmt::Debug for ThresholdCompactor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ThresholdCompactor")
            .field("threshold", &self.threshold)
            .finish_non_exhaustive()
    }
}

impl CompactionStrategy for ThresholdCompactor {
    fn compact(&self, buckets: &mut BucketSet) -> bool {
        let before = buckets.total();

        while buckets.len() > self.threshold {
            let candidates = generalizations(buckets);
            let Some(target) = self.generalization.choose(buckets, &candidates) else {
                break;
            };
            merge_into(buckets, target);
        }

        debug_assert_eq!(before, buckets.total(), "compaction must conserve counts");
        buckets.len() <= self.threshold
    }
}

/// Descriptions a merge could target.
///
/// For every pair of same-shape buckets, the least (most specific)
/// description generalizing both. Each candidate therefore covers at least
/// two buckets. Buckets of different type or direction never merge, so a
/// node left with one bucket per `(type, direction)` has no candidates.
pub fn generalizations(buckets: &BucketSet) -> BTreeSet<RelationshipDescription> {
    let mut out = BTreeSet::new();

    for (rel_type, direction) in buckets.shapes() {
        let closures: Vec<BTreeSet<RelationshipDescription>> = buckets
            .shape(&rel_type, direction)
            .map(|(d, _)| d.generate_all_more_general())
            .collect();

        for i in 0..closures.len() {
            for j in (i + 1)..closures.len() {
                if let Some(target) = closures[i].intersection(&closures[j]).next() {
                    out.insert(target.clone());
                }
            }
        }
    }

    out
}

/// Most specific description generalizing both `a` and `b`, if they share
/// a type and direction.
pub fn common_generalization(
    a: &RelationshipDescription,
    b: &RelationshipDescription,
) -> Option<RelationshipDescription> {
    if !a.same_shape(b) {
        return None;
    }
    a.generate_all_more_general()
        .intersection(&b.generate_all_more_general())
        .next()
        .cloned()
}

/// Replace every bucket `target` covers with a single bucket for it.
///
/// `target` is first widened until each bucket of its group is either
/// covered by it or mutually exclusive with it. Returns the description the
/// merged bucket ended up with.
pub fn merge_into(buckets: &mut BucketSet, mut target: RelationshipDescription) -> RelationshipDescription {
    loop {
        let overlapping = buckets
            .shape(target.rel_type(), target.direction())
            .map(|(d, _)| d)
            .find(|d| !target.is_more_general_than(d) && !target.is_mutually_exclusive(d))
            .cloned();
        let Some(other) = overlapping else {
            break;
        };
        target = common_generalization(&target, &other)
            .unwrap_or_else(|| RelationshipDescription::wildcard(target.rel_type(), target.direction()));
    }

    let covered: Vec<RelationshipDescription> = buckets
        .shape(target.rel_type(), target.direction())
        .filter(|(d, _)| target.is_more_general_than(d))
        .map(|(d, _)| d.clone())
        .collect();

    let mut count = 0;
    for bucket in &covered {
        count += buckets.remove(bucket).unwrap_or(0);
    }
    tracing::trace!(bucket = %target, merged = covered.len(), count, "merging buckets");
    buckets.insert(target.clone(), count);
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{resolve, Resolution};
    use crate::model::Direction;
    use pretty_assertions::assert_eq;

    fn test_out() -> RelationshipDescription {
        RelationshipDescription::wildcard("test", Direction::Outgoing)
    }

    fn buckets(entries: Vec<(RelationshipDescription, u64)>) -> BucketSet {
        entries.into_iter().collect()
    }

    fn assert_disjoint_groups(set: &BucketSet) {
        let all: Vec<_> = set.iter().map(|(d, _)| d).collect();
        for (i, a) in all.iter().enumerate() {
            for b in &all[i + 1..] {
                assert!(a.is_mutually_exclusive(b), "{a} overlaps {b}");
            }
        }
    }

    #[test]
    fn test_nothing_compacted_at_threshold() {
        let mut set = buckets(vec![
            (test_out().with("k1", "v1"), 14),
            (test_out().with("k1", "v2"), 1),
            (test_out().with("k1", "v3"), 2),
            (test_out().with("k1", "v4"), 3),
        ]);
        let untouched = set.clone();
        assert!(ThresholdCompactor::new(4).compact(&mut set));
        assert_eq!(set, untouched);
    }

    #[test]
    fn test_compacted_above_threshold() {
        let mut set = buckets(vec![
            (test_out().with("k1", "v1"), 14),
            (test_out().with("k1", "v2"), 1),
            (test_out().with("k1", "v3"), 2),
            (test_out().with("k1", "v4"), 3),
            (test_out().with("k1", "v5"), 4),
        ]);
        assert!(ThresholdCompactor::new(4).compact(&mut set));

        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(&test_out(), 24)]);
        assert_eq!(resolve(&set, &test_out()), Resolution::Exact(24));
        assert_eq!(resolve(&set, &test_out().with("k1", "v1")), Resolution::Ambiguous);
    }

    #[test]
    fn test_two_levels_merge_into_wildcard() {
        let friend = RelationshipDescription::literal("FRIEND", Direction::Outgoing);
        let mut set = buckets(vec![(friend.clone().with("level", 1), 1), (friend.with("level", 2), 1)]);

        assert!(ThresholdCompactor::new(1).compact(&mut set));

        let any_level = RelationshipDescription::wildcard("FRIEND", Direction::Outgoing);
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(&any_level, 2)]);
    }

    #[test]
    fn test_shared_key_is_kept_when_merging() {
        let mut set = buckets(vec![
            (test_out().with("k1", "v1").with("k2", "v1"), 1),
            (test_out().with("k1", "v1").with("k2", "v2"), 1),
            (test_out().with("k1", "v2").with("k2", "v1"), 1),
        ]);
        assert!(ThresholdCompactor::new(2).compact(&mut set));

        assert_eq!(set.get(&test_out().with("k1", "v1")), Some(2));
        assert_eq!(resolve(&set, &test_out().with("k1", "v1")), Resolution::Exact(2));
        assert_eq!(resolve(&set, &test_out().with("k1", "v2")), Resolution::Exact(1));
    }

    #[test]
    fn test_multiple_compactions() {
        let mut entries = Vec::new();
        for k1 in ["v1", "v2"] {
            for k2 in ["v1", "v2", "v3", "v4"] {
                entries.push((test_out().with("k1", k1).with("k2", k2), 1));
            }
        }
        let mut set = buckets(entries);
        assert!(ThresholdCompactor::new(4).compact(&mut set));

        assert_eq!(set.len(), 2);
        assert_eq!(resolve(&set, &test_out().with("k1", "v1")), Resolution::Exact(4));
        assert_eq!(resolve(&set, &test_out().with("k1", "v2")), Resolution::Exact(4));
        assert_eq!(resolve(&set, &test_out()), Resolution::Exact(8));
        assert_eq!(resolve(&set, &test_out().with("k2", "v1")), Resolution::Ambiguous);
    }

    #[test]
    fn test_multi_level_compaction() {
        let mut set = buckets(
            (1..=5)
                .map(|i| {
                    let v = format!("v{i}");
                    (test_out().with("z1", "v1").with("k2", v.as_str()).with("k3", v.as_str()), 1)
                })
                .collect(),
        );
        assert!(ThresholdCompactor::new(4).compact(&mut set));

        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&test_out().with("z1", "v1")), Some(5));
        assert_eq!(resolve(&set, &test_out().with("z1", "v1")), Resolution::Exact(5));
        assert_eq!(resolve(&set, &test_out()), Resolution::Exact(5));
        assert_eq!(
            resolve(&set, &RelationshipDescription::literal("test", Direction::Outgoing)),
            Resolution::Exact(0)
        );
        assert_eq!(resolve(&set, &test_out().with("k3", "v4")), Resolution::Ambiguous);
    }

    #[test]
    fn test_impossible_compaction_stops_at_floor() {
        let mut entries: Vec<(RelationshipDescription, u64)> = (1..=5)
            .map(|i| {
                let v = format!("v{i}");
                (test_out().with("k1", "v1").with("k2", v.as_str()).with("k3", v.as_str()), 1)
            })
            .collect();
        entries.push((test_out().with("k2", "v2"), 1));
        for t in ["test2", "test3", "test4", "test5"] {
            entries.push((RelationshipDescription::wildcard(t, Direction::Outgoing).with("k2", "v2"), 1));
        }
        let mut set = buckets(entries);

        assert!(!ThresholdCompactor::new(4).compact(&mut set));

        assert_eq!(set.len(), 5);
        assert_eq!(set.total(), 10);
        assert_eq!(resolve(&set, &test_out()), Resolution::Exact(6));
        for t in ["test2", "test3", "test4", "test5"] {
            let q = RelationshipDescription::wildcard(t, Direction::Outgoing);
            assert_eq!(resolve(&set, &q), Resolution::Exact(1));
        }
        assert_eq!(resolve(&set, &test_out().with("k1", "v1")), Resolution::Ambiguous);
    }

    #[test]
    fn test_compaction_including_wildcards() {
        let one = RelationshipDescription::wildcard("ONE", Direction::Incoming);
        let mut set = buckets(vec![
            (one.clone().with("k1", "v1").with("k2", "v2"), 1),
            (one.clone().with_any("k1").with_any("w"), 2),
        ]);
        assert!(ThresholdCompactor::new(1).compact(&mut set));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(&one, 3)]);

        let mut set = buckets(vec![
            (RelationshipDescription::literal("ONE", Direction::Incoming).with_any("k1"), 1),
            (RelationshipDescription::literal("ONE", Direction::Incoming).with_any("k2"), 2),
        ]);
        assert!(ThresholdCompactor::new(1).compact(&mut set));
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(&one, 3)]);
    }

    #[test]
    fn test_generalizations_are_pairwise_common_targets() {
        let set = buckets(vec![
            (test_out().with("a", 1).with("b", 1), 1),
            (test_out().with("a", 2).with("b", 2), 1),
            (test_out().with("a", 3).with("b", 1), 1),
        ]);
        let candidates: Vec<_> = generalizations(&set).into_iter().collect();
        assert_eq!(candidates, vec![test_out().with("b", 1), test_out()]);
    }

    #[test]
    fn test_different_shapes_never_merge() {
        let set = buckets(vec![
            (test_out(), 1),
            (test_out().with_direction(Direction::Incoming), 1),
        ]);
        assert!(generalizations(&set).is_empty());
        assert_eq!(common_generalization(&test_out(), &test_out().with_direction(Direction::Incoming)), None);
    }

    #[test]
    fn test_merge_absorbs_every_covered_bucket() {
        let literal = RelationshipDescription::literal("test", Direction::Outgoing);
        let mut set = buckets(vec![
            (literal.clone().with("a", 1).with("b", 1), 1),
            (literal.clone().with("a", 1).with("b", 2), 1),
            (literal.clone().with("a", 1).with("b", 3), 1),
            (literal.clone().with("a", 2).with("b", 1), 1),
        ]);

        let merged = merge_into(&mut set, test_out().with("a", 1));

        assert_eq!(merged, test_out().with("a", 1));
        assert_eq!(set.get(&merged), Some(3));
        assert_eq!(set.len(), 2);
        assert_disjoint_groups(&set);
    }

    #[test]
    fn test_merge_widens_past_partial_overlap() {
        let literal = RelationshipDescription::literal("test", Direction::Outgoing);
        let mut set = buckets(vec![
            (test_out().with("b", 1), 2),
            (literal.clone().with("a", 1).with("b", 2), 1),
            (literal.clone().with("a", 1).with("b", 3), 1),
            (literal.clone().with("a", 1).with("b", 4), 1),
        ]);

        assert!(ThresholdCompactor::new(3).compact(&mut set));

        // {a: 1} alone would share the shape {a: 1, b: 1} with {b: 1}.
        assert_eq!(set.iter().collect::<Vec<_>>(), vec![(&test_out(), 5)]);
        assert_eq!(resolve(&set, &test_out().with("b", 1)), Resolution::Ambiguous);
    }

    #[test]
    fn test_compacted_groups_stay_disjoint() {
        let literal = RelationshipDescription::literal("test", Direction::Outgoing);
        let mut set = BucketSet::new();
        let compactor = ThresholdCompactor::new(3);
        for (a, b) in [(1, 1), (2, 1), (7, 7), (8, 8), (1, 2), (1, 3), (3, 5), (4, 1), (9, 9)] {
            set.increment(&literal.clone().with("a", a).with("b", b), 1);
            compactor.compact(&mut set);
            assert_disjoint_groups(&set);
        }
        assert_eq!(set.total(), 9);
        assert!(set.len() <= 3);
    }

    #[test]
    fn test_strategy_picks_the_merge() {
        let mut entries = Vec::new();
        for (k1, k2) in [("1", "x"), ("2", "x"), ("3", "y"), ("4", "y"), ("1", "z")] {
            entries.push((test_out().with("k1", k1).with("k2", k2), 1));
        }

        let mut default = buckets(entries.clone());
        assert!(ThresholdCompactor::new(4).compact(&mut default));
        assert_eq!(default.get(&test_out().with("k1", "1")), Some(2));

        let mut scored = buckets(entries);
        let compactor = ThresholdCompactor::with_generalization(4, Arc::new(AverageCardinality));
        assert!(compactor.compact(&mut scored));
        assert_eq!(scored.get(&test_out().with("k2", "x")), Some(2));
        assert_eq!(scored.len(), 4);
        assert_disjoint_groups(&scored);
    }
}
