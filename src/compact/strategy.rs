//! Choosing which generalization a compaction step merges into.

use std::collections::{BTreeMap, BTreeSet};

use crate::cache::BucketSet;
use crate::description::{Predicate, RelationshipDescription};
use crate::model::Direction;

/// Picks the next merge target among candidate generalizations.
///
/// Every candidate generalizes at least two buckets of `buckets`. Returning
/// `None` stops compaction.
pub trait GeneralizationStrategy: Send + Sync {
    fn choose(
        &self,
        buckets: &BucketSet,
        candidates: &BTreeSet<RelationshipDescription>,
    ) -> Option<RelationshipDescription>;
}

impl<F> GeneralizationStrategy for F
where
    F: Fn(&BucketSet, &BTreeSet<RelationshipDescription>) -> Option<RelationshipDescription> + Send + Sync,
{
    fn choose(
        &self,
        buckets: &BucketSet,
        candidates: &BTreeSet<RelationshipDescription>,
    ) -> Option<RelationshipDescription> {
        self(buckets, candidates)
    }
}

/// The least candidate in the description total order: the most specific
/// generalization, first type and direction first.
#[derive(Debug, Clone, Copy, Default)]
pub struct MostSpecificGeneralization;

impl GeneralizationStrategy for MostSpecificGeneralization {
    fn choose(
        &self,
        _buckets: &BucketSet,
        candidates: &BTreeSet<RelationshipDescription>,
    ) -> Option<RelationshipDescription> {
        candidates.first().cloned()
    }
}

/// Scores candidates by how much distinction they keep.
///
/// A key a candidate still pins scores 1. A key it wildcards scores the
/// number of values that key takes across the type's buckets (wildcarded
/// counts included) over the type's total count plus one. The average over
/// the type's keys is the score, highest first, ties in total order. Keys
/// that take many values and types spread over many buckets are therefore
/// wildcarded first.
#[derive(Debug, Clone, Copy, Default)]
pub struct AverageCardinality;

/// What one relationship type's buckets say about its keys.
#[derive(Debug, Default)]
struct TypeStats {
    degree: u64,
    keys: BTreeSet<String>,
    /// `None` stands for a key a literal bucket requires to be absent.
    values: BTreeMap<String, BTreeSet<Option<String>>>,
    wildcards: BTreeMap<String, u64>,
}

impl AverageCardinality {
    fn stats(buckets: &BucketSet) -> (BTreeMap<String, TypeStats>, BTreeMap<(String, Direction), BTreeSet<String>>) {
        let mut types: BTreeMap<String, TypeStats> = BTreeMap::new();
        let mut shape_keys: BTreeMap<(String, Direction), BTreeSet<String>> = BTreeMap::new();

        for (bucket, count) in buckets.iter() {
            let stats = types.entry(bucket.rel_type().to_string()).or_default();
            stats.degree += count;
            let keys = shape_keys
                .entry((bucket.rel_type().to_string(), bucket.direction()))
                .or_default();
            for (key, _) in bucket.properties().entries() {
                stats.keys.insert(key.clone());
                keys.insert(key.clone());
            }
        }

        for (bucket, count) in buckets.iter() {
            let Some(stats) = types.get_mut(bucket.rel_type()) else {
                continue;
            };
            let keys: Vec<String> = stats.keys.iter().cloned().collect();
            for key in keys {
                match bucket.properties().get(&key) {
                    Predicate::Concrete(v) => {
                        stats.values.entry(key).or_default().insert(Some(v));
                    }
                    Predicate::Absent => {
                        stats.values.entry(key).or_default().insert(None);
                    }
                    Predicate::Wildcard => {
                        *stats.wildcards.entry(key).or_default() += count;
                    }
                }
            }
        }

        (types, shape_keys)
    }

    fn score(
        candidate: &RelationshipDescription,
        stats: &TypeStats,
        shape_keys: Option<&BTreeSet<String>>,
    ) -> f64 {
        let mut score = 1.0;
        for key in &stats.keys {
            let pinned = matches!(candidate.properties().get(key), Predicate::Concrete(_));
            let seen_in_shape = shape_keys.is_some_and(|keys| keys.contains(key));
            if pinned || !seen_in_shape {
                score += 1.0;
            } else {
                let values = stats.values.get(key).map_or(0, BTreeSet::len) as f64;
                let wildcards = stats.wildcards.get(key).copied().unwrap_or(0) as f64;
                score += (values + wildcards) / (stats.degree as f64 + 1.0);
            }
        }
        score / (stats.keys.len() as f64 + 1.0)
    }
}

impl GeneralizationStrategy for AverageCardinality {
    fn choose(
        &self,
        buckets: &BucketSet,
        candidates: &BTreeSet<RelationshipDescription>,
    ) -> Option<RelationshipDescription> {
        let (types, shape_keys) = Self::stats(buckets);
        let mut best: Option<(f64, &RelationshipDescription)> = None;

        for candidate in candidates {
            let Some(stats) = types.get(candidate.rel_type()) else {
                continue;
            };
            let keys = shape_keys.get(&(candidate.rel_type().to_string(), candidate.direction()));
            let score = Self::score(candidate, stats, keys);
            tracing::trace!(%candidate, score, "scored generalization");
            if best.is_none_or(|(top, _)| score > top) {
                best = Some((score, candidate));
            }
        }

        best.map(|(_, d)| d.clone())
    }
}
