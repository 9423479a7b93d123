//! # Bucket Cache
//!
//! A node's cached relationship counts: a set of buckets
//! `(description, count)` kept most specific first, the [`resolve`] primitive
//! every cache-backed counter is built on, and [`CachingNode`] which loads and
//! flushes a bucket set through the storage backend.

pub mod node;

use std::collections::{BTreeMap, BTreeSet};

use crate::description::RelationshipDescription;
use crate::model::Direction;
use crate::{Error, Result};

pub use node::CachingNode;

// ============================================================================
// BucketSet
// ============================================================================

/// Cached counts for one node and one namespace.
///
/// Iteration follows the description total order: grouped by type and
/// direction, most specific description first within each group. Compaction
/// keeps the buckets of a group mutually exclusive, so an observed
/// relationship shape is covered by at most one bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketSet {
    buckets: BTreeMap<RelationshipDescription, u64>,
}

impl BucketSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn get(&self, description: &RelationshipDescription) -> Option<u64> {
        self.buckets.get(description).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RelationshipDescription, u64)> {
        self.buckets.iter().map(|(d, c)| (d, *c))
    }

    /// Sum of all bucket counts.
    pub fn total(&self) -> u64 {
        self.buckets.values().sum()
    }

    /// Distinct `(type, direction)` groups present.
    pub fn shapes(&self) -> BTreeSet<(String, Direction)> {
        self.buckets
            .keys()
            .map(|d| (d.rel_type().to_string(), d.direction()))
            .collect()
    }

    /// Buckets of one `(type, direction)` group, most specific first.
    pub fn shape<'a>(
        &'a self,
        rel_type: &'a str,
        direction: Direction,
    ) -> impl Iterator<Item = (&'a RelationshipDescription, u64)> + 'a {
        self.iter()
            .filter(move |(d, _)| d.rel_type() == rel_type && d.direction() == direction)
    }

    /// Add `count` to the bucket for `description`, creating it if needed.
    pub fn insert(&mut self, description: RelationshipDescription, count: u64) {
        if count == 0 {
            return;
        }
        *self.buckets.entry(description).or_insert(0) += count;
    }

    pub fn remove(&mut self, description: &RelationshipDescription) -> Option<u64> {
        self.buckets.remove(description)
    }

    /// Most specific bucket covering `literal`, if any.
    fn covering(&self, literal: &RelationshipDescription) -> Option<(RelationshipDescription, u64)> {
        self.buckets
            .iter()
            .find(|(d, _)| d.is_more_general_than(literal))
            .map(|(d, c)| (d.clone(), *c))
    }

    /// Count a relationship of shape `literal` with weight `weight`.
    ///
    /// The most specific bucket already covering the shape absorbs it; only
    /// a shape nothing covers gets its own literal bucket.
    pub fn increment(&mut self, literal: &RelationshipDescription, weight: u64) -> RelationshipDescription {
        let target = self
            .covering(literal)
            .map_or_else(|| literal.clone(), |(d, _)| d);
        self.insert(target.clone(), weight);
        target
    }

    /// Un-count a relationship of shape `literal` with weight `weight`.
    ///
    /// Taken from the most specific covering bucket, the one that absorbed
    /// the relationship; a bucket reaching zero is removed. A missing bucket
    /// or one holding less than `weight` means the cache is out of sync.
    pub fn decrement(&mut self, literal: &RelationshipDescription, weight: u64) -> Result<RelationshipDescription> {
        if weight == 0 {
            return Ok(literal.clone());
        }
        let (target, count) = self
            .covering(literal)
            .ok_or_else(|| Error::InvariantViolation(format!("no bucket covers {literal}")))?;
        if count < weight {
            return Err(Error::InvariantViolation(format!(
                "bucket {target} holds {count}, cannot remove {weight} for {literal}"
            )));
        }
        let remaining = count - weight;
        if remaining == 0 {
            self.buckets.remove(&target);
        } else {
            self.buckets.insert(target.clone(), remaining);
        }
        Ok(target)
    }
}

impl FromIterator<(RelationshipDescription, u64)> for BucketSet {
    fn from_iter<I: IntoIterator<Item = (RelationshipDescription, u64)>>(iter: I) -> Self {
        let mut set = BucketSet::new();
        for (d, c) in iter {
            set.insert(d, c);
        }
        set
    }
}

// ============================================================================
// Resolution
// ============================================================================

/// Outcome of answering a query from buckets alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Exact(u64),
    /// Some bucket partially overlaps the query.
    Ambiguous,
}

/// Answer `query` from `buckets`.
///
/// A bucket at least as specific as the query contributes its count; a
/// mutually exclusive one contributes nothing; any other bucket of the same
/// type and direction makes the whole answer ambiguous. A `Both` query is
/// resolved as its outgoing plus its incoming half.
pub fn resolve(buckets: &BucketSet, query: &RelationshipDescription) -> Resolution {
    let mut total = 0;
    for direction in query.direction().split() {
        let half = query.with_direction(direction);
        for (bucket, count) in buckets.shape(half.rel_type(), direction) {
            if bucket.is_more_specific_than(&half) {
                total += count;
            } else if !bucket.is_mutually_exclusive(&half) {
                return Resolution::Ambiguous;
            }
        }
    }
    Resolution::Exact(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn friend() -> RelationshipDescription {
        RelationshipDescription::literal("FRIEND", Direction::Outgoing)
    }

    fn friend_any() -> RelationshipDescription {
        RelationshipDescription::wildcard("FRIEND", Direction::Outgoing)
    }

    #[test]
    fn test_increment_creates_literal_bucket() {
        let mut set = BucketSet::new();
        let d = friend().with("level", 1);
        assert_eq!(set.increment(&d, 1), d);
        assert_eq!(set.increment(&d, 2), d);
        assert_eq!(set.get(&d), Some(3));
    }

    #[test]
    fn test_increment_prefers_covering_bucket() {
        let mut set = BucketSet::new();
        set.insert(friend_any(), 2);
        let hit = set.increment(&friend().with("level", 3), 1);
        assert_eq!(hit, friend_any());
        assert_eq!(set.len(), 1);
        assert_eq!(set.get(&friend_any()), Some(3));
    }

    #[test]
    fn test_decrement_removes_empty_bucket() {
        let mut set = BucketSet::new();
        let d = friend().with("level", 1);
        set.insert(d.clone(), 2);
        set.decrement(&d, 1).unwrap();
        assert_eq!(set.get(&d), Some(1));
        set.decrement(&d, 1).unwrap();
        assert!(set.is_empty());
    }

    #[test]
    fn test_decrement_falls_through_to_general_bucket() {
        let mut set = BucketSet::new();
        let d = friend().with("level", 1);
        set.insert(d.clone(), 1);
        set.insert(friend_any(), 4);
        set.decrement(&d, 1).unwrap();
        assert_eq!(set.decrement(&d, 1).unwrap(), friend_any());
        assert_eq!(set.total(), 3);
    }

    #[test]
    fn test_decrement_never_borrows_from_a_wider_bucket() {
        let mut set = BucketSet::new();
        let d = friend().with("level", 1);
        set.insert(d.clone(), 1);
        set.insert(friend_any(), 4);
        let err = set.decrement(&d, 2).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
        assert_eq!(set.total(), 5);
    }

    #[test]
    fn test_decrement_without_bucket_is_invariant_violation() {
        let mut set = BucketSet::new();
        set.insert(friend().with("level", 1), 1);
        let err = set.decrement(&friend().with("level", 2), 1).unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));
    }

    #[test]
    fn test_resolve_exact() {
        let set: BucketSet = [
            (friend().with("level", 1), 3),
            (friend().with("level", 2), 4),
            (RelationshipDescription::literal("ENEMY", Direction::Outgoing), 9),
        ]
        .into_iter()
        .collect();

        assert_eq!(resolve(&set, &friend_any()), Resolution::Exact(7));
        assert_eq!(resolve(&set, &friend_any().with("level", 2)), Resolution::Exact(4));
        assert_eq!(resolve(&set, &friend_any().with("level", 5)), Resolution::Exact(0));
        assert_eq!(resolve(&set, &friend()), Resolution::Exact(0));
    }

    #[test]
    fn test_resolve_ambiguous_after_generalization() {
        let set: BucketSet = [(friend_any(), 2)].into_iter().collect();
        assert_eq!(resolve(&set, &friend_any().with("level", 1)), Resolution::Ambiguous);
        assert_eq!(resolve(&set, &friend_any()), Resolution::Exact(2));
    }

    #[test]
    fn test_resolve_both_sums_halves() {
        let set: BucketSet = [
            (friend(), 2),
            (RelationshipDescription::literal("FRIEND", Direction::Incoming), 5),
        ]
        .into_iter()
        .collect();
        let both = RelationshipDescription::wildcard("FRIEND", Direction::Both);
        assert_eq!(resolve(&set, &both), Resolution::Exact(7));
    }
}
