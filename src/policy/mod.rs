//! # Policies
//!
//! Which relationships and relationship properties participate in counting,
//! and what a single relationship weighs. Policies are plain values handed
//! to a module through its configuration.

use std::fmt;
use std::sync::Arc;

use crate::description::RelationshipDescription;
use crate::model::{Direction, NodeId, Relationship, Value};

/// Types and keys starting with this prefix belong to the cache itself.
pub const INTERNAL_PREFIX: &str = "_GA_";

// ============================================================================
// Traits
// ============================================================================

/// Decides whether a relationship is counted at all.
pub trait RelationshipInclusionPolicy: Send + Sync {
    fn include(&self, rel: &Relationship) -> bool;
}

/// Decides whether a property of a relationship is part of its shape.
pub trait RelationshipPropertyInclusionPolicy: Send + Sync {
    fn include(&self, key: &str, rel: &Relationship) -> bool;
}

/// Weight of one relationship as seen from one of its nodes.
pub trait WeighingStrategy: Send + Sync {
    fn weigh(&self, rel: &Relationship, pov: NodeId) -> u64;
}

impl<F> RelationshipInclusionPolicy for F
where
    F: Fn(&Relationship) -> bool + Send + Sync,
{
    fn include(&self, rel: &Relationship) -> bool {
        self(rel)
    }
}

impl<F> RelationshipPropertyInclusionPolicy for F
where
    F: Fn(&str, &Relationship) -> bool + Send + Sync,
{
    fn include(&self, key: &str, rel: &Relationship) -> bool {
        self(key, rel)
    }
}

impl<F> WeighingStrategy for F
where
    F: Fn(&Relationship, NodeId) -> u64 + Send + Sync,
{
    fn weigh(&self, rel: &Relationship, pov: NodeId) -> u64 {
        self(rel, pov)
    }
}

// ============================================================================
// Defaults
// ============================================================================

/// Every relationship except the cache's own.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAllBusinessRelationships;

impl RelationshipInclusionPolicy for IncludeAllBusinessRelationships {
    fn include(&self, rel: &Relationship) -> bool {
        !rel.rel_type.starts_with(INTERNAL_PREFIX)
    }
}

/// Every relationship property except internal ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeAllBusinessRelationshipProperties;

impl RelationshipPropertyInclusionPolicy for IncludeAllBusinessRelationshipProperties {
    fn include(&self, key: &str, _rel: &Relationship) -> bool {
        !key.starts_with(INTERNAL_PREFIX)
    }
}

/// No properties: counts are kept per type and direction only.
#[derive(Debug, Clone, Copy, Default)]
pub struct IncludeNoRelationshipProperties;

impl RelationshipPropertyInclusionPolicy for IncludeNoRelationshipProperties {
    fn include(&self, _key: &str, _rel: &Relationship) -> bool {
        false
    }
}

/// Every relationship weighs 1.
#[derive(Debug, Clone, Copy, Default)]
pub struct OneForEach;

impl WeighingStrategy for OneForEach {
    fn weigh(&self, _rel: &Relationship, _pov: NodeId) -> u64 {
        1
    }
}

/// Weight read from an integer relationship property.
///
/// A missing, negative or non-integer property weighs 1.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyWeight {
    pub key: String,
}

impl PropertyWeight {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

impl WeighingStrategy for PropertyWeight {
    fn weigh(&self, rel: &Relationship, _pov: NodeId) -> u64 {
        match rel.properties.get(&self.key) {
            Some(Value::Int(n)) if *n >= 0 => *n as u64,
            _ => 1,
        }
    }
}

// ============================================================================
// InclusionPolicies
// ============================================================================

/// The relationship and relationship-property policies of one module.
#[derive(Clone)]
pub struct InclusionPolicies {
    relationships: Arc<dyn RelationshipInclusionPolicy>,
    properties: Arc<dyn RelationshipPropertyInclusionPolicy>,
}

impl InclusionPolicies {
    pub fn new(
        relationships: impl RelationshipInclusionPolicy + 'static,
        properties: impl RelationshipPropertyInclusionPolicy + 'static,
    ) -> Self {
        Self {
            relationships: Arc::new(relationships),
            properties: Arc::new(properties),
        }
    }

    pub fn with_relationships(mut self, policy: impl RelationshipInclusionPolicy + 'static) -> Self {
        self.relationships = Arc::new(policy);
        self
    }

    pub fn with_properties(mut self, policy: impl RelationshipPropertyInclusionPolicy + 'static) -> Self {
        self.properties = Arc::new(policy);
        self
    }

    pub fn include_relationship(&self, rel: &Relationship) -> bool {
        self.relationships.include(rel)
    }

    pub fn include_property(&self, key: &str, rel: &Relationship) -> bool {
        self.properties.include(key, rel)
    }

    /// Literal shape of `rel` seen in `direction`, restricted to the
    /// included properties.
    pub fn describe(&self, rel: &Relationship, direction: Direction) -> RelationshipDescription {
        RelationshipDescription::from_relationship(rel, direction, |key| self.include_property(key, rel))
    }
}

impl Default for InclusionPolicies {
    fn default() -> Self {
        Self::new(IncludeAllBusinessRelationships, IncludeAllBusinessRelationshipProperties)
    }
}

impl fmt::Debug for InclusionPolicies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InclusionPolicies").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelId;

    fn rel() -> Relationship {
        Relationship::new(RelId(1), NodeId(1), NodeId(2), "FRIEND")
            .with_property("level", 2)
            .with_property("_GA_marker", true)
    }

    #[test]
    fn test_business_defaults_skip_internal_names() {
        let policies = InclusionPolicies::default();
        assert!(policies.include_relationship(&rel()));
        assert!(!policies.include_relationship(&Relationship::new(RelId(2), NodeId(1), NodeId(2), "_GA_META")));
        assert!(policies.include_property("level", &rel()));
        assert!(!policies.include_property("_GA_marker", &rel()));
    }

    #[test]
    fn test_describe_uses_property_policy() {
        let shape = InclusionPolicies::default().describe(&rel(), Direction::Outgoing);
        assert_eq!(shape, RelationshipDescription::literal("FRIEND", Direction::Outgoing).with("level", 2));

        let bare = InclusionPolicies::default()
            .with_properties(IncludeNoRelationshipProperties)
            .describe(&rel(), Direction::Incoming);
        assert_eq!(bare, RelationshipDescription::literal("FRIEND", Direction::Incoming));
    }

    #[test]
    fn test_closures_are_policies() {
        let policies = InclusionPolicies::default()
            .with_relationships(|r: &Relationship| r.rel_type == "FRIEND")
            .with_properties(|key: &str, _: &Relationship| key == "level");
        assert!(policies.include_relationship(&rel()));
        assert!(!policies.include_relationship(&Relationship::new(RelId(3), NodeId(1), NodeId(1), "ENEMY")));
        assert!(!policies.include_property("colour", &rel()));
    }

    #[test]
    fn test_weighing() {
        assert_eq!(OneForEach.weigh(&rel(), NodeId(1)), 1);

        let by_level = PropertyWeight::new("level");
        assert_eq!(by_level.weigh(&rel(), NodeId(1)), 2);
        assert_eq!(by_level.weigh(&rel().with_property("level", -3), NodeId(1)), 1);
        assert_eq!(by_level.weigh(&rel().with_property("level", "high"), NodeId(1)), 1);

        let doubled = |r: &Relationship, _: NodeId| -> u64 { if r.is_loop() { 2 } else { 1 } };
        assert_eq!(doubled.weigh(&rel(), NodeId(1)), 1);
    }
}
