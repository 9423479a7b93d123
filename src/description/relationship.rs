//! Relationship descriptions: exact type and direction plus a property description.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::properties::PropertiesDescription;
use crate::model::{Direction, Relationship, Value};

/// Shape of a relationship: `(type, direction, properties)`.
///
/// Type and direction are never generalized. Two descriptions with different
/// type or direction are unrelated in the partial order and mutually
/// exclusive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelationshipDescription {
    rel_type: String,
    direction: Direction,
    properties: PropertiesDescription,
}

impl RelationshipDescription {
    pub fn new(rel_type: impl Into<String>, direction: Direction, properties: PropertiesDescription) -> Self {
        Self { rel_type: rel_type.into(), direction, properties }
    }

    /// Description with literal semantics: unspecified properties must be absent.
    pub fn literal(rel_type: impl Into<String>, direction: Direction) -> Self {
        Self::new(rel_type, direction, PropertiesDescription::literal())
    }

    /// Description with general semantics: unspecified properties don't matter.
    pub fn wildcard(rel_type: impl Into<String>, direction: Direction) -> Self {
        Self::new(rel_type, direction, PropertiesDescription::general())
    }

    /// Literal leaf for `rel` as seen in `direction`, keeping only the
    /// properties `include` accepts.
    pub fn from_relationship<F>(rel: &Relationship, direction: Direction, include: F) -> Self
    where
        F: Fn(&str) -> bool,
    {
        let properties = PropertiesDescription::literal_from(
            rel.properties.iter().filter(|(k, _)| include(k)),
        );
        Self::new(rel.rel_type.clone(), direction, properties)
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties = self.properties.with(key, value);
        self
    }

    pub fn with_any(mut self, key: impl Into<String>) -> Self {
        self.properties = self.properties.with_any(key);
        self
    }

    pub fn without(mut self, key: &str) -> Self {
        self.properties = self.properties.without(key);
        self
    }

    /// Same type and properties, different direction.
    pub fn with_direction(&self, direction: Direction) -> Self {
        Self { direction, ..self.clone() }
    }

    pub fn rel_type(&self) -> &str {
        &self.rel_type
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn properties(&self) -> &PropertiesDescription {
        &self.properties
    }

    /// Same type and direction.
    pub fn same_shape(&self, other: &Self) -> bool {
        self.rel_type == other.rel_type && self.direction == other.direction
    }

    pub fn is_more_general_than(&self, other: &Self) -> bool {
        self.same_shape(other) && self.properties.is_more_general_than(&other.properties)
    }

    pub fn is_strictly_more_general_than(&self, other: &Self) -> bool {
        self.same_shape(other) && self.properties.is_strictly_more_general_than(&other.properties)
    }

    pub fn is_more_specific_than(&self, other: &Self) -> bool {
        self.same_shape(other) && self.properties.is_more_specific_than(&other.properties)
    }

    pub fn is_strictly_more_specific_than(&self, other: &Self) -> bool {
        self.same_shape(other) && self.properties.is_strictly_more_specific_than(&other.properties)
    }

    pub fn is_mutually_exclusive(&self, other: &Self) -> bool {
        !self.same_shape(other) || self.properties.is_mutually_exclusive(&other.properties)
    }

    pub fn generate_one_more_general(&self) -> BTreeSet<Self> {
        self.rebuild(self.properties.generate_one_more_general())
    }

    pub fn generate_all_more_general(&self) -> BTreeSet<Self> {
        self.rebuild(self.properties.generate_all_more_general())
    }

    fn rebuild(&self, properties: BTreeSet<PropertiesDescription>) -> BTreeSet<Self> {
        properties
            .into_iter()
            .map(|p| Self::new(self.rel_type.clone(), self.direction, p))
            .collect()
    }
}

impl fmt::Display for RelationshipDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{} {}", self.rel_type, self.direction, self.properties)
    }
}
