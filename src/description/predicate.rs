//! Per-key property filters and the two matching semantics.

use serde::{Deserialize, Serialize};

/// Filter on a single property key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Predicate {
    /// The property must hold exactly this (canonical) value.
    Concrete(String),
    /// The property may hold any value.
    Wildcard,
    /// The property must not be set. Never stored; produced by lookups.
    Absent,
}

impl Predicate {
    pub fn is_concrete(&self) -> bool {
        matches!(self, Predicate::Concrete(_))
    }
}

/// What a key missing from a description means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Semantics {
    /// Missing key: the relationship must not have the property.
    Literal,
    /// Missing key: any value, or no value, is acceptable.
    General,
}

/// The set of property states a predicate admits, once semantics are applied.
///
/// A relationship property is either absent or holds a value; these are the
/// four shapes of admitted sets the lattice works with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admits<'a> {
    Value(&'a str),
    AnyValue,
    AnyOrAbsent,
    Absent,
}

impl<'a> Admits<'a> {
    /// Admitted states for a stored predicate (or `None` when the key is
    /// missing) under the given semantics.
    pub(crate) fn of(predicate: Option<&'a Predicate>, semantics: Semantics) -> Self {
        match (predicate, semantics) {
            (Some(Predicate::Concrete(v)), _) => Admits::Value(v),
            (Some(Predicate::Wildcard), Semantics::Literal) => Admits::AnyValue,
            (Some(Predicate::Wildcard), Semantics::General) => Admits::AnyOrAbsent,
            (Some(Predicate::Absent), _) | (None, Semantics::Literal) => Admits::Absent,
            (None, Semantics::General) => Admits::AnyOrAbsent,
        }
    }

    /// Superset test.
    pub(crate) fn covers(self, other: Admits<'_>) -> bool {
        match (self, other) {
            (Admits::AnyOrAbsent, _) => true,
            (Admits::AnyValue, Admits::Value(_) | Admits::AnyValue) => true,
            (Admits::Value(a), Admits::Value(b)) => a == b,
            (Admits::Absent, Admits::Absent) => true,
            _ => false,
        }
    }

    /// Empty intersection test.
    pub(crate) fn disjoint(self, other: Admits<'_>) -> bool {
        match (self, other) {
            (Admits::Value(a), Admits::Value(b)) => a != b,
            (Admits::Value(_) | Admits::AnyValue, Admits::Absent)
            | (Admits::Absent, Admits::Value(_) | Admits::AnyValue) => true,
            _ => false,
        }
    }
}
