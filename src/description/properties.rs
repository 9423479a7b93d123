//! Property descriptions: a set of per-key predicates plus matching semantics.
//!
//! This is the lattice the cache is built on. `a.is_more_general_than(b)`
//! holds when every relationship property combination `b` admits is also
//! admitted by `a`; two descriptions are mutually exclusive when no
//! combination is admitted by both.

use std::cmp::{Ordering, Reverse};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use super::predicate::{Admits, Predicate, Semantics};
use crate::model::Value;

/// Immutable description of relationship properties.
///
/// Under [`Semantics::General`] a wildcard entry is never stored: a missing
/// key already admits any value, so wildcarding a key removes its filter.
/// This keeps structural equality identical to semantic equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropertiesDescription {
    semantics: Semantics,
    predicates: BTreeMap<String, Predicate>,
}

impl PropertiesDescription {
    /// Empty literal description: admits only relationships with no properties.
    pub fn literal() -> Self {
        Self { semantics: Semantics::Literal, predicates: BTreeMap::new() }
    }

    /// Empty general description: admits everything.
    pub fn general() -> Self {
        Self { semantics: Semantics::General, predicates: BTreeMap::new() }
    }

    /// Literal description holding exactly the given properties.
    pub fn literal_from<'a, I>(properties: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a Value)>,
    {
        let predicates = properties
            .into_iter()
            .map(|(k, v)| (k.clone(), Predicate::Concrete(v.canonical())))
            .collect();
        Self { semantics: Semantics::Literal, predicates }
    }

    pub(crate) fn from_parts(semantics: Semantics, predicates: BTreeMap<String, Predicate>) -> Self {
        let mut description = Self { semantics, predicates };
        if semantics == Semantics::General {
            description.predicates.retain(|_, p| p.is_concrete());
        }
        description.predicates.retain(|_, p| *p != Predicate::Absent);
        description
    }

    /// Require `key` to hold `value`.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.predicates.insert(key.into(), Predicate::Concrete(value.into().canonical()));
        self
    }

    /// Accept any value for `key`. Under literal semantics the key must still
    /// be present.
    pub fn with_any(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        match self.semantics {
            Semantics::Literal => {
                self.predicates.insert(key, Predicate::Wildcard);
            }
            Semantics::General => {
                self.predicates.remove(&key);
            }
        }
        self
    }

    /// Drop the filter on `key`: "must be absent" under literal semantics,
    /// "don't care" under general semantics.
    pub fn without(mut self, key: &str) -> Self {
        self.predicates.remove(key);
        self
    }

    pub fn semantics(&self) -> Semantics {
        self.semantics
    }

    pub fn is_literal(&self) -> bool {
        self.semantics == Semantics::Literal
    }

    /// Effective predicate for `key`, missing keys resolved per semantics.
    pub fn get(&self, key: &str) -> Predicate {
        match (self.predicates.get(key), self.semantics) {
            (Some(p), _) => p.clone(),
            (None, Semantics::Literal) => Predicate::Absent,
            (None, Semantics::General) => Predicate::Wildcard,
        }
    }

    /// Stored entries in canonical (sorted) key order.
    pub fn entries(&self) -> impl Iterator<Item = (&String, &Predicate)> {
        self.predicates.iter()
    }

    pub fn concrete_keys(&self) -> impl Iterator<Item = &String> {
        self.predicates.iter().filter(|(_, p)| p.is_concrete()).map(|(k, _)| k)
    }

    fn concrete_count(&self) -> usize {
        self.predicates.values().filter(|p| p.is_concrete()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.predicates.is_empty()
    }

    /// General semantics view of this description.
    pub fn to_general(&self) -> Self {
        Self::from_parts(Semantics::General, self.predicates.clone())
    }

    fn admits(&self, key: &str) -> Admits<'_> {
        Admits::of(self.predicates.get(key), self.semantics)
    }

    fn union_keys<'a>(&'a self, other: &'a Self) -> impl Iterator<Item = &'a String> + 'a {
        self.predicates
            .keys()
            .chain(other.predicates.keys().filter(move |k| !self.predicates.contains_key(*k)))
    }

    // ========================================================================
    // Partial order
    // ========================================================================

    pub fn is_more_general_than(&self, other: &Self) -> bool {
        // Keys outside both sets: "absent" never covers "any or absent".
        if self.semantics == Semantics::Literal && other.semantics == Semantics::General {
            return false;
        }
        self.union_keys(other)
            .all(|k| self.admits(k).covers(other.admits(k)))
    }

    pub fn is_strictly_more_general_than(&self, other: &Self) -> bool {
        self.is_more_general_than(other) && self != other
    }

    pub fn is_more_specific_than(&self, other: &Self) -> bool {
        other.is_more_general_than(self)
    }

    pub fn is_strictly_more_specific_than(&self, other: &Self) -> bool {
        other.is_strictly_more_general_than(self)
    }

    /// No relationship can satisfy both descriptions.
    pub fn is_mutually_exclusive(&self, other: &Self) -> bool {
        self.union_keys(other)
            .any(|k| self.admits(k).disjoint(other.admits(k)))
    }

    // ========================================================================
    // Generalization
    // ========================================================================

    /// `self` plus every description one generalization step above it.
    ///
    /// A literal description first steps to its general form; each concrete
    /// key of that form can then be widened on its own.
    pub fn generate_one_more_general(&self) -> BTreeSet<Self> {
        let mut result = BTreeSet::new();
        result.insert(self.clone());

        let base = match self.semantics {
            Semantics::Literal => self.to_general(),
            Semantics::General => self.clone(),
        };
        for key in base.concrete_keys() {
            result.insert(base.clone().without(key));
        }
        result.insert(base);
        result
    }

    /// Full upward closure, most specific first.
    ///
    /// Enumerates the bit-mask over concrete keys of the general form, so the
    /// result holds `2^k` general descriptions, plus `self` when literal.
    pub fn generate_all_more_general(&self) -> BTreeSet<Self> {
        let mut result = BTreeSet::new();
        if self.semantics == Semantics::Literal {
            result.insert(self.clone());
        }

        let base = self.to_general();
        let keys: Vec<&String> = base.concrete_keys().collect();
        debug_assert!(keys.len() < 64, "too many concrete keys to enumerate");

        for mask in 0..(1u64 << keys.len()) {
            let mut predicates = base.predicates.clone();
            for (bit, key) in keys.iter().enumerate() {
                if mask & (1 << bit) != 0 {
                    predicates.remove(*key);
                }
            }
            result.insert(Self { semantics: Semantics::General, predicates });
        }
        result
    }
}

// ============================================================================
// Total order: a linear extension of the partial order
// ============================================================================

impl Ord for PropertiesDescription {
    /// Literal before general, more concrete keys before fewer, then the
    /// canonical entry sequence. Anything strictly more general sorts after.
    fn cmp(&self, other: &Self) -> Ordering {
        (self.semantics, Reverse(self.concrete_count()))
            .cmp(&(other.semantics, Reverse(other.concrete_count())))
            .then_with(|| self.predicates.iter().cmp(other.predicates.iter()))
    }
}

impl PartialOrd for PropertiesDescription {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for PropertiesDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.semantics == Semantics::Literal {
            write!(f, "literal ")?;
        }
        write!(f, "{{")?;
        for (i, (k, p)) in self.predicates.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match p {
                Predicate::Concrete(v) => write!(f, "{k}: {v}")?,
                Predicate::Wildcard => write!(f, "{k}: *")?,
                Predicate::Absent => write!(f, "{k}: <absent>")?,
            }
        }
        write!(f, "}}")
    }
}
