//! # Relationship Descriptions
//!
//! The description lattice: per-key [`Predicate`]s under literal or general
//! [`Semantics`], wrapped into [`PropertiesDescription`]s and then
//! [`RelationshipDescription`]s with an exact type and direction.
//!
//! Everything here is pure and synchronous.

pub mod predicate;
pub mod properties;
pub mod relationship;
pub mod key;

pub use predicate::{Predicate, Semantics};
pub use properties::PropertiesDescription;
pub use relationship::RelationshipDescription;
