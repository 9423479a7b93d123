//! Transaction management and the relationship mutation feed.

use serde::{Deserialize, Serialize};

use crate::model::Relationship;

/// Transaction mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxMode {
    ReadOnly,
    ReadWrite,
}

/// Opaque transaction identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TxId(pub u64);

/// Transaction trait that all backends must implement.
pub trait Transaction: Send + Sync {
    fn mode(&self) -> TxMode;
    fn id(&self) -> TxId;
}

/// A relationship mutation, as delivered to relationship count modules.
///
/// Events carry full relationship snapshots so the affected literal shape
/// can be rebuilt on both sides of a change.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationshipEvent {
    Created(Relationship),
    Deleted(Relationship),
    /// Properties changed; type and endpoints are the same on both sides.
    Changed { before: Relationship, after: Relationship },
}

impl RelationshipEvent {
    /// The relationship as it looks after the event (before, for deletions).
    pub fn relationship(&self) -> &Relationship {
        match self {
            RelationshipEvent::Created(r) | RelationshipEvent::Deleted(r) => r,
            RelationshipEvent::Changed { after, .. } => after,
        }
    }
}
