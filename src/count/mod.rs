//! # Counting Strategies
//!
//! Three interchangeable ways to answer `count(node, description)`:
//!
//! | Counter | Cost | Fails with |
//! |---------|------|------------|
//! | [`NaiveRelationshipCounter`] | node degree | storage errors only |
//! | [`CachedRelationshipCounter`] | bucket count | `UnableToCount`, `CacheUnavailable` |
//! | [`FallbackRelationshipCounter`] | bucket count, degree when ambiguous | `CacheUnavailable` |

pub mod naive;
pub mod cached;
pub mod fallback;

use async_trait::async_trait;

use crate::description::RelationshipDescription;
use crate::model::NodeId;
use crate::storage::StorageBackend;
use crate::Result;

pub use cached::CachedRelationshipCounter;
pub use fallback::FallbackRelationshipCounter;
pub use naive::NaiveRelationshipCounter;

/// Counts the relationships of a node matching a description.
///
/// Properties the description leaves out are matched per its semantics: a
/// general query doesn't care about them, a literal query requires them
/// absent.
#[async_trait]
pub trait RelationshipCounter<B: StorageBackend>: Send + Sync {
    async fn count(
        &self,
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        query: &RelationshipDescription,
    ) -> Result<u64>;
}
