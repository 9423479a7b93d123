//! Cache first, full scan when the cache can't tell.

use std::sync::Arc;

use async_trait::async_trait;

use super::{CachedRelationshipCounter, NaiveRelationshipCounter, RelationshipCounter};
use crate::description::RelationshipDescription;
use crate::model::NodeId;
use crate::module::RelationshipCountModule;
use crate::storage::StorageBackend;
use crate::Result;

/// Never reports `UnableToCount`. Availability errors pass through.
#[derive(Debug, Clone)]
pub struct FallbackRelationshipCounter {
    cached: CachedRelationshipCounter,
    naive: NaiveRelationshipCounter,
}

impl FallbackRelationshipCounter {
    pub fn new(module: Arc<RelationshipCountModule>) -> Self {
        let naive = NaiveRelationshipCounter::new(module.config().clone());
        Self { cached: CachedRelationshipCounter::new(module), naive }
    }
}

#[async_trait]
impl<B: StorageBackend> RelationshipCounter<B> for FallbackRelationshipCounter {
    async fn count(
        &self,
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        query: &RelationshipDescription,
    ) -> Result<u64> {
        match RelationshipCounter::<B>::count(&self.cached, backend, tx, node, query).await {
            Err(e) if e.is_unable_to_count() => {
                tracing::warn!(
                    module = %self.cached.module().id(),
                    node = %node,
                    %query,
                    "cache can't resolve the query; falling back to a full scan"
                );
                RelationshipCounter::<B>::count(&self.naive, backend, tx, node, query).await
            }
            other => other,
        }
    }
}
