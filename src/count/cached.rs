//! Answers from a module's buckets only.

use std::sync::Arc;

use async_trait::async_trait;

use super::RelationshipCounter;
use crate::cache::{resolve, CachingNode, Resolution};
use crate::description::RelationshipDescription;
use crate::model::NodeId;
use crate::module::RelationshipCountModule;
use crate::storage::StorageBackend;
use crate::{Error, Result};

/// Reads the buckets of one module.
///
/// Refuses with [`Error::UnableToCount`] instead of guessing when the
/// buckets can't tell, and with [`Error::CacheUnavailable`] while the module
/// is not initialized.
#[derive(Debug, Clone)]
pub struct CachedRelationshipCounter {
    module: Arc<RelationshipCountModule>,
}

impl CachedRelationshipCounter {
    pub fn new(module: Arc<RelationshipCountModule>) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &RelationshipCountModule {
        &self.module
    }
}

#[async_trait]
impl<B: StorageBackend> RelationshipCounter<B> for CachedRelationshipCounter {
    async fn count(
        &self,
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        query: &RelationshipDescription,
    ) -> Result<u64> {
        if !self.module.is_initialized() {
            return Err(Error::CacheUnavailable(format!(
                "module '{}' is not initialized",
                self.module.id()
            )));
        }

        let cache = CachingNode::load(backend, tx, node, self.module.prefix()).await?;
        match resolve(cache.buckets(), query) {
            Resolution::Exact(count) => Ok(count),
            Resolution::Ambiguous => Err(Error::UnableToCount(format!(
                "{query} on node {node} is not resolvable from module '{}'",
                self.module.id()
            ))),
        }
    }
}
