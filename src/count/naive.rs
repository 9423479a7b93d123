//! Full scan over a node's relationships.

use async_trait::async_trait;

use super::RelationshipCounter;
use crate::config::RelcountConfig;
use crate::description::RelationshipDescription;
use crate::model::{Direction, NodeId};
use crate::storage::StorageBackend;
use crate::Result;

/// Always correct; cost proportional to node degree.
///
/// Applies the same inclusion policies and weighing as the module whose
/// configuration it was built with, so its answers are comparable to that
/// module's cache. A self-loop is counted once per matching direction, so
/// twice for a `Both` query.
#[derive(Debug, Clone, Default)]
pub struct NaiveRelationshipCounter {
    config: RelcountConfig,
}

impl NaiveRelationshipCounter {
    pub fn new(config: RelcountConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl<B: StorageBackend> RelationshipCounter<B> for NaiveRelationshipCounter {
    async fn count(
        &self,
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        query: &RelationshipDescription,
    ) -> Result<u64> {
        let inclusion = self.config.inclusion();
        let weighing = self.config.weighing();
        let candidates = backend
            .get_relationships(tx, node, query.direction(), Some(query.rel_type()))
            .await?;

        let mut total = 0;
        for rel in &candidates {
            if !inclusion.include_relationship(rel) {
                continue;
            }
            for direction in Direction::resolve(rel, node) {
                if !query.direction().matches(direction) {
                    continue;
                }
                let shape = inclusion.describe(rel, direction);
                if shape.properties().is_more_specific_than(query.properties()) {
                    total += weighing.weigh(rel, node);
                }
            }
        }
        Ok(total)
    }
}
