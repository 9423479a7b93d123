//! # Relationship Count Module
//!
//! The incremental maintainer. A module owns one cache namespace: it turns
//! every relationship event into weighted bucket updates on both endpoints,
//! compacts the touched nodes and writes them back.
//!
//! ## Namespaces
//!
//! Buckets of module `id` live in node properties prefixed with
//! `_GA_RC_<id>#`. Module ids may not contain `#` or `\`, so no module's
//! prefix is a prefix of another's.

use std::sync::atomic::{AtomicBool, Ordering};

use smallvec::SmallVec;

use crate::cache::CachingNode;
use crate::compact::CompactionStrategy;
use crate::config::RelcountConfig;
use crate::model::{Direction, NodeId, Relationship};
use crate::storage::StorageBackend;
use crate::tx::RelationshipEvent;
use crate::{Error, Result};

/// Common start of every cache property key.
pub const PREFIX_BASE: &str = "_GA_RC_";

/// One relationship count cache.
#[derive(Debug)]
pub struct RelationshipCountModule {
    id: String,
    prefix: String,
    config: RelcountConfig,
    initialized: AtomicBool,
}

/// A weighted shape change on one node.
enum Delta<'a> {
    Add(&'a Relationship),
    Remove(&'a Relationship),
}

impl RelationshipCountModule {
    /// New, not yet initialized module.
    pub fn new(id: impl Into<String>, config: RelcountConfig) -> Result<Self> {
        let id = id.into();
        if id.is_empty() {
            return Err(Error::Config("module id must not be empty".into()));
        }
        if id.contains('#') || id.contains('\\') {
            return Err(Error::Config(format!("module id '{id}' must not contain '#' or '\\'")));
        }
        let prefix = format!("{PREFIX_BASE}{id}#");
        Ok(Self { id, prefix, config, initialized: AtomicBool::new(false) })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Node property prefix of this module's buckets.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn config(&self) -> &RelcountConfig {
        &self.config
    }

    /// Do the buckets reflect every relationship in the graph?
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub(crate) fn mark_initialized(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    /// Apply one relationship event to the affected nodes.
    ///
    /// Ignored until the module is initialized; reinitialization accounts
    /// for everything that happened before. Every endpoint is updated in
    /// memory before any is written back. A bucket set that cannot absorb
    /// the event leaves the module uninitialized, so cached counts are
    /// unavailable until [`RelationshipCountModule::reinitialize`].
    pub async fn handle<B: StorageBackend>(
        &self,
        backend: &B,
        tx: &mut B::Tx,
        event: &RelationshipEvent,
    ) -> Result<()> {
        if !self.is_initialized() {
            return Ok(());
        }

        let staged = match self.stage(backend, tx, event).await {
            Ok(staged) => staged,
            Err(e @ Error::InvariantViolation(_)) => {
                self.initialized.store(false, Ordering::Release);
                tracing::warn!(
                    module = %self.id,
                    error = %e,
                    "relationship counts out of sync; module needs reinitialization"
                );
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        for mut cache in staged {
            cache.flush(backend, tx).await?;
        }
        Ok(())
    }

    async fn stage<B: StorageBackend>(
        &self,
        backend: &B,
        tx: &B::Tx,
        event: &RelationshipEvent,
    ) -> Result<SmallVec<[CachingNode; 2]>> {
        let mut staged = SmallVec::new();
        match event {
            RelationshipEvent::Created(rel) => {
                for node in endpoints(rel) {
                    staged.push(self.update(backend, tx, node, &[Delta::Add(rel)]).await?);
                }
            }
            RelationshipEvent::Deleted(rel) => {
                for node in endpoints(rel) {
                    staged.push(self.update(backend, tx, node, &[Delta::Remove(rel)]).await?);
                }
            }
            RelationshipEvent::Changed { before, after } => {
                for node in endpoints(after) {
                    if self.unchanged(before, after, node) {
                        continue;
                    }
                    staged.push(self.update(backend, tx, node, &[Delta::Remove(before), Delta::Add(after)]).await?);
                }
            }
        }
        Ok(staged)
    }

    /// Is the change invisible to this module from `node`?
    fn unchanged(&self, before: &Relationship, after: &Relationship, node: NodeId) -> bool {
        let inclusion = self.config.inclusion();
        let weighing = self.config.weighing();
        match (inclusion.include_relationship(before), inclusion.include_relationship(after)) {
            (false, false) => true,
            (true, true) => {
                weighing.weigh(before, node) == weighing.weigh(after, node)
                    && Direction::resolve(after, node)
                        .into_iter()
                        .all(|d| inclusion.describe(before, d) == inclusion.describe(after, d))
            }
            _ => false,
        }
    }

    async fn update<B: StorageBackend>(
        &self,
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        deltas: &[Delta<'_>],
    ) -> Result<CachingNode> {
        let inclusion = self.config.inclusion();
        let weighing = self.config.weighing();

        let mut cache = CachingNode::load(backend, tx, node, &self.prefix).await?;
        for delta in deltas {
            let rel = match delta {
                Delta::Add(rel) | Delta::Remove(rel) => *rel,
            };
            if !inclusion.include_relationship(rel) {
                continue;
            }
            let weight = weighing.weigh(rel, node);
            for direction in Direction::resolve(rel, node) {
                let shape = inclusion.describe(rel, direction);
                let bucket = match delta {
                    Delta::Add(_) => cache.buckets_mut().increment(&shape, weight),
                    Delta::Remove(_) => cache.buckets_mut().decrement(&shape, weight)?,
                };
                tracing::debug!(module = %self.id, node = %node, rel = %rel.id, %bucket, weight, "bucket updated");
            }
        }

        self.compact(&mut cache);
        Ok(cache)
    }

    fn compact(&self, cache: &mut CachingNode) {
        let compactor = self.config.compactor();
        if !compactor.compact(cache.buckets_mut()) {
            tracing::warn!(
                module = %self.id,
                node = %cache.node(),
                threshold = compactor.threshold(),
                buckets = cache.buckets().len(),
                "compaction could not reach the threshold; more distinct relationship type and \
                 direction pairs than the threshold allows"
            );
        }
    }

    /// Rebuild every node's buckets from the relationships in the graph.
    pub async fn reinitialize<B: StorageBackend>(&self, backend: &B, tx: &mut B::Tx) -> Result<()> {
        let inclusion = self.config.inclusion();
        let weighing = self.config.weighing();
        let nodes = backend.all_nodes(tx).await?;
        let mut replayed = 0usize;

        for stored in &nodes {
            let stale: Vec<String> = stored.properties_with_prefix(&self.prefix).map(|(k, _)| k.clone()).collect();
            for key in &stale {
                backend.remove_node_property(tx, stored.id, key).await?;
            }

            let mut cache = CachingNode::empty(stored.id, self.prefix.as_str());
            for rel in backend.get_relationships(tx, stored.id, Direction::Both, None).await? {
                if !inclusion.include_relationship(&rel) {
                    continue;
                }
                let weight = weighing.weigh(&rel, stored.id);
                for direction in Direction::resolve(&rel, stored.id) {
                    cache.buckets_mut().increment(&inclusion.describe(&rel, direction), weight);
                }
                self.compact(&mut cache);
                replayed += 1;
            }
            cache.flush(backend, tx).await?;
        }

        self.mark_initialized();
        tracing::info!(module = %self.id, nodes = nodes.len(), replayed, "relationship counts reinitialized");
        Ok(())
    }
}

/// Distinct nodes `rel` is attached to.
fn endpoints(rel: &Relationship) -> SmallVec<[NodeId; 2]> {
    let mut nodes = SmallVec::new();
    nodes.push(rel.src);
    if !rel.is_loop() {
        nodes.push(rel.dst);
    }
    nodes
}
