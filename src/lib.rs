//! # relcount: Relationship Count Cache for Property Graphs
//!
//! Keeps, per node, a bounded cache of relationship counts broken down by
//! type, direction and relationship properties, and answers
//! `count(node, description)` from it whenever the cache can tell.
//!
//! ## Design Principles
//!
//! 1. **Lattice first**: descriptions form a generalization partial order;
//!    everything else (compaction, resolution) is built on it
//! 2. **Trait-first storage**: `StorageBackend` is the contract with the host graph
//! 3. **Explicit configuration**: thresholds and policies are values, never globals
//! 4. **Refuse, don't guess**: the cache reports `UnableToCount` rather than a wrong number
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use relcount::{Direction, Graph, RelationshipDescription, RelcountConfig, TxMode, props};
//!
//! # async fn example() -> relcount::Result<()> {
//! let graph = Graph::open_memory().await?;
//! graph.register_module("relcount", RelcountConfig::default()).await?;
//!
//! let mut tx = graph.begin(TxMode::ReadWrite).await?;
//! let ada = tx.create_node(&["Person"], props([("name", "Ada")])).await?;
//! let bob = tx.create_node(&["Person"], props([("name", "Bob")])).await?;
//! tx.create_relationship(ada, bob, "FRIEND", props([("level", 2)])).await?;
//! tx.commit().await?;
//!
//! let counter = graph.fallback_counter("relcount")?;
//! let query = RelationshipDescription::wildcard("FRIEND", Direction::Outgoing).with("level", 2);
//! assert_eq!(graph.count(&counter, ada, &query).await?, 1);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod description;
pub mod cache;
pub mod compact;
pub mod count;
pub mod policy;
pub mod config;
pub mod module;
pub mod storage;
pub mod tx;

use std::sync::Arc;

use parking_lot::RwLock;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Node, Relationship, Value, PropertyMap, props,
    NodeId, RelId, Direction,
};

// ============================================================================
// Re-exports: Lattice, cache and counting
// ============================================================================

pub use description::{Predicate, PropertiesDescription, RelationshipDescription, Semantics};
pub use cache::{BucketSet, CachingNode, Resolution};
pub use compact::{
    AverageCardinality, CompactionStrategy, GeneralizationStrategy, MostSpecificGeneralization,
    ThresholdCompactor,
};
pub use count::{
    CachedRelationshipCounter, FallbackRelationshipCounter,
    NaiveRelationshipCounter, RelationshipCounter,
};
pub use policy::InclusionPolicies;
pub use config::{Generalization, ModuleSettings, RelcountConfig};
pub use module::RelationshipCountModule;

// ============================================================================
// Re-exports: Storage and transactions
// ============================================================================

pub use storage::StorageBackend;
pub use tx::{RelationshipEvent, Transaction, TxMode, TxId};

// ============================================================================
// Top-level Graph handle
// ============================================================================

/// The primary entry point. A `Graph` wraps a storage backend and the
/// relationship count modules maintained on it.
pub struct Graph<B: StorageBackend> {
    backend: B,
    modules: RwLock<Vec<Arc<RelationshipCountModule>>>,
}

impl<B: StorageBackend> Graph<B> {
    /// Create a Graph with the given backend.
    pub fn with_backend(backend: B) -> Self {
        Self { backend, modules: RwLock::new(Vec::new()) }
    }

    /// Access the underlying backend (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Register a new relationship count module.
    ///
    /// On an empty graph the module starts initialized. Otherwise it stays
    /// uninitialized, and its cache unavailable, until [`Graph::reinitialize`].
    pub async fn register_module(
        &self,
        id: &str,
        config: RelcountConfig,
    ) -> Result<Arc<RelationshipCountModule>> {
        if self.module(id).is_some() {
            return Err(Error::Config(format!("module '{id}' is already registered")));
        }
        let module = Arc::new(RelationshipCountModule::new(id, config)?);

        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let existing = self.backend.relationship_count(&tx).await?;
        self.backend.commit_tx(tx).await?;

        if existing == 0 {
            module.mark_initialized();
        } else {
            tracing::warn!(module = id, existing, "module registered on a non-empty graph; reinitialize before cached counting");
        }

        let mut modules = self.modules.write();
        if modules.iter().any(|m| m.id() == id) {
            return Err(Error::Config(format!("module '{id}' is already registered")));
        }
        modules.push(Arc::clone(&module));
        Ok(module)
    }

    /// Register a module from serialized settings with default policies.
    pub async fn register_from_settings(&self, settings: &ModuleSettings) -> Result<Arc<RelationshipCountModule>> {
        self.register_module(&settings.id, settings.to_config()?).await
    }

    /// Register or replace module `id` with `config`, then rebuild its cache.
    pub async fn configure(&self, id: &str, config: RelcountConfig) -> Result<Arc<RelationshipCountModule>> {
        let module = Arc::new(RelationshipCountModule::new(id, config)?);
        {
            let mut modules = self.modules.write();
            modules.retain(|m| m.id() != id);
            modules.push(Arc::clone(&module));
        }
        self.reinitialize(id).await?;
        Ok(module)
    }

    pub fn module(&self, id: &str) -> Option<Arc<RelationshipCountModule>> {
        self.modules.read().iter().find(|m| m.id() == id).cloned()
    }

    pub fn modules(&self) -> Vec<Arc<RelationshipCountModule>> {
        self.modules.read().clone()
    }

    /// Discard module `id`'s buckets and rebuild them from every relationship.
    pub async fn reinitialize(&self, id: &str) -> Result<()> {
        let module = self
            .module(id)
            .ok_or_else(|| Error::NotFound(format!("module '{id}'")))?;
        let mut tx = self.backend.begin_tx(TxMode::ReadWrite).await?;
        module.reinitialize(&self.backend, &mut tx).await?;
        self.backend.commit_tx(tx).await
    }

    /// Begin an explicit transaction.
    pub async fn begin(&self, mode: TxMode) -> Result<ExplicitTx<'_, B>> {
        let tx = self.backend.begin_tx(mode).await?;
        Ok(ExplicitTx { graph: self, tx })
    }

    // ========================================================================
    // Counters
    // ========================================================================

    /// Full-scan counter with default policies.
    pub fn naive_counter(&self) -> NaiveRelationshipCounter {
        NaiveRelationshipCounter::default()
    }

    /// Full-scan counter using module `id`'s policies.
    pub fn naive_counter_for(&self, id: &str) -> Result<NaiveRelationshipCounter> {
        Ok(NaiveRelationshipCounter::new(self.registered(id)?.config().clone()))
    }

    pub fn cached_counter(&self, id: &str) -> Result<CachedRelationshipCounter> {
        Ok(CachedRelationshipCounter::new(self.registered(id)?))
    }

    pub fn fallback_counter(&self, id: &str) -> Result<FallbackRelationshipCounter> {
        Ok(FallbackRelationshipCounter::new(self.registered(id)?))
    }

    fn registered(&self, id: &str) -> Result<Arc<RelationshipCountModule>> {
        self.module(id)
            .ok_or_else(|| Error::CacheUnavailable(format!("no module '{id}' is registered")))
    }

    /// Count in a fresh read-only transaction.
    pub async fn count<C>(&self, counter: &C, node: NodeId, query: &RelationshipDescription) -> Result<u64>
    where
        C: RelationshipCounter<B>,
    {
        let tx = self.backend.begin_tx(TxMode::ReadOnly).await?;
        let result = counter.count(&self.backend, &tx, node, query).await;
        self.backend.commit_tx(tx).await?;
        result
    }
}

/// In-memory graph for testing and embedding.
impl Graph<storage::MemoryBackend> {
    pub async fn open_memory() -> Result<Self> {
        let backend = storage::MemoryBackend::new();
        Ok(Self::with_backend(backend))
    }
}

/// Explicit transaction handle.
///
/// Every relationship mutation is applied to the backend and then delivered
/// to each registered module, in order, inside this transaction.
pub struct ExplicitTx<'g, B: StorageBackend> {
    graph: &'g Graph<B>,
    tx: B::Tx,
}

impl<'g, B: StorageBackend> ExplicitTx<'g, B> {
    pub fn tx(&self) -> &B::Tx {
        &self.tx
    }

    pub async fn create_node(&mut self, labels: &[&str], props: PropertyMap) -> Result<NodeId> {
        self.graph.backend.create_node(&mut self.tx, labels, props).await
    }

    pub async fn get_node(&self, id: NodeId) -> Result<Option<Node>> {
        self.graph.backend.get_node(&self.tx, id).await
    }

    pub async fn get_relationship(&self, id: RelId) -> Result<Option<Relationship>> {
        self.graph.backend.get_relationship(&self.tx, id).await
    }

    pub async fn create_relationship(
        &mut self,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        let id = self.graph.backend.create_relationship(&mut self.tx, src, dst, rel_type, props).await?;
        let rel = self.snapshot(id).await?;
        self.dispatch(RelationshipEvent::Created(rel)).await?;
        Ok(id)
    }

    /// Returns false if the relationship did not exist.
    pub async fn delete_relationship(&mut self, id: RelId) -> Result<bool> {
        let Some(rel) = self.graph.backend.get_relationship(&self.tx, id).await? else {
            return Ok(false);
        };
        self.graph.backend.delete_relationship(&mut self.tx, id).await?;
        self.dispatch(RelationshipEvent::Deleted(rel)).await?;
        Ok(true)
    }

    pub async fn set_relationship_property(&mut self, id: RelId, key: &str, value: Value) -> Result<()> {
        let before = self.snapshot(id).await?;
        self.graph.backend.set_relationship_property(&mut self.tx, id, key, value).await?;
        let after = self.snapshot(id).await?;
        self.dispatch(RelationshipEvent::Changed { before, after }).await
    }

    pub async fn remove_relationship_property(&mut self, id: RelId, key: &str) -> Result<()> {
        let before = self.snapshot(id).await?;
        self.graph.backend.remove_relationship_property(&mut self.tx, id, key).await?;
        let after = self.snapshot(id).await?;
        self.dispatch(RelationshipEvent::Changed { before, after }).await
    }

    /// Delete a node after deleting each of its relationships.
    pub async fn detach_delete_node(&mut self, id: NodeId) -> Result<bool> {
        let rels = self
            .graph
            .backend
            .get_relationships(&self.tx, id, Direction::Both, None)
            .await?;
        for rel in rels {
            self.delete_relationship(rel.id).await?;
        }
        self.graph.backend.delete_node(&mut self.tx, id).await
    }

    /// Count within this transaction.
    pub async fn count<C>(&self, counter: &C, node: NodeId, query: &RelationshipDescription) -> Result<u64>
    where
        C: RelationshipCounter<B>,
    {
        counter.count(&self.graph.backend, &self.tx, node, query).await
    }

    pub async fn commit(self) -> Result<()> {
        self.graph.backend.commit_tx(self.tx).await
    }

    pub async fn rollback(self) -> Result<()> {
        self.graph.backend.rollback_tx(self.tx).await
    }

    async fn snapshot(&self, id: RelId) -> Result<Relationship> {
        self.graph
            .backend
            .get_relationship(&self.tx, id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))
    }

    async fn dispatch(&mut self, event: RelationshipEvent) -> Result<()> {
        for module in self.graph.modules() {
            module.handle(&self.graph.backend, &mut self.tx, &event).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The cache can't resolve the query exactly; a full scan can.
    #[error("Unable to count: {0}")]
    UnableToCount(String),

    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
}

impl Error {
    pub fn is_unable_to_count(&self) -> bool {
        matches!(self, Error::UnableToCount(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
