//! In-memory storage backend.
//!
//! This is the reference implementation of `StorageBackend`.
//! It uses simple HashMaps protected by RwLock.
//!
//! ## Limitations
//!
//! - **No real transactions**: `commit_tx()` and `rollback_tx()` are no-ops.
//!   Writes are applied immediately. Rollback does NOT undo mutations.
//! - **Single-writer only**: Per-collection locks mean multi-step mutations
//!   are NOT atomic. Safe for single-threaded or read-heavy use only.
//!
//! Use this backend for:
//! - Testing the maintainer and the counters
//! - Embedding the cache in applications that don't need persistence

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use parking_lot::RwLock;
use async_trait::async_trait;

use crate::model::*;
use crate::tx::{Transaction, TxMode, TxId};
use crate::{Error, Result};
use super::StorageBackend;

// ============================================================================
// MemoryBackend
// ============================================================================

/// In-memory property graph storage.
#[derive(Clone)]
pub struct MemoryBackend {
    inner: Arc<MemoryInner>,
}

struct MemoryInner {
    nodes: RwLock<HashMap<NodeId, Node>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs, in creation order
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                nodes: RwLock::new(HashMap::new()),
                relationships: RwLock::new(HashMap::new()),
                adjacency: RwLock::new(HashMap::new()),
                next_node_id: AtomicU64::new(1),
                next_rel_id: AtomicU64::new(1),
                next_tx_id: AtomicU64::new(1),
            }),
        }
    }
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// MemoryTx
// ============================================================================

/// In-memory transaction (a marker; there is no MVCC).
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

fn ensure_writable(tx: &MemoryTx) -> Result<()> {
    if tx.mode == TxMode::ReadOnly {
        return Err(Error::TxError(format!("transaction {} is read-only", tx.id.0)));
    }
    Ok(())
}

// ============================================================================
// StorageBackend impl
// ============================================================================

#[async_trait]
impl StorageBackend for MemoryBackend {
    type Tx = MemoryTx;

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        Ok(MemoryTx { id, mode })
    }

    /// No-op: memory backend applies writes immediately, not on commit.
    async fn commit_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    /// WARNING: No-op. Memory backend has no write-ahead log.
    /// Mutations applied during this transaction are NOT reverted.
    async fn rollback_tx(&self, _tx: MemoryTx) -> Result<()> { Ok(()) }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_node(
        &self,
        tx: &mut MemoryTx,
        labels: &[&str],
        props: PropertyMap,
    ) -> Result<NodeId> {
        ensure_writable(tx)?;
        let id = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        let node = Node {
            id,
            labels: labels.iter().map(|l| l.to_string()).collect(),
            properties: props,
        };

        self.inner.nodes.write().insert(id, node);
        self.inner.adjacency.write().insert(id, Vec::new());

        Ok(id)
    }

    async fn get_node(&self, _tx: &MemoryTx, id: NodeId) -> Result<Option<Node>> {
        Ok(self.inner.nodes.read().get(&id).cloned())
    }

    async fn delete_node(&self, tx: &mut MemoryTx, id: NodeId) -> Result<bool> {
        ensure_writable(tx)?;
        {
            let adj = self.inner.adjacency.read();
            if let Some(rels) = adj.get(&id) {
                if !rels.is_empty() {
                    return Err(Error::ConstraintViolation(
                        format!("Cannot delete node {id} with {} relationships. Delete relationships first.", rels.len())
                    ));
                }
            }
        }

        let removed = self.inner.nodes.write().remove(&id);
        self.inner.adjacency.write().remove(&id);
        Ok(removed.is_some())
    }

    async fn set_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        node.properties.insert(key.to_string(), val);
        Ok(())
    }

    async fn remove_node_property(
        &self,
        tx: &mut MemoryTx,
        id: NodeId,
        key: &str,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut nodes = self.inner.nodes.write();
        let node = nodes.get_mut(&id).ok_or_else(|| Error::NotFound(format!("Node {id}")))?;
        node.properties.remove(key);
        Ok(())
    }

    // ========================================================================
    // Relationship CRUD
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: &str,
        props: PropertyMap,
    ) -> Result<RelId> {
        ensure_writable(tx)?;
        // Verify both nodes exist
        {
            let nodes = self.inner.nodes.read();
            if !nodes.contains_key(&src) {
                return Err(Error::NotFound(format!("Source node {src}")));
            }
            if !nodes.contains_key(&dst) {
                return Err(Error::NotFound(format!("Target node {dst}")));
            }
        }

        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        let rel = Relationship {
            id,
            src,
            dst,
            rel_type: rel_type.to_string(),
            properties: props,
        };

        self.inner.relationships.write().insert(id, rel);

        // Update adjacency for both endpoints
        let mut adj = self.inner.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }

        Ok(id)
    }

    async fn get_relationship(&self, _tx: &MemoryTx, id: RelId) -> Result<Option<Relationship>> {
        Ok(self.inner.relationships.read().get(&id).cloned())
    }

    async fn set_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
        val: Value,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        rel.properties.insert(key.to_string(), val);
        Ok(())
    }

    async fn remove_relationship_property(
        &self,
        tx: &mut MemoryTx,
        id: RelId,
        key: &str,
    ) -> Result<()> {
        ensure_writable(tx)?;
        let mut rels = self.inner.relationships.write();
        let rel = rels.get_mut(&id)
            .ok_or_else(|| Error::NotFound(format!("Relationship {id}")))?;
        rel.properties.remove(key);
        Ok(())
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        ensure_writable(tx)?;
        let removed = self.inner.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.inner.adjacency.write();
            if let Some(rels) = adj.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = adj.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        Ok(removed.is_some())
    }

    // ========================================================================
    // Traversal
    // ========================================================================

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<&str>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let rel_ids = adj.get(&node).cloned().unwrap_or_default();
        let mut result = Vec::new();

        for rid in rel_ids {
            if let Some(rel) = rels.get(&rid) {
                let matches_dir = match dir {
                    Direction::Outgoing => rel.src == node,
                    Direction::Incoming => rel.dst == node,
                    Direction::Both => true,
                };
                let matches_type = rel_type.map_or(true, |t| rel.rel_type == t);

                if matches_dir && matches_type {
                    result.push(rel.clone());
                }
            }
        }

        Ok(result)
    }

    // ========================================================================
    // Scan
    // ========================================================================

    async fn all_nodes(&self, _tx: &MemoryTx) -> Result<Vec<Node>> {
        let mut nodes: Vec<Node> = self.inner.nodes.read().values().cloned().collect();
        nodes.sort_by_key(|n| n.id);
        Ok(nodes)
    }

    async fn relationship_count(&self, _tx: &MemoryTx) -> Result<u64> {
        Ok(self.inner.relationships.read().len() as u64)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let id = db.create_node(&mut tx, &["Person"], props([("name", "Ada")])).await.unwrap();
        let node = db.get_node(&tx, id).await.unwrap().unwrap();

        assert_eq!(node.labels, vec!["Person"]);
        assert_eq!(node.get("name"), Some(&Value::from("Ada")));
    }

    #[tokio::test]
    async fn test_read_only_tx_rejects_writes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let result = db.create_node(&mut tx, &[], PropertyMap::new()).await;
        assert!(matches!(result, Err(Error::TxError(_))));
    }

    #[tokio::test]
    async fn test_cannot_delete_connected_node() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();

        let result = db.delete_node(&mut tx, a).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_self_loop_listed_once() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, a, "SELF", PropertyMap::new()).await.unwrap();

        assert_eq!(db.get_relationships(&tx, a, Direction::Both, None).await.unwrap().len(), 1);
        assert_eq!(db.get_relationships(&tx, a, Direction::Outgoing, None).await.unwrap().len(), 1);
        assert_eq!(db.get_relationships(&tx, a, Direction::Incoming, None).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_relationship_properties() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &["Person"], PropertyMap::new()).await.unwrap();
        let rel_id = db.create_relationship(
            &mut tx, a, b, "KNOWS", PropertyMap::new(),
        ).await.unwrap();

        db.set_relationship_property(&mut tx, rel_id, "since", Value::from(2025i64)).await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();
        assert_eq!(rel.properties.get("since"), Some(&Value::from(2025i64)));

        db.remove_relationship_property(&mut tx, rel_id, "since").await.unwrap();
        let rel = db.get_relationship(&tx, rel_id).await.unwrap().unwrap();
        assert!(rel.properties.get("since").is_none());
    }

    #[tokio::test]
    async fn test_relationships_filtered_by_direction_and_type() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let a = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();
        let b = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "KNOWS", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, b, a, "KNOWS", PropertyMap::new()).await.unwrap();
        db.create_relationship(&mut tx, a, b, "WORKS_WITH", PropertyMap::new()).await.unwrap();

        let out = db.get_relationships(&tx, a, Direction::Outgoing, Some("KNOWS")).await.unwrap();
        assert_eq!(out.len(), 1);
        let all = db.get_relationships(&tx, a, Direction::Both, None).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(db.relationship_count(&tx).await.unwrap(), 3);
    }
}
