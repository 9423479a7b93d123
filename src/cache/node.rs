//! A node's bucket set bound to its persisted form.

use hashbrown::HashMap;

use super::BucketSet;
use crate::description::key;
use crate::model::{NodeId, Value};
use crate::storage::StorageBackend;
use crate::{Error, Result};

/// Buckets of one node under one namespace prefix.
///
/// Holds the counts as they were loaded so that [`CachingNode::flush`]
/// writes back only the keys that changed.
#[derive(Debug, Clone)]
pub struct CachingNode {
    node: NodeId,
    prefix: String,
    loaded: HashMap<String, u64>,
    buckets: BucketSet,
}

impl CachingNode {
    /// A node with nothing cached yet.
    pub fn empty(node: NodeId, prefix: impl Into<String>) -> Self {
        Self {
            node,
            prefix: prefix.into(),
            loaded: HashMap::new(),
            buckets: BucketSet::new(),
        }
    }

    /// Read every `prefix`ed property of `node` back into buckets.
    pub async fn load<B: StorageBackend>(
        backend: &B,
        tx: &B::Tx,
        node: NodeId,
        prefix: &str,
    ) -> Result<Self> {
        let stored = backend
            .get_node(tx, node)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Node {node}")))?;

        let mut this = Self::empty(node, prefix);
        for (raw, value) in stored.properties_with_prefix(prefix) {
            let count = match value {
                Value::Int(n) if *n >= 0 => *n as u64,
                Value::Int(n) => {
                    return Err(Error::InvariantViolation(format!(
                        "negative count {n} under '{raw}' on node {node}"
                    )));
                }
                other => {
                    return Err(Error::Decode(format!(
                        "count under '{raw}' on node {node} is a {}",
                        other.type_name()
                    )));
                }
            };
            let description = key::decode(prefix, raw)?;
            this.buckets.insert(description, count);
            this.loaded.insert(raw.clone(), count);
        }
        Ok(this)
    }

    pub fn node(&self) -> NodeId {
        self.node
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn buckets(&self) -> &BucketSet {
        &self.buckets
    }

    pub fn buckets_mut(&mut self) -> &mut BucketSet {
        &mut self.buckets
    }

    /// Is the in-memory state different from what was last loaded or flushed?
    pub fn is_dirty(&self) -> bool {
        self.current() != self.loaded
    }

    fn current(&self) -> HashMap<String, u64> {
        self.buckets
            .iter()
            .map(|(d, c)| (key::encode(&self.prefix, d), c))
            .collect()
    }

    /// Persist changed buckets and drop the ones that disappeared.
    ///
    /// Returns the number of properties written or removed.
    pub async fn flush<B: StorageBackend>(&mut self, backend: &B, tx: &mut B::Tx) -> Result<usize> {
        let current = self.current();
        let mut touched = 0;

        for raw in self.loaded.keys() {
            if !current.contains_key(raw) {
                backend.remove_node_property(tx, self.node, raw).await?;
                touched += 1;
            }
        }

        for (raw, count) in &current {
            if self.loaded.get(raw) != Some(count) {
                let value = i64::try_from(*count).map_err(|_| {
                    Error::InvariantViolation(format!("count {count} under '{raw}' overflows"))
                })?;
                backend.set_node_property(tx, self.node, raw, Value::Int(value)).await?;
                touched += 1;
            }
        }

        self.loaded = current;
        Ok(touched)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::description::RelationshipDescription;
    use crate::model::{Direction, PropertyMap};
    use crate::storage::MemoryBackend;
    use crate::tx::TxMode;

    const PREFIX: &str = "_GA_RC_relcount#";

    #[tokio::test]
    async fn test_flush_then_load_restores_buckets() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let id = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();

        let friend = RelationshipDescription::literal("FRIEND", Direction::Outgoing).with("level", 2);
        let mut node = CachingNode::empty(id, PREFIX);
        node.buckets_mut().insert(friend.clone(), 3);
        assert!(node.is_dirty());
        assert_eq!(node.flush(&db, &mut tx).await.unwrap(), 1);
        assert!(!node.is_dirty());

        let reloaded = CachingNode::load(&db, &tx, id, PREFIX).await.unwrap();
        assert_eq!(reloaded.buckets().get(&friend), Some(3));
    }

    #[tokio::test]
    async fn test_flush_writes_only_changes() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let id = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();

        let a = RelationshipDescription::literal("A", Direction::Outgoing);
        let b = RelationshipDescription::literal("B", Direction::Incoming);
        let mut node = CachingNode::empty(id, PREFIX);
        node.buckets_mut().insert(a.clone(), 1);
        node.buckets_mut().insert(b.clone(), 1);
        node.flush(&db, &mut tx).await.unwrap();

        node.buckets_mut().remove(&a);
        assert_eq!(node.flush(&db, &mut tx).await.unwrap(), 1);

        let stored = db.get_node(&tx, id).await.unwrap().unwrap();
        assert_eq!(stored.properties_with_prefix(PREFIX).count(), 1);
    }

    #[tokio::test]
    async fn test_load_ignores_foreign_properties() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let id = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();
        db.set_node_property(&mut tx, id, "name", Value::from("Ada")).await.unwrap();
        db.set_node_property(&mut tx, id, "_GA_RC_other#A#OUTGOING", Value::Int(4)).await.unwrap();

        let node = CachingNode::load(&db, &tx, id, PREFIX).await.unwrap();
        assert!(node.buckets().is_empty());
    }

    #[tokio::test]
    async fn test_load_rejects_bad_counts() {
        let db = MemoryBackend::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let id = db.create_node(&mut tx, &[], PropertyMap::new()).await.unwrap();
        let raw = format!("{PREFIX}A#OUTGOING");

        db.set_node_property(&mut tx, id, &raw, Value::Int(-1)).await.unwrap();
        let err = CachingNode::load(&db, &tx, id, PREFIX).await.unwrap_err();
        assert!(matches!(err, Error::InvariantViolation(_)));

        db.set_node_property(&mut tx, id, &raw, Value::from("two")).await.unwrap();
        let err = CachingNode::load(&db, &tx, id, PREFIX).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn test_load_missing_node() {
        let db = MemoryBackend::new();
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let err = CachingNode::load(&db, &tx, NodeId(99), PREFIX).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
