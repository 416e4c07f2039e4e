//! In-process graph store: used for `--dry-run` builds and in tests.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use super::{GraphEdge, GraphNode, GraphStore};
use crate::error::{Result, TrialGraphError};
use crate::ids::Uid;

/// One call received by the store, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Node(GraphNode),
    Edge(GraphEdge),
}

#[derive(Default)]
struct Inner {
    ops: Vec<StoreOp>,
    nodes: BTreeMap<Uid, GraphNode>,
    edges: BTreeSet<(Uid, Uid, String)>,
    edge_list: Vec<GraphEdge>,
}

/// Graph store held in memory, with the same keying rules as the SQLite store
#[derive(Default)]
pub struct MemoryGraphStore {
    inner: Mutex<Inner>,
}

impl MemoryGraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave Inner half-updated.
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Every call received so far, duplicates included
    pub fn ops(&self) -> Vec<StoreOp> {
        self.lock().ops.clone()
    }

    /// Stored nodes ordered by uid
    pub fn nodes(&self) -> Vec<GraphNode> {
        self.lock().nodes.values().cloned().collect()
    }

    /// Stored edges in insertion order
    pub fn edges(&self) -> Vec<GraphEdge> {
        self.lock().edge_list.clone()
    }

    pub fn max_uid(&self) -> Option<Uid> {
        self.lock().nodes.keys().next_back().copied()
    }
}

#[async_trait]
impl GraphStore for MemoryGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<Uid> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::Node(node.clone()));
        inner.nodes.entry(node.uid()).or_insert_with(|| node.clone());
        Ok(node.uid())
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let mut inner = self.lock();
        inner.ops.push(StoreOp::Edge(edge.clone()));
        if !inner.nodes.contains_key(&edge.source) || !inner.nodes.contains_key(&edge.target) {
            return Err(TrialGraphError::DanglingEdge {
                source_uid: edge.source,
                target_uid: edge.target,
            });
        }
        let key = (edge.source, edge.target, edge.kind.relation().to_string());
        if inner.edges.insert(key) {
            inner.edge_list.push(edge.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::EdgeKind;

    fn word(uid: Uid, word: &str) -> GraphNode {
        GraphNode::Word {
            uid,
            word: word.to_string(),
            index: uid as usize,
        }
    }

    #[tokio::test]
    async fn test_node_upsert_keyed_by_uid() {
        let store = MemoryGraphStore::new();
        store.upsert_node(&word(1, "age")).await.unwrap();
        store.upsert_node(&word(1, "age")).await.unwrap();
        // same uid, different properties: first write wins
        store.upsert_node(&word(1, "other")).await.unwrap();

        assert_eq!(store.ops().len(), 3);
        assert_eq!(store.nodes(), vec![word(1, "age")]);
        assert_eq!(store.max_uid(), Some(1));
    }

    #[tokio::test]
    async fn test_edge_upsert_idempotent() {
        let store = MemoryGraphStore::new();
        store.upsert_node(&word(1, "age")).await.unwrap();
        store.upsert_node(&word(2, ">")).await.unwrap();
        let edge = GraphEdge::new(1, 2, EdgeKind::Dependency("nsubj".to_string()));
        store.upsert_edge(&edge).await.unwrap();
        store.upsert_edge(&edge).await.unwrap();

        assert_eq!(store.edges(), vec![edge]);
    }

    #[tokio::test]
    async fn test_dangling_edge_rejected() {
        let store = MemoryGraphStore::new();
        store.upsert_node(&word(1, "age")).await.unwrap();
        let err = store
            .upsert_edge(&GraphEdge::new(1, 99, EdgeKind::Parse))
            .await
            .unwrap_err();
        assert!(matches!(err, TrialGraphError::DanglingEdge { source_uid: 1, target_uid: 99 }));
        assert!(store.edges().is_empty());
    }
}
