//! Graph store backed by SQLite.

use async_trait::async_trait;
use rusqlite::params;

use super::{GraphEdge, GraphNode, GraphStore};
use crate::db::Db;
use crate::error::{Result, TrialGraphError};
use crate::ids::Uid;

/// Node and edge counts for reporting
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GraphStats {
    pub nodes_by_label: Vec<(String, i64)>,
    pub edges_by_relation: Vec<(String, i64)>,
}

/// Writes graph upserts to the `graph_nodes` / `graph_edges` tables.
///
/// Each upsert runs on its own connection; nothing spans statements.
#[derive(Debug, Clone)]
pub struct SqliteGraphStore {
    db: Db,
}

impl SqliteGraphStore {
    pub fn new(db: Db) -> Self {
        Self { db }
    }

    /// Highest uid persisted so far, if any
    pub async fn max_uid(&self) -> Result<Option<Uid>> {
        self.db
            .with_connection(|conn| {
                let max: Option<Uid> =
                    conn.query_row("SELECT MAX(uid) FROM graph_nodes", [], |row| row.get(0))?;
                Ok(max)
            })
            .await
    }

    pub async fn stats(&self) -> Result<GraphStats> {
        self.db
            .with_connection(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT label, COUNT(*) FROM graph_nodes GROUP BY label ORDER BY label",
                )?;
                let nodes_by_label = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

                let mut stmt = conn.prepare(
                    "SELECT relation, COUNT(*) FROM graph_edges GROUP BY relation \
                     ORDER BY COUNT(*) DESC, relation",
                )?;
                let edges_by_relation = stmt
                    .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))?
                    .collect::<std::result::Result<Vec<_>, rusqlite::Error>>()?;

                Ok(GraphStats {
                    nodes_by_label,
                    edges_by_relation,
                })
            })
            .await
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    async fn upsert_node(&self, node: &GraphNode) -> Result<Uid> {
        let uid = node.uid();
        let label = node.primary_label();
        let labels_json = serde_json::to_string(&node.labels())?;
        let properties_json = serde_json::to_string(&node.properties())?;

        self.db
            .with_connection(move |conn| {
                conn.execute(
                    "INSERT INTO graph_nodes (uid, label, labels_json, properties_json) \
                     VALUES (?1, ?2, ?3, ?4) \
                     ON CONFLICT(uid) DO NOTHING",
                    params![uid, label, labels_json, properties_json],
                )?;
                Ok(uid)
            })
            .await
    }

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()> {
        let source = edge.source;
        let target = edge.target;
        let relation = edge.kind.relation().to_string();

        self.db
            .with_connection(move |conn| {
                let expected = if source == target { 1 } else { 2 };
                let found: i64 = conn.query_row(
                    "SELECT COUNT(*) FROM graph_nodes WHERE uid IN (?1, ?2)",
                    params![source, target],
                    |row| row.get(0),
                )?;
                if found != expected {
                    return Err(TrialGraphError::DanglingEdge {
                        source_uid: source,
                        target_uid: target,
                    });
                }

                conn.execute(
                    "INSERT OR IGNORE INTO graph_edges (source_uid, target_uid, relation) \
                     VALUES (?1, ?2, ?3)",
                    params![source, target, relation],
                )?;
                Ok(())
            })
            .await
    }
}
