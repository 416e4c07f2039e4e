//! Sentence graphs: node/edge model, the store protocol, and the emitter.
//!
//! Every sentence yields two subgraphs: its constituency tree (`ParseNode`,
//! `TextNode`, `RootEdge`, `ParseEdge`) and its dependency graph (`WordNode`
//! plus one edge per grammatical relation, closed by a `root` edge).

mod emitter;
mod memory;
mod sqlite;

pub use emitter::{EmitStats, GraphEmitter};
pub use memory::{MemoryGraphStore, StoreOp};
pub use sqlite::{GraphStats, SqliteGraphStore};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeSet;

use crate::error::Result;
use crate::ids::Uid;

pub const PARSE_NODE: &str = "ParseNode";
pub const TEXT_NODE: &str = "TextNode";
pub const WORD_NODE: &str = "WordNode";

/// Character span of a constituent; `end` is inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GraphNode {
    /// Root of a constituency tree, carrying the sentence's provenance.
    TreeRoot {
        uid: Uid,
        category: String,
        span: Span,
        section: String,
        sentence_index: usize,
        doc_id: String,
    },
    /// Internal constituent such as `NP`.
    Parse { uid: Uid, category: String, span: Span },
    /// Token leaf.
    Text { uid: Uid, text: String, span: Span },
    /// Dependency vertex; `index` is the 1-based token position.
    Word { uid: Uid, word: String, index: usize },
    /// Synthetic `ROOT` word anchoring a sentence's dependency graph.
    SentenceRoot {
        uid: Uid,
        doc_id: String,
        section: String,
        sentence_index: usize,
    },
}

impl GraphNode {
    pub fn uid(&self) -> Uid {
        match self {
            GraphNode::TreeRoot { uid, .. }
            | GraphNode::Parse { uid, .. }
            | GraphNode::Text { uid, .. }
            | GraphNode::Word { uid, .. }
            | GraphNode::SentenceRoot { uid, .. } => *uid,
        }
    }

    /// The label queries group by.
    pub fn primary_label(&self) -> &'static str {
        match self {
            GraphNode::TreeRoot { .. } | GraphNode::Parse { .. } => PARSE_NODE,
            GraphNode::Text { .. } => TEXT_NODE,
            GraphNode::Word { .. } | GraphNode::SentenceRoot { .. } => WORD_NODE,
        }
    }

    pub fn labels(&self) -> BTreeSet<String> {
        let mut labels = BTreeSet::from([self.primary_label().to_string()]);
        match self {
            GraphNode::TreeRoot { category, .. } | GraphNode::Parse { category, .. } => {
                labels.insert(category.clone());
            }
            _ => {}
        }
        labels
    }

    pub fn properties(&self) -> Map<String, Value> {
        let mut props = Map::new();
        match self {
            GraphNode::TreeRoot {
                span,
                section,
                sentence_index,
                doc_id,
                ..
            } => {
                props.insert("section".into(), section.clone().into());
                props.insert("sentence_index".into(), (*sentence_index).into());
                props.insert("doc_id".into(), doc_id.clone().into());
                insert_span(&mut props, span);
            }
            GraphNode::Parse { span, .. } => insert_span(&mut props, span),
            GraphNode::Text { text, span, .. } => {
                props.insert("text".into(), text.clone().into());
                insert_span(&mut props, span);
            }
            GraphNode::Word { word, index, .. } => {
                props.insert("word".into(), word.clone().into());
                props.insert("idx".into(), (*index).into());
            }
            GraphNode::SentenceRoot {
                doc_id,
                section,
                sentence_index,
                ..
            } => {
                props.insert("word".into(), "ROOT".into());
                props.insert("idx".into(), 0.into());
                props.insert("doc_id".into(), doc_id.clone().into());
                props.insert("section".into(), section.clone().into());
                props.insert("sentence_index".into(), (*sentence_index).into());
            }
        }
        props.insert("uid".into(), self.uid().into());
        props
    }
}

fn insert_span(props: &mut Map<String, Value>, span: &Span) {
    props.insert("start_offset".into(), span.start.into());
    props.insert("end_offset".into(), span.end.into());
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EdgeKind {
    /// Tree root to its immediate child.
    Root,
    /// Constituent to child, below the root.
    Parse,
    /// Grammatical relation, stored dependent -> governor.
    Dependency(String),
    /// Last governor of a sentence to its synthetic ROOT word.
    SentenceRoot,
}

impl EdgeKind {
    pub fn relation(&self) -> &str {
        match self {
            EdgeKind::Root => "RootEdge",
            EdgeKind::Parse => "ParseEdge",
            EdgeKind::Dependency(relation) => relation,
            EdgeKind::SentenceRoot => "root",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphEdge {
    pub source: Uid,
    pub target: Uid,
    pub kind: EdgeKind,
}

impl GraphEdge {
    pub fn new(source: Uid, target: Uid, kind: EdgeKind) -> Self {
        Self { source, target, kind }
    }
}

/// Minimal upsert protocol the emitter writes through.
///
/// Both operations are idempotent. Nodes are keyed by `uid` alone and never
/// updated once stored; edges are keyed by (source, target, relation) and
/// must reference stored nodes.
#[async_trait]
pub trait GraphStore: Send + Sync {
    async fn upsert_node(&self, node: &GraphNode) -> Result<Uid>;

    async fn upsert_edge(&self, edge: &GraphEdge) -> Result<()>;
}
