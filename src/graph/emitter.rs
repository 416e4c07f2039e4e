use std::collections::HashMap;

use super::{EdgeKind, GraphEdge, GraphNode, GraphStore, Span};
use crate::annotate::{AnnotatedSentence, ParseTree, Token};
use crate::error::{Result, TrialGraphError};
use crate::ids::{IdAllocator, Uid};

/// Counts of what an emitter has sent to the store.
///
/// Upserts, not distinct elements: a word shared by several relations is
/// upserted once per relation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitStats {
    pub sentences: usize,
    pub node_upserts: usize,
    pub edge_upserts: usize,
}

/// Turns annotated sentences of one document into store upserts.
///
/// Each upsert is its own unit of work; a failure part way through a sentence
/// leaves the nodes already written in place.
pub struct GraphEmitter<'a> {
    store: &'a dyn GraphStore,
    ids: &'a IdAllocator,
    doc_id: String,
    stats: EmitStats,
}

/// A tree node in pre-order with the leaves it covers
struct FlatNode<'t> {
    tree: &'t ParseTree,
    parent: Option<usize>,
    first_leaf: usize,
    last_leaf: usize,
}

fn flatten(tree: &ParseTree) -> Vec<FlatNode<'_>> {
    let mut out = Vec::with_capacity(tree.size());
    let mut next_leaf = 0;
    flatten_into(tree, None, &mut next_leaf, &mut out);
    out
}

fn flatten_into<'t>(
    tree: &'t ParseTree,
    parent: Option<usize>,
    next_leaf: &mut usize,
    out: &mut Vec<FlatNode<'t>>,
) {
    let slot = out.len();
    out.push(FlatNode {
        tree,
        parent,
        first_leaf: *next_leaf,
        last_leaf: *next_leaf,
    });
    if tree.is_leaf() {
        *next_leaf += 1;
        return;
    }
    for child in &tree.children {
        flatten_into(child, Some(slot), next_leaf, out);
    }
    out[slot].last_leaf = *next_leaf - 1;
}

impl<'a> GraphEmitter<'a> {
    pub fn new(store: &'a dyn GraphStore, ids: &'a IdAllocator, doc_id: impl Into<String>) -> Self {
        Self {
            store,
            ids,
            doc_id: doc_id.into(),
            stats: EmitStats::default(),
        }
    }

    pub fn doc_id(&self) -> &str {
        &self.doc_id
    }

    pub fn stats(&self) -> EmitStats {
        self.stats
    }

    /// Write both subgraphs of one sentence.
    pub async fn emit(
        &mut self,
        sentence: &AnnotatedSentence,
        section: &str,
        sentence_index: usize,
    ) -> Result<()> {
        self.build_tree(sentence, section, sentence_index).await?;
        self.build_dependency(sentence, section, sentence_index).await?;
        self.stats.sentences += 1;
        Ok(())
    }

    /// Constituency subgraph: one node per constituent in pre-order, one edge
    /// from each parent. Edges leaving the root are `RootEdge`s.
    pub async fn build_tree(
        &mut self,
        sentence: &AnnotatedSentence,
        section: &str,
        sentence_index: usize,
    ) -> Result<()> {
        let flat = flatten(&sentence.tree);
        let mut uids: Vec<Uid> = Vec::with_capacity(flat.len());

        for entry in &flat {
            let span = leaf_span(&sentence.tokens, entry.first_leaf, entry.last_leaf)?;
            let uid = self.ids.next();
            let node = match entry.parent {
                None => GraphNode::TreeRoot {
                    uid,
                    category: entry.tree.label.clone(),
                    span,
                    section: section.to_string(),
                    sentence_index,
                    doc_id: self.doc_id.clone(),
                },
                Some(_) if entry.tree.is_leaf() => GraphNode::Text {
                    uid,
                    text: entry.tree.label.clone(),
                    span,
                },
                Some(_) => GraphNode::Parse {
                    uid,
                    category: entry.tree.label.clone(),
                    span,
                },
            };
            self.upsert_node(&node).await?;
            uids.push(uid);

            if let Some(parent) = entry.parent {
                let kind = if flat[parent].parent.is_none() {
                    EdgeKind::Root
                } else {
                    EdgeKind::Parse
                };
                self.upsert_edge(GraphEdge::new(uids[parent], uid, kind)).await?;
            }
        }

        log::debug!(
            "{} sentence {} ({}): {} tree nodes",
            self.doc_id,
            sentence_index,
            section,
            flat.len()
        );
        Ok(())
    }

    /// Dependency subgraph, edges taken in the order the annotator listed them.
    ///
    /// DIRECTION: each relation is stored from the *dependent* (target) word to
    /// the *governor* (source) word. Consumers query it that way; storing
    /// governor -> dependent would invert every relation.
    ///
    /// A token keeps one uid for the whole sentence no matter how many edges
    /// mention it. After the last edge a synthetic `ROOT` word is added and
    /// linked from that edge's governor. A sentence without edges gets no ROOT.
    pub async fn build_dependency(
        &mut self,
        sentence: &AnnotatedSentence,
        section: &str,
        sentence_index: usize,
    ) -> Result<()> {
        let ids = self.ids;
        let mut token_uids: HashMap<usize, Uid> = HashMap::new();
        let mut last_source: Option<Uid> = None;

        for dependency in &sentence.dependencies {
            let source_uid = *token_uids
                .entry(dependency.source.index)
                .or_insert_with(|| ids.next());
            let target_uid = *token_uids
                .entry(dependency.target.index)
                .or_insert_with(|| ids.next());

            self.upsert_node(&GraphNode::Word {
                uid: target_uid,
                word: dependency.target.word.clone(),
                index: dependency.target.index,
            })
            .await?;
            self.upsert_node(&GraphNode::Word {
                uid: source_uid,
                word: dependency.source.word.clone(),
                index: dependency.source.index,
            })
            .await?;
            self.upsert_edge(GraphEdge::new(
                target_uid,
                source_uid,
                EdgeKind::Dependency(dependency.relation.clone()),
            ))
            .await?;

            last_source = Some(source_uid);
        }

        if let Some(source_uid) = last_source {
            let root_uid = ids.next();
            self.upsert_node(&GraphNode::SentenceRoot {
                uid: root_uid,
                doc_id: self.doc_id.clone(),
                section: section.to_string(),
                sentence_index,
            })
            .await?;
            self.upsert_edge(GraphEdge::new(source_uid, root_uid, EdgeKind::SentenceRoot))
                .await?;
        }

        Ok(())
    }

    async fn upsert_node(&mut self, node: &GraphNode) -> Result<()> {
        self.store.upsert_node(node).await?;
        self.stats.node_upserts += 1;
        Ok(())
    }

    async fn upsert_edge(&mut self, edge: GraphEdge) -> Result<()> {
        self.store.upsert_edge(&edge).await?;
        self.stats.edge_upserts += 1;
        Ok(())
    }
}

/// Span from the first leaf's begin to the last leaf's end, end made inclusive.
fn leaf_span(tokens: &[Token], first_leaf: usize, last_leaf: usize) -> Result<Span> {
    let missing = |leaf: usize| {
        TrialGraphError::Annotation(format!(
            "leaf {} has no token offsets ({} tokens)",
            leaf,
            tokens.len()
        ))
    };
    let first = tokens.get(first_leaf).ok_or_else(|| missing(first_leaf))?;
    let last = tokens.get(last_leaf).ok_or_else(|| missing(last_leaf))?;
    Ok(Span {
        start: first.begin,
        end: last.end.saturating_sub(1),
    })
}
