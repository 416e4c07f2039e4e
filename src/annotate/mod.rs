//! Linguistic annotation consumed from an external server.
//!
//! The annotator is a black box: given raw text it returns, per sentence, a
//! constituency tree, a dependency edge list and token offsets.

mod corenlp;
mod tree;

pub use corenlp::{annotation_from_json, CoreNlpClient};
pub use tree::ParseTree;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// A token with character offsets into the annotated text (end exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub begin: usize,
    pub end: usize,
}

/// A dependency endpoint: the word and its 1-based index in the sentence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenRef {
    pub word: String,
    pub index: usize,
}

impl TokenRef {
    pub fn new(word: impl Into<String>, index: usize) -> Self {
        Self {
            word: word.into(),
            index,
        }
    }
}

/// One grammatical relation, `source` being the governor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub source: TokenRef,
    pub target: TokenRef,
    pub relation: String,
}

#[derive(Debug, Clone)]
pub struct AnnotatedSentence {
    pub tree: ParseTree,
    pub dependencies: Vec<DependencyEdge>,
    /// Indexed by leaf position in `tree`.
    pub tokens: Vec<Token>,
}

/// The annotator's answer for one text section.
#[derive(Debug, Clone)]
pub struct Annotation {
    pub sentences: Vec<AnnotatedSentence>,
    /// Response as received, written to the annotation record.
    pub raw: Value,
}

/// Anything that can annotate a run of text
#[async_trait]
pub trait Annotator: Send + Sync {
    async fn annotate(&self, text: &str) -> Result<Annotation>;
}
