//! Bracketed constituency trees, e.g. `(ROOT (S (NP (NN age)) (. .)))`.

use crate::error::{Result, TrialGraphError};

/// A constituent; leaves are tokens and have no children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseTree {
    pub label: String,
    pub children: Vec<ParseTree>,
}

impl ParseTree {
    pub fn leaf(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            children: Vec::new(),
        }
    }

    pub fn node(label: impl Into<String>, children: Vec<ParseTree>) -> Self {
        Self {
            label: label.into(),
            children,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Number of constituents, root and leaves included.
    pub fn size(&self) -> usize {
        1 + self.children.iter().map(ParseTree::size).sum::<usize>()
    }

    #[cfg(test)]
    pub(crate) fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(ParseTree::leaf_count).sum()
        }
    }

    /// Read a tree in Penn Treebank bracket notation.
    pub fn parse_bracketed(text: &str) -> Result<Self> {
        let tokens = lex(text);
        let mut pos = 0;
        let tree = parse_node(&tokens, &mut pos)?;
        if pos != tokens.len() {
            return Err(malformed("trailing input after the root constituent"));
        }
        Ok(tree)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Lexeme {
    Open,
    Close,
    Atom(String),
}

fn lex(text: &str) -> Vec<Lexeme> {
    let mut out = Vec::new();
    let mut atom = String::new();
    for ch in text.chars() {
        match ch {
            '(' | ')' => {
                if !atom.is_empty() {
                    out.push(Lexeme::Atom(std::mem::take(&mut atom)));
                }
                out.push(if ch == '(' { Lexeme::Open } else { Lexeme::Close });
            }
            c if c.is_whitespace() => {
                if !atom.is_empty() {
                    out.push(Lexeme::Atom(std::mem::take(&mut atom)));
                }
            }
            c => atom.push(c),
        }
    }
    if !atom.is_empty() {
        out.push(Lexeme::Atom(atom));
    }
    out
}

fn malformed(detail: &str) -> TrialGraphError {
    TrialGraphError::Annotation(format!("malformed parse tree: {}", detail))
}

fn parse_node(tokens: &[Lexeme], pos: &mut usize) -> Result<ParseTree> {
    if tokens.get(*pos) != Some(&Lexeme::Open) {
        return Err(malformed("expected '('"));
    }
    *pos += 1;

    let label = match tokens.get(*pos) {
        Some(Lexeme::Atom(label)) => {
            *pos += 1;
            label.clone()
        }
        _ => return Err(malformed("constituent without a label")),
    };

    let mut children = Vec::new();
    loop {
        match tokens.get(*pos) {
            Some(Lexeme::Open) => children.push(parse_node(tokens, pos)?),
            Some(Lexeme::Atom(word)) => {
                children.push(ParseTree::leaf(word.clone()));
                *pos += 1;
            }
            Some(Lexeme::Close) => {
                *pos += 1;
                break;
            }
            None => return Err(malformed("unbalanced parentheses")),
        }
    }

    if children.is_empty() {
        return Err(malformed("constituent without children"));
    }
    Ok(ParseTree { label, children })
}
