//! Study records as nested key/value trees.
//!
//! Records arrive as XML or JSON and are held as a `serde_json::Value`.
//! Traversal code never inspects the value directly; it asks for a
//! [`FieldKind`] and matches on that.

pub mod json;
pub mod xml;

use serde_json::{Map, Value};

use crate::error::{Result, TrialGraphError};

/// The closed set of shapes a field value can take.
#[derive(Debug, Clone, Copy)]
pub enum FieldKind<'a> {
    Scalar(&'a Value),
    Object(&'a Map<String, Value>),
    List(&'a [Value]),
}

impl<'a> FieldKind<'a> {
    pub fn of(value: &'a Value) -> Self {
        match value {
            Value::Object(map) => FieldKind::Object(map),
            Value::Array(items) => FieldKind::List(items),
            other => FieldKind::Scalar(other),
        }
    }
}

/// Follow `path` from the document root and return the string found there.
pub fn lookup_str<'a, S: AsRef<str>>(document: &'a Value, path: &[S]) -> Option<&'a str> {
    let mut current = document;
    for key in path {
        current = current.get(key.as_ref())?;
    }
    current.as_str()
}

/// Extract the document id, failing the document when it is absent.
pub fn document_id<S: AsRef<str>>(document: &Value, path: &[S]) -> Result<String> {
    lookup_str(document, path)
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
        .ok_or_else(|| {
            let dotted = path.iter().map(|s| s.as_ref()).collect::<Vec<_>>().join(".");
            TrialGraphError::DocumentFormat(format!("document id not found at {}", dotted))
        })
}

/// Trait for record parsers
pub trait DocumentParser {
    /// Check if this parser can handle the given file extension
    fn can_parse(&self, extension: &str) -> bool;

    /// Parse raw markup into a nested document
    fn parse(&self, content: &str, path: &str) -> Result<Value>;
}

/// Parser registry that selects the appropriate parser by extension
pub struct DocumentParserRegistry {
    parsers: Vec<Box<dyn DocumentParser + Send + Sync>>,
}

impl DocumentParserRegistry {
    /// Create a registry with the XML and JSON parsers
    pub fn new() -> Self {
        let mut registry = Self {
            parsers: Vec::new(),
        };

        registry.register(Box::new(xml::XmlDocumentParser));
        registry.register(Box::new(json::JsonDocumentParser));

        registry
    }

    pub fn register(&mut self, parser: Box<dyn DocumentParser + Send + Sync>) {
        self.parsers.push(parser);
    }

    pub fn find_parser(&self, extension: &str) -> Option<&(dyn DocumentParser + Send + Sync)> {
        self.parsers
            .iter()
            .find(|p| p.can_parse(extension))
            .map(|p| p.as_ref())
    }

    /// Parse content using the parser registered for `extension`.
    ///
    /// Unlike free-text ingestion there is no plain-text fallback: a record that
    /// does not parse has no structure to walk.
    pub fn parse(&self, content: &str, path: &str, extension: &str) -> Result<Value> {
        let parser = self.find_parser(extension).ok_or_else(|| {
            TrialGraphError::DocumentFormat(format!("No parser found for extension: {}", extension))
        })?;
        parser.parse(content, path)
    }
}

impl Default for DocumentParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}
