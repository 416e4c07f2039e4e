//! Depth-first walk over a study record, feeding prose to the annotator and
//! the annotated sentences to the graph emitter.

use serde_json::{Map, Value};

use crate::annotate::Annotator;
use crate::config::DocumentConfig;
use crate::document::FieldKind;
use crate::error::{Result, TrialGraphError};
use crate::graph::GraphEmitter;
use crate::segment::{TextSection, TextSegmenter};

/// Field inside the criteria block that holds the eligibility text.
const CRITERIA_BODY: &str = "textblock";

/// Raw annotator output per section, kept for auditing: `group -> field -> raw`.
#[derive(Debug, Clone, Default)]
pub struct AnnotationRecord {
    entries: Map<String, Value>,
}

impl AnnotationRecord {
    pub fn insert(&mut self, group: &str, field: &str, raw: Value) {
        let slot = self
            .entries
            .entry(group.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if let Value::Object(fields) = slot {
            fields.insert(field.to_string(), raw);
        }
    }

    pub fn get(&self, group: &str, field: &str) -> Option<&Value> {
        self.entries.get(group)?.get(field)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.entries)
    }
}

/// What happened to one text section during a walk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionSummary {
    pub label: String,
    pub sentences: usize,
}

#[derive(Debug, Clone)]
pub struct WalkOutcome {
    pub sections: Vec<SectionSummary>,
    pub record: AnnotationRecord,
}

/// Finds the prose in a record and decides how it is cut into sections
pub struct DocumentWalker {
    rules: DocumentConfig,
    segmenter: TextSegmenter,
}

impl DocumentWalker {
    pub fn new(rules: DocumentConfig) -> Self {
        let segmenter = TextSegmenter::new(rules.exclusion_marker.clone());
        Self { rules, segmenter }
    }

    /// Text sections of `document` in pre-order. Traversal has no side effects.
    pub fn sections(&self, document: &Value) -> Vec<TextSection> {
        let mut out = Vec::new();
        if let FieldKind::Object(map) = FieldKind::of(document) {
            self.visit_object(map, None, &mut out);
        }
        out
    }

    /// Annotate every section in order and emit its sentences.
    ///
    /// The first annotation or store failure aborts the walk; graph elements
    /// written before it stay in the store.
    pub async fn walk(
        &self,
        document: &Value,
        annotator: &dyn Annotator,
        emitter: &mut GraphEmitter<'_>,
    ) -> Result<WalkOutcome> {
        let mut record = AnnotationRecord::default();
        let mut summaries = Vec::new();

        for section in self.sections(document) {
            log::debug!(
                "{}: annotating section '{}' ({} chars)",
                emitter.doc_id(),
                section.label,
                section.text.len()
            );

            let annotation = annotator.annotate(&section.text).await.map_err(|e| match e {
                TrialGraphError::Annotation(msg) => TrialGraphError::Annotation(format!(
                    "{} section '{}': {}",
                    emitter.doc_id(),
                    section.label,
                    msg
                )),
                other => other,
            })?;
            record.insert(&section.group, &section.field, annotation.raw);

            for (index, sentence) in annotation.sentences.iter().enumerate() {
                emitter.emit(sentence, &section.label, index).await?;
            }

            summaries.push(SectionSummary {
                label: section.label,
                sentences: annotation.sentences.len(),
            });
        }

        Ok(WalkOutcome {
            sections: summaries,
            record,
        })
    }

    fn is_skipped(&self, key: &str) -> bool {
        self.rules.skip_fields.iter().any(|f| f == key)
    }

    fn is_prose(&self, key: &str) -> bool {
        self.rules.prose_fields.iter().any(|f| f == key)
    }

    fn visit_object(
        &self,
        map: &Map<String, Value>,
        enclosing: Option<&str>,
        out: &mut Vec<TextSection>,
    ) {
        for (key, value) in map {
            if self.is_skipped(key) {
                continue;
            }

            if *key == self.rules.criteria_field {
                let body = value.get(CRITERIA_BODY).and_then(Value::as_str);
                if let Some(sections) = body.and_then(|text| self.segmenter.split_criteria(key, text)) {
                    out.extend(sections);
                    continue;
                }
            } else if self.is_prose(key) {
                if let Value::String(text) = value {
                    let label = enclosing.unwrap_or(key);
                    out.push(self.segmenter.prose(label, key, text));
                    continue;
                }
            }

            self.visit_value(key, value, out);
        }
    }

    fn visit_value(&self, key: &str, value: &Value, out: &mut Vec<TextSection>) {
        match FieldKind::of(value) {
            FieldKind::Object(map) => self.visit_object(map, Some(key), out),
            FieldKind::List(items) => {
                for item in items {
                    match FieldKind::of(item) {
                        FieldKind::Object(map) => self.visit_object(map, Some(key), out),
                        // the rest of a mixed list is not visited
                        _ => break,
                    }
                }
            }
            FieldKind::Scalar(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotate::testing::{FailingAnnotator, StubAnnotator};
    use crate::graph::{EdgeKind, GraphNode, MemoryGraphStore};
    use crate::ids::IdAllocator;
    use serde_json::json;

    fn walker() -> DocumentWalker {
        DocumentWalker::new(DocumentConfig::default())
    }

    fn labels(sections: &[TextSection]) -> Vec<(&str, &str)> {
        sections.iter().map(|s| (s.label.as_str(), s.text.as_str())).collect()
    }

    #[test]
    fn test_sections_split_criteria() {
        let doc = json!({"criteria": {"textblock": "Inclusion: age > 18. Exclusion Criteria: pregnancy."}});
        let sections = walker().sections(&doc);
        assert_eq!(
            labels(&sections),
            vec![("Inclusion Criteria", "age > 18."), ("Exclusion Criteria", "pregnancy.")]
        );
        assert_eq!(sections[0].group, "criteria");
    }

    #[test]
    fn test_sections_prose_uses_enclosing_key() {
        let doc = json!({
            "clinical_study": {
                "brief_summary": {"textblock": "Skipped entirely."},
                "detailed_description": {"textblock": "An open   label study."},
                "arm_group": [
                    {"description": "Arm one."},
                    {"description": "Arm two."}
                ]
            }
        });
        let sections = walker().sections(&doc);
        assert_eq!(
            labels(&sections),
            vec![
                ("detailed_description", "An open label study."),
                ("arm_group", "Arm one."),
                ("arm_group", "Arm two."),
            ]
        );
        assert_eq!(sections[0].field, "textblock");
        assert_eq!(sections[1].field, "description");
    }

    #[test]
    fn test_criteria_without_marker_walked_as_nested() {
        let doc = json!({"eligibility": {"criteria": {"textblock": "Healthy adults only."}}});
        let sections = walker().sections(&doc);
        assert_eq!(labels(&sections), vec![("criteria", "Healthy adults only.")]);
        assert_eq!(sections[0].field, "textblock");
    }

    #[test]
    fn test_list_stops_at_first_non_object() {
        let doc = json!({
            "intervention": [
                {"description": "First."},
                "a bare string",
                {"description": "Never reached."}
            ]
        });
        let sections = walker().sections(&doc);
        assert_eq!(labels(&sections), vec![("intervention", "First.")]);
    }

    #[test]
    fn test_top_level_prose_labelled_with_own_key() {
        let doc = json!({"description": "Top level text."});
        assert_eq!(labels(&walker().sections(&doc)), vec![("description", "Top level text.")]);
    }

    #[test]
    fn test_non_string_prose_field_recursed() {
        let doc = json!({"description": {"textblock": "Nested body."}});
        assert_eq!(labels(&walker().sections(&doc)), vec![("description", "Nested body.")]);
    }

    #[test]
    fn test_annotation_record() {
        let mut record = AnnotationRecord::default();
        assert!(record.is_empty());
        record.insert("criteria", "Inclusion Criteria", json!(1));
        record.insert("criteria", "Exclusion Criteria", json!(2));
        record.insert("detailed_description", "textblock", json!(3));
        assert_eq!(record.get("criteria", "Exclusion Criteria"), Some(&json!(2)));
        assert_eq!(
            record.into_value(),
            json!({
                "criteria": {"Inclusion Criteria": 1, "Exclusion Criteria": 2},
                "detailed_description": {"textblock": 3}
            })
        );
    }

    #[tokio::test]
    async fn test_walk_end_to_end() {
        let doc = json!({"criteria": {"textblock": "Inclusion: age > 18. Exclusion Criteria: pregnancy."}});
        let annotator = StubAnnotator::default();
        let store = MemoryGraphStore::new();
        let ids = IdAllocator::new();
        let mut emitter = GraphEmitter::new(&store, &ids, "NCT01");

        let outcome = walker().walk(&doc, &annotator, &mut emitter).await.unwrap();

        assert_eq!(annotator.calls(), vec!["age > 18.", "pregnancy."]);
        assert_eq!(
            outcome.sections,
            vec![
                SectionSummary { label: "Inclusion Criteria".to_string(), sentences: 1 },
                SectionSummary { label: "Exclusion Criteria".to_string(), sentences: 1 },
            ]
        );
        assert!(outcome.record.get("criteria", "Inclusion Criteria").is_some());
        assert!(outcome.record.get("criteria", "Exclusion Criteria").is_some());

        let nodes = store.nodes();
        let tree_sections: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                GraphNode::TreeRoot { section, doc_id, .. } => {
                    assert_eq!(doc_id, "NCT01");
                    Some(section.as_str())
                }
                _ => None,
            })
            .collect();
        assert_eq!(tree_sections, vec!["Inclusion Criteria", "Exclusion Criteria"]);

        // "age > 18." has dependencies and gets a ROOT word; "pregnancy." has one token and none
        let dep_roots: Vec<&str> = nodes
            .iter()
            .filter_map(|n| match n {
                GraphNode::SentenceRoot { section, .. } => Some(section.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(dep_roots, vec!["Inclusion Criteria"]);
        assert_eq!(
            store.edges().iter().filter(|e| e.kind == EdgeKind::Root).count(),
            2
        );
        assert_eq!(emitter.stats().sentences, 2);
    }

    #[tokio::test]
    async fn test_walk_annotation_failure_aborts() {
        let doc = json!({"detailed_description": {"textblock": "Some text."}});
        let store = MemoryGraphStore::new();
        let ids = IdAllocator::new();
        let mut emitter = GraphEmitter::new(&store, &ids, "NCT01");

        let err = walker()
            .walk(&doc, &FailingAnnotator, &mut emitter)
            .await
            .unwrap_err();

        assert!(matches!(err, TrialGraphError::Annotation(_)));
        assert!(err.to_string().contains("detailed_description"));
        assert!(store.ops().is_empty());
    }
}
