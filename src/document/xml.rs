use super::DocumentParser;
use crate::error::{Result, TrialGraphError};
use quick_xml::escape::{resolve_predefined_entity, unescape};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// XML parser for study records (e.g. ClinicalTrials.gov exports)
///
/// Produces the same shape a generic XML-to-JSON conversion would:
/// - an element with only text becomes a string
/// - an element with children or attributes becomes an object
/// - repeated child names are coerced into an array
/// - text alongside children is kept under `content`
pub struct XmlDocumentParser;

impl DocumentParser for XmlDocumentParser {
    fn can_parse(&self, extension: &str) -> bool {
        extension == "xml"
    }

    fn parse(&self, content: &str, path: &str) -> Result<Value> {
        let sanitized = sanitize_markup(content);
        xml_to_value(&sanitized).map_err(|e| match e {
            TrialGraphError::DocumentFormat(msg) => {
                TrialGraphError::DocumentFormat(format!("XML parse error in {}: {}", path, msg))
            }
            other => other,
        })
    }
}

/// Drop numbered-list markers (" 1.", " 2." ...) and collapse whitespace runs.
///
/// Markers are removed before conversion because list numbering does not survive
/// the key/value tree anyway. A decimal such as "5.5" preceded by whitespace loses
/// its integer part; records that need exact numbers must be cleaned upstream.
pub fn sanitize_markup(content: &str) -> String {
    static LIST_MARKER: OnceLock<Regex> = OnceLock::new();
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();

    let list_marker =
        LIST_MARKER.get_or_init(|| Regex::new(r"\s+[1-9]\.").expect("Invalid regex pattern"));
    let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

    let without_markers = list_marker.replace_all(content, "");
    whitespace.replace_all(&without_markers, " ").into_owned()
}

/// An element whose closing tag has not been seen yet
struct Frame {
    name: String,
    fields: Map<String, Value>,
    text: String,
}

impl Frame {
    fn open(start: &BytesStart) -> Self {
        let name = String::from_utf8_lossy(start.name().as_ref()).to_string();
        let mut fields = Map::new();
        for attr in start.attributes().flatten() {
            let key = String::from_utf8_lossy(attr.key.as_ref()).to_string();
            let raw = String::from_utf8_lossy(&attr.value).to_string();
            let value = unescape(&raw).map(|v| v.into_owned()).unwrap_or(raw);
            fields.insert(key, Value::String(value));
        }
        Self {
            name,
            fields,
            text: String::new(),
        }
    }

    fn close(mut self) -> (String, Value) {
        let text = self.text.trim().to_string();
        if self.fields.is_empty() {
            return (self.name, Value::String(text));
        }
        if !text.is_empty() {
            insert_child(&mut self.fields, "content".to_string(), Value::String(text));
        }
        (self.name, Value::Object(self.fields))
    }
}

/// Insert `value` under `key`, turning repeated keys into arrays
fn insert_child(map: &mut Map<String, Value>, key: String, value: Value) {
    match map.get_mut(&key) {
        Some(Value::Array(items)) => items.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            map.insert(key, value);
        }
    }
}

fn resolve_reference(name: &str) -> String {
    if let Some(code) = name.strip_prefix('#') {
        let parsed = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        if let Some(ch) = parsed.and_then(char::from_u32) {
            return ch.to_string();
        }
    } else if let Some(resolved) = resolve_predefined_entity(name) {
        return resolved.to_string();
    }
    format!("&{};", name)
}

fn xml_to_value(content: &str) -> Result<Value> {
    let mut reader = Reader::from_str(content);
    let mut buf = Vec::new();
    let mut stack: Vec<Frame> = vec![Frame {
        name: String::new(),
        fields: Map::new(),
        text: String::new(),
    }];

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => stack.push(Frame::open(&e)),
            Ok(Event::Empty(e)) => {
                let (name, value) = Frame::open(&e).close();
                if let Some(parent) = stack.last_mut() {
                    insert_child(&mut parent.fields, name, value);
                }
            }
            Ok(Event::End(_)) => {
                if stack.len() < 2 {
                    return Err(TrialGraphError::DocumentFormat(
                        "closing tag without matching opening tag".to_string(),
                    ));
                }
                if let Some(frame) = stack.pop() {
                    let (name, value) = frame.close();
                    if let Some(parent) = stack.last_mut() {
                        insert_child(&mut parent.fields, name, value);
                    }
                }
            }
            Ok(Event::Text(e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&e));
                }
            }
            Ok(Event::CData(e)) => {
                if let Some(frame) = stack.last_mut() {
                    frame.text.push_str(&String::from_utf8_lossy(&e.into_inner()));
                }
            }
            Ok(Event::GeneralRef(e)) => {
                if let Some(frame) = stack.last_mut() {
                    let name = String::from_utf8_lossy(&e).to_string();
                    frame.text.push_str(&resolve_reference(&name));
                }
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(TrialGraphError::DocumentFormat(e.to_string())),
        }
        buf.clear();
    }

    if stack.len() != 1 {
        let open = stack.last().map(|f| f.name.clone()).unwrap_or_default();
        return Err(TrialGraphError::DocumentFormat(format!("unclosed element <{}>", open)));
    }

    let root = stack.remove(0);
    if root.fields.is_empty() {
        return Err(TrialGraphError::DocumentFormat("no root element".to_string()));
    }
    Ok(Value::Object(root.fields))
}

#[cfg(test)]
mod tests {
    use super::*;

    const STUDY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<clinical_study rank="7">
  <id_info>
    <org_study_id>ABC-1</org_study_id>
    <nct_id>NCT00000102</nct_id>
  </id_info>
  <brief_summary>
    <textblock>Short summary.</textblock>
  </brief_summary>
  <condition>Asthma</condition>
  <condition>COPD</condition>
  <eligibility>
    <criteria>
      <textblock>
        Inclusion Criteria:
          1. Age &gt; 18
        Exclusion Criteria:
          1. Pregnancy
      </textblock>
    </criteria>
    <gender>All</gender>
  </eligibility>
  <location/>
</clinical_study>
"#;

    #[test]
    fn test_xml_parser_can_parse() {
        let parser = XmlDocumentParser;
        assert!(parser.can_parse("xml"));
        assert!(!parser.can_parse("json"));
    }

    #[test]
    fn test_xml_study_to_tree() {
        let doc = XmlDocumentParser.parse(STUDY, "NCT00000102.xml").unwrap();
        let study = &doc["clinical_study"];

        assert_eq!(study["rank"], "7");
        assert_eq!(study["id_info"]["nct_id"], "NCT00000102");
        assert_eq!(study["condition"], serde_json::json!(["Asthma", "COPD"]));
        assert_eq!(study["eligibility"]["gender"], "All");
        assert_eq!(study["location"], "");
        assert_eq!(
            study["eligibility"]["criteria"]["textblock"],
            "Inclusion Criteria: Age > 18 Exclusion Criteria: Pregnancy"
        );
    }

    #[test]
    fn test_mixed_content_goes_to_content_key() {
        let doc = XmlDocumentParser
            .parse("<a>lead<b>inner</b> tail</a>", "mixed.xml")
            .unwrap();
        assert_eq!(doc["a"]["b"], "inner");
        assert_eq!(doc["a"]["content"], "lead tail");
    }

    #[test]
    fn test_character_references_resolved() {
        let doc = XmlDocumentParser
            .parse("<a>x &#8805; 5 &amp; y &#x2264; 3</a>", "refs.xml")
            .unwrap();
        assert_eq!(doc["a"], "x \u{2265} 5 & y \u{2264} 3");
    }

    #[test]
    fn test_sanitize_markup() {
        assert_eq!(sanitize_markup("a\n\n  1. first\t 2. second"), "a first second");
    }

    #[test]
    fn test_unclosed_element_is_format_error() {
        let err = XmlDocumentParser.parse("<a><b>text</b>", "broken.xml").unwrap_err();
        assert!(matches!(err, TrialGraphError::DocumentFormat(_)));
        assert!(err.to_string().contains("broken.xml"));
    }
}
