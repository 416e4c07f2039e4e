//! Prose extraction: normalization and the inclusion/exclusion split.

use regex::Regex;
use std::sync::OnceLock;

pub const INCLUSION_LABEL: &str = "Inclusion Criteria";
pub const EXCLUSION_LABEL: &str = "Exclusion Criteria";

/// A run of prose handed to the annotator as one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextSection {
    /// Section label stamped on every graph built from this text.
    pub label: String,
    /// Outer key of the annotation record entry.
    pub group: String,
    /// Inner key of the annotation record entry.
    pub field: String,
    pub text: String,
}

/// Splits and cleans prose fields.
#[derive(Debug, Clone)]
pub struct TextSegmenter {
    exclusion_marker: String,
}

impl TextSegmenter {
    pub fn new(exclusion_marker: impl Into<String>) -> Self {
        Self {
            exclusion_marker: exclusion_marker.into(),
        }
    }

    /// Collapse whitespace, replace glyphs the parser mangles, and turn
    /// "- " bullets into paragraph breaks.
    ///
    /// Bullets are expanded after collapsing so the breaks survive.
    pub fn normalize(text: &str) -> String {
        static WHITESPACE: OnceLock<Regex> = OnceLock::new();
        let whitespace = WHITESPACE.get_or_init(|| Regex::new(r"\s+").expect("Invalid regex pattern"));

        whitespace
            .replace_all(text, " ")
            .replace('≦', "<=")
            .replace('≤', "<=")
            .replace('≧', ">=")
            .replace('≥', ">=")
            .replace('®', "(R)")
            .replace("- ", "\n\n")
    }

    /// Split an eligibility block at the exclusion marker.
    ///
    /// Returns `None` when the marker is absent; the caller then walks the
    /// field as ordinary nested data. Sections left empty after the label
    /// prefix is dropped are omitted.
    pub fn split_criteria(&self, group: &str, raw: &str) -> Option<Vec<TextSection>> {
        let text = Self::normalize(raw);
        let marker_at = text.find(&self.exclusion_marker)?;
        let (inclusion, exclusion) = text.split_at(marker_at);

        let sections = [(INCLUSION_LABEL, inclusion), (EXCLUSION_LABEL, exclusion)]
            .into_iter()
            .filter_map(|(label, part)| {
                let body = strip_label_prefix(part);
                if body.is_empty() {
                    log::debug!("{} of '{}' is empty after prefix removal", label, group);
                    return None;
                }
                Some(TextSection {
                    label: label.to_string(),
                    group: group.to_string(),
                    field: label.to_string(),
                    text: body.to_string(),
                })
            })
            .collect();

        Some(sections)
    }

    /// A whole prose field as one section.
    pub fn prose(&self, label: &str, field: &str, raw: &str) -> TextSection {
        TextSection {
            label: label.to_string(),
            group: label.to_string(),
            field: field.to_string(),
            text: Self::normalize(raw),
        }
    }
}

/// Drop everything up to and including the first colon.
fn strip_label_prefix(part: &str) -> &str {
    match part.find(':') {
        Some(colon) => part[colon + 1..].trim(),
        None => part.trim(),
    }
}
