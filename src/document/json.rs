use super::DocumentParser;
use crate::error::{Result, TrialGraphError};
use serde_json::Value;

/// JSON records are already nested key/value trees
pub struct JsonDocumentParser;

impl DocumentParser for JsonDocumentParser {
    fn can_parse(&self, extension: &str) -> bool {
        extension == "json"
    }

    fn parse(&self, content: &str, path: &str) -> Result<Value> {
        let value: Value = serde_json::from_str(content).map_err(|e| {
            TrialGraphError::DocumentFormat(format!("JSON parse error in {}: {}", path, e))
        })?;

        if !value.is_object() {
            return Err(TrialGraphError::DocumentFormat(format!(
                "{} does not hold a JSON object at the top level",
                path
            )));
        }

        Ok(value)
    }
}
