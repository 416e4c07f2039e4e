//! Pretty-printed JSON copies of each record and its annotations, for auditing.

use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// Prefix of the annotation record written next to each parsed record
pub const ANNOTATED_PREFIX: &str = "annotated_";

/// Paths written for one source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DebugOutput {
    pub document: PathBuf,
    pub annotations: PathBuf,
}

/// Write `<dir>/<file_name>.json` and `<dir>/annotated_<file_name>.json`.
pub fn write_debug_output(
    dir: &Path,
    file_name: &str,
    document: &Value,
    annotations: &Value,
) -> Result<DebugOutput> {
    std::fs::create_dir_all(dir)?;

    let out_name = format!("{}.json", file_name);
    let paths = DebugOutput {
        document: dir.join(&out_name),
        annotations: dir.join(format!("{}{}", ANNOTATED_PREFIX, out_name)),
    };

    std::fs::write(&paths.document, serde_json::to_string_pretty(document)?)?;
    std::fs::write(&paths.annotations, serde_json::to_string_pretty(annotations)?)?;

    log::debug!("Wrote {}", paths.document.display());
    Ok(paths)
}
