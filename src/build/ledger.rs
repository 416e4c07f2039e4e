//! Build ledger: which source files already have their graphs in the store.
//!
//! Node uids are fresh on every run, so re-emitting a record would add a
//! second copy of its subgraphs. The ledger keys each built file by path and
//! SHA-256 content hash; unchanged files are skipped unless forced.

use rusqlite::params;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::Path;

use super::SourceFile;
use crate::db::Db;
use crate::error::{Result, TrialGraphError};

/// Compute SHA256 hash of file contents
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(format!("{:x}", hasher.finalize()))
}

/// Discovered sources split by ledger state
#[derive(Debug, Default)]
pub struct SourceClassification {
    /// Never built
    pub new_files: Vec<SourceFile>,
    /// Built before from different content
    pub modified_files: Vec<SourceFile>,
    /// Built from identical content; skipped
    pub unchanged_files: Vec<SourceFile>,
}

impl SourceClassification {
    /// Files that need building, new ones first
    pub fn pending(self) -> Vec<SourceFile> {
        self.new_files.into_iter().chain(self.modified_files).collect()
    }
}

/// Map of `doc_path` to the hash it was last built from
pub async fn get_built_hashes(db: &Db) -> Result<HashMap<String, String>> {
    db.with_connection(|conn| {
        let mut stmt = conn.prepare("SELECT doc_path, file_hash FROM built_documents")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        let mut map = HashMap::new();
        for row in rows {
            let (path, hash) = row?;
            map.insert(path, hash);
        }
        Ok::<HashMap<String, String>, TrialGraphError>(map)
    })
    .await
}

/// Classify discovered files against the hashes they were last built from
pub fn classify_sources(
    files: &[SourceFile],
    built_hashes: &HashMap<String, String>,
) -> Result<SourceClassification> {
    let mut classification = SourceClassification::default();

    for file in files {
        let current_hash = compute_file_hash(&file.absolute_path)?;
        match built_hashes.get(&file.relative_path) {
            None => classification.new_files.push(file.clone()),
            Some(stored) if *stored != current_hash => {
                classification.modified_files.push(file.clone())
            }
            Some(_) => classification.unchanged_files.push(file.clone()),
        }
    }

    Ok(classification)
}

/// Record a successful build, replacing any earlier entry for the same path
pub async fn record_built(db: &Db, doc_path: &str, doc_id: &str, file_hash: &str) -> Result<()> {
    let doc_path = doc_path.to_string();
    let doc_id = doc_id.to_string();
    let file_hash = file_hash.to_string();
    let built_at = chrono::Utc::now().to_rfc3339();

    db.with_connection(move |conn| {
        conn.execute(
            "INSERT INTO built_documents (doc_path, doc_id, file_hash, built_at) \
             VALUES (?1, ?2, ?3, ?4) \
             ON CONFLICT(doc_path) DO UPDATE SET \
             doc_id = excluded.doc_id, file_hash = excluded.file_hash, built_at = excluded.built_at",
            params![doc_path, doc_id, file_hash, built_at],
        )?;
        Ok(())
    })
    .await
}

/// Number of documents in the ledger
pub async fn count_built(db: &Db) -> Result<i64> {
    db.with_connection(|conn| {
        let count: i64 =
            conn.query_row("SELECT COUNT(*) FROM built_documents", [], |row| row.get(0))?;
        Ok(count)
    })
    .await
}
