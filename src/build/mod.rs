//! Batch driver: turns study records on disk into sentence graphs.

pub mod ledger;
pub mod output;
pub mod sources;

pub use ledger::{classify_sources, compute_file_hash, get_built_hashes, record_built, SourceClassification};
pub use output::{write_debug_output, DebugOutput};
pub use sources::{discover_sources, SourceFile};

use std::path::PathBuf;

use crate::annotate::Annotator;
use crate::config::DocumentConfig;
use crate::db::Db;
use crate::document::{document_id, DocumentParserRegistry};
use crate::error::Result;
use crate::graph::{GraphEmitter, GraphStore};
use crate::ids::IdAllocator;
use crate::walker::DocumentWalker;

/// What one record sent to the graph store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub doc_id: String,
    pub sections: usize,
    pub sentences: usize,
    pub node_upserts: usize,
    pub edge_upserts: usize,
}

/// Totals for a batch run
#[derive(Debug, Default)]
pub struct BatchSummary {
    pub reports: Vec<BuildReport>,
    /// `(relative path, error message)` for each record that failed
    pub failures: Vec<(String, String)>,
}

impl BatchSummary {
    pub fn sentences(&self) -> usize {
        self.reports.iter().map(|r| r.sentences).sum()
    }

    pub fn node_upserts(&self) -> usize {
        self.reports.iter().map(|r| r.node_upserts).sum()
    }

    pub fn edge_upserts(&self) -> usize {
        self.reports.iter().map(|r| r.edge_upserts).sum()
    }
}

/// Builds records one at a time against a shared store and allocator.
pub struct DocumentBuilder<'a> {
    parsers: DocumentParserRegistry,
    walker: DocumentWalker,
    id_path: Vec<String>,
    annotator: &'a dyn Annotator,
    store: &'a dyn GraphStore,
    ids: &'a IdAllocator,
    output_dir: Option<PathBuf>,
    ledger: Option<Db>,
}

impl<'a> DocumentBuilder<'a> {
    pub fn new(
        rules: &DocumentConfig,
        annotator: &'a dyn Annotator,
        store: &'a dyn GraphStore,
        ids: &'a IdAllocator,
    ) -> Self {
        Self {
            parsers: DocumentParserRegistry::new(),
            walker: DocumentWalker::new(rules.clone()),
            id_path: rules.id_path.clone(),
            annotator,
            store,
            ids,
            output_dir: None,
            ledger: None,
        }
    }

    /// Also write the parsed record and its annotations under `dir`
    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    /// Record every successful build in the ledger of `db`
    pub fn with_ledger(mut self, db: Db) -> Self {
        self.ledger = Some(db);
        self
    }

    /// Parse, walk and emit one record.
    ///
    /// On failure the graph elements written so far stay in the store and the
    /// record is not entered in the ledger.
    pub async fn build_document(&self, file: &SourceFile) -> Result<BuildReport> {
        let content = std::fs::read_to_string(&file.absolute_path)?;
        let document = self
            .parsers
            .parse(&content, &file.relative_path, &file.extension)?;
        let doc_id = document_id(&document, &self.id_path)?;

        let mut emitter = GraphEmitter::new(self.store, self.ids, doc_id.clone());
        let outcome = self.walker.walk(&document, self.annotator, &mut emitter).await?;
        let stats = emitter.stats();

        if let Some(dir) = &self.output_dir {
            write_debug_output(dir, &file.file_name(), &document, &outcome.record.into_value())?;
        }

        if let Some(db) = &self.ledger {
            let file_hash = compute_file_hash(&file.absolute_path)?;
            record_built(db, &file.relative_path, &doc_id, &file_hash).await?;
        }

        let report = BuildReport {
            doc_id,
            sections: outcome.sections.len(),
            sentences: stats.sentences,
            node_upserts: stats.node_upserts,
            edge_upserts: stats.edge_upserts,
        };
        log::info!(
            "Built {} from {}: {} sections, {} sentences, {} node upserts, {} edge upserts",
            report.doc_id,
            file.relative_path,
            report.sections,
            report.sentences,
            report.node_upserts,
            report.edge_upserts
        );
        Ok(report)
    }

    /// Build every file in order; a failed record is logged and skipped.
    pub async fn build_batch(&self, files: &[SourceFile]) -> BatchSummary {
        let mut summary = BatchSummary::default();
        let total = files.len();

        for (idx, file) in files.iter().enumerate() {
            log::info!("[{}/{}] Building: {}", idx + 1, total, file.relative_path);
            match self.build_document(file).await {
                Ok(report) => summary.reports.push(report),
                Err(e) => {
                    log::error!("Failed to build {}: {}", file.relative_path, e);
                    summary.failures.push((file.relative_path.clone(), e.to_string()));
                }
            }
        }

        summary
    }
}
