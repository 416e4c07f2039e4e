pub mod annotate;
pub mod build;
pub mod config;
pub mod db;
pub mod document;
pub mod error;
pub mod graph;
pub mod ids;
pub mod segment;
pub mod walker;

pub use annotate::{Annotator, CoreNlpClient};
pub use config::Config;
pub use error::{Result, TrialGraphError};
pub use graph::{GraphEmitter, GraphStore};
pub use ids::IdAllocator;
pub use segment::TextSegmenter;
pub use walker::DocumentWalker;
