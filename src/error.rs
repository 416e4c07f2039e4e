use thiserror::Error;

/// Main error type for trialgraph
#[derive(Error, Debug)]
pub enum TrialGraphError {
    /// The document could not be parsed, or a required field (such as its id) is absent
    #[error("Document format error: {0}")]
    DocumentFormat(String),

    /// The annotation server returned no usable result
    #[error("Annotation error: {0}")]
    Annotation(String),

    /// Graph store connection or statement failure
    #[error("Graph store unavailable: {0}")]
    StoreUnavailable(#[from] rusqlite::Error),

    /// An edge named an endpoint the graph store does not hold
    #[error("Dangling edge {source_uid} -> {target_uid}: endpoint not in graph store")]
    DanglingEdge { source_uid: i64, target_uid: i64 },

    /// File system I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Convenient Result type using TrialGraphError
pub type Result<T> = std::result::Result<T, TrialGraphError>;
