use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot file not found: {0}")]
    SnapshotNotFound(std::path::PathBuf),

    #[error("no results for query")]
    NoResults,

    #[error("row {row}: missing required field `{field}`")]
    MissingField { row: usize, field: String },

    #[error("proposal {id}: `{field}` is not a date: {value:?}")]
    InvalidDate {
        id: String,
        field: String,
        value: String,
    },

    #[error("invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("consolidation failed: {0}")]
    Consolidation(#[from] propmerge_core::ConsolidationError),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[cfg(feature = "duckdb")]
    #[error("duckdb error: {0}")]
    DuckDb(#[from] ::duckdb::Error),

    #[error("{0}")]
    Other(String),
}
