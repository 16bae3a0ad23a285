use std::path::PathBuf;

use thiserror::Error;

/// Configuration errors. These are fatal and never retried.
#[derive(Debug, Error)]
pub enum EvalError {
    #[error("batch size must be at least one, got {0}")]
    InvalidBatchSize(usize),

    #[error("incomplete batch: expected {expected} items, got {actual}")]
    IncompleteBatch { expected: usize, actual: usize },

    #[error("record {record} has no column '{column}'")]
    MissingColumn { record: String, column: String },

    #[error("multiple correct answers for document {doc_id} ({count} gold standards)")]
    MultipleCorrectAnswers { doc_id: String, count: usize },

    #[error("document {doc_id} has no gold standard answer")]
    EmptyGoldStandard { doc_id: String },

    #[error("prompt template error: {0}")]
    Template(String),

    #[error("file not found: {0}")]
    MissingFile(PathBuf),
}
