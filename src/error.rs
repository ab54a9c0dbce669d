use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("Database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Categorizer used before initialize()")]
    NotInitialized,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unknown category: {0}")]
    UnknownCategory(String),

    #[error("Unknown transaction: {0}")]
    UnknownTransaction(String),

    #[error("Batch {batch} failed to commit ({committed} earlier batches kept): {source}")]
    BatchCommit {
        batch: usize,
        committed: usize,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Settings error: {0}")]
    Settings(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, TallyError>;
