//! Error types for tt-history.

use thiserror::Error;

/// Errors from history writers and the background worker.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV write error: {0}")]
    Csv(#[from] csv::Error),

    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("invalid history configuration: {0}")]
    Config(String),

    #[error("history worker has stopped")]
    WorkerStopped,

    #[error("history worker panicked")]
    WorkerPanicked,
}

/// Alias for `Result<T, HistoryError>`.
pub type HistoryResult<T> = Result<T, HistoryError>;
