use thiserror::Error;

/// Errors surfaced by a [`ChatStore`](super::ChatStore)
#[derive(Debug, Error)]
pub enum StoreError {
    /// Optimistic-concurrency failure: a version check or uniqueness
    /// constraint rejected the write. Callers may retry the whole operation.
    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage task failed: {0}")]
    Task(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
