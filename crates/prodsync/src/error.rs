use std::fmt;
use rusqlite;

#[derive(Debug)]
pub enum ProdSyncError {
    SqliteError(rusqlite::Error),
    Database(String),
    Serialization(String),
    IO(String),
    /// 空 diff 调用 record：调用方 bug，不重试
    EmptyDiff(String),
    NotFound(String),
    InvalidInput(String),
    Transport(String),
    Timeout(String),
    Other(String),
}

impl fmt::Display for ProdSyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProdSyncError::SqliteError(e) => write!(f, "SQLite error: {}", e),
            ProdSyncError::Database(e) => write!(f, "Database error: {}", e),
            ProdSyncError::Serialization(e) => write!(f, "Serialization error: {}", e),
            ProdSyncError::IO(e) => write!(f, "IO error: {}", e),
            ProdSyncError::EmptyDiff(e) => write!(f, "Empty diff: {}", e),
            ProdSyncError::NotFound(e) => write!(f, "Not found: {}", e),
            ProdSyncError::InvalidInput(e) => write!(f, "Invalid input: {}", e),
            ProdSyncError::Transport(e) => write!(f, "Transport error: {}", e),
            ProdSyncError::Timeout(e) => write!(f, "Timeout: {}", e),
            ProdSyncError::Other(e) => write!(f, "Other error: {}", e),
        }
    }
}

impl std::error::Error for ProdSyncError {}

impl From<rusqlite::Error> for ProdSyncError {
    fn from(error: rusqlite::Error) -> Self {
        ProdSyncError::SqliteError(error)
    }
}

impl From<serde_json::Error> for ProdSyncError {
    fn from(error: serde_json::Error) -> Self {
        ProdSyncError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for ProdSyncError {
    fn from(error: std::io::Error) -> Self {
        ProdSyncError::IO(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ProdSyncError>;
