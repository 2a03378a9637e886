use std::path::PathBuf;

use rusqlite::ErrorCode;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("walkdir error: {0}")]
    WalkDir(#[from] walkdir::Error),

    #[error("cannot read {}: {source}", .path.display())]
    FilesystemRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no metadata extracted for {}: {reason}", .path.display())]
    ExtractionFailed { path: PathBuf, reason: String },

    #[error("malformed structured metadata for {}: {message}", .path.display())]
    StructuredParseFailed { path: PathBuf, message: String },

    #[error("preview generation failed: {0}")]
    CacheGeneration(String),

    #[error("catalog still busy after {attempts} attempts: {message}")]
    StoreBusy { attempts: u32, message: String },

    #[error("metadata tool `{program}` is not available: {message}")]
    ToolNotAvailable { program: String, message: String },

    #[error("metadata tool I/O failure: {0}")]
    ToolIo(String),

    #[error("library root does not exist: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("library root is not a directory: {}", .0.display())]
    RootNotDirectory(PathBuf),

    #[error("library root already registered: {}", .0.display())]
    RootAlreadyExists(PathBuf),

    #[error("library root not registered: {}", .0.display())]
    RootNotRegistered(PathBuf),

    #[error("catalog schema version {found} is newer than supported version {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

impl Error {
    /// True when SQLite reported the database as busy or locked by another writer.
    pub fn is_busy(&self) -> bool {
        match self {
            Error::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sqlite_failure(code: i32) -> Error {
        Error::Database(rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(code),
            None,
        ))
    }

    #[test]
    fn test_busy_and_locked_are_busy() {
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_BUSY).is_busy());
        assert!(sqlite_failure(rusqlite::ffi::SQLITE_LOCKED).is_busy());
    }

    #[test]
    fn test_other_failures_are_not_busy() {
        assert!(!sqlite_failure(rusqlite::ffi::SQLITE_CONSTRAINT).is_busy());
        assert!(!Error::CacheGeneration("x".into()).is_busy());
    }
}
