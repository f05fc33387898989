use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the persistence layer.
///
/// `DuplicateKey` and `NotFound` are recoverable — callers decide whether to
/// skip, overwrite, or pre-check. `QuotaExceeded` is split out from generic
/// SQLite failures so the UI layer can tell the user to free space instead of
/// showing an opaque storage error.
#[derive(Debug, Error)]
pub(crate) enum VaultError {
    #[error("duplicate key: {0}")]
    DuplicateKey(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid data: {0}")]
    Validation(String),

    #[error("storage unavailable at {path}: {message}")]
    StorageUnavailable { path: PathBuf, message: String },

    #[error("storage quota exceeded")]
    QuotaExceeded,

    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub(crate) type Result<T, E = VaultError> = std::result::Result<T, E>;

impl VaultError {
    /// Map a rusqlite failure from a keyed write into the taxonomy.
    pub(crate) fn from_write(err: rusqlite::Error, key: &str) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Self::DuplicateKey(key.to_string())
            }
            rusqlite::Error::SqliteFailure(e, _)
                if e.code == rusqlite::ErrorCode::DiskFull =>
            {
                Self::QuotaExceeded
            }
            other => Self::Sqlite(other),
        }
    }
}
