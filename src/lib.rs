//! Waymark - a project-metadata consistency engine for AI agents.
//!
//! This library tracks a project's files, functions, types, themes/flows and a
//! hierarchical work breakdown (completion paths, milestones, tasks, subtasks,
//! sidequests, items) in a set of SQLite databases, and keeps them consistent:
//!
//! - identifiers are reserved before an artifact is named, then finalized
//! - destructive operations are refused while dependents exist
//! - completion path stages keep a dense, gap-free order
//! - work context is assembled from many tables in one best-effort call

pub mod api;
pub mod collab;
pub mod config;
pub mod logging;
pub mod models;
pub mod schema;
pub mod storage;

pub use storage::Store;
pub use storage::integrity::BlockingReport;


/// Stable tag for each error family, used at the call boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    NotFound,
    InvalidArgument,
    InvalidState,
    PreconditionFailed,
    BlockingReferences,
    Forbidden,
    Storage,
}

/// Library-level error type for Waymark operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    BlockingReferences(Box<BlockingReport>),

    #[error("Forbidden: {reason}")]
    Forbidden {
        reason: String,
        /// The operation a caller should use instead, if one exists
        use_instead: Option<String>,
    },
}

impl Error {
    /// Build a `Forbidden` error pointing the caller at the right operation.
    pub fn forbidden(reason: impl Into<String>, use_instead: Option<&str>) -> Self {
        Error::Forbidden {
            reason: reason.into(),
            use_instead: use_instead.map(str::to_string),
        }
    }

    /// Classify the error for callers that dispatch on the family.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidState(_) => ErrorKind::InvalidState,
            Error::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            Error::BlockingReferences(_) => ErrorKind::BlockingReferences,
            Error::Forbidden { .. } => ErrorKind::Forbidden,
            Error::Io(_) | Error::Json(_) | Error::Database(_) | Error::Config(_) => {
                ErrorKind::Storage
            }
        }
    }
}

/// Result type alias for Waymark operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind_mapping() {
        assert_eq!(Error::NotFound("x".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::forbidden("no", Some("delete_file")).kind(),
            ErrorKind::Forbidden
        );
        assert_eq!(Error::Config("bad".into()).kind(), ErrorKind::Storage);
    }

    #[test]
    fn test_forbidden_carries_alternative() {
        let err = Error::forbidden("files are protected", Some("delete_file"));
        match err {
            Error::Forbidden { use_instead, .. } => {
                assert_eq!(use_instead.as_deref(), Some("delete_file"))
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
