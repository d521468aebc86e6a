//! Error types for ppp.
//!
//! Every failure the core can report is a variant of [`Error`], so callers
//! (the CLI, tests, other front ends) can decide exit codes and wording
//! without parsing messages.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for ppp operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid id '{id}': {reason}")]
    InvalidIdFormat { id: String, reason: String },

    #[error("Parent issue not found: {id}")]
    ParentNotFound { id: String },

    #[error("Hierarchy violation: {0}")]
    HierarchyViolation(String),

    #[error("Issue not found: {id}")]
    IssueNotFound { id: String },

    #[error("Sprint not found: {id}")]
    SprintNotFound { id: String },

    #[error("Issue {id} still has children: {}", children.join(", "))]
    IssueHasChildren { id: String, children: Vec<String> },

    #[error("Database not found at {path}. Run 'ppp init' first.")]
    DatabaseNotFound { path: PathBuf },

    #[error("Database at {path} is corrupt: {reason}")]
    DatabaseCorrupt { path: PathBuf, reason: String },

    #[error("Project already initialized at {path}")]
    AlreadyInitialized { path: PathBuf },

    #[error("Folder for parent of {id} cannot be resolved")]
    ParentFolderMissing { id: String },

    #[error("Failed to {op} {path}: {source}")]
    FilesystemOperationFailed {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Sprint {id} cannot move from {from} to {to}")]
    InvalidTransition { id: String, from: String, to: String },

    #[error("Sprint {id} is {status} and no longer accepts issues")]
    SprintClosed { id: String, status: String },

    #[error("No ids left under {parent}: every 2-digit slot is taken")]
    CounterExhausted { parent: String },

    #[error("{0}")]
    InvalidValue(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl Error {
    /// Wrap an io error raised while touching `path`.
    pub fn fs(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FilesystemOperationFailed {
            op,
            path: path.into(),
            source,
        }
    }

    /// Category-based process exit code.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::DatabaseNotFound { .. }
            | Error::DatabaseCorrupt { .. }
            | Error::AlreadyInitialized { .. }
            | Error::Yaml(_) => 2,
            Error::IssueNotFound { .. } | Error::SprintNotFound { .. } | Error::ParentNotFound { .. } => 3,
            Error::InvalidIdFormat { .. }
            | Error::InvalidValue(_)
            | Error::InvalidTransition { .. }
            | Error::SprintClosed { .. } => 4,
            Error::HierarchyViolation(_)
            | Error::IssueHasChildren { .. }
            | Error::CounterExhausted { .. } => 5,
            Error::ParentFolderMissing { .. }
            | Error::FilesystemOperationFailed { .. }
            | Error::Io(_) => 6,
        }
    }
}
