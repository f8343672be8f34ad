//! Error taxonomy for compiling, planning and committing a publish run.
//!
//! Two channels are kept apart:
//! - fatal, fail-fast errors ([`CompilationError`], [`StageError::MissingSource`],
//!   [`StageError::AuthPermission`]) abort before anything is mutated;
//! - per-task errors ([`SyncFileError`]) are collected by the pool and only
//!   surface as a [`SyncAggregateError`] once the retry budget is spent.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Failure reported by an [`ObjectStore`](crate::contract::ObjectStore) implementation.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store refused the request (HTTP 403 or an equivalent error code).
    #[error("permission denied: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Any other backend failure, already rendered to text.
    #[error("{0}")]
    Backend(String),
}

impl StoreError {
    pub fn is_forbidden(&self) -> bool {
        matches!(self, StoreError::Forbidden(_))
    }
}

/// A redirect rule source could not be compiled. Carries the 1-based line number.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompilationError {
    #[error("line {line}: malformed rule: {text}")]
    Syntax { line: usize, text: String },

    #[error("line {line}: unknown version `{version}`")]
    UnknownVersion { line: usize, version: String },

    #[error("line {line}: range rule used before `define: versions ...`")]
    MissingVersions { line: usize },

    #[error("line {line}: `*` cannot be an exclusive lower bound")]
    ExclusiveWildcard { line: usize },

    #[error("line {line}: `[* - *]` matches everything, use a `raw:` rule instead")]
    WildcardRange { line: usize },

    #[error("line {line}: `[v - *)` is not a valid range, close it with `]`")]
    OpenWildcardRange { line: usize },

    #[error("line {line}: range includes no versions")]
    EmptyRange { line: usize },

    #[error("line {line}: unresolved variable `${{{name}}}`")]
    UnresolvedVariable { line: usize, name: String },
}

/// One upload or redirect task failed.
#[derive(Debug, Error)]
#[error("error syncing {path}: {source}")]
pub struct SyncFileError {
    pub path: String,
    #[source]
    pub source: StoreError,
}

impl SyncFileError {
    pub fn new(path: impl Into<String>, source: StoreError) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Every failure left over after the retry budget was exhausted.
#[derive(Debug, Error)]
pub struct SyncAggregateError {
    pub errors: Vec<SyncFileError>,
}

impl SyncAggregateError {
    pub fn is_forbidden(&self) -> bool {
        self.errors.iter().any(|e| e.source.is_forbidden())
    }
}

impl fmt::Display for SyncAggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to sync {} path(s)", self.errors.len())?;
        for err in &self.errors {
            write!(f, "\n  {}: {}", err.path, err.source)?;
        }
        Ok(())
    }
}

/// Top-level error of a publish run.
#[derive(Debug, Error)]
pub enum StageError {
    #[error("no source directory found at {}", .0.display())]
    MissingSource(PathBuf),

    #[error(transparent)]
    Compilation(#[from] CompilationError),

    #[error(transparent)]
    Sync(SyncAggregateError),

    /// The store answered "forbidden"; credentials need attention.
    #[error("permission denied by the object store; check your AWS credential configuration: {0}")]
    AuthPermission(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("object store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for StageError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Forbidden(msg) => StageError::AuthPermission(msg),
            other => StageError::Store(other),
        }
    }
}

/// A batch containing any forbidden failure becomes [`StageError::AuthPermission`],
/// still listing every failure of the batch.
impl From<SyncAggregateError> for StageError {
    fn from(err: SyncAggregateError) -> Self {
        if err.is_forbidden() {
            StageError::AuthPermission(err.to_string())
        } else {
            StageError::Sync(err)
        }
    }
}

impl StageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StageError::Io {
            path: path.into(),
            source,
        }
    }
}
