//! Error taxonomy for an ingestion run.
//!
//! Only [`IngestError`] aborts a parse. Everything else that can go wrong while
//! walking or reading a repository is reported as a [`TraversalWarning`] and the
//! run carries on with whatever it could collect.

use serde::Serialize;
use std::path::Path;

/// Fatal errors: the caller gets no `ParseResult`.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("acquisition failed: {0}")]
    Acquisition(#[from] AcquisitionError),

    #[error("invalid filter configuration: {0}")]
    FilterConfig(String),

    #[error("ingestion cancelled")]
    Cancelled,

    #[error("internal task failed: {0}")]
    Task(String),
}

/// Why a location could not be turned into a local directory snapshot.
#[derive(Debug, thiserror::Error)]
pub enum AcquisitionError {
    #[error("'{0}' is neither an existing directory nor a recognised repository URL")]
    InvalidLocation(String),

    #[error("authentication required to clone {url}")]
    AuthenticationRequired { url: String },

    #[error("git clone of {url} failed: {message}")]
    CloneFailed { url: String, message: String },

    #[error("git checkout of '{reference}' failed: {message}")]
    CheckoutFailed { reference: String, message: String },

    #[error("could not launch git: {0}")]
    GitUnavailable(#[source] std::io::Error),

    #[error("could not prepare clone workspace: {0}")]
    Workspace(#[source] std::io::Error),
}

/// A non-fatal problem met during traversal or extraction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TraversalWarning {
    /// Path relative to the repository root (`/` separated).
    pub path: String,
    pub kind: WarningKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    UnreadableDirectory,
    UnreadableEntry,
    SymlinkCycle,
    BrokenSymlink,
    /// A symbolic link resolving outside the repository root; never followed.
    SymlinkOutsideRoot,
    /// An entry whose name is not valid UTF-8; left out of the tree.
    NonUtf8Name,
    BinarySkipped,
    ChangedDuringRead,
}

impl TraversalWarning {
    pub(crate) fn new(path: impl Into<String>, kind: WarningKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for TraversalWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

/// Helper used by the acquirer when an IO failure has a path worth keeping.
pub(crate) fn workspace_error(path: &Path, e: std::io::Error) -> AcquisitionError {
    tracing::error!(error = ?e, path = %path.display(), "Failed to prepare clone workspace");
    AcquisitionError::Workspace(e)
}
