//! # contract: shared types and the seam to the outside world
//!
//! Plain data shared by every stage of an ingestion, plus the one trait that
//! touches something external: [`Cloner`], which fetches a remote repository
//! into a local directory.
//!
//! ## Mocking & Testing
//! - `Cloner` is annotated for `mockall`; with the `test-export-mocks` feature
//!   (on by default) `MockCloner` is exported so integration tests can exercise
//!   remote acquisition without network access.

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use std::path::PathBuf;

use crate::cancel::CancellationToken;
use crate::error::AcquisitionError;

/// Kind of a filesystem entry as seen by the filter engine and tree builder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// How the repository root was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AcquisitionKind {
    /// An existing directory, used in place.
    Local,
    /// A remote repository cloned into an ephemeral workspace.
    Cloned,
}

/// Everything a [`Cloner`] needs to fetch one repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    /// URL handed to git. May carry an access token; never log it directly,
    /// use [`CloneRequest::display_url`].
    pub url: String,
    /// Branch, tag or commit to check out. `None` means the remote default.
    pub reference: Option<String>,
    /// Directory to clone into. Its parent exists; the directory itself does not.
    pub destination: PathBuf,
}

impl CloneRequest {
    /// The URL with any embedded credentials masked.
    pub fn display_url(&self) -> String {
        crate::acquire::redact_url(&self.url)
    }
}

/// Fetches a remote repository into a local directory.
///
/// Implementations return [`CloneError::Cancelled`] promptly once `cancel`
/// fires. Cleanup of the destination is not their concern: it lives inside a
/// workspace owned by the acquirer.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Cloner: Send + Sync {
    async fn clone_repository(
        &self,
        request: CloneRequest,
        cancel: CancellationToken,
    ) -> Result<(), CloneError>;
}

/// Why a clone did not complete.
#[derive(Debug)]
pub enum CloneError {
    Failed(AcquisitionError),
    Cancelled,
}

impl From<AcquisitionError> for CloneError {
    fn from(e: AcquisitionError) -> Self {
        CloneError::Failed(e)
    }
}
