//! High-level pipeline: acquire → walk → {summarise, extract} for one location.
//!
//! This module ties the stages together into a single call. A parse:
//!   - validates and compiles the [`FilterSpec`] (no IO yet, so bad input fails fast)
//!   - resolves the location into a [`RepositorySource`], cloning remote repositories
//!     into an ephemeral workspace
//!   - walks the tree on the blocking pool
//!   - builds the summary and the content blob from that same tree
//!
//! # Major Types
//! - [`IngestRequest`]: what to parse and how to filter it
//! - [`ParseResult`]: the three text outputs plus counts and warnings
//! - [`Ingestor`]: holds the acquirer and extraction settings, runs parses
//!
//! # Resource ownership
//! The [`RepositorySource`] lives until the end of [`Ingestor::ingest`]. Its
//! workspace, if any, is removed when it drops, whichever way the call exits.
//!
//! # Error Handling
//! Only acquisition failures, filter configuration errors and cancellation
//! abort a parse. Unreadable entries and binary files end up in
//! [`ParseResult::warnings`] and the counts.

use serde::Serialize;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::acquire::{GitCli, RepositorySource, SourceAcquirer};
use crate::cancel::CancellationToken;
use crate::config::FilterSpec;
use crate::contract::{AcquisitionKind, Cloner};
use crate::error::{IngestError, TraversalWarning};
use crate::extract::{self, DEFAULT_CONCURRENCY};
use crate::filter::CompiledFilter;
use crate::summary::{summarize, IngestCounts};
use crate::tree::{self, BuiltTree};

/// One parse: a location plus the rules deciding what to keep.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    /// Local directory path or remote repository reference.
    pub location: String,
    /// Branch, tag or commit for remote repositories.
    pub reference: Option<String>,
    pub filter: FilterSpec,
}

impl IngestRequest {
    pub fn new(location: impl Into<String>, filter: FilterSpec) -> Self {
        Self {
            location: location.into(),
            reference: None,
            filter,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.reference = reference;
        self
    }
}

/// Output of one parse. Immutable once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ParseResult {
    pub summary: String,
    pub tree: String,
    pub content: String,
    pub included_count: usize,
    pub excluded_count: usize,
    pub counts: IngestCounts,
    pub warnings: Vec<TraversalWarning>,
    pub source_kind: AcquisitionKind,
}

/// Runs parses against a configured [`SourceAcquirer`].
pub struct Ingestor<C> {
    acquirer: SourceAcquirer<C>,
    concurrency: usize,
}

impl Ingestor<GitCli> {
    /// Ingestor cloning with the `git` executable on `PATH`.
    pub fn git() -> Self {
        Self::new(SourceAcquirer::git())
    }
}

impl<C: Cloner> Ingestor<C> {
    pub fn new(acquirer: SourceAcquirer<C>) -> Self {
        Self {
            acquirer,
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    /// Number of files read in parallel during extraction (minimum 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub async fn ingest(
        &self,
        request: IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<ParseResult, IngestError> {
        let parse_id = Uuid::new_v4();
        let span = info_span!("ingest", %parse_id, location = %crate::acquire::redact_url(&request.location));
        self.run(request, cancel).instrument(span).await
    }

    async fn run(
        &self,
        request: IngestRequest,
        cancel: &CancellationToken,
    ) -> Result<ParseResult, IngestError> {
        info!("[INGEST] Starting parse");
        let filter = CompiledFilter::compile(&request.filter).map_err(|e| {
            error!(error = %e, "[INGEST][ERROR] Invalid filter configuration");
            e
        })?;
        request.filter.trace_loaded();

        let source = self
            .acquirer
            .acquire(&request.location, request.reference.as_deref(), cancel)
            .await?;
        info!(
            root = %source.root().display(),
            kind = ?source.kind(),
            "[INGEST] Source acquired"
        );

        // `source` is dropped at the end of this function on every path,
        // which removes a cloned workspace.
        let built = walk(&source, filter, cancel).await?;
        let BuiltTree {
            root,
            counts: filter_counts,
            mut warnings,
        } = built;

        let extraction = extract::extract(&root, &request.filter, self.concurrency, cancel).await?;
        warnings.extend(extraction.warnings);

        let mut counts = IngestCounts::from_filter(filter_counts);
        counts.binary_skipped = extraction.binary_skipped;
        counts.read_failures = extraction.read_failures;

        let result = ParseResult {
            summary: summarize(&root, &counts),
            tree: tree::render(&root),
            content: extraction.content,
            included_count: counts.files_included,
            excluded_count: counts.files_excluded(),
            counts,
            warnings,
            source_kind: source.kind(),
        };
        info!(
            included = result.included_count,
            excluded = result.excluded_count,
            warnings = result.warnings.len(),
            content_bytes = result.content.len(),
            "[INGEST] Parse finished"
        );
        Ok(result)
    }
}

async fn walk(
    source: &RepositorySource,
    filter: CompiledFilter,
    cancel: &CancellationToken,
) -> Result<BuiltTree, IngestError> {
    let root = source.root().to_path_buf();
    let name = source.name().to_string();
    let cancel = cancel.clone();
    tokio::task::spawn_blocking(move || tree::build_tree(&root, &name, &filter, &cancel))
        .await
        .map_err(|e| {
            error!(error = ?e, "[INGEST][ERROR] Tree walk task failed");
            IngestError::Task(e.to_string())
        })?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::{CloneError, MockCloner};

    #[tokio::test]
    async fn invalid_filter_fails_before_acquisition() {
        let mut cloner = MockCloner::new();
        cloner.expect_clone_repository().never();
        let ingestor = Ingestor::new(SourceAcquirer::new(cloner));
        let request = IngestRequest::new(
            "https://example.com/o/r.git",
            FilterSpec {
                max_file_size_bytes: -1,
                ..FilterSpec::unbounded()
            },
        );
        let err = ingestor
            .ingest(request, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::FilterConfig(_)));
    }

    #[tokio::test]
    async fn local_directory_parse() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("main.rs"), "fn main() {}\n").unwrap();
        let ingestor = Ingestor::new(SourceAcquirer::new(MockCloner::new()));
        let result = ingestor
            .ingest(
                IngestRequest::new(tmp.path().to_string_lossy(), FilterSpec::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(result.source_kind, AcquisitionKind::Local);
        assert_eq!(result.included_count, 1);
        assert!(result.content.contains("fn main() {}"));
        assert!(result.tree.ends_with("└── main.rs\n"));
    }

    #[tokio::test]
    async fn cancelled_clone_surfaces_as_cancelled() {
        let workspace = tempfile::tempdir().unwrap();
        let mut cloner = MockCloner::new();
        cloner
            .expect_clone_repository()
            .returning(|_, _| Err(CloneError::Cancelled));
        let ingestor =
            Ingestor::new(SourceAcquirer::new(cloner).with_workspace_root(workspace.path()));
        let err = ingestor
            .ingest(
                IngestRequest::new("https://example.com/o/r", FilterSpec::default()),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::Cancelled));
        assert_eq!(std::fs::read_dir(workspace.path()).unwrap().count(), 0);
    }
}
