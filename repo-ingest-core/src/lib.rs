#![doc = "repo-ingest-core: turns a repository into summary, tree and content text."]

//! This crate holds all ingestion logic: acquiring a local or remote repository,
//! filtering its entries, walking it into a tree and extracting file contents.
//! The CLI crate is a thin shell around [`ingest::Ingestor`].
//!
//! # Usage
//! ```no_run
//! use repo_ingest_core::{CancellationToken, FilterSpec, IngestRequest, Ingestor};
//!
//! # async fn demo() -> Result<(), repo_ingest_core::IngestError> {
//! let result = Ingestor::git()
//!     .ingest(IngestRequest::new(".", FilterSpec::default()), &CancellationToken::new())
//!     .await?;
//! println!("{}\n{}", result.summary, result.tree);
//! # Ok(())
//! # }
//! ```

pub mod acquire;
pub mod cancel;
pub mod config;
pub mod contract;
pub mod error;
pub mod extract;
pub mod filter;
pub mod ingest;
pub mod summary;
pub mod tree;

pub use acquire::{EphemeralWorkspace, GitCli, RepositorySource, SourceAcquirer};
pub use cancel::CancellationToken;
pub use config::FilterSpec;
pub use contract::{AcquisitionKind, CloneError, CloneRequest, Cloner, EntryKind};
pub use error::{AcquisitionError, IngestError, TraversalWarning, WarningKind};
pub use ingest::{IngestRequest, Ingestor, ParseResult};
