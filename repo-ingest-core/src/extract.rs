//! Content extractor: concatenates the text of every included file.
//!
//! Files are read on the blocking pool, several at a time, but their blocks
//! are appended strictly in tree order. Each block looks like
//!
//! ```text
//! ================================================
//! FILE: src/a.py (9 bytes)
//! ================================================
//! <file text, unchanged>
//!
//! ```
//!
//! The byte count in the header makes each block self-delimiting: a reader
//! takes exactly that many bytes as the file text, whatever they contain.
//!
//! Binary detection is a heuristic: a NUL byte in the first 8 KiB, or bytes
//! that are not valid UTF-8 anywhere in the file.

use futures::stream::{self, StreamExt};
use std::fs::File;
use std::io::{self, Read};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::cancel::CancellationToken;
use crate::config::FilterSpec;
use crate::error::{IngestError, TraversalWarning, WarningKind};
use crate::tree::TreeNode;

/// Width of the `=` rules around each block header.
pub const RULE_WIDTH: usize = 48;

/// Bytes inspected for NUL when sniffing for binary content.
pub const SNIFF_LEN: usize = 8 * 1024;

/// Files read concurrently unless configured otherwise.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// The content blob and what was left out of it.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub content: String,
    /// Files written to the blob.
    pub files_extracted: usize,
    /// Files classified as binary.
    pub binary_skipped: usize,
    /// Files that vanished, became unreadable or grew past the ceiling after the walk.
    pub read_failures: usize,
    pub warnings: Vec<TraversalWarning>,
}

#[derive(Debug)]
enum FileText {
    Text(String),
    Binary,
    TooLarge,
}

/// Reads every file under `root` in traversal order and builds the blob.
///
/// `concurrency` bounds the number of files in flight (minimum 1). Files larger
/// than the size ceiling at read time are skipped with a warning.
pub async fn extract(
    root: &TreeNode,
    spec: &FilterSpec,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<Extraction, IngestError> {
    spec.validate()?;
    // Validated above, so the ceiling is non-negative.
    let limit = u64::try_from(spec.max_file_size_bytes).unwrap_or(u64::MAX);
    let files: Vec<(String, PathBuf)> = root
        .files()
        .into_iter()
        .map(|f| (f.path.clone(), f.absolute_path.clone()))
        .collect();
    info!(files = files.len(), concurrency, "Extracting file contents");

    let mut reads = stream::iter(files)
        .map(|(relative, absolute)| {
            let cancel = cancel.clone();
            async move {
                let result = tokio::task::spawn_blocking(move || {
                    if cancel.is_cancelled() {
                        return Err(io::Error::new(io::ErrorKind::Interrupted, "cancelled"));
                    }
                    read_text(&absolute, limit)
                })
                .await;
                (relative, result)
            }
        })
        .buffered(concurrency.max(1));

    let mut extraction = Extraction::default();
    while let Some((relative, result)) = reads.next().await {
        if cancel.is_cancelled() {
            warn!("Extraction cancelled");
            return Err(IngestError::Cancelled);
        }
        let outcome = result.map_err(|e| IngestError::Task(e.to_string()))?;
        match outcome {
            Ok(FileText::Text(text)) => {
                push_block(&mut extraction.content, &relative, &text);
                extraction.files_extracted += 1;
            }
            Ok(FileText::Binary) => {
                debug!(path = %relative, "Binary file skipped");
                extraction.binary_skipped += 1;
                extraction.warnings.push(TraversalWarning::new(
                    relative,
                    WarningKind::BinarySkipped,
                    "binary content skipped",
                ));
            }
            Ok(FileText::TooLarge) => {
                warn!(path = %relative, limit, "File grew past the size ceiling after the walk");
                extraction.read_failures += 1;
                extraction.warnings.push(TraversalWarning::new(
                    relative,
                    WarningKind::ChangedDuringRead,
                    format!("file grew past {limit} bytes during extraction"),
                ));
            }
            Err(e) => {
                warn!(path = %relative, error = %e, "Failed to read file");
                extraction.read_failures += 1;
                extraction.warnings.push(TraversalWarning::new(
                    relative,
                    WarningKind::UnreadableEntry,
                    format!("could not read file: {e}"),
                ));
            }
        }
    }

    info!(
        files_extracted = extraction.files_extracted,
        binary_skipped = extraction.binary_skipped,
        read_failures = extraction.read_failures,
        bytes = extraction.content.len(),
        "Extraction finished"
    );
    Ok(extraction)
}

/// Reads at most `limit + 1` bytes so a file that grew cannot blow up memory.
fn read_text(path: &std::path::Path, limit: u64) -> io::Result<FileText> {
    let file = File::open(path)?;
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() as u64 > limit {
        return Ok(FileText::TooLarge);
    }
    if looks_binary(&bytes) {
        return Ok(FileText::Binary);
    }
    match String::from_utf8(bytes) {
        Ok(text) => Ok(FileText::Text(text)),
        Err(_) => Ok(FileText::Binary),
    }
}

/// True if the sniffed prefix contains a NUL byte.
pub fn looks_binary(bytes: &[u8]) -> bool {
    bytes[..bytes.len().min(SNIFF_LEN)].contains(&0)
}

fn rule() -> String {
    "=".repeat(RULE_WIDTH)
}

/// Appends one annotated block to `blob`.
pub fn push_block(blob: &mut String, relative_path: &str, text: &str) {
    let rule = rule();
    blob.push_str(&rule);
    blob.push_str("\nFILE: ");
    blob.push_str(relative_path);
    blob.push_str(&format!(" ({} bytes)\n", text.len()));
    blob.push_str(&rule);
    blob.push('\n');
    blob.push_str(text);
    blob.push_str("\n\n");
}

/// Splits a content blob back into `(path, text)` pairs, in blob order.
///
/// Stops at the first block that does not parse; everything before it is
/// returned.
pub fn split_content_blob(blob: &str) -> Vec<(String, String)> {
    let rule = rule();
    let opener = format!("{rule}\nFILE: ");
    let header_end = format!(" bytes)\n{rule}\n");
    let mut blocks = Vec::new();
    let mut rest = blob;
    while let Some(header) = rest.strip_prefix(opener.as_str()) {
        let Some(end) = header.find(header_end.as_str()) else {
            break;
        };
        let Some((path, len)) = header[..end].rsplit_once(" (") else {
            break;
        };
        let Ok(len) = len.parse::<usize>() else {
            break;
        };
        let body = &header[end + header_end.len()..];
        let Some(text) = body.get(..len) else {
            break;
        };
        let Some(next) = body[len..].strip_prefix("\n\n") else {
            break;
        };
        blocks.push((path.to_string(), text.to_string()));
        rest = next;
    }
    blocks
}
