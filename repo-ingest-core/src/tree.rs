//! Tree builder: walks the repository and keeps what the filter lets through.
//!
//! The walk is depth-first with an explicit stack, so pathological nesting
//! cannot exhaust the call stack. Entries are visited directories first, then
//! files, each group sorted by name (byte order). The same order drives the
//! rendered tree, the content blob and the summary.

use serde::Serialize;
use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::acquire::RepositorySource;
use crate::cancel::CancellationToken;
use crate::config::FilterSpec;
use crate::contract::EntryKind;
use crate::error::{IngestError, TraversalWarning, WarningKind};
use crate::filter::{CompiledFilter, FilterDecision};

/// One included filesystem entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TreeNode {
    pub name: String,
    /// Path relative to the repository root, `/` separated. Empty for the root.
    pub path: String,
    pub kind: EntryKind,
    /// Size in bytes for files; always 0 for directories.
    pub size: u64,
    pub children: Vec<TreeNode>,
    /// Set on directories that could not be read.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub diagnostic: Option<String>,
    #[serde(skip)]
    pub absolute_path: PathBuf,
}

impl TreeNode {
    fn directory(name: String, path: String, absolute_path: PathBuf) -> Self {
        Self {
            name,
            path,
            kind: EntryKind::Directory,
            size: 0,
            children: Vec::new(),
            diagnostic: None,
            absolute_path,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    /// Included files in depth-first traversal order.
    pub fn files(&self) -> Vec<&TreeNode> {
        let mut files = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if node.is_dir() {
                stack.extend(node.children.iter().rev());
            } else {
                files.push(node);
            }
        }
        files
    }

    /// Directories below this node (the node itself not counted).
    pub fn directory_count(&self) -> usize {
        let mut count = 0;
        let mut stack: Vec<&TreeNode> = self.children.iter().collect();
        while let Some(node) = stack.pop() {
            if node.is_dir() {
                count += 1;
                stack.extend(node.children.iter());
            }
        }
        count
    }
}

/// How many entries each filter rule admitted or dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FilterCounts {
    pub files_included: usize,
    pub files_excluded_by_pattern: usize,
    pub files_excluded_by_size: usize,
    /// Directories skipped whole because they matched an exclude pattern.
    pub directories_pruned: usize,
}

impl FilterCounts {
    pub fn files_excluded(&self) -> usize {
        self.files_excluded_by_pattern + self.files_excluded_by_size
    }
}

/// Output of a walk: the filtered tree plus what was dropped on the way.
#[derive(Debug, Clone)]
pub struct BuiltTree {
    pub root: TreeNode,
    pub counts: FilterCounts,
    pub warnings: Vec<TraversalWarning>,
}

/// Walks an acquired source with a freshly compiled filter.
pub fn build(source: &RepositorySource, spec: &FilterSpec) -> Result<BuiltTree, IngestError> {
    let filter = CompiledFilter::compile(spec)?;
    build_tree(source.root(), source.name(), &filter, &CancellationToken::new())
}

struct Frame {
    node: TreeNode,
    pending: std::vec::IntoIter<Entry>,
    identity: PathBuf,
}

struct Entry {
    name: String,
    absolute_path: PathBuf,
    kind: EntryKind,
    size: u64,
}

/// Blocking depth-first walk of `root`. Checks `cancel` before every entry.
pub fn build_tree(
    root: &Path,
    root_name: &str,
    filter: &CompiledFilter,
    cancel: &CancellationToken,
) -> Result<BuiltTree, IngestError> {
    info!(root = %root.display(), "Building repository tree");
    let mut counts = FilterCounts::default();
    let mut warnings = Vec::new();

    let mut root_node = TreeNode::directory(root_name.to_string(), String::new(), root.to_path_buf());
    let identity = fs::canonicalize(root).unwrap_or_else(|_| root.to_path_buf());
    // Symbolic links are only followed while they resolve beneath this.
    let canonical_root = identity.clone();
    let pending = match read_entries(root, "", &canonical_root, &mut warnings) {
        Ok(entries) => entries,
        Err(e) => {
            root_node.diagnostic = Some(unreadable(&mut warnings, "", &e));
            Vec::new()
        }
    };

    // Canonical identities of the directories currently on the walk path.
    let mut on_path: HashSet<PathBuf> = HashSet::from([identity.clone()]);
    let mut stack = vec![Frame {
        node: root_node,
        pending: pending.into_iter(),
        identity,
    }];
    let mut finished_root = None;

    while let Some(frame) = stack.last_mut() {
        if cancel.is_cancelled() {
            warn!(root = %root.display(), "Tree walk cancelled");
            return Err(IngestError::Cancelled);
        }

        let Some(entry) = frame.pending.next() else {
            if let Some(done) = stack.pop() {
                on_path.remove(&done.identity);
                match stack.last_mut() {
                    Some(parent) => {
                        // Directories without anything included are left out.
                        if !done.node.children.is_empty() || done.node.diagnostic.is_some() {
                            parent.node.children.push(done.node);
                        }
                    }
                    None => finished_root = Some(done.node),
                }
            }
            continue;
        };

        let relative = child_path(&frame.node.path, &entry.name);
        match entry.kind {
            EntryKind::File => match filter.evaluate(&relative, EntryKind::File, entry.size) {
                FilterDecision::Included => {
                    counts.files_included += 1;
                    frame.node.children.push(TreeNode {
                        name: entry.name,
                        path: relative,
                        kind: EntryKind::File,
                        size: entry.size,
                        children: Vec::new(),
                        diagnostic: None,
                        absolute_path: entry.absolute_path,
                    });
                }
                FilterDecision::ExcludedByPattern => {
                    debug!(path = %relative, "File excluded by pattern");
                    counts.files_excluded_by_pattern += 1;
                }
                FilterDecision::ExcludedBySize => {
                    debug!(path = %relative, size = entry.size, "File excluded by size");
                    counts.files_excluded_by_size += 1;
                }
            },
            EntryKind::Directory => {
                if !filter.is_included(&relative, EntryKind::Directory, 0) {
                    debug!(path = %relative, "Directory pruned by pattern");
                    counts.directories_pruned += 1;
                    continue;
                }
                let identity = match fs::canonicalize(&entry.absolute_path) {
                    Ok(identity) => identity,
                    Err(e) => {
                        warn!(path = %relative, error = %e, "Could not resolve directory");
                        warnings.push(TraversalWarning::new(
                            relative,
                            WarningKind::UnreadableEntry,
                            format!("could not resolve directory: {e}"),
                        ));
                        continue;
                    }
                };
                if on_path.contains(&identity) {
                    warn!(path = %relative, target = %identity.display(), "Symbolic link cycle skipped");
                    warnings.push(TraversalWarning::new(
                        relative,
                        WarningKind::SymlinkCycle,
                        format!("links back to ancestor {}", identity.display()),
                    ));
                    continue;
                }
                let mut node =
                    TreeNode::directory(entry.name, relative.clone(), entry.absolute_path.clone());
                match read_entries(&entry.absolute_path, &relative, &canonical_root, &mut warnings) {
                    Ok(children) => {
                        on_path.insert(identity.clone());
                        stack.push(Frame {
                            node,
                            pending: children.into_iter(),
                            identity,
                        });
                    }
                    Err(e) => {
                        node.diagnostic = Some(unreadable(&mut warnings, &relative, &e));
                        frame.node.children.push(node);
                    }
                }
            }
        }
    }

    let root = finished_root.unwrap_or_else(|| {
        TreeNode::directory(root_name.to_string(), String::new(), root.to_path_buf())
    });
    info!(
        files_included = counts.files_included,
        files_excluded = counts.files_excluded(),
        directories_pruned = counts.directories_pruned,
        warnings = warnings.len(),
        "Repository tree built"
    );
    Ok(BuiltTree {
        root,
        counts,
        warnings,
    })
}

fn child_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

fn unreadable(warnings: &mut Vec<TraversalWarning>, relative: &str, e: &io::Error) -> String {
    let message = format!("unreadable: {e}");
    warn!(path = %relative, error = %e, "Directory could not be read");
    warnings.push(TraversalWarning::new(
        relative,
        WarningKind::UnreadableDirectory,
        message.clone(),
    ));
    message
}

/// Lists a directory, sorted directories first.
///
/// Symbolic links are followed only when their target lies inside
/// `canonical_root`. Entries with names that are not valid UTF-8 are left out.
fn read_entries(
    dir: &Path,
    relative: &str,
    canonical_root: &Path,
    warnings: &mut Vec<TraversalWarning>,
) -> io::Result<Vec<Entry>> {
    let mut entries = Vec::new();
    for item in fs::read_dir(dir)? {
        let item = match item {
            Ok(item) => item,
            Err(e) => {
                warnings.push(TraversalWarning::new(
                    relative,
                    WarningKind::UnreadableEntry,
                    format!("could not list entry: {e}"),
                ));
                continue;
            }
        };
        let file_name = item.file_name();
        let Some(name) = file_name.to_str().map(str::to_owned) else {
            let lossy = child_path(relative, &file_name.to_string_lossy());
            warn!(path = %lossy, "Entry name is not valid UTF-8, skipped");
            warnings.push(TraversalWarning::new(
                lossy,
                WarningKind::NonUtf8Name,
                "name is not valid UTF-8",
            ));
            continue;
        };
        let absolute_path = item.path();
        let entry_relative = child_path(relative, &name);

        let file_type = match item.file_type() {
            Ok(file_type) => file_type,
            Err(e) => {
                warnings.push(TraversalWarning::new(
                    entry_relative,
                    WarningKind::UnreadableEntry,
                    format!("could not stat entry: {e}"),
                ));
                continue;
            }
        };
        let metadata = if file_type.is_symlink() {
            let target = match fs::canonicalize(&absolute_path) {
                Ok(target) => target,
                Err(e) => {
                    debug!(path = %entry_relative, error = %e, "Broken symbolic link skipped");
                    warnings.push(TraversalWarning::new(
                        entry_relative,
                        WarningKind::BrokenSymlink,
                        format!("broken symbolic link: {e}"),
                    ));
                    continue;
                }
            };
            if !target.starts_with(canonical_root) {
                warn!(
                    path = %entry_relative,
                    target = %target.display(),
                    "Symbolic link leaves the repository, skipped"
                );
                warnings.push(TraversalWarning::new(
                    entry_relative,
                    WarningKind::SymlinkOutsideRoot,
                    format!("points outside the repository to {}", target.display()),
                ));
                continue;
            }
            match fs::metadata(&target) {
                Ok(metadata) => metadata,
                Err(e) => {
                    warnings.push(TraversalWarning::new(
                        entry_relative,
                        WarningKind::UnreadableEntry,
                        format!("could not stat link target: {e}"),
                    ));
                    continue;
                }
            }
        } else {
            match item.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warnings.push(TraversalWarning::new(
                        entry_relative,
                        WarningKind::UnreadableEntry,
                        format!("could not stat entry: {e}"),
                    ));
                    continue;
                }
            }
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else if metadata.is_file() {
            EntryKind::File
        } else {
            debug!(path = %entry_relative, "Special file skipped");
            continue;
        };
        entries.push(Entry {
            name,
            absolute_path,
            kind,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
        });
    }
    entries.sort_by(|a, b| {
        let a_file = a.kind == EntryKind::File;
        let b_file = b.kind == EntryKind::File;
        a_file.cmp(&b_file).then_with(|| a.name.cmp(&b.name))
    });
    Ok(entries)
}

/// Renders the tree with box-drawing connectors, one line per entry.
///
/// ```text
/// repo/
/// ├── src/
/// │   └── a.py
/// └── README.md
/// ```
///
/// An empty tree (nothing included, nothing to report) renders as "".
pub fn render(root: &TreeNode) -> String {
    if root.children.is_empty() && root.diagnostic.is_none() {
        return String::new();
    }
    let mut output = String::new();
    push_line(&mut output, "", "", root);

    // (node, prefix for its line, is_last)
    let mut stack: Vec<(&TreeNode, String, bool)> = Vec::new();
    push_children(&mut stack, root, "");
    while let Some((node, prefix, is_last)) = stack.pop() {
        let connector = if is_last { "└── " } else { "├── " };
        push_line(&mut output, &prefix, connector, node);
        if node.is_dir() {
            let child_prefix = format!("{prefix}{}", if is_last { "    " } else { "│   " });
            push_children(&mut stack, node, &child_prefix);
        }
    }
    output
}

fn push_children<'a>(stack: &mut Vec<(&'a TreeNode, String, bool)>, node: &'a TreeNode, prefix: &str) {
    let total = node.children.len();
    for (i, child) in node.children.iter().enumerate().rev() {
        stack.push((child, prefix.to_string(), i + 1 == total));
    }
}

fn push_line(output: &mut String, prefix: &str, connector: &str, node: &TreeNode) {
    output.push_str(prefix);
    output.push_str(connector);
    output.push_str(&node.name);
    if node.is_dir() {
        output.push('/');
    }
    if let Some(diagnostic) = &node.diagnostic {
        output.push_str(" [");
        output.push_str(diagnostic);
        output.push(']');
    }
    output.push('\n');
}
