use serde::Serialize;
use std::collections::BTreeMap;

use crate::tree::{FilterCounts, TreeNode};

/// All the numbers a parse reports, gathered from the walk and the extraction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestCounts {
    pub files_included: usize,
    pub files_excluded_by_pattern: usize,
    pub files_excluded_by_size: usize,
    pub directories_pruned: usize,
    pub binary_skipped: usize,
    pub read_failures: usize,
}

impl IngestCounts {
    pub fn from_filter(counts: FilterCounts) -> Self {
        Self {
            files_included: counts.files_included,
            files_excluded_by_pattern: counts.files_excluded_by_pattern,
            files_excluded_by_size: counts.files_excluded_by_size,
            directories_pruned: counts.directories_pruned,
            ..Self::default()
        }
    }

    pub fn files_excluded(&self) -> usize {
        self.files_excluded_by_pattern + self.files_excluded_by_size
    }
}

#[derive(Default)]
struct ExtensionStats {
    files: usize,
    bytes: u64,
}

/// Builds the fixed-format summary from the already filtered tree.
///
/// Walks the in-memory tree once; never touches the filesystem.
pub fn summarize(root: &TreeNode, counts: &IngestCounts) -> String {
    let mut total_bytes = 0u64;
    let mut extensions: BTreeMap<String, ExtensionStats> = BTreeMap::new();
    for file in root.files() {
        total_bytes += file.size;
        let stats = extensions.entry(extension_of(&file.name)).or_default();
        stats.files += 1;
        stats.bytes += file.size;
    }

    let mut out = String::new();
    out.push_str(&format!("Repository: {}\n", root.name));
    out.push_str(&format!("Files included: {}\n", counts.files_included));
    out.push_str(&format!(
        "Files excluded by pattern: {}\n",
        counts.files_excluded_by_pattern
    ));
    out.push_str(&format!(
        "Files excluded by size: {}\n",
        counts.files_excluded_by_size
    ));
    out.push_str(&format!("Directories pruned: {}\n", counts.directories_pruned));
    out.push_str(&format!("Binary files skipped: {}\n", counts.binary_skipped));
    out.push_str(&format!("Unreadable files: {}\n", counts.read_failures));
    out.push_str(&format!("Directories: {}\n", root.directory_count()));
    out.push_str(&format!(
        "Total size: {total_bytes} bytes ({})\n",
        human_size(total_bytes)
    ));

    if !extensions.is_empty() {
        out.push_str("\nBy extension:\n");
        for (extension, stats) in &extensions {
            let noun = if stats.files == 1 { "file" } else { "files" };
            out.push_str(&format!(
                "  {extension}: {} {noun}, {}\n",
                stats.files,
                human_size(stats.bytes)
            ));
        }
    }
    out
}

/// `.rs` for `main.rs`, `(none)` for `Makefile` or `.gitignore`.
fn extension_of(name: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => format!(".{ext}"),
        _ => "(none)".to_string(),
    }
}

pub fn human_size(bytes: u64) -> String {
    const KIB: f64 = 1024.0;
    let b = bytes as f64;
    if b < KIB {
        format!("{bytes} B")
    } else if b < KIB * KIB {
        format!("{:.1} KiB", b / KIB)
    } else if b < KIB * KIB * KIB {
        format!("{:.1} MiB", b / (KIB * KIB))
    } else {
        format!("{:.1} GiB", b / (KIB * KIB * KIB))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::EntryKind;
    use std::path::PathBuf;

    fn file(path: &str, size: u64) -> TreeNode {
        TreeNode {
            name: path.rsplit('/').next().unwrap().to_string(),
            path: path.to_string(),
            kind: EntryKind::File,
            size,
            children: vec![],
            diagnostic: None,
            absolute_path: PathBuf::new(),
        }
    }

    fn dir(name: &str, children: Vec<TreeNode>) -> TreeNode {
        TreeNode {
            name: name.to_string(),
            path: name.to_string(),
            kind: EntryKind::Directory,
            size: 0,
            children,
            diagnostic: None,
            absolute_path: PathBuf::new(),
        }
    }

    #[test]
    fn summary_has_fixed_layout() {
        let root = dir(
            "repo",
            vec![
                dir("src", vec![file("src/a.py", 10), file("src/b.py", 2048)]),
                file("Makefile", 5),
            ],
        );
        let counts = IngestCounts {
            files_included: 3,
            files_excluded_by_pattern: 1,
            ..IngestCounts::default()
        };
        assert_eq!(
            summarize(&root, &counts),
            "Repository: repo\n\
             Files included: 3\n\
             Files excluded by pattern: 1\n\
             Files excluded by size: 0\n\
             Directories pruned: 0\n\
             Binary files skipped: 0\n\
             Unreadable files: 0\n\
             Directories: 1\n\
             Total size: 2063 bytes (2.0 KiB)\n\
             \n\
             By extension:\n\
             \x20 (none): 1 file, 5 B\n\
             \x20 .py: 2 files, 2.0 KiB\n"
        );
    }

    #[test]
    fn empty_tree_has_no_breakdown() {
        let root = dir("repo", vec![]);
        let counts = IngestCounts {
            files_excluded_by_size: 3,
            ..IngestCounts::default()
        };
        let summary = summarize(&root, &counts);
        assert!(summary.contains("Files included: 0\n"));
        assert!(summary.contains("Files excluded by size: 3\n"));
        assert!(!summary.contains("By extension"));
    }

    #[test]
    fn extensions_ignore_dotfiles() {
        assert_eq!(extension_of("main.rs"), ".rs");
        assert_eq!(extension_of("archive.tar.gz"), ".gz");
        assert_eq!(extension_of(".gitignore"), "(none)");
        assert_eq!(extension_of("Makefile"), "(none)");
    }

    #[test]
    fn sizes_are_humanised() {
        assert_eq!(human_size(0), "0 B");
        assert_eq!(human_size(1536), "1.5 KiB");
        assert_eq!(human_size(10 * 1024 * 1024), "10.0 MiB");
    }
}
