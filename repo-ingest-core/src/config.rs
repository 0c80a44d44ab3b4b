use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::IngestError;

/// Default size ceiling for a single file, in megabytes.
pub const DEFAULT_MAX_FILE_SIZE_MB: f64 = 10.0;

/// Hidden files and directories (which includes `.git`).
pub const DEFAULT_EXCLUDE_PATTERNS: &[&str] = &[".*"];

/// Size and pattern rules deciding which entries end up in the digest.
///
/// An empty `include_patterns` includes everything. An entry matching any
/// exclude pattern is dropped even when it also matches an include pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub max_file_size_bytes: i64,
    #[serde(default)]
    pub include_patterns: Vec<String>,
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterSpec {
    fn default() -> Self {
        Self {
            max_file_size_bytes: megabytes_to_bytes(DEFAULT_MAX_FILE_SIZE_MB),
            include_patterns: Vec::new(),
            exclude_patterns: DEFAULT_EXCLUDE_PATTERNS
                .iter()
                .map(|p| (*p).to_string())
                .collect(),
        }
    }
}

impl FilterSpec {
    /// Accepts every file of any size.
    pub fn unbounded() -> Self {
        Self {
            max_file_size_bytes: i64::MAX,
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
        }
    }

    /// Builds a spec from a ceiling given in megabytes, the unit used by
    /// human-facing configuration.
    pub fn from_megabytes(
        max_file_size_mb: f64,
        include_patterns: Vec<String>,
        exclude_patterns: Vec<String>,
    ) -> Result<Self, IngestError> {
        if !max_file_size_mb.is_finite() || max_file_size_mb < 0.0 {
            return Err(IngestError::FilterConfig(format!(
                "max file size must be a non-negative number of megabytes, got {max_file_size_mb}"
            )));
        }
        let spec = Self {
            max_file_size_bytes: megabytes_to_bytes(max_file_size_mb),
            include_patterns,
            exclude_patterns,
        };
        spec.validate()?;
        Ok(spec)
    }

    /// Rejects values that would make filtering silently misbehave.
    pub fn validate(&self) -> Result<(), IngestError> {
        if self.max_file_size_bytes < 0 {
            return Err(IngestError::FilterConfig(format!(
                "max_file_size_bytes must not be negative, got {}",
                self.max_file_size_bytes
            )));
        }
        for (set, patterns) in [
            ("include", &self.include_patterns),
            ("exclude", &self.exclude_patterns),
        ] {
            if let Some(bad) = patterns.iter().find(|p| p.contains('\0')) {
                return Err(IngestError::FilterConfig(format!(
                    "{set} pattern {bad:?} contains a NUL byte"
                )));
            }
        }
        Ok(())
    }

    pub fn trace_loaded(&self) {
        info!(
            max_file_size_bytes = self.max_file_size_bytes,
            include_count = self.include_patterns.len(),
            exclude_count = self.exclude_patterns.len(),
            "Loaded FilterSpec"
        );
        debug!(?self, "FilterSpec loaded (full debug)");
    }
}

fn megabytes_to_bytes(mb: f64) -> i64 {
    let bytes = (mb * 1024.0 * 1024.0).floor();
    if bytes >= i64::MAX as f64 {
        i64::MAX
    } else {
        bytes as i64
    }
}
