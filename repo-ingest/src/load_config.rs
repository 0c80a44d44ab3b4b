/// `load_config` module: loads the optional YAML config file and injects secrets from the environment.
///
/// This module is the only place where untrusted YAML is parsed into typed settings.
///
/// # Responsibilities
/// - Parse the user-supplied YAML file into [`CliConfig`]; every section and key is optional
/// - Accept pattern lists either as YAML sequences or as one comma/whitespace separated string
/// - Inject the clone access token from `GITHUB_TOKEN`; secrets never live in the YAML file
///
/// # Errors
/// All errors use `anyhow::Error` and are surfaced at the CLI boundary.
///
/// Accepted schema:
///
/// ```yaml
/// filter:
///   max_file_size_mb: 10
///   include: ["*.rs", "docs/"]
///   exclude: ".*, target/"
/// clone:
///   reference: main
///   workspace_dir: /var/tmp/ingest
/// extract:
///   concurrency: 8
/// ```
use anyhow::{anyhow, Result};
use repo_ingest_core::filter::parse_pattern_list;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};

/// Environment variable holding the token used for private HTTPS clones.
pub const ACCESS_TOKEN_ENV: &str = "GITHUB_TOKEN";

#[derive(Debug, Default, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub filter: FilterSection,
    #[serde(default)]
    pub clone: CloneSection,
    #[serde(default)]
    pub extract: ExtractSection,
    /// Injected from the environment, never read from YAML.
    #[serde(skip)]
    pub access_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct FilterSection {
    pub max_file_size_mb: Option<f64>,
    pub include: Option<PatternList>,
    pub exclude: Option<PatternList>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CloneSection {
    /// Branch, tag or commit to check out.
    pub reference: Option<String>,
    /// Parent directory for ephemeral clone workspaces.
    pub workspace_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExtractSection {
    pub concurrency: Option<usize>,
}

/// Patterns written either as a YAML list or as a single delimited string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PatternList {
    Many(Vec<String>),
    One(String),
}

impl PatternList {
    pub fn into_patterns(self) -> Vec<String> {
        match self {
            PatternList::Many(patterns) => patterns
                .iter()
                .flat_map(|p| parse_pattern_list(p))
                .collect(),
            PatternList::One(raw) => parse_pattern_list(&raw),
        }
    }
}

impl CliConfig {
    /// Config with every value defaulted, plus secrets from the environment.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.inject_env();
        config
    }

    fn inject_env(&mut self) {
        self.access_token = std::env::var(ACCESS_TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty());
    }

    pub fn trace_loaded(&self) {
        info!(
            max_file_size_mb = ?self.filter.max_file_size_mb,
            reference = ?self.clone.reference,
            workspace_dir = ?self.clone.workspace_dir,
            concurrency = ?self.extract.concurrency,
            access_token_set = self.access_token.is_some(),
            "Loaded CliConfig"
        );
        debug!(filter = ?self.filter, "CliConfig filter section (full debug)");
    }
}

/// Loads a YAML config file (no secrets) and injects secrets from the environment.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => content,
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow!("Failed to read config file {:?}: {}", path_ref, e));
        }
    };

    let mut config: CliConfig = if config_content.trim().is_empty() {
        CliConfig::default()
    } else {
        match serde_yaml::from_str(&config_content) {
            Ok(conf) => {
                info!(config_path = ?path_ref, "Parsed config YAML successfully");
                conf
            }
            Err(e) => {
                error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
                return Err(anyhow!("Failed to parse config YAML: {e}"));
            }
        }
    };

    config.inject_env();
    config.trace_loaded();
    Ok(config)
}
