///
/// This module implements the CLI interface for repo-ingest: command parsing,
/// merging flags with the config file, cancellation wiring and output.
///
/// All ingestion logic (acquisition, filtering, tree building, extraction) lives
/// in the [`repo-ingest-core`] crate. This module is strictly CLI glue.
///
/// ## Features
/// - Entry struct [`Cli`] with the `ingest` subcommand.
/// - Flags override values from the YAML config, which override built-in defaults.
/// - Ctrl-C and `--timeout-secs` cancel a running parse; clone workspaces are still removed.
/// - Async entrypoint ([`run`]) for programmatic invocation and integration testing.
///
/// [`repo-ingest-core`]: ../../repo-ingest-core/
use crate::load_config::{load_config, CliConfig};
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use repo_ingest_core::acquire::redact_url;
use repo_ingest_core::config::DEFAULT_MAX_FILE_SIZE_MB;
use repo_ingest_core::extract::DEFAULT_CONCURRENCY;
use repo_ingest_core::filter::parse_pattern_list;
use repo_ingest_core::{
    CancellationToken, FilterSpec, IngestRequest, Ingestor, ParseResult, SourceAcquirer,
};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

/// CLI for repo-ingest: turn a repository into LLM-ready text.
#[derive(Parser)]
#[clap(
    name = "repo-ingest",
    version,
    about = "Produce a summary, directory tree and concatenated file contents for a local or remote repository"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Parse a local directory or remote git repository
    Ingest(IngestArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct IngestArgs {
    /// Local directory path or remote repository URL
    pub location: String,

    /// Path to an optional YAML config file
    #[clap(long)]
    pub config: Option<PathBuf>,

    /// Branch, tag or commit to check out (remote repositories only)
    #[clap(long, alias = "reference")]
    pub branch: Option<String>,

    /// Skip files larger than this many megabytes
    #[clap(long)]
    pub max_size_mb: Option<f64>,

    /// Include pattern; repeatable, or comma separated
    #[clap(long)]
    pub include: Vec<String>,

    /// Exclude pattern; repeatable, or comma separated. Pass "" to clear the defaults
    #[clap(long)]
    pub exclude: Vec<String>,

    /// Parent directory for the temporary clone workspace
    #[clap(long)]
    pub workspace_dir: Option<PathBuf>,

    /// Files read in parallel during extraction
    #[clap(long)]
    pub concurrency: Option<usize>,

    /// Output format on stdout
    #[clap(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Write summary.txt, tree.txt and content.txt into this directory instead of stdout
    #[clap(long)]
    pub output_dir: Option<PathBuf>,

    /// Cancel the parse after this many seconds
    #[clap(long)]
    pub timeout_secs: Option<u64>,
}

#[derive(ValueEnum, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Ingest(args) => ingest(args).await,
    }
}

async fn ingest(args: IngestArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path)?,
        None => CliConfig::from_env(),
    };
    let filter = resolve_filter(&args, &config)?;
    let reference = args.branch.clone().or_else(|| config.clone.reference.clone());

    let mut acquirer = SourceAcquirer::git().with_access_token(config.access_token.clone());
    if let Some(dir) = args
        .workspace_dir
        .clone()
        .or_else(|| config.clone.workspace_dir.clone())
    {
        acquirer = acquirer.with_workspace_root(dir);
    }
    let concurrency = args
        .concurrency
        .or(config.extract.concurrency)
        .unwrap_or(DEFAULT_CONCURRENCY);
    let ingestor = Ingestor::new(acquirer).with_concurrency(concurrency);

    let cancel = CancellationToken::new();
    let deadline = args
        .timeout_secs
        .map(|secs| cancel.cancel_after(Duration::from_secs(secs)));
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling");
                cancel.cancel();
            }
        })
    };

    tracing::info!(command = "ingest", location = %redact_url(&args.location), "Starting ingestion");
    let request = IngestRequest::new(args.location.clone(), filter).with_reference(reference);
    let outcome = ingestor.ingest(request, &cancel).await;
    interrupt.abort();
    if let Some(deadline) = deadline {
        deadline.abort();
    }

    let result = match outcome {
        Ok(result) => result,
        Err(e) => {
            tracing::error!(command = "ingest", error = %e, "Ingestion failed");
            return Err(e).with_context(|| format!("Failed to ingest {}", redact_url(&args.location)));
        }
    };
    for warning in &result.warnings {
        tracing::debug!(path = %warning.path, kind = ?warning.kind, "{}", warning.message);
    }
    write_output(&args, &result)?;
    tracing::info!(
        command = "ingest",
        included = result.included_count,
        excluded = result.excluded_count,
        "Ingestion complete"
    );
    Ok(())
}

/// Flags win over the config file, which wins over the built-in defaults.
pub fn resolve_filter(args: &IngestArgs, config: &CliConfig) -> Result<FilterSpec> {
    let defaults = FilterSpec::default();
    let max_file_size_mb = args
        .max_size_mb
        .or(config.filter.max_file_size_mb)
        .unwrap_or(DEFAULT_MAX_FILE_SIZE_MB);

    let include = if !args.include.is_empty() {
        flatten(&args.include)
    } else {
        config
            .filter
            .include
            .clone()
            .map(|p| p.into_patterns())
            .unwrap_or_else(|| defaults.include_patterns.clone())
    };
    let exclude = if !args.exclude.is_empty() {
        flatten(&args.exclude)
    } else {
        config
            .filter
            .exclude
            .clone()
            .map(|p| p.into_patterns())
            .unwrap_or_else(|| defaults.exclude_patterns.clone())
    };

    let spec = FilterSpec::from_megabytes(max_file_size_mb, include, exclude)
        .context("Invalid filter settings")?;
    spec.trace_loaded();
    Ok(spec)
}

fn flatten(raw: &[String]) -> Vec<String> {
    raw.iter().flat_map(|r| parse_pattern_list(r)).collect()
}

/// Text layout printed on stdout for `--format text`.
pub fn render_text(result: &ParseResult) -> String {
    let mut out = String::new();
    out.push_str(&result.summary);
    out.push('\n');
    out.push_str("Directory structure:\n");
    out.push_str(&result.tree);
    out.push('\n');
    out.push_str(&result.content);
    out
}

fn write_output(args: &IngestArgs, result: &ParseResult) -> Result<()> {
    if let Some(dir) = &args.output_dir {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create output directory {}", dir.display()))?;
        let files: Vec<(&str, String)> = match args.format {
            OutputFormat::Text => vec![
                ("summary.txt", result.summary.clone()),
                ("tree.txt", result.tree.clone()),
                ("content.txt", result.content.clone()),
            ],
            OutputFormat::Json => vec![("result.json", serde_json::to_string_pretty(result)?)],
        };
        for (name, body) in files {
            let path = dir.join(name);
            fs::write(&path, body)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            tracing::info!(path = %path.display(), "Wrote output file");
        }
        return Ok(());
    }

    let body = match args.format {
        OutputFormat::Text => render_text(result),
        OutputFormat::Json => serde_json::to_string_pretty(result)? + "\n",
    };
    let stdout = std::io::stdout();
    let mut lock = stdout.lock();
    lock.write_all(body.as_bytes())
        .context("Failed to write to stdout")?;
    lock.flush().context("Failed to flush stdout")?;
    Ok(())
}
