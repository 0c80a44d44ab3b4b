use repo_ingest::cli::{resolve_filter, IngestArgs};
use repo_ingest::load_config::{load_config, CliConfig, PatternList};
use serial_test::serial;
use std::env;
use std::fs::write;
use std::path::PathBuf;
use tempfile::NamedTempFile;

fn config_file(yaml: &str) -> NamedTempFile {
    let file = NamedTempFile::new().expect("temp file");
    write(file.path(), yaml).unwrap();
    file
}

/// A fully populated config maps onto every section.
#[test]
#[serial]
fn test_load_config_all_sections() {
    env::remove_var("GITHUB_TOKEN");
    let file = config_file(
        r#"
filter:
  max_file_size_mb: 2.5
  include: ["*.rs", "docs/"]
  exclude: ".*, target/"
clone:
  reference: release-1.2
  workspace_dir: /var/tmp/ingest
extract:
  concurrency: 3
"#,
    );

    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.filter.max_file_size_mb, Some(2.5));
    assert_eq!(
        config.filter.include.clone().unwrap().into_patterns(),
        vec!["*.rs", "docs/"]
    );
    assert_eq!(
        config.filter.exclude,
        Some(PatternList::One(".*, target/".to_string()))
    );
    assert_eq!(config.clone.reference.as_deref(), Some("release-1.2"));
    assert_eq!(config.clone.workspace_dir, Some(PathBuf::from("/var/tmp/ingest")));
    assert_eq!(config.extract.concurrency, Some(3));
    assert!(config.access_token.is_none());
}

/// Every section is optional; an empty file is a valid config.
#[test]
#[serial]
fn test_load_config_empty_file_uses_defaults() {
    env::remove_var("GITHUB_TOKEN");
    for yaml in ["", "filter:\n  max_file_size_mb: 1\n"] {
        let file = config_file(yaml);
        let config = load_config(file.path()).expect("Config should load");
        assert!(config.filter.include.is_none());
        assert!(config.clone.reference.is_none());
    }
}

#[test]
#[serial]
fn test_load_config_injects_access_token() {
    env::set_var("GITHUB_TOKEN", "ghp_example");
    let file = config_file("clone:\n  reference: main\n");
    let config = load_config(file.path()).expect("Config should load");
    assert_eq!(config.access_token.as_deref(), Some("ghp_example"));

    env::set_var("GITHUB_TOKEN", "   ");
    assert!(CliConfig::from_env().access_token.is_none());
    env::remove_var("GITHUB_TOKEN");
}

#[test]
#[serial]
fn test_load_config_errors_for_invalid_file() {
    let file = config_file("filter: [this is: not valid");
    let err = load_config(file.path()).expect_err("Invalid YAML must fail");
    assert!(err.to_string().contains("Failed to parse config YAML"));

    let err = load_config("/definitely/missing/config.yaml").expect_err("Missing file must fail");
    assert!(err.to_string().contains("Failed to read config file"));
}

struct ResolveCase {
    name: &'static str,
    args: IngestArgs,
    yaml: &'static str,
    expected_bytes: i64,
    expected_include: Vec<&'static str>,
    expected_exclude: Vec<&'static str>,
}

#[test]
#[serial]
fn test_resolve_filter_precedence_table_driven() {
    env::remove_var("GITHUB_TOKEN");
    let cases = vec![
        ResolveCase {
            name: "built-in defaults",
            args: IngestArgs::default(),
            yaml: "",
            expected_bytes: 10 * 1024 * 1024,
            expected_include: vec![],
            expected_exclude: vec![".*"],
        },
        ResolveCase {
            name: "config overrides defaults",
            args: IngestArgs::default(),
            yaml: "filter:\n  max_file_size_mb: 1\n  include: \"*.py *.md\"\n",
            expected_bytes: 1024 * 1024,
            expected_include: vec!["*.py", "*.md"],
            expected_exclude: vec![".*"],
        },
        ResolveCase {
            name: "flags override config",
            args: IngestArgs {
                max_size_mb: Some(0.5),
                include: vec!["*.rs,*.toml".to_string()],
                exclude: vec!["target/".to_string(), "*.lock".to_string()],
                ..IngestArgs::default()
            },
            yaml: "filter:\n  max_file_size_mb: 1\n  include: [\"*.py\"]\n  exclude: []\n",
            expected_bytes: 512 * 1024,
            expected_include: vec!["*.rs", "*.toml"],
            expected_exclude: vec!["target/", "*.lock"],
        },
        ResolveCase {
            name: "empty config exclude clears the default",
            args: IngestArgs::default(),
            yaml: "filter:\n  exclude: []\n",
            expected_bytes: 10 * 1024 * 1024,
            expected_include: vec![],
            expected_exclude: vec![],
        },
    ];

    for case in cases {
        let file = config_file(case.yaml);
        let config = load_config(file.path()).expect("Config should load");
        let spec = resolve_filter(&case.args, &config).expect("Filter should resolve");
        assert_eq!(spec.max_file_size_bytes, case.expected_bytes, "case: {}", case.name);
        assert_eq!(spec.include_patterns, case.expected_include, "case: {}", case.name);
        assert_eq!(spec.exclude_patterns, case.expected_exclude, "case: {}", case.name);
    }
}

#[test]
#[serial]
fn test_resolve_filter_rejects_negative_size() {
    let args = IngestArgs {
        max_size_mb: Some(-3.0),
        ..IngestArgs::default()
    };
    assert!(resolve_filter(&args, &CliConfig::default()).is_err());
}
