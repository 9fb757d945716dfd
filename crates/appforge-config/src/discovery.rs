use serde::Deserialize;
use std::collections::BTreeMap;
use std::env;
use std::path::{Path, PathBuf};

use appforge_utils::error::ConfigError;
use appforge_utils::types::{ConfigSource, Platform};

use crate::{
    CliArgs, Config, LlmConfig, RetrievalBackendKind, RetryBounds, RetryScope,
};

/// Directory holding the project-level config file.
pub const CONFIG_DIR_NAME: &str = ".appforge";
pub const CONFIG_FILE_NAME: &str = "config.toml";
/// Environment variable naming a directory that contains `config.toml`.
pub const HOME_ENV: &str = "APPFORGE_HOME";

/// TOML configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlConfig {
    workflow: Option<TomlWorkflow>,
    #[serde(default)]
    retries: BTreeMap<String, TomlRetryBounds>,
    retrieval: Option<TomlRetrieval>,
    llm: Option<LlmConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlWorkflow {
    concurrency_limit: Option<usize>,
    call_timeout_secs: Option<u64>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    max_transitions: Option<u32>,
    fallback_platforms: Option<Vec<Platform>>,
    min_platforms: Option<usize>,
    top_k: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRetryBounds {
    transient_attempts: Option<u32>,
    revision_attempts: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRetrieval {
    backend: Option<RetrievalBackendKind>,
    corpus_dir: Option<PathBuf>,
    base_url: Option<String>,
    api_key_env: Option<String>,
    min_relevance: Option<f32>,
}

macro_rules! apply_opt {
    ($target:expr, $value:expr, $key:literal, $attr:expr, $source:expr) => {
        if let Some(value) = $value {
            $target = value;
            $attr.insert($key.to_string(), $source);
        }
    };
}

impl Config {
    /// Discover and load configuration with precedence: CLI > file > defaults.
    ///
    /// The config file is located in this order:
    /// 1. `--config <path>`
    /// 2. `$APPFORGE_HOME/config.toml`
    /// 3. `.appforge/config.toml` searching upward from the current directory
    /// 4. `<user config dir>/appforge/config.toml`
    pub fn discover(cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let start_dir = env::current_dir().map_err(|e| ConfigError::DiscoveryFailed {
            reason: format!("cannot determine current directory: {e}"),
        })?;

        let path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => {
                let from_home = env::var_os(HOME_ENV)
                    .map(|home| PathBuf::from(home).join(CONFIG_FILE_NAME))
                    .filter(|p| p.is_file());
                let user_level = dirs::config_dir()
                    .map(|d| d.join("appforge").join(CONFIG_FILE_NAME))
                    .filter(|p| p.is_file());
                from_home
                    .or_else(|| Self::discover_config_file_from(&start_dir))
                    .or(user_level)
            }
        };

        Self::load(path.as_deref(), cli_args)
    }

    /// Discover configuration starting from a specific directory.
    ///
    /// This is the path-driven variant used by tests to avoid process-global
    /// state: no environment variables and no user-level file are consulted.
    pub fn discover_from(start_dir: &Path, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let path = match &cli_args.config_path {
            Some(explicit) => Some(explicit.clone()),
            None => Self::discover_config_file_from(start_dir),
        };
        Self::load(path.as_deref(), cli_args)
    }

    /// Walk up from `start_dir` looking for `.appforge/config.toml`.
    ///
    /// Stops at repository root markers (.git, .hg, .svn) or the filesystem root.
    #[must_use]
    pub fn discover_config_file_from(start_dir: &Path) -> Option<PathBuf> {
        let mut current_dir = Some(start_dir);

        while let Some(dir) = current_dir {
            let config_path = dir.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME);
            if config_path.is_file() {
                return Some(config_path);
            }

            if dir.join(".git").exists() || dir.join(".hg").exists() || dir.join(".svn").exists()
            {
                break;
            }

            current_dir = dir.parent();
        }

        None
    }

    /// Build the effective configuration from an optional file plus CLI overrides.
    pub fn load(path: Option<&Path>, cli_args: &CliArgs) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Some(path) = path {
            let file_config = Self::load_config_file(path)?;
            tracing::debug!(path = %path.display(), "Loaded config file");
            config.apply_file(file_config)?;
            config.config_path = Some(path.to_path_buf());
        }

        config.apply_cli(cli_args);
        config.validate()?;

        Ok(config)
    }

    fn load_config_file(path: &Path) -> Result<TomlConfig, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ConfigError::NotFound {
                    path: path.display().to_string(),
                }
            } else {
                ConfigError::InvalidFile(format!("cannot read {}: {e}", path.display()))
            }
        })?;

        toml::from_str(&content)
            .map_err(|e| ConfigError::InvalidFile(format!("{}: {e}", path.display())))
    }

    fn apply_file(&mut self, file: TomlConfig) -> Result<(), ConfigError> {
        let src = ConfigSource::Config;
        let attr = &mut self.source_attribution;

        if let Some(workflow) = file.workflow {
            let w = &mut self.workflow;
            apply_opt!(w.concurrency_limit, workflow.concurrency_limit, "concurrency_limit", attr, src);
            apply_opt!(w.call_timeout_secs, workflow.call_timeout_secs, "call_timeout_secs", attr, src);
            apply_opt!(w.initial_backoff_ms, workflow.initial_backoff_ms, "initial_backoff_ms", attr, src);
            apply_opt!(w.max_backoff_ms, workflow.max_backoff_ms, "max_backoff_ms", attr, src);
            apply_opt!(w.max_transitions, workflow.max_transitions, "max_transitions", attr, src);
            apply_opt!(w.fallback_platforms, workflow.fallback_platforms, "fallback_platforms", attr, src);
            apply_opt!(w.min_platforms, workflow.min_platforms, "min_platforms", attr, src);
            apply_opt!(w.top_k, workflow.top_k, "top_k", attr, src);
        }

        for (name, bounds) in file.retries {
            let scope = RetryScope::parse(&name).ok_or_else(|| ConfigError::InvalidValue {
                key: format!("retries.{name}"),
                value: "unknown step (expected planning, platform_selection, architecture or generation)"
                    .to_string(),
            })?;
            let current = self.retries.for_scope(scope);
            self.retries.set(
                scope,
                RetryBounds::new(
                    bounds.transient_attempts.unwrap_or(current.transient_attempts),
                    bounds.revision_attempts.unwrap_or(current.revision_attempts),
                ),
            );
            attr.insert("retries".to_string(), src);
        }

        if let Some(retrieval) = file.retrieval {
            let r = &mut self.retrieval;
            apply_opt!(r.backend, retrieval.backend, "retrieval_backend", attr, src);
            apply_opt!(r.min_relevance, retrieval.min_relevance, "min_relevance", attr, src);
            if retrieval.corpus_dir.is_some() {
                r.corpus_dir = retrieval.corpus_dir;
                attr.insert("corpus_dir".to_string(), src);
            }
            if retrieval.base_url.is_some() {
                r.base_url = retrieval.base_url;
                attr.insert("retrieval_base_url".to_string(), src);
            }
            if retrieval.api_key_env.is_some() {
                r.api_key_env = retrieval.api_key_env;
            }
        }

        if let Some(llm) = file.llm {
            if llm.provider.is_some() {
                attr.insert("llm_provider".to_string(), src);
            }
            if llm.budget.is_some() {
                attr.insert("llm_budget".to_string(), src);
            }
            if !llm.steps.is_empty() {
                attr.insert("llm_steps".to_string(), src);
            }
            self.llm = llm;
        }

        Ok(())
    }

    fn apply_cli(&mut self, cli_args: &CliArgs) {
        let src = ConfigSource::Cli;
        let attr = &mut self.source_attribution;
        let w = &mut self.workflow;

        apply_opt!(w.concurrency_limit, cli_args.concurrency_limit, "concurrency_limit", attr, src);
        apply_opt!(w.call_timeout_secs, cli_args.call_timeout_secs, "call_timeout_secs", attr, src);
        apply_opt!(w.top_k, cli_args.top_k, "top_k", attr, src);

        if let Some(corpus_dir) = &cli_args.corpus_dir {
            self.retrieval.corpus_dir = Some(corpus_dir.clone());
            self.retrieval.backend = RetrievalBackendKind::Memory;
            attr.insert("corpus_dir".to_string(), src);
            attr.insert("retrieval_backend".to_string(), src);
        }

        if let Some(provider) = &cli_args.llm_provider {
            self.llm.provider = Some(provider.clone());
            // An explicit provider on the command line wins over per-step overrides.
            for step in self.llm.steps.values_mut() {
                step.provider = None;
            }
            attr.insert("llm_provider".to_string(), src);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write_config(dir: &Path, content: &str) -> PathBuf {
        let config_dir = dir.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).unwrap();
        let path = config_dir.join(CONFIG_FILE_NAME);
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults_without_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();

        let config = Config::discover_from(dir.path(), &CliArgs::default()).unwrap();

        assert_eq!(config.workflow.concurrency_limit, 2);
        assert_eq!(config.workflow.top_k, 5);
        assert!(config.workflow.fallback_platforms.is_empty());
        assert_eq!(config.source_of("concurrency_limit"), ConfigSource::Default);
        assert!(config.config_path.is_none());
    }

    #[test]
    fn test_discovers_config_upward() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        write_config(
            dir.path(),
            r#"
[workflow]
concurrency_limit = 4
fallback_platforms = ["web"]

[retries.generation]
revision_attempts = 1

[retrieval]
min_relevance = 0.5
"#,
        );
        let nested = dir.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let config = Config::discover_from(&nested, &CliArgs::default()).unwrap();

        assert_eq!(config.workflow.concurrency_limit, 4);
        assert_eq!(config.workflow.fallback_platforms, vec![Platform::Web]);
        assert_eq!(
            config.retries.for_scope(RetryScope::Generation),
            RetryBounds::new(3, 1)
        );
        assert!((config.retrieval.min_relevance - 0.5).abs() < f32::EPSILON);
        assert_eq!(config.source_of("concurrency_limit"), ConfigSource::Config);
        assert_eq!(config.source_of("top_k"), ConfigSource::Default);
    }

    #[test]
    fn test_cli_overrides_file() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(".git")).unwrap();
        write_config(
            dir.path(),
            r#"
[workflow]
concurrency_limit = 4

[llm]
provider = "openai"

[llm.steps.planning]
provider = "anthropic"
"#,
        );
        let cli = CliArgs {
            concurrency_limit: Some(1),
            llm_provider: Some("stub".into()),
            ..CliArgs::default()
        };

        let config = Config::discover_from(dir.path(), &cli).unwrap();

        assert_eq!(config.workflow.concurrency_limit, 1);
        assert_eq!(config.source_of("concurrency_limit"), ConfigSource::Cli);
        assert_eq!(config.llm.provider_for_step(RetryScope::Planning), "stub");
    }

    #[test]
    fn test_invalid_toml_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), "[workflow\nconcurrency_limit = ");
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };

        let err = Config::discover_from(dir.path(), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidFile(_)));
    }

    #[test]
    fn test_unknown_retry_step_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write_config(dir.path(), "[retries.assembly]\ntransient_attempts = 2\n");
        let cli = CliArgs {
            config_path: Some(path),
            ..CliArgs::default()
        };

        let err = Config::discover_from(dir.path(), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[test]
    fn test_explicit_missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let cli = CliArgs {
            config_path: Some(dir.path().join("nope.toml")),
            ..CliArgs::default()
        };

        let err = Config::discover_from(dir.path(), &cli).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }

    #[test]
    fn test_discovery_stops_at_repo_root() {
        let outer = TempDir::new().unwrap();
        write_config(outer.path(), "[workflow]\ntop_k = 9\n");
        let repo = outer.path().join("repo");
        fs::create_dir_all(repo.join(".git")).unwrap();

        assert!(Config::discover_config_file_from(&repo).is_none());
    }
}
