//! recallkit configuration.
//!
//! Loaded from `recallkit.toml` in the working directory, falling back to
//! `~/.config/recallkit/config.toml`, then to defaults.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::report::OutputFormat;
use crate::scoring::ScoreOptions;

/// Top-level recallkit configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecallConfig {
    /// Auxiliary columns carried through scoring.
    #[serde(default)]
    pub scoring: ScoreOptions,
    /// Worker threads for per-subject analysis. 0 lets rayon decide.
    #[serde(default)]
    pub parallelism: usize,
    /// Output directory for reports.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default)]
    pub default_format: OutputFormat,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("./recallkit-results")
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self {
            scoring: ScoreOptions::default(),
            parallelism: 0,
            output_dir: default_output_dir(),
            default_format: OutputFormat::default(),
        }
    }
}

/// Replace `${VAR_NAME}` references with the variable's value, or nothing
/// when it is unset.
fn resolve_env_vars(s: &str) -> String {
    let mut result = s.to_string();
    while let Some(start) = result.find("${") {
        let Some(len) = result[start..].find('}') else {
            break;
        };
        let value = std::env::var(&result[start + 2..start + len]).unwrap_or_default();
        result.replace_range(start..start + len + 1, &value);
    }
    result
}

fn resolve_keys(keys: &[String]) -> Vec<String> {
    keys.iter().map(|k| resolve_env_vars(k)).collect()
}

/// Load configuration from the default locations.
pub fn load_config() -> Result<RecallConfig> {
    load_config_from(None)
}

/// Load config from an explicit path, or search the default locations.
///
/// `RECALLKIT_PARALLELISM` and `RECALLKIT_OUTPUT_DIR` override the file.
pub fn load_config_from(path: Option<&Path>) -> Result<RecallConfig> {
    let config_path = match path {
        Some(p) if p.exists() => Some(p.to_path_buf()),
        Some(p) => anyhow::bail!("config file not found: {}", p.display()),
        None => {
            let local = PathBuf::from("recallkit.toml");
            if local.exists() {
                Some(local)
            } else {
                config_dir()
                    .map(|dir| dir.join("config.toml"))
                    .filter(|p| p.exists())
            }
        }
    };

    let mut config = match config_path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("failed to read config: {}", path.display()))?;
            let config = parse_config(&content)
                .with_context(|| format!("failed to parse config: {}", path.display()))?;
            tracing::debug!(path = %path.display(), "loaded config");
            config
        }
        None => RecallConfig::default(),
    };

    if let Ok(value) = std::env::var("RECALLKIT_PARALLELISM") {
        config.parallelism = value
            .trim()
            .parse()
            .with_context(|| format!("RECALLKIT_PARALLELISM is not a number: '{value}'"))?;
    }
    if let Ok(dir) = std::env::var("RECALLKIT_OUTPUT_DIR") {
        config.output_dir = PathBuf::from(dir);
    }

    Ok(config)
}

/// Parse a config document and expand `${VAR}` references in it.
pub fn parse_config(content: &str) -> Result<RecallConfig> {
    let mut config: RecallConfig = toml::from_str(content).context("invalid config TOML")?;
    config.scoring = ScoreOptions {
        list_keys: resolve_keys(&config.scoring.list_keys),
        study_keys: resolve_keys(&config.scoring.study_keys),
        recall_keys: resolve_keys(&config.scoring.recall_keys),
    };
    if let Some(dir) = config.output_dir.to_str() {
        config.output_dir = PathBuf::from(resolve_env_vars(dir));
    }
    Ok(config)
}

fn config_dir() -> Option<PathBuf> {
    std::env::var("HOME")
        .ok()
        .map(|h| PathBuf::from(h).join(".config").join("recallkit"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_env_vars_basic() {
        std::env::set_var("_RECALLKIT_TEST_VAR", "block");
        assert_eq!(resolve_env_vars("${_RECALLKIT_TEST_VAR}"), "block");
        assert_eq!(
            resolve_env_vars("pre_${_RECALLKIT_TEST_VAR}_post"),
            "pre_block_post"
        );
        assert_eq!(resolve_env_vars("${_RECALLKIT_UNSET_VAR}x"), "x");
        assert_eq!(resolve_env_vars("${unterminated"), "${unterminated");
        std::env::remove_var("_RECALLKIT_TEST_VAR");
    }

    #[test]
    fn default_config() {
        let config = RecallConfig::default();
        assert_eq!(config.parallelism, 0);
        assert_eq!(config.output_dir, PathBuf::from("./recallkit-results"));
        assert_eq!(config.default_format, OutputFormat::Json);
        assert!(config.scoring.list_keys.is_empty());
    }

    #[test]
    fn parse_scoring_section() {
        let config = parse_config(
            r#"
parallelism = 2
default_format = "markdown"

[scoring]
list_keys = ["session"]
study_keys = ["category", "item_index"]
"#,
        )
        .unwrap();
        assert_eq!(config.parallelism, 2);
        assert_eq!(config.default_format, OutputFormat::Markdown);
        let options = &config.scoring;
        assert_eq!(options.list_keys, vec!["session"]);
        assert_eq!(options.study_keys, vec!["category", "item_index"]);
        assert!(options.recall_keys.is_empty());
    }

    #[test]
    fn load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recallkit.toml");
        std::fs::write(&path, "[scoring]\nrecall_keys = [\"rt\"]\n").unwrap();
        let config = load_config_from(Some(&path)).unwrap();
        assert_eq!(config.scoring.recall_keys, vec!["rt"]);
    }

    #[test]
    fn missing_explicit_path_fails() {
        let err = load_config_from(Some(Path::new("no-such-recallkit.toml"))).unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn malformed_config_fails() {
        assert!(parse_config("parallelism = \"many\"").is_err());
    }
}
