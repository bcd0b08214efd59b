//! Configuration management for naturalfix
//!
//! Settings are read from `--config <path>` when given, otherwise from
//! `~/.config/naturalfix/config.toml`, otherwise defaults are used.

use crate::lang::Language;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Default number of tokens on each side of a position.
pub const DEFAULT_CONTEXT_LENGTH: usize = 20;
/// Default tier-1 cache entries per predictor side.
pub const DEFAULT_MEMORY_CAPACITY: usize = 1 << 16;
/// Default number of ranked positions tried by fix synthesis.
pub const DEFAULT_TOP_K: usize = 4;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Config {
    /// Tokens of context on each side (C)
    pub context_length: usize,
    /// Bounded in-process cache entries per predictor side
    pub memory_capacity: usize,
    /// SQLite file backing the durable prediction cache
    pub store_path: Option<PathBuf>,
    /// Ranked positions tried by fix synthesis
    pub top_k: usize,
    pub language: Language,
    /// JSON vocabulary file; the language's built-in vocabulary otherwise
    pub vocabulary: Option<PathBuf>,
    pub forward: Option<PredictorCommand>,
    pub backward: Option<PredictorCommand>,
    /// Mutations generated per file during evaluation
    pub mutations_per_file: usize,
    /// Seed for mutation sampling
    pub seed: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            context_length: DEFAULT_CONTEXT_LENGTH,
            memory_capacity: DEFAULT_MEMORY_CAPACITY,
            store_path: None,
            top_k: DEFAULT_TOP_K,
            language: Language::JavaScript,
            vocabulary: None,
            forward: None,
            backward: None,
            mutations_per_file: 1,
            seed: 0,
        }
    }
}

/// An external predictor process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PredictorCommand {
    /// Identity used to key durable cache entries
    pub model_id: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_predictor_timeout")]
    pub timeout_secs: u64,
}

fn default_predictor_timeout() -> u64 {
    60
}

impl Config {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("naturalfix"))
    }

    /// Get the default config file path
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("config.toml"))
    }

    /// Load an explicitly requested config file. Errors are fatal.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config '{}'", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load the default config from disk, or return defaults.
    ///
    /// A corrupt default config is backed up and replaced by defaults.
    pub fn load() -> Self {
        match Self::default_path() {
            Some(path) => Self::load_or_default(&path),
            None => Self::default(),
        }
    }

    /// Load `path` if it exists. A corrupt file is moved aside to
    /// `*.toml.corrupt` so the warning fires once, and defaults are used.
    fn load_or_default(path: &Path) -> Self {
        let Ok(content) = fs::read_to_string(path) else {
            return Self::default();
        };
        let parsed = toml::from_str::<Config>(&content)
            .map_err(anyhow::Error::from)
            .and_then(|config| config.validate().map(|_| config));
        match parsed {
            Ok(config) => config,
            Err(err) => {
                preserve_corrupt_config(path, &content);
                tracing::warn!(
                    path = %path.display(),
                    error = %err,
                    "config file was corrupted; a backup was saved and defaults were loaded"
                );
                Self::default()
            }
        }
    }

    /// Explicit path wins; otherwise the default location.
    pub fn resolve(path: Option<&Path>) -> anyhow::Result<Self> {
        match path {
            Some(path) => Self::load_from(path),
            None => Ok(Self::load()),
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.context_length == 0 {
            anyhow::bail!("context_length must be at least 1");
        }
        if self.memory_capacity == 0 {
            anyhow::bail!("memory_capacity must be at least 1");
        }
        if self.top_k == 0 {
            anyhow::bail!("top_k must be at least 1");
        }
        Ok(())
    }

    /// Durable cache location: configured, else the user cache directory.
    pub fn store_path(&self) -> anyhow::Result<PathBuf> {
        if let Some(path) = &self.store_path {
            return Ok(path.clone());
        }
        dirs::cache_dir()
            .map(|dir| dir.join("naturalfix").join("predictions.sqlite3"))
            .ok_or_else(|| anyhow::anyhow!("Could not determine cache directory"))
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let backup = path.with_extension("toml.corrupt");
    if fs::rename(path, &backup).is_err() {
        if let Err(err) = fs::write(&backup, content) {
            tracing::warn!(path = %backup.display(), error = %err, "failed to back up corrupt config");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.context_length, DEFAULT_CONTEXT_LENGTH);
        assert_eq!(config.top_k, 4);
        assert_eq!(config.language, Language::JavaScript);
        assert!(config.forward.is_none());
    }

    #[test]
    fn parses_predictor_commands() {
        let config: Config = toml::from_str(
            r#"
            context_length = 10
            language = "rust"

            [forward]
            model_id = "fwd-v1"
            program = "python3"
            args = ["serve.py", "--forward"]

            [backward]
            model_id = "bwd-v1"
            program = "python3"
            timeout_secs = 5
            "#,
        )
        .unwrap();
        assert_eq!(config.context_length, 10);
        assert_eq!(config.language, Language::Rust);
        let forward = config.forward.unwrap();
        assert_eq!(forward.args, vec!["serve.py", "--forward"]);
        assert_eq!(forward.timeout_secs, 60);
        assert_eq!(config.backward.unwrap().timeout_secs, 5);
    }

    #[test]
    fn corrupt_default_config_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_k = \"four\"").unwrap();

        let config = Config::load_or_default(&path);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(!path.exists());
        let backup = dir.path().join("config.toml.corrupt");
        assert_eq!(fs::read_to_string(&backup).unwrap(), "top_k = \"four\"");

        // Nothing left to warn about on the next run.
        let config = Config::load_or_default(&path);
        assert_eq!(config.top_k, DEFAULT_TOP_K);
        assert!(backup.exists());
    }

    #[test]
    fn rejects_unknown_keys_and_zero_sizes() {
        assert!(toml::from_str::<Config>("lambda = 0.7").is_err());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_k = 0").unwrap();
        assert!(Config::load_from(&path).is_err());
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = Config {
            store_path: Some(PathBuf::from("/tmp/p.sqlite3")),
            ..Config::default()
        };
        assert_eq!(
            config.store_path().unwrap(),
            PathBuf::from("/tmp/p.sqlite3")
        );
    }
}
