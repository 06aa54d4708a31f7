//! Run configuration.
//!
//! Loaded from `rowsift.yaml` (or `.rowsift.yaml`) in the working directory,
//! or from an explicit path. Every field is optional.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::logging;
use crate::view::OutputColumns;

/// File names searched for when no config path is given.
pub const DEFAULT_CONFIG_NAMES: &[&str] = &["rowsift.yaml", ".rowsift.yaml"];

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Directory holding pattern JSON files.
    pub patterns_dir: PathBuf,
    /// Directory holding JSON workbooks.
    pub data_dir: PathBuf,
    /// Root for result directories.
    pub output_dir: PathBuf,
    /// Languages to load (empty loads all).
    pub languages: Vec<String>,
    /// Globs over pattern file paths to skip.
    pub excluded_patterns: Vec<String>,
    pub output_columns: OutputColumns,
    pub parallel: bool,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            patterns_dir: PathBuf::from("data/patterns"),
            data_dir: PathBuf::from("data/input"),
            output_dir: PathBuf::from("data/output"),
            languages: Vec::new(),
            excluded_patterns: Vec::new(),
            output_columns: OutputColumns::default(),
            parallel: true,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse a config from a YAML file.
    pub fn parse_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse_str(&content).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse_str(content: &str) -> anyhow::Result<Self> {
        // An empty file deserializes to null, not to a mapping.
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(content)?)
    }

    /// Load from `path`, or discover a config in `dir`, or use defaults.
    pub fn load(path: Option<&Path>, dir: &Path) -> anyhow::Result<(Self, Option<PathBuf>)> {
        let found = match path {
            Some(p) => Some(p.to_path_buf()),
            None => discover_config(dir),
        };
        match found {
            Some(p) => Ok((Self::parse_file(&p)?, Some(p))),
            None => Ok((Self::default(), None)),
        }
    }
}

/// Find a config file in `dir`.
pub fn discover_config(dir: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|p| p.is_file())
}

/// Validate a config for correctness.
pub fn validate(config: &Config) -> anyhow::Result<()> {
    if !logging::LEVELS.contains(&config.log_level.to_lowercase().as_str()) {
        anyhow::bail!(
            "invalid log_level {:?}, must be one of {}",
            config.log_level,
            logging::LEVELS.join(", ")
        );
    }

    for pattern in &config.excluded_patterns {
        globset::Glob::new(pattern).map_err(|e| {
            anyhow::anyhow!("invalid excluded_patterns entry {:?}: {}", pattern, e)
        })?;
    }

    if config.languages.iter().any(|l| l.trim().is_empty()) {
        anyhow::bail!("languages must not contain empty entries");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_parse_config() {
        let yaml = r#"
patterns_dir: "pats"
languages: [es, en]
excluded_patterns:
  - "**/draft_*.json"
output_columns: pattern_first
parallel: false
"#;
        let config = Config::parse_str(yaml).unwrap();
        assert_eq!(config.patterns_dir, PathBuf::from("pats"));
        assert_eq!(config.data_dir, PathBuf::from("data/input"));
        assert_eq!(config.languages, vec!["es".to_string(), "en".to_string()]);
        assert_eq!(config.output_columns, OutputColumns::PatternFirst);
        assert!(!config.parallel);
        assert_eq!(config.log_level, "info");
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_empty_config_is_default() {
        assert_eq!(Config::parse_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.log_level = "loud".into();
        assert!(validate(&config).is_err());

        let mut config = Config::default();
        config.excluded_patterns = vec!["[".into()];
        assert!(validate(&config).is_err());
    }

    #[test]
    fn test_discover_config() {
        let temp = TempDir::new().unwrap();
        assert!(discover_config(temp.path()).is_none());

        std::fs::write(temp.path().join(".rowsift.yaml"), "parallel: false\n").unwrap();
        let (config, path) = Config::load(None, temp.path()).unwrap();
        assert_eq!(path, Some(temp.path().join(".rowsift.yaml")));
        assert!(!config.parallel);
    }
}
