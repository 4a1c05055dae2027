//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.coursetally.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Data source settings.
    #[serde(default)]
    pub data: DataConfig,

    /// Report settings.
    #[serde(default)]
    pub report: ReportConfig,

    /// Cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Default output file path.
    #[serde(default = "default_output")]
    pub output: String,

    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            output: default_output(),
            verbose: false,
        }
    }
}

fn default_output() -> String {
    "activity_report.md".to_string()
}

/// Data source settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DataConfig {
    /// Path to the activity snapshot. The --data flag takes precedence.
    #[serde(default)]
    pub snapshot: Option<String>,
}

/// Report generation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Counter column to sort the course table by.
    #[serde(default = "default_sort")]
    pub sort: String,

    /// Courses per page.
    #[serde(default = "default_per_page")]
    pub per_page: usize,

    /// How many courses the most-active list shows.
    #[serde(default = "default_top_courses")]
    pub top_courses: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            sort: default_sort(),
            per_page: default_per_page(),
            top_courses: default_top_courses(),
        }
    }
}

fn default_sort() -> String {
    "total".to_string()
}

fn default_per_page() -> usize {
    25
}

fn default_top_courses() -> usize {
    5
}

/// Cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether aggregation results are cached within a run.
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

fn default_true() -> bool {
    true
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        let default_path = Path::new(".coursetally.toml");

        if default_path.exists() {
            Ok(Some(Self::load(default_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings.
    /// This method only overrides config when CLI provides explicit values.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        // Snapshot path - only override if provided
        if let Some(ref data) = args.data {
            self.data.snapshot = Some(data.display().to_string());
        }

        // Report settings - only override if explicitly provided
        if let Some(ref sort) = args.sort {
            self.report.sort = sort.clone();
        }
        if let Some(per_page) = args.per_page {
            self.report.per_page = per_page;
        }
        if let Some(ref output) = args.output {
            self.general.output = output.display().to_string();
        }

        // The cache flag can only disable
        if args.no_cache {
            self.cache.enabled = false;
        }

        // Flags always override
        if args.verbose {
            self.general.verbose = true;
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Args, OutputFormat};
    use std::path::PathBuf;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.general.output, "activity_report.md");
        assert_eq!(config.report.sort, "total");
        assert_eq!(config.report.per_page, 25);
        assert!(config.cache.enabled);
        assert!(config.data.snapshot.is_none());
    }

    #[test]
    fn test_parse_config() {
        let toml_content = r#"
[general]
output = "custom_report.md"
verbose = true

[data]
snapshot = "exports/term1.json"

[report]
sort = "forum"
per_page = 50

[cache]
enabled = false
"#;

        let config: Config = toml::from_str(toml_content).unwrap();
        assert_eq!(config.general.output, "custom_report.md");
        assert!(config.general.verbose);
        assert_eq!(config.data.snapshot.as_deref(), Some("exports/term1.json"));
        assert_eq!(config.report.sort, "forum");
        assert_eq!(config.report.per_page, 50);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_partial_config_keeps_defaults() {
        let config: Config = toml::from_str("[report]\nsort = \"quiz\"\n").unwrap();
        assert_eq!(config.report.sort, "quiz");
        assert_eq!(config.report.per_page, 25);
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_merge_with_args() {
        let mut config = Config::default();
        config.report.sort = "forum".to_string();

        let args = Args {
            data: Some(PathBuf::from("exports/term2.json")),
            category: None,
            sort: None,
            page: 0,
            per_page: Some(10),
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            no_cache: true,
            list_counters: false,
            list_categories: false,
            verbose: false,
            quiet: false,
            init_config: false,
        };

        config.merge_with_args(&args);
        assert_eq!(config.data.snapshot.as_deref(), Some("exports/term2.json"));
        // No CLI sort given, so the config value survives.
        assert_eq!(config.report.sort, "forum");
        assert_eq!(config.report.per_page, 10);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_default_toml_generation() {
        let toml_str = Config::default_toml();
        assert!(!toml_str.is_empty());
        assert!(toml_str.contains("[general]"));
        assert!(toml_str.contains("[report]"));
        assert!(toml_str.contains("[cache]"));
    }
}
