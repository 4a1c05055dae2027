//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// CourseTally - per-course student activity reports
///
/// Aggregate quiz attempts, forum posts, submissions and other activity
/// events per course from a platform snapshot. Markdown/JSON reports.
///
/// Examples:
///   coursetally --data snapshot.json
///   coursetally --data snapshot.json --category 7 --sort forum
///   coursetally --data snapshot.json --format json --output report.json
///   coursetally --data snapshot.json --list-counters
///   coursetally --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Path to the activity snapshot to report on
    ///
    /// A JSON export of the platform's courses, categories, visible
    /// modules and activity record stores. Can also be set via the
    /// COURSETALLY_SNAPSHOT env var or .coursetally.toml config.
    #[arg(short, long, value_name = "FILE", env = "COURSETALLY_SNAPSHOT")]
    pub data: Option<PathBuf>,

    /// Restrict the report to one category and its descendants
    ///
    /// If not specified, every course except the site course is reported.
    #[arg(long, value_name = "ID")]
    pub category: Option<i64>,

    /// Counter column to sort the course table by
    ///
    /// One of the counter names shown by --list-counters. Unknown names
    /// fall back to `total` with a warning.
    #[arg(short, long, value_name = "COUNTER")]
    pub sort: Option<String>,

    /// Zero-based page of the course table to emit
    #[arg(long, default_value = "0", value_name = "PAGE")]
    pub page: usize,

    /// Courses per page
    #[arg(long, value_name = "COUNT")]
    pub per_page: Option<usize>,

    /// Output file path for the report
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Output format (markdown, json)
    #[arg(long, default_value = "markdown", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .coursetally.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Run without the aggregation cache
    ///
    /// Every counter is recomputed from the snapshot, which is only
    /// interesting for timing comparisons.
    #[arg(long)]
    pub no_cache: bool,

    /// List the declared counters with their availability and exit
    #[arg(long)]
    pub list_counters: bool,

    /// List the categories available for --category and exit
    #[arg(long)]
    pub list_categories: bool,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .coursetally.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Markdown format (default)
    #[default]
    Markdown,
    /// JSON format
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    ///
    /// The snapshot path itself may also come from the config file, so
    /// its presence is checked after the config merge, not here.
    pub fn validate(&self) -> Result<(), String> {
        // Skip validation for --init-config
        if self.init_config {
            return Ok(());
        }

        // Validate the snapshot file if given on the command line
        if let Some(ref data) = self.data {
            if !data.exists() {
                return Err(format!("Snapshot file does not exist: {}", data.display()));
            }
            if !data.is_file() {
                return Err(format!("Snapshot path is not a file: {}", data.display()));
            }
        }

        // Validate the category scope
        if let Some(category) = self.category {
            if category < 1 {
                return Err("Category id must be at least 1".to_string());
            }
        }

        // Validate pagination
        if let Some(per_page) = self.per_page {
            if per_page == 0 {
                return Err("Per-page must be at least 1".to_string());
            }
        }

        // Check for conflicting options
        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        Ok(())
    }

    /// Returns the log level based on verbosity settings.
    pub fn log_level(&self) -> tracing::Level {
        if self.quiet {
            tracing::Level::ERROR
        } else if self.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::INFO
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args {
            data: None,
            category: None,
            sort: None,
            page: 0,
            per_page: None,
            output: None,
            format: OutputFormat::Markdown,
            config: None,
            no_cache: false,
            list_counters: false,
            list_categories: false,
            verbose: false,
            quiet: false,
            init_config: false,
        }
    }

    #[test]
    fn test_validation_accepts_defaults() {
        let args = make_args();
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_missing_snapshot_file() {
        let mut args = make_args();
        args.data = Some(PathBuf::from("/nonexistent/snapshot.json"));
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_per_page() {
        let mut args = make_args();
        args.per_page = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_nonpositive_category() {
        let mut args = make_args();
        args.category = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_init_config_skips_validation() {
        let mut args = make_args();
        args.per_page = Some(0);
        args.init_config = true;
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_log_level() {
        let mut args = make_args();
        assert_eq!(args.log_level(), tracing::Level::INFO);

        args.verbose = true;
        assert_eq!(args.log_level(), tracing::Level::DEBUG);

        args.verbose = false;
        args.quiet = true;
        assert_eq!(args.log_level(), tracing::Level::ERROR);
    }
}
