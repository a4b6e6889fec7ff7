//! Command-line interface argument parsing.
//!
//! Flags here override values from the configuration file; see
//! [`crate::config::Config::merge_with_args`].

use crate::models::Feature;
use clap::Parser;
use std::path::PathBuf;

/// Visago - visual AI aggregator
///
/// Send images to several vision APIs at once and merge what they find.
/// Items can be local files or http(s) URLs, given as arguments or piped
/// through stdin.
///
/// Examples:
///   visago https://example.com/dog.jpg ./photos/cat.png
///   visago --json --tags --tag-score 0.8 https://example.com/dog.jpg
///   ls *.jpg | visago --whitelist imagga,googlevision
///   visago --list-plugins
///   visago --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Files or URLs to analyze
    #[arg(value_name = "FILES/URLS")]
    pub items: Vec<String>,

    /// Provide JSON output (shorthand for --format json)
    #[arg(short, long)]
    pub json: bool,

    /// Output format
    #[arg(long, value_name = "FORMAT")]
    pub format: Option<OutputFormat>,

    /// Write the report to a file instead of stdout
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// List supported plugins and exit
    #[arg(short, long)]
    pub list_plugins: bool,

    /// Only extract tags
    ///
    /// Feature flags combine; with none set, every feature is extracted.
    #[arg(long)]
    pub tags: bool,

    /// Only extract dominant colors
    #[arg(long)]
    pub colors: bool,

    /// Only extract faces
    #[arg(long)]
    pub faces: bool,

    /// Minimum tag confidence to keep (0.0 - 1.0, inclusive)
    #[arg(long, value_name = "SCORE")]
    pub tag_score: Option<f64>,

    /// Only run these plugins (comma-separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',', env = "VISAGO_WHITELIST")]
    pub whitelist: Option<Vec<String>>,

    /// Never run these plugins (comma-separated)
    #[arg(long, value_name = "NAMES", value_delimiter = ',', env = "VISAGO_BLACKLIST")]
    pub blacklist: Option<Vec<String>>,

    /// Per-plugin deadline in seconds
    ///
    /// A plugin that takes longer reports a timeout error. No deadline by default.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Path to configuration file
    ///
    /// If not specified, looks for .visago.toml in the current directory,
    /// then ~/.visago/config.toml
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (errors only)
    #[arg(short, long)]
    pub quiet: bool,

    /// Generate a default .visago.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Plain text summary (default)
    #[default]
    Text,
    /// JSON format
    Json,
    /// Markdown format
    Markdown,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if let Some(score) = self.tag_score {
            if !(0.0..=1.0).contains(&score) {
                return Err("Tag score must be between 0.0 and 1.0".to_string());
            }
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(timeout) = self.timeout {
            if timeout == 0 {
                return Err("Timeout must be at least 1 second".to_string());
            }
        }

        if self.json && matches!(self.format, Some(f) if f != OutputFormat::Json) {
            return Err("--json conflicts with --format".to_string());
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

    /// The output format asked for on the command line, if any.
    pub fn requested_format(&self) -> Option<OutputFormat> {
        if self.json {
            Some(OutputFormat::Json)
        } else {
            self.format
        }
    }

    /// Features selected by flags. Empty when none was given.
    pub fn requested_features(&self) -> Vec<Feature> {
        [
            (self.tags, Feature::Tags),
            (self.colors, Feature::Colors),
            (self.faces, Feature::Faces),
        ]
        .into_iter()
        .filter_map(|(on, feature)| on.then_some(feature))
        .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_args() -> Args {
        Args::parse_from(["visago", "http://x/a.jpg"])
    }

    #[test]
    fn test_parse_items_and_lists() {
        let args = Args::parse_from([
            "visago",
            "--whitelist",
            "imagga,clarifai",
            "--tags",
            "a.jpg",
            "http://x/b.jpg",
        ]);
        assert_eq!(args.items, vec!["a.jpg", "http://x/b.jpg"]);
        assert_eq!(
            args.whitelist,
            Some(vec!["imagga".to_string(), "clarifai".to_string()])
        );
        assert_eq!(args.requested_features(), vec![Feature::Tags]);
    }

    #[test]
    fn test_validation_tag_score_range() {
        let mut args = make_args();
        args.tag_score = Some(1.5);
        assert!(args.validate().is_err());

        args.tag_score = Some(1.0);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_validation_conflicting_options() {
        let mut args = make_args();
        args.verbose = true;
        args.quiet = true;
        assert!(args.validate().is_err());

        let mut args = make_args();
        args.json = true;
        args.format = Some(OutputFormat::Markdown);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_validation_zero_timeout() {
        let mut args = make_args();
        args.timeout = Some(0);
        assert!(args.validate().is_err());
    }

    #[test]
    fn test_json_flag_selects_format() {
        let mut args = make_args();
        assert_eq!(args.requested_format(), None);

        args.json = true;
        assert_eq!(args.requested_format(), Some(OutputFormat::Json));
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
