//! Configuration file handling.
//!
//! Settings are read from `.visago.toml` in the working directory, or from
//! `~/.visago/config.toml` when that is absent. Command-line flags win over
//! both.

use crate::cli::{Args, OutputFormat};
use crate::models::Feature;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// File name looked up in the working directory.
pub const LOCAL_CONFIG: &str = ".visago.toml";

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// What to extract.
    #[serde(default)]
    pub request: RequestConfig,

    /// Which plugins run, and for how long.
    #[serde(default)]
    pub plugins: PluginsConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Default output format.
    #[serde(default)]
    pub format: OutputFormat,
}

/// Request settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Minimum tag confidence to keep, inclusive.
    #[serde(default = "default_tag_score")]
    pub tag_score: f64,

    #[serde(default = "default_true")]
    pub tags: bool,

    #[serde(default = "default_true")]
    pub colors: bool,

    #[serde(default = "default_true")]
    pub faces: bool,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            tag_score: default_tag_score(),
            tags: true,
            colors: true,
            faces: true,
        }
    }
}

fn default_tag_score() -> f64 {
    0.0
}

fn default_true() -> bool {
    true
}

/// Plugin selection settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginsConfig {
    /// When non-empty, only these plugins run.
    #[serde(default)]
    pub whitelist: Vec<String>,

    /// These plugins never run.
    #[serde(default)]
    pub blacklist: Vec<String>,

    /// Per-plugin deadline. Unset means no deadline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<u64>,
}

impl RequestConfig {
    /// The enabled features, or empty when all are on.
    pub fn features(&self) -> Vec<Feature> {
        let selected: Vec<Feature> = [
            (self.tags, Feature::Tags),
            (self.colors, Feature::Colors),
            (self.faces, Feature::Faces),
        ]
        .into_iter()
        .filter_map(|(on, feature)| on.then_some(feature))
        .collect();

        if selected.len() == Feature::ALL.len() {
            Vec::new()
        } else {
            selected
        }
    }
}

impl PluginsConfig {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_seconds.map(Duration::from_secs)
    }
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

    /// Try to load configuration from the default locations.
    ///
    /// Returns `Ok(None)` if no file exists, `Err` if one exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_first(&Self::default_paths())
    }

    /// Candidate config files, most specific first.
    pub fn default_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from(LOCAL_CONFIG)];
        if let Some(home) = dirs::home_dir() {
            paths.push(home.join(".visago").join("config.toml"));
        }
        paths
    }

    fn load_first(paths: &[PathBuf]) -> Result<Option<Self>> {
        match paths.iter().find(|p| p.exists()) {
            Some(path) => Ok(Some(Self::load(path)?)),
            None => Ok(None),
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence, but only when given explicitly.
    pub fn merge_with_args(&mut self, args: &Args) {
        if args.verbose {
            self.general.verbose = true;
        }
        if let Some(format) = args.requested_format() {
            self.general.format = format;
        }

        if let Some(score) = args.tag_score {
            self.request.tag_score = score;
        }
        let features = args.requested_features();
        if !features.is_empty() {
            self.request.tags = features.contains(&Feature::Tags);
            self.request.colors = features.contains(&Feature::Colors);
            self.request.faces = features.contains(&Feature::Faces);
        }

        if let Some(ref whitelist) = args.whitelist {
            self.plugins.whitelist = whitelist.clone();
        }
        if let Some(ref blacklist) = args.blacklist {
            self.plugins.blacklist = blacklist.clone();
        }
        if let Some(timeout) = args.timeout {
            self.plugins.timeout_seconds = Some(timeout);
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
