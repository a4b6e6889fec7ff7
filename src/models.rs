//! Data models shared by plugins, the runner and the aggregator.
//!
//! Results are kept in `BTreeMap`s so every iteration order, and therefore
//! every rendered report, is deterministic.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;

/// Key of the unified cross-provider section in an [`AggregateReport`].
pub const ALL_KEY: &str = "all";

/// Analysis category a plugin can be asked for.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Feature {
    Tags,
    Colors,
    Faces,
}

impl Feature {
    /// All features, in the order they are extracted.
    pub const ALL: [Feature; 3] = [Feature::Tags, Feature::Colors, Feature::Faces];
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Tags => write!(f, "tags"),
            Feature::Colors => write!(f, "colors"),
            Feature::Faces => write!(f, "faces"),
        }
    }
}

/// Where an item's bytes come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Url,
    File,
}

/// One unit of work: a URL or a local file path.
///
/// The name is the merge key across providers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Item {
    pub name: String,
    pub kind: ItemKind,
}

impl Item {
    pub fn url(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::Url,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ItemKind::File,
        }
    }

    pub fn is_url(&self) -> bool {
        self.kind == ItemKind::Url
    }

    pub fn is_file(&self) -> bool {
        self.kind == ItemKind::File
    }
}

/// Everything one aggregation run needs to know.
///
/// Built once, then shared read-only by every plugin task.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestDescriptor {
    items: Vec<Item>,
    features: BTreeSet<Feature>,
    min_score: f64,
}

impl RequestDescriptor {
    /// Create a request from URLs and files. URLs come first; duplicates
    /// are dropped, keeping the first occurrence.
    pub fn new<U, F>(urls: U, files: F) -> Self
    where
        U: IntoIterator,
        U::Item: Into<String>,
        F: IntoIterator,
        F::Item: Into<String>,
    {
        let items = urls
            .into_iter()
            .map(Item::url)
            .chain(files.into_iter().map(Item::file))
            .collect();
        Self::from_items(items)
    }

    /// Create a request from already classified items.
    pub fn from_items(items: Vec<Item>) -> Self {
        let mut seen = HashSet::new();
        let items = items
            .into_iter()
            .filter(|item| seen.insert(item.name.clone()))
            .collect();

        Self {
            items,
            features: BTreeSet::new(),
            min_score: 0.0,
        }
    }

    /// Restrict the request to the given features. An empty set means all.
    pub fn with_features(mut self, features: impl IntoIterator<Item = Feature>) -> Self {
        self.features = features.into_iter().collect();
        self
    }

    /// Set the inclusive lower bound on tag confidence, clamped to [0, 1].
    pub fn with_min_score(mut self, min_score: f64) -> Self {
        self.min_score = if min_score.is_nan() {
            0.0
        } else {
            min_score.clamp(0.0, 1.0)
        };
        self
    }

    pub fn items(&self) -> &[Item] {
        &self.items
    }

    pub fn urls(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.is_url())
    }

    pub fn files(&self) -> impl Iterator<Item = &Item> {
        self.items.iter().filter(|i| i.is_file())
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.items.iter().any(|i| i.name == name)
    }

    /// Whether a feature should be extracted for this request.
    pub fn wants(&self, feature: Feature) -> bool {
        self.features.is_empty() || self.features.contains(&feature)
    }

    /// The features that will actually be extracted.
    pub fn enabled_features(&self) -> Vec<Feature> {
        Feature::ALL.into_iter().filter(|f| self.wants(*f)).collect()
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }
}

/// A tag attached to an item. Scores run from 0 to 1.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagResult {
    pub name: String,
    pub score: f64,

    /// Originating plugin. Set only by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl TagResult {
    pub fn new(name: impl Into<String>, score: f64) -> Self {
        Self {
            name: name.into(),
            score,
            source: None,
        }
    }
}

/// A dominant color of an item.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColorResult {
    pub hex: String,
    #[serde(default)]
    pub score: f64,
    #[serde(default)]
    pub pixel_fraction: f64,
    #[serde(default)]
    pub red: f64,
    #[serde(default)]
    pub green: f64,
    #[serde(default)]
    pub blue: f64,
    #[serde(default)]
    pub alpha: f64,

    /// Originating plugin. Set only by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl ColorResult {
    /// Build a fully opaque color from 0-255 channel values.
    pub fn from_rgb(red: f64, green: f64, blue: f64) -> Self {
        Self {
            hex: rgb_to_hex(red, green, blue),
            red,
            green,
            blue,
            alpha: 1.0,
            ..Self::default()
        }
    }

    /// Build a fully opaque color from a `#rrggbb` string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        let (red, green, blue) = hex_to_rgb(hex)?;
        Some(Self {
            hex: hex.to_lowercase(),
            red,
            green,
            blue,
            alpha: 1.0,
            ..Self::default()
        })
    }
}

/// Format 0-255 channel values as `#rrggbb`.
pub fn rgb_to_hex(red: f64, green: f64, blue: f64) -> String {
    let channel = |v: f64| v.round().clamp(0.0, 255.0) as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        channel(red),
        channel(green),
        channel(blue)
    )
}

/// Parse `#rrggbb` (or `rrggbb`) into 0-255 channel values.
pub fn hex_to_rgb(hex: &str) -> Option<(f64, f64, f64)> {
    let digits = hex.trim().trim_start_matches('#');
    if digits.len() != 6 || !digits.is_ascii() {
        return None;
    }

    let channel = |range: std::ops::Range<usize>| {
        u8::from_str_radix(&digits[range], 16)
            .ok()
            .map(f64::from)
    };

    Some((channel(0..2)?, channel(2..4)?, channel(4..6)?))
}

/// A vertex of a face bounding polygon, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vertex {
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingPoly {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub vertices: Vec<Vertex>,
}

/// A detected face. Likelihoods use the provider's own vocabulary
/// (e.g. `VERY_LIKELY`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceResult {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bounding_poly: Option<BoundingPoly>,
    #[serde(default)]
    pub detection_score: f64,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub joy_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub sorrow_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub anger_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub surprise_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub under_exposed_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub blurred_likelihood: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub headwear_likelihood: String,

    /// Originating plugin. Set only by the aggregator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Findings for one item, from one plugin or merged across plugins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Asset {
    pub name: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, Vec<TagResult>>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub colors: BTreeMap<String, Vec<ColorResult>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub faces: Vec<FaceResult>,
}

impl Asset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// True when no tag, color or face was found.
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.colors.is_empty() && self.faces.is_empty()
    }
}

/// One section of the report: a plugin's assets and errors, or the merged view.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PluginReport {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assets: Vec<Asset>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl PluginReport {
    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Result of one aggregation run, handed to the presentation layer.
///
/// Serializes as `{"all": {...}, "<plugin>": {...}, ...}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    #[serde(rename = "all", default)]
    pub all: PluginReport,
    #[serde(flatten)]
    pub providers: BTreeMap<String, PluginReport>,
}

impl AggregateReport {
    pub fn provider(&self, name: &str) -> Option<&PluginReport> {
        self.providers.get(name)
    }

    /// Every section, `all` included, sorted by key.
    pub fn sections(&self) -> Vec<(&str, &PluginReport)> {
        let mut sections: Vec<(&str, &PluginReport)> = self
            .providers
            .iter()
            .map(|(name, report)| (name.as_str(), report))
            .collect();
        sections.push((ALL_KEY, &self.all));
        sections.sort_by(|a, b| a.0.cmp(b.0));
        sections
    }

    /// Total number of errors across all plugins.
    pub fn error_count(&self) -> usize {
        self.all.errors.len()
    }
}
