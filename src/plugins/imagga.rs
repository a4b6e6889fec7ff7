//! Imagga backend.
//!
//! Imagga works one image at a time: local files are uploaded first, then
//! the tagging and color endpoints are queried per image. All images of a
//! request are processed concurrently. Credentials come from
//! `IMAGGA_API_KEY` and `IMAGGA_API_SECRET`.

use super::{check_status, env_credential, read_item_file, ColorMap, FaceMap, Plugin, RequestHandle, TagMap};
use crate::error::{ConfigError, ProviderError};
use crate::models::{ColorResult, Feature, Item, RequestDescriptor, TagResult};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::{debug, info};

const NAME: &str = "imagga";
const API_BASE: &str = "https://api.imagga.com/v2";

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    result: Option<T>,
    status: ApiStatus,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct UploadResult {
    upload_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TagsResult {
    #[serde(default)]
    tags: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    /// Percentage, 0-100.
    confidence: f64,
    tag: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct ColorsResult {
    colors: ColorGroups,
}

#[derive(Debug, Deserialize)]
struct ColorGroups {
    #[serde(default)]
    image_colors: Vec<ColorEntry>,
}

#[derive(Debug, Deserialize)]
struct ColorEntry {
    html_code: String,
    /// Percentage of the image, 0-100.
    percent: f64,
    r: f64,
    g: f64,
    b: f64,
}

/// What Imagga returned for one image.
#[derive(Debug, Default)]
struct Analysis {
    tags: Vec<TagEntry>,
    colors: Vec<ColorEntry>,
}

#[derive(Debug, Clone)]
struct Credentials {
    key: String,
    secret: String,
}

pub struct ImaggaPlugin {
    client: reqwest::Client,
    credentials: Option<Credentials>,
    responses: HashMap<RequestHandle, BTreeMap<String, Analysis>>,
}

impl ImaggaPlugin {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            credentials: None,
            responses: HashMap::new(),
        }
    }

    fn cached(&self, handle: &RequestHandle) -> Result<&BTreeMap<String, Analysis>, ProviderError> {
        self.responses
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownRequest(NAME.to_string()))
    }
}

/// Unwrap Imagga's `{result, status}` envelope.
fn open_envelope<T>(envelope: Envelope<T>) -> Result<T, ProviderError> {
    if envelope.status.kind != "success" {
        return Err(ProviderError::Api(envelope.status.text));
    }
    envelope
        .result
        .ok_or_else(|| ProviderError::Malformed("missing result".to_string()))
}

async fn get<T: DeserializeOwned>(
    client: &reqwest::Client,
    credentials: &Credentials,
    endpoint: &str,
    query: &[(&str, &str)],
) -> Result<T, ProviderError> {
    let response = client
        .get(format!("{}/{}", API_BASE, endpoint))
        .basic_auth(&credentials.key, Some(&credentials.secret))
        .query(query)
        .send()
        .await?;
    let response = check_status(NAME, response).await?;
    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;
    open_envelope(envelope)
}

async fn upload(
    client: &reqwest::Client,
    credentials: &Credentials,
    path: &str,
) -> Result<String, ProviderError> {
    let bytes = read_item_file(path).await?;
    let file_name = Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "image".to_string());
    let form = reqwest::multipart::Form::new()
        .part("image", reqwest::multipart::Part::bytes(bytes).file_name(file_name));

    let response = client
        .post(format!("{}/uploads", API_BASE))
        .basic_auth(&credentials.key, Some(&credentials.secret))
        .multipart(form)
        .send()
        .await?;
    let response = check_status(NAME, response).await?;
    let envelope: Envelope<UploadResult> = response
        .json()
        .await
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let upload_id = open_envelope(envelope)?.upload_id;
    debug!("Uploaded {} to Imagga as {}", path, upload_id);
    Ok(upload_id)
}

async fn analyze(
    client: &reqwest::Client,
    credentials: &Credentials,
    item: &Item,
    features: (bool, bool),
) -> Result<(String, Analysis), ProviderError> {
    let (want_tags, want_colors) = features;
    let (param, value) = if item.is_file() {
        ("image_upload_id", upload(client, credentials, &item.name).await?)
    } else {
        ("image_url", item.name.clone())
    };
    let query = [(param, value.as_str())];

    let mut analysis = Analysis::default();
    if want_tags {
        let result: TagsResult = get(client, credentials, "tags", &query).await?;
        analysis.tags = result.tags;
    }
    if want_colors {
        let result: ColorsResult = get(client, credentials, "colors", &query).await?;
        analysis.colors = result.colors.image_colors;
    }

    Ok((item.name.clone(), analysis))
}

fn extract_tags(analyses: &BTreeMap<String, Analysis>, min_score: f64) -> TagMap {
    let mut tags = TagMap::new();
    for (item, analysis) in analyses {
        let entry = tags.entry(item.clone()).or_default();
        for tag in &analysis.tags {
            let Some(name) = tag.tag.get("en") else {
                continue;
            };
            let score = tag.confidence / 100.0;
            if score >= min_score {
                entry.insert(name.clone(), TagResult::new(name, score));
            }
        }
    }
    tags
}

fn extract_colors(analyses: &BTreeMap<String, Analysis>) -> ColorMap {
    let mut colors = ColorMap::new();
    for (item, analysis) in analyses {
        let entry = colors.entry(item.clone()).or_default();
        for color in &analysis.colors {
            let mut result = ColorResult::from_rgb(color.r, color.g, color.b);
            result.pixel_fraction = color.percent / 100.0;
            if !color.html_code.is_empty() {
                result.hex = color.html_code.to_lowercase();
            }
            entry.insert(result.hex.clone(), result);
        }
    }
    colors
}

#[async_trait]
impl Plugin for ImaggaPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self) -> Result<(), ConfigError> {
        let credentials = env_credential("IMAGGA_API_KEY").and_then(|key| {
            let secret = env_credential("IMAGGA_API_SECRET")?;
            Ok(Credentials { key, secret })
        });

        match credentials {
            Ok(credentials) => {
                self.credentials = Some(credentials);
                Ok(())
            }
            Err(e) => {
                self.credentials = None;
                Err(e)
            }
        }
    }

    async fn perform(&mut self, request: &RequestDescriptor) -> Result<RequestHandle, ProviderError> {
        let credentials = self.credentials.clone().ok_or(ProviderError::NotConfigured)?;
        if request.is_empty() {
            return Err(ProviderError::NoItems);
        }

        let features = (request.wants(Feature::Tags), request.wants(Feature::Colors));
        let client = &self.client;
        let analyses = try_join_all(
            request
                .items()
                .iter()
                .map(|item| analyze(client, &credentials, item, features)),
        )
        .await?;

        let handle = RequestHandle::next(NAME);
        info!("Imagga analyzed {} item(s) as {}", analyses.len(), handle);
        self.responses
            .insert(handle.clone(), analyses.into_iter().collect());
        Ok(handle)
    }

    fn tags(&self, handle: &RequestHandle, min_score: f64) -> Result<TagMap, ProviderError> {
        Ok(extract_tags(self.cached(handle)?, min_score))
    }

    fn colors(&self, handle: &RequestHandle) -> Result<ColorMap, ProviderError> {
        Ok(extract_colors(self.cached(handle)?))
    }

    fn faces(&self, handle: &RequestHandle) -> Result<FaceMap, ProviderError> {
        self.cached(handle)?;
        Ok(FaceMap::new())
    }

    fn reset(&mut self) {
        self.responses.clear();
    }

    fn request_handles(&self) -> Result<Vec<RequestHandle>, ProviderError> {
        if self.credentials.is_none() {
            return Err(ProviderError::NotConfigured);
        }
        Ok(self.responses.keys().cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::assert_err;

    fn analyses() -> BTreeMap<String, Analysis> {
        let tags: Envelope<TagsResult> = serde_json::from_str(
            r#"{
                "result": {"tags": [
                    {"confidence": 91.5, "tag": {"en": "dog"}},
                    {"confidence": 50.0, "tag": {"en": "canine"}},
                    {"confidence": 12.0, "tag": {"en": "wolf"}},
                    {"confidence": 80.0, "tag": {"de": "hund"}}
                ]},
                "status": {"text": "", "type": "success"}
            }"#,
        )
        .unwrap();
        let colors: Envelope<ColorsResult> = serde_json::from_str(
            r##"{
                "result": {"colors": {"image_colors": [
                    {"html_code": "#1A2B3C", "percent": 40.0, "r": 26, "g": 43, "b": 60,
                     "closest_palette_color": "navy"}
                ]}},
                "status": {"text": "", "type": "success"}
            }"##,
        )
        .unwrap();

        let mut analyses = BTreeMap::new();
        analyses.insert(
            "http://x/dog.jpg".to_string(),
            Analysis {
                tags: open_envelope(tags).unwrap().tags,
                colors: open_envelope(colors).unwrap().colors.image_colors,
            },
        );
        analyses
    }

    #[test]
    fn test_extract_tags_scales_confidence() {
        let tags = extract_tags(&analyses(), 0.5);
        let dog = &tags["http://x/dog.jpg"];
        assert_eq!(dog["dog"].score, 0.915);
        assert_eq!(dog["canine"].score, 0.5);
        assert!(!dog.contains_key("wolf"));
        assert_eq!(dog.len(), 2);
    }

    #[test]
    fn test_extract_colors() {
        let colors = extract_colors(&analyses());
        let color = &colors["http://x/dog.jpg"]["#1a2b3c"];
        assert_eq!(color.pixel_fraction, 0.4);
        assert_eq!(color.red, 26.0);
        assert_eq!(color.alpha, 1.0);
    }

    #[test]
    fn test_error_envelope() {
        let envelope: Envelope<TagsResult> = serde_json::from_str(
            r#"{"status": {"text": "Monthly limit reached", "type": "error"}}"#,
        )
        .unwrap();
        let err = assert_err!(open_envelope(envelope));
        assert_eq!(err.to_string(), "Monthly limit reached");
    }
}
