//! Clarifai backend.
//!
//! Uses the v2 model outputs API with a personal access token read from
//! `CLARIFAI_API_KEY`. Tags come from the general recognition model and
//! colors from the color model; Clarifai reports no faces here.

use super::{check_status, env_credential, read_item_file, ColorMap, FaceMap, Plugin, RequestHandle, TagMap};
use crate::error::{ConfigError, ProviderError};
use crate::models::{ColorResult, Feature, Item, RequestDescriptor, TagResult};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{debug, info};

const NAME: &str = "clarifai";
const API_BASE: &str = "https://api.clarifai.com/v2";
const GENERAL_MODEL: &str = "general-image-recognition";
const COLOR_MODEL: &str = "color-recognition";
/// Clarifai's status code for a successful call.
const STATUS_OK: u32 = 10000;

#[derive(Debug, Deserialize)]
struct OutputsResponse {
    status: Status,
    #[serde(default)]
    outputs: Vec<Output>,
}

#[derive(Debug, Deserialize)]
struct Status {
    code: u32,
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct Output {
    #[serde(default)]
    data: OutputData,
}

#[derive(Debug, Default, Deserialize)]
struct OutputData {
    #[serde(default)]
    concepts: Vec<Concept>,
    #[serde(default)]
    colors: Vec<Color>,
}

#[derive(Debug, Deserialize)]
struct Concept {
    name: String,
    value: f64,
}

#[derive(Debug, Deserialize)]
struct Color {
    raw_hex: String,
    value: f64,
}

/// Responses for one request, in the same order as `items`.
#[derive(Debug, Default)]
struct Cached {
    items: Vec<String>,
    tags: Option<OutputsResponse>,
    colors: Option<OutputsResponse>,
}

pub struct ClarifaiPlugin {
    client: reqwest::Client,
    api_key: Option<String>,
    responses: HashMap<RequestHandle, Cached>,
}

impl ClarifaiPlugin {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: None,
            responses: HashMap::new(),
        }
    }

    async fn predict(&self, api_key: &str, model: &str, inputs: &[Value]) -> Result<OutputsResponse, ProviderError> {
        let url = format!("{}/models/{}/outputs", API_BASE, model);
        let body = json!({
            "user_app_id": { "user_id": "clarifai", "app_id": "main" },
            "inputs": inputs,
        });

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Key {}", api_key))
            .json(&body)
            .send()
            .await?;
        let response = check_status(NAME, response).await?;
        let parsed: OutputsResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if parsed.status.code != STATUS_OK {
            return Err(ProviderError::Api(parsed.status.description));
        }
        Ok(parsed)
    }

    fn cached(&self, handle: &RequestHandle) -> Result<&Cached, ProviderError> {
        self.responses
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownRequest(NAME.to_string()))
    }
}

/// Build a Clarifai input: URLs by reference, files inline.
async fn to_input(item: &Item) -> Result<Value, ProviderError> {
    if item.is_url() {
        return Ok(json!({ "data": { "image": { "url": item.name } } }));
    }
    let bytes = read_item_file(&item.name).await?;
    Ok(json!({ "data": { "image": { "base64": BASE64.encode(bytes) } } }))
}

fn extract_tags(items: &[String], response: &OutputsResponse, min_score: f64) -> TagMap {
    let mut tags = TagMap::new();
    for (item, output) in items.iter().zip(&response.outputs) {
        let entry = tags.entry(item.clone()).or_default();
        for concept in &output.data.concepts {
            if concept.value >= min_score {
                entry.insert(concept.name.clone(), TagResult::new(&concept.name, concept.value));
            }
        }
    }
    tags
}

fn extract_colors(items: &[String], response: &OutputsResponse) -> ColorMap {
    let mut colors = ColorMap::new();
    for (item, output) in items.iter().zip(&response.outputs) {
        let entry = colors.entry(item.clone()).or_default();
        for color in &output.data.colors {
            let Some(mut result) = ColorResult::from_hex(&color.raw_hex) else {
                debug!("Skipping unparseable Clarifai color {:?}", color.raw_hex);
                continue;
            };
            result.pixel_fraction = color.value;
            entry.insert(result.hex.clone(), result);
        }
    }
    colors
}

#[async_trait]
impl Plugin for ClarifaiPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self) -> Result<(), ConfigError> {
        match env_credential("CLARIFAI_API_KEY") {
            Ok(key) => {
                self.api_key = Some(key);
                Ok(())
            }
            Err(e) => {
                self.api_key = None;
                Err(e)
            }
        }
    }

    async fn perform(&mut self, request: &RequestDescriptor) -> Result<RequestHandle, ProviderError> {
        let api_key = self.api_key.clone().ok_or(ProviderError::NotConfigured)?;
        if request.is_empty() {
            return Err(ProviderError::NoItems);
        }

        let mut inputs = Vec::with_capacity(request.items().len());
        for item in request.items() {
            inputs.push(to_input(item).await?);
        }

        let mut cached = Cached {
            items: request.items().iter().map(|i| i.name.clone()).collect(),
            ..Cached::default()
        };
        if request.wants(Feature::Tags) {
            cached.tags = Some(self.predict(&api_key, GENERAL_MODEL, &inputs).await?);
        }
        if request.wants(Feature::Colors) {
            cached.colors = Some(self.predict(&api_key, COLOR_MODEL, &inputs).await?);
        }

        let handle = RequestHandle::next(NAME);
        info!("Clarifai analyzed {} item(s) as {}", cached.items.len(), handle);
        self.responses.insert(handle.clone(), cached);
        Ok(handle)
    }

    fn tags(&self, handle: &RequestHandle, min_score: f64) -> Result<TagMap, ProviderError> {
        let cached = self.cached(handle)?;
        let response = cached
            .tags
            .as_ref()
            .ok_or_else(|| ProviderError::Api("tag request has not been made to clarifai".to_string()))?;
        Ok(extract_tags(&cached.items, response, min_score))
    }

    fn colors(&self, handle: &RequestHandle) -> Result<ColorMap, ProviderError> {
        let cached = self.cached(handle)?;
        let response = cached
            .colors
            .as_ref()
            .ok_or_else(|| ProviderError::Api("color request has not been made to clarifai".to_string()))?;
        Ok(extract_colors(&cached.items, response))
    }

    fn faces(&self, handle: &RequestHandle) -> Result<FaceMap, ProviderError> {
        self.cached(handle)?;
        Ok(FaceMap::new())
    }

    fn reset(&mut self) {
        self.responses.clear();
    }

    fn request_handles(&self) -> Result<Vec<RequestHandle>, ProviderError> {
        if self.api_key.is_none() {
            return Err(ProviderError::NotConfigured);
        }
        Ok(self.responses.keys().cloned().collect())
    }
}
