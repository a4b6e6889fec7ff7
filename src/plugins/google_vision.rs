//! Google Cloud Vision backend.
//!
//! One batched `images:annotate` call covers every item and every wanted
//! feature. Authenticates with the API key in `GOOGLE_VISION_API_KEY`.

use super::{check_status, env_credential, read_item_file, ColorMap, FaceMap, Plugin, RequestHandle, TagMap};
use crate::error::{ConfigError, ProviderError};
use crate::models::{
    rgb_to_hex, BoundingPoly, ColorResult, FaceResult, Feature, Item, RequestDescriptor, TagResult,
};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use tracing::{info, warn};

const NAME: &str = "googlevision";
const ANNOTATE_URL: &str = "https://vision.googleapis.com/v1/images:annotate";

#[derive(Debug, Deserialize)]
struct BatchResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    #[serde(default)]
    face_annotations: Vec<FaceAnnotation>,
    image_properties_annotation: Option<ImageProperties>,
    error: Option<ApiStatus>,
}

#[derive(Debug, Deserialize)]
struct ApiStatus {
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
    #[serde(default)]
    score: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct FaceAnnotation {
    bounding_poly: Option<BoundingPoly>,
    detection_confidence: f64,
    joy_likelihood: String,
    sorrow_likelihood: String,
    anger_likelihood: String,
    surprise_likelihood: String,
    under_exposed_likelihood: String,
    blurred_likelihood: String,
    headwear_likelihood: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageProperties {
    dominant_colors: DominantColors,
}

#[derive(Debug, Deserialize)]
struct DominantColors {
    #[serde(default)]
    colors: Vec<ColorInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ColorInfo {
    color: RgbColor,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    pixel_fraction: f64,
}

#[derive(Debug, Deserialize)]
struct RgbColor {
    #[serde(default)]
    red: f64,
    #[serde(default)]
    green: f64,
    #[serde(default)]
    blue: f64,
    /// Absent means fully opaque.
    alpha: Option<f64>,
}

#[derive(Debug)]
struct Cached {
    items: Vec<String>,
    response: BatchResponse,
}

impl Cached {
    /// Item/response pairs, skipping images the API could not process.
    fn annotated(&self) -> impl Iterator<Item = (&String, &ImageResponse)> {
        self.items
            .iter()
            .zip(&self.response.responses)
            .filter(|(item, response)| match &response.error {
                Some(status) => {
                    warn!("Google Vision could not annotate {}: {}", item, status.message);
                    false
                }
                None => true,
            })
    }
}

pub struct GoogleVisionPlugin {
    client: reqwest::Client,
    api_key: Option<String>,
    responses: HashMap<RequestHandle, Cached>,
}

impl GoogleVisionPlugin {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_key: None,
            responses: HashMap::new(),
        }
    }

    fn cached(&self, handle: &RequestHandle) -> Result<&Cached, ProviderError> {
        self.responses
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownRequest(NAME.to_string()))
    }
}

async fn to_image(item: &Item) -> Result<Value, ProviderError> {
    if item.is_url() {
        return Ok(json!({ "source": { "imageUri": item.name } }));
    }
    let bytes = read_item_file(&item.name).await?;
    Ok(json!({ "content": BASE64.encode(bytes) }))
}

fn api_features(request: &RequestDescriptor) -> Vec<Value> {
    request
        .enabled_features()
        .into_iter()
        .map(|feature| match feature {
            Feature::Tags => json!({ "type": "LABEL_DETECTION" }),
            Feature::Faces => json!({ "type": "FACE_DETECTION" }),
            Feature::Colors => json!({ "type": "IMAGE_PROPERTIES" }),
        })
        .collect()
}

fn extract_tags(cached: &Cached, min_score: f64) -> TagMap {
    let mut tags = TagMap::new();
    for (item, response) in cached.annotated() {
        let entry = tags.entry(item.clone()).or_default();
        for label in &response.label_annotations {
            if label.score >= min_score {
                entry.insert(label.description.clone(), TagResult::new(&label.description, label.score));
            }
        }
    }
    tags
}

fn extract_colors(cached: &Cached) -> ColorMap {
    let mut colors = ColorMap::new();
    for (item, response) in cached.annotated() {
        let Some(ref properties) = response.image_properties_annotation else {
            continue;
        };
        let entry = colors.entry(item.clone()).or_default();
        for info in &properties.dominant_colors.colors {
            let c = &info.color;
            let color = ColorResult {
                hex: rgb_to_hex(c.red, c.green, c.blue),
                score: info.score,
                pixel_fraction: info.pixel_fraction,
                red: c.red,
                green: c.green,
                blue: c.blue,
                alpha: c.alpha.unwrap_or(1.0),
                source: None,
            };
            entry.insert(color.hex.clone(), color);
        }
    }
    colors
}

fn extract_faces(cached: &Cached) -> FaceMap {
    let mut faces = FaceMap::new();
    for (item, response) in cached.annotated() {
        if response.face_annotations.is_empty() {
            continue;
        }
        let entry = faces.entry(item.clone()).or_default();
        for face in &response.face_annotations {
            entry.push(FaceResult {
                bounding_poly: face.bounding_poly.clone(),
                detection_score: face.detection_confidence,
                joy_likelihood: face.joy_likelihood.clone(),
                sorrow_likelihood: face.sorrow_likelihood.clone(),
                anger_likelihood: face.anger_likelihood.clone(),
                surprise_likelihood: face.surprise_likelihood.clone(),
                under_exposed_likelihood: face.under_exposed_likelihood.clone(),
                blurred_likelihood: face.blurred_likelihood.clone(),
                headwear_likelihood: face.headwear_likelihood.clone(),
                source: None,
            });
        }
    }
    faces
}

#[async_trait]
impl Plugin for GoogleVisionPlugin {
    fn name(&self) -> &str {
        NAME
    }

    fn setup(&mut self) -> Result<(), ConfigError> {
        match env_credential("GOOGLE_VISION_API_KEY") {
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

        let features = api_features(request);
        let mut requests = Vec::with_capacity(request.items().len());
        for item in request.items() {
            requests.push(json!({ "image": to_image(item).await?, "features": features }));
        }

        let response = self
            .client
            .post(ANNOTATE_URL)
            .query(&[("key", api_key.as_str())])
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        let response = check_status(NAME, response).await?;
        let response: BatchResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Malformed(e.to_string()))?;

        if response.responses.len() != request.items().len() {
            return Err(ProviderError::Malformed(format!(
                "expected {} responses, got {}",
                request.items().len(),
                response.responses.len()
            )));
        }

        let handle = RequestHandle::next(NAME);
        info!("Google Vision annotated {} item(s) as {}", request.items().len(), handle);
        self.responses.insert(
            handle.clone(),
            Cached {
                items: request.items().iter().map(|i| i.name.clone()).collect(),
                response,
            },
        );
        Ok(handle)
    }

    fn tags(&self, handle: &RequestHandle, min_score: f64) -> Result<TagMap, ProviderError> {
        Ok(extract_tags(self.cached(handle)?, min_score))
    }

    fn colors(&self, handle: &RequestHandle) -> Result<ColorMap, ProviderError> {
        Ok(extract_colors(self.cached(handle)?))
    }

    fn faces(&self, handle: &RequestHandle) -> Result<FaceMap, ProviderError> {
        Ok(extract_faces(self.cached(handle)?))
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vertex;

    const SAMPLE: &str = r#"{
        "responses": [
            {
                "labelAnnotations": [
                    {"description": "Dog", "score": 0.97},
                    {"description": "Grass", "score": 0.45}
                ],
                "faceAnnotations": [{
                    "boundingPoly": {"vertices": [{"x": 1, "y": 2}, {"x": 30}]},
                    "detectionConfidence": 0.93,
                    "joyLikelihood": "VERY_LIKELY",
                    "headwearLikelihood": "UNLIKELY"
                }],
                "imagePropertiesAnnotation": {"dominantColors": {"colors": [
                    {"color": {"red": 255, "green": 128}, "score": 0.6, "pixelFraction": 0.3}
                ]}}
            },
            {"error": {"code": 3, "message": "Bad image data."}}
        ]
    }"#;

    fn cached() -> Cached {
        Cached {
            items: vec!["http://x/dog.jpg".to_string(), "broken.png".to_string()],
            response: serde_json::from_str(SAMPLE).unwrap(),
        }
    }

    #[test]
    fn test_extract_tags_skips_failed_images() {
        let tags = extract_tags(&cached(), 0.45);
        assert_eq!(tags.len(), 1);
        let dog = &tags["http://x/dog.jpg"];
        assert_eq!(dog["Dog"].score, 0.97);
        assert!(dog.contains_key("Grass"));

        let tags = extract_tags(&cached(), 0.5);
        assert!(!tags["http://x/dog.jpg"].contains_key("Grass"));
    }

    #[test]
    fn test_extract_colors_defaults_alpha() {
        let colors = extract_colors(&cached());
        let color = &colors["http://x/dog.jpg"]["#ff8000"];
        assert_eq!(color.alpha, 1.0);
        assert_eq!(color.pixel_fraction, 0.3);
        assert_eq!(color.blue, 0.0);
    }

    #[test]
    fn test_extract_faces() {
        let faces = extract_faces(&cached());
        let face = &faces["http://x/dog.jpg"][0];
        assert_eq!(face.detection_score, 0.93);
        assert_eq!(face.joy_likelihood, "VERY_LIKELY");
        assert_eq!(face.sorrow_likelihood, "");
        let poly = face.bounding_poly.as_ref().unwrap();
        assert_eq!(poly.vertices[1], Vertex { x: 30, y: 0 });
    }

    #[test]
    fn test_api_features_follow_request() {
        let request = RequestDescriptor::new(vec!["http://x/a.jpg"], Vec::<String>::new())
            .with_features([Feature::Faces]);
        assert_eq!(api_features(&request), vec![json!({ "type": "FACE_DETECTION" })]);
        assert_eq!(
            api_features(&request.with_features(Vec::<Feature>::new())).len(),
            3
        );
    }
}
