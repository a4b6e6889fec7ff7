//! Scriptable in-memory plugin for tests.

use super::{ColorMap, FaceMap, Plugin, RequestHandle, TagMap};
use crate::error::{ConfigError, ProviderError};
use crate::models::{ColorResult, FaceResult, RequestDescriptor, TagResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Default)]
struct Cached {
    tags: TagMap,
    colors: ColorMap,
    faces: FaceMap,
}

/// A plugin whose answers and failures are set up by the test.
pub struct MockPlugin {
    name: String,
    tags: TagMap,
    colors: ColorMap,
    faces: FaceMap,
    setup_error: bool,
    perform_error: Option<String>,
    tags_error: Option<String>,
    colors_error: Option<String>,
    panic_in_perform: bool,
    delay: Option<Duration>,
    ignore_min_score: bool,
    configured: bool,
    cache: BTreeMap<RequestHandle, Cached>,
    pub tag_calls: Arc<AtomicUsize>,
    pub color_calls: Arc<AtomicUsize>,
    pub face_calls: Arc<AtomicUsize>,
}

impl MockPlugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tags: TagMap::new(),
            colors: ColorMap::new(),
            faces: FaceMap::new(),
            setup_error: false,
            perform_error: None,
            tags_error: None,
            colors_error: None,
            panic_in_perform: false,
            delay: None,
            ignore_min_score: false,
            configured: false,
            cache: BTreeMap::new(),
            tag_calls: Arc::new(AtomicUsize::new(0)),
            color_calls: Arc::new(AtomicUsize::new(0)),
            face_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_tag(mut self, item: &str, tag: &str, score: f64) -> Self {
        self.tags
            .entry(item.to_string())
            .or_default()
            .insert(tag.to_string(), TagResult::new(tag, score));
        self
    }

    /// Report the item as analyzed but with no tags.
    pub fn with_empty_tags(mut self, item: &str) -> Self {
        self.tags.entry(item.to_string()).or_default();
        self
    }

    pub fn with_color(mut self, item: &str, hex: &str, score: f64) -> Self {
        let mut color = ColorResult::from_hex(hex).unwrap_or_default();
        color.score = score;
        self.colors
            .entry(item.to_string())
            .or_default()
            .insert(color.hex.clone(), color);
        self
    }

    pub fn with_face(mut self, item: &str, detection_score: f64) -> Self {
        self.faces.entry(item.to_string()).or_default().push(FaceResult {
            detection_score,
            joy_likelihood: "LIKELY".to_string(),
            ..FaceResult::default()
        });
        self
    }

    pub fn failing_setup(mut self) -> Self {
        self.setup_error = true;
        self
    }

    pub fn failing_perform(mut self, message: &str) -> Self {
        self.perform_error = Some(message.to_string());
        self
    }

    pub fn failing_tags(mut self, message: &str) -> Self {
        self.tags_error = Some(message.to_string());
        self
    }

    pub fn failing_colors(mut self, message: &str) -> Self {
        self.colors_error = Some(message.to_string());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic_in_perform = true;
        self
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Return every tag regardless of the threshold.
    pub fn ignoring_min_score(mut self) -> Self {
        self.ignore_min_score = true;
        self
    }

    fn cached(&self, handle: &RequestHandle) -> Result<&Cached, ProviderError> {
        self.cache
            .get(handle)
            .ok_or_else(|| ProviderError::UnknownRequest(self.name.clone()))
    }
}

#[async_trait]
impl Plugin for MockPlugin {
    fn name(&self) -> &str {
        &self.name
    }

    fn setup(&mut self) -> Result<(), ConfigError> {
        if self.setup_error {
            self.configured = false;
            return Err(ConfigError::MissingCredentials);
        }
        self.configured = true;
        Ok(())
    }

    async fn perform(&mut self, request: &RequestDescriptor) -> Result<RequestHandle, ProviderError> {
        if !self.configured {
            return Err(ProviderError::NotConfigured);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic_in_perform {
            panic!("mock plugin {} exploded", self.name);
        }
        if let Some(ref message) = self.perform_error {
            return Err(ProviderError::Api(message.clone()));
        }

        let keep = |name: &String| request.contains(name);
        let cached = Cached {
            tags: self
                .tags
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            colors: self
                .colors
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            faces: self
                .faces
                .iter()
                .filter(|(k, _)| keep(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        };

        let handle = RequestHandle::next(&self.name);
        self.cache.insert(handle.clone(), cached);
        Ok(handle)
    }

    fn tags(&self, handle: &RequestHandle, min_score: f64) -> Result<TagMap, ProviderError> {
        self.tag_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.tags_error {
            return Err(ProviderError::Api(message.clone()));
        }

        let mut tags = self.cached(handle)?.tags.clone();
        if !self.ignore_min_score {
            for item_tags in tags.values_mut() {
                item_tags.retain(|_, tag| tag.score >= min_score);
            }
        }
        Ok(tags)
    }

    fn colors(&self, handle: &RequestHandle) -> Result<ColorMap, ProviderError> {
        self.color_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(ref message) = self.colors_error {
            return Err(ProviderError::Api(message.clone()));
        }
        Ok(self.cached(handle)?.colors.clone())
    }

    fn faces(&self, handle: &RequestHandle) -> Result<FaceMap, ProviderError> {
        self.face_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.cached(handle)?.faces.clone())
    }

    fn reset(&mut self) {
        self.cache.clear();
    }

    fn request_handles(&self) -> Result<Vec<RequestHandle>, ProviderError> {
        if !self.configured {
            return Err(ProviderError::NotConfigured);
        }
        Ok(self.cache.keys().cloned().collect())
    }
}
