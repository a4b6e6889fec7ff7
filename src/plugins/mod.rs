//! Plugin contract and the built-in vision backends.
//!
//! A plugin is queried in two phases: [`Plugin::perform`] makes the network
//! calls once and caches the responses under a [`RequestHandle`], then
//! [`Plugin::tags`], [`Plugin::colors`] and [`Plugin::faces`] extract typed
//! results from that cache. The runner only calls the extractors for the
//! features a request wants.

pub mod clarifai;
pub mod google_vision;
pub mod imagga;
pub mod registry;

#[cfg(test)]
pub(crate) mod mock;

use crate::error::{ConfigError, ProviderError};
use crate::models::{ColorResult, FaceResult, RequestDescriptor, TagResult};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

pub use clarifai::ClarifaiPlugin;
pub use google_vision::GoogleVisionPlugin;
pub use imagga::ImaggaPlugin;
pub use registry::PluginRegistry;

/// Item name -> tag name -> tag.
pub type TagMap = BTreeMap<String, BTreeMap<String, TagResult>>;
/// Item name -> color key (hex) -> color.
pub type ColorMap = BTreeMap<String, BTreeMap<String, ColorResult>>;
/// Item name -> faces in detection order.
pub type FaceMap = BTreeMap<String, Vec<FaceResult>>;

/// A plugin behind a lock, so one task at a time can drive it.
pub type SharedPlugin = Arc<Mutex<Box<dyn Plugin>>>;

/// Opaque identifier for responses cached by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestHandle(String);

static NEXT_HANDLE: AtomicU64 = AtomicU64::new(1);

impl RequestHandle {
    /// Issue a handle that is unique for the lifetime of the process.
    pub fn next(plugin: &str) -> Self {
        let id = NEXT_HANDLE.fetch_add(1, Ordering::Relaxed);
        Self(format!("{}-{}", plugin, id))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The capability every vision backend provides.
#[async_trait]
pub trait Plugin: Send {
    /// Registry name, e.g. `"clarifai"`.
    fn name(&self) -> &str;

    /// Discover credentials and prepare clients. Safe to call repeatedly.
    fn setup(&mut self) -> Result<(), ConfigError>;

    /// Query the backend for every item in the request and cache the
    /// responses under the returned handle.
    async fn perform(&mut self, request: &RequestDescriptor) -> Result<RequestHandle, ProviderError>;

    /// Tags per item with `score >= min_score`.
    fn tags(&self, handle: &RequestHandle, min_score: f64) -> Result<TagMap, ProviderError>;

    fn colors(&self, handle: &RequestHandle) -> Result<ColorMap, ProviderError>;

    fn faces(&self, handle: &RequestHandle) -> Result<FaceMap, ProviderError>;

    /// Drop every cached response and handle.
    fn reset(&mut self);

    /// Handles with cached responses.
    fn request_handles(&self) -> Result<Vec<RequestHandle>, ProviderError>;
}

/// A registry holding every built-in plugin.
pub fn default_registry(client: reqwest::Client) -> PluginRegistry {
    let mut registry = PluginRegistry::new();
    // Built-in names are fixed and distinct, so registration cannot fail.
    let _ = registry.register(ClarifaiPlugin::new(client.clone()));
    let _ = registry.register(GoogleVisionPlugin::new(client.clone()));
    let _ = registry.register(ImaggaPlugin::new(client));
    registry
}

/// Read a required environment variable, treating blank as missing.
pub(crate) fn env_credential(key: &str) -> Result<String, ConfigError> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(ConfigError::MissingCredentials),
    }
}

/// Read a local file for upload, attributing failures to the path.
pub(crate) async fn read_item_file(path: &str) -> Result<Vec<u8>, ProviderError> {
    tokio::fs::read(path).await.map_err(|source| ProviderError::Io {
        path: path.to_string(),
        source,
    })
}

/// Turn a non-success response into a [`ProviderError::Status`].
pub(crate) async fn check_status(
    provider: &str,
    response: reqwest::Response,
) -> Result<reqwest::Response, ProviderError> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    Err(ProviderError::Status {
        provider: provider.to_string(),
        status,
        body,
    })
}
