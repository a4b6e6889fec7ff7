//! Concurrent plugin execution.
//!
//! One Tokio task is spawned per active plugin. Each task drives its own
//! plugin through setup, perform and extraction, and publishes exactly one
//! [`ProviderOutcome`] on a shared channel. The [`OutcomeCollector`] waits
//! for one outcome per plugin before anything is aggregated.

use crate::analysis::aggregator::build_report;
use crate::error::{PluginError, RunError};
use crate::models::{AggregateReport, Feature, RequestDescriptor};
use crate::plugins::{ColorMap, FaceMap, Plugin, PluginRegistry, SharedPlugin, TagMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything one plugin produced, or failed to produce, for one request.
#[derive(Debug, Default)]
pub struct ProviderOutcome {
    pub name: String,
    pub tags: TagMap,
    pub colors: ColorMap,
    pub faces: FaceMap,
    /// Failures in the order they happened. A task stops at its first one.
    pub errors: Vec<PluginError>,
}

impl ProviderOutcome {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Outcome for a plugin whose task never reported.
    fn aborted(name: &str) -> Self {
        let mut outcome = Self::new(name);
        outcome
            .errors
            .push(PluginError::Aborted(name.to_string()));
        outcome
    }

    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Whether the plugin returned any entry, even an empty one, for the item.
    pub fn covers(&self, item: &str) -> bool {
        self.tags.contains_key(item) || self.colors.contains_key(item) || self.faces.contains_key(item)
    }
}

/// Runs every active plugin in a registry against a request.
pub struct Runner<'a> {
    registry: &'a PluginRegistry,
    timeout: Option<Duration>,
}

impl<'a> Runner<'a> {
    pub fn new(registry: &'a PluginRegistry) -> Self {
        Self {
            registry,
            timeout: None,
        }
    }

    /// Bound each plugin task. `None` lets tasks run to completion.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run all active plugins and aggregate their outcomes.
    pub async fn run(&self, request: RequestDescriptor) -> Result<AggregateReport, RunError> {
        self.run_with_progress(request, |_| {}).await
    }

    /// Like [`Runner::run`], calling `on_outcome` as each plugin reports.
    pub async fn run_with_progress<F>(
        &self,
        request: RequestDescriptor,
        on_outcome: F,
    ) -> Result<AggregateReport, RunError>
    where
        F: FnMut(&ProviderOutcome),
    {
        let request = Arc::new(request);
        let outcomes = self.collect_outcomes(Arc::clone(&request), on_outcome).await?;
        Ok(build_report(&request, outcomes))
    }

    /// Spawn one task per active plugin and wait for all of them.
    pub async fn collect_outcomes<F>(
        &self,
        request: Arc<RequestDescriptor>,
        on_outcome: F,
    ) -> Result<Vec<ProviderOutcome>, RunError>
    where
        F: FnMut(&ProviderOutcome),
    {
        let active = self.registry.active();
        if active.is_empty() {
            warn!("No active plugins");
            return Ok(Vec::new());
        }

        let runtime =
            tokio::runtime::Handle::try_current().map_err(|e| RunError::NoRuntime(e.to_string()))?;

        info!(
            "Running {} plugin(s) on {} item(s): {}",
            active.len(),
            request.items().len(),
            active
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );

        let (tx, rx) = mpsc::channel(active.len());
        let collector = OutcomeCollector::new(active.iter().map(|(name, _)| name.clone()));

        for (name, plugin) in active {
            let tx = tx.clone();
            let request = Arc::clone(&request);
            let timeout = self.timeout;

            runtime.spawn(async move {
                let outcome = run_plugin(name, plugin, request, timeout).await;
                let name = outcome.name.clone();
                if tx.send(outcome).await.is_err() {
                    warn!("Outcome from {} was dropped: collector is gone", name);
                }
            });
        }

        // Only the tasks hold senders now, so the channel closes when they are all done.
        drop(tx);

        Ok(collector.collect(rx, on_outcome).await)
    }
}

/// Gathers exactly one outcome per expected plugin.
pub struct OutcomeCollector {
    expected: Vec<String>,
}

impl OutcomeCollector {
    pub fn new(expected: impl IntoIterator<Item = String>) -> Self {
        Self {
            expected: expected.into_iter().collect(),
        }
    }

    /// Receive until every expected plugin has reported or all senders are gone.
    ///
    /// Plugins that never reported get a synthesized outcome carrying a
    /// single [`PluginError::Aborted`]. Outcomes from unexpected or
    /// already-reported names are discarded.
    pub async fn collect<F>(
        self,
        mut rx: mpsc::Receiver<ProviderOutcome>,
        mut on_outcome: F,
    ) -> Vec<ProviderOutcome>
    where
        F: FnMut(&ProviderOutcome),
    {
        let mut outcomes: Vec<ProviderOutcome> = Vec::with_capacity(self.expected.len());

        while outcomes.len() < self.expected.len() {
            let Some(outcome) = rx.recv().await else {
                break;
            };

            if !self.expected.contains(&outcome.name) {
                warn!("Ignoring outcome from unexpected plugin {}", outcome.name);
                continue;
            }
            if outcomes.iter().any(|o| o.name == outcome.name) {
                warn!("Ignoring duplicate outcome from {}", outcome.name);
                continue;
            }

            debug!(
                "Collected outcome from {} ({}/{})",
                outcome.name,
                outcomes.len() + 1,
                self.expected.len()
            );
            on_outcome(&outcome);
            outcomes.push(outcome);
        }

        for name in &self.expected {
            if !outcomes.iter().any(|o| &o.name == name) {
                warn!("Plugin {} ended without reporting", name);
                let outcome = ProviderOutcome::aborted(name);
                on_outcome(&outcome);
                outcomes.push(outcome);
            }
        }

        outcomes
    }
}

/// Drive one plugin to completion. Never fails: errors land in the outcome.
async fn run_plugin(
    name: String,
    plugin: SharedPlugin,
    request: Arc<RequestDescriptor>,
    timeout: Option<Duration>,
) -> ProviderOutcome {
    let mut outcome = ProviderOutcome::new(name);
    let mut guard = plugin.lock().await;

    let result = match timeout {
        Some(limit) => {
            match tokio::time::timeout(limit, execute(&mut **guard, &request, &mut outcome)).await {
                Ok(result) => result,
                Err(_) => Err(PluginError::Timeout(limit)),
            }
        }
        None => execute(&mut **guard, &request, &mut outcome).await,
    };

    // Cached responses must not outlive the request that produced them.
    guard.reset();

    match result {
        Ok(()) => debug!(
            "{} finished: {} tagged, {} colored, {} with faces",
            outcome.name,
            outcome.tags.len(),
            outcome.colors.len(),
            outcome.faces.len()
        ),
        Err(e) => {
            warn!("{} failed: {}", outcome.name, e);
            outcome.errors.push(e);
        }
    }

    outcome
}

/// Setup, perform, then extract the wanted features, stopping at the first error.
async fn execute(
    plugin: &mut dyn Plugin,
    request: &RequestDescriptor,
    outcome: &mut ProviderOutcome,
) -> Result<(), PluginError> {
    plugin.setup()?;
    let handle = plugin.perform(request).await?;
    debug!("{} performed request {}", outcome.name, handle);

    if request.wants(Feature::Tags) {
        let min_score = request.min_score();
        let mut tags = plugin.tags(&handle, min_score)?;
        for item_tags in tags.values_mut() {
            item_tags.retain(|_, tag| tag.score >= min_score);
        }
        outcome.tags = tags;
    }

    if request.wants(Feature::Colors) {
        outcome.colors = plugin.colors(&handle)?;
    }

    if request.wants(Feature::Faces) {
        outcome.faces = plugin.faces(&handle)?;
    }

    Ok(())
}
