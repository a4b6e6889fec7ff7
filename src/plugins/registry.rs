//! Plugin registry with whitelist/blacklist filtering.
//!
//! Filters are applied when the active set is queried, never at
//! registration, so a registry can be re-filtered freely.

use super::{Plugin, SharedPlugin};
use crate::error::RunError;
use crate::models::ALL_KEY;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// Registered plugins, keyed by name.
#[derive(Default)]
pub struct PluginRegistry {
    plugins: BTreeMap<String, SharedPlugin>,
    whitelist: BTreeSet<String>,
    blacklist: BTreeSet<String>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a plugin under its own name.
    ///
    /// `all` is reserved for the merged report section.
    pub fn register<P: Plugin + 'static>(&mut self, plugin: P) -> Result<(), RunError> {
        let name = plugin.name().to_string();
        if name == ALL_KEY {
            return Err(RunError::ReservedName(name));
        }
        if self.plugins.contains_key(&name) {
            return Err(RunError::DuplicatePlugin(name));
        }

        debug!("Registered plugin {}", name);
        self.plugins.insert(name, Arc::new(Mutex::new(Box::new(plugin))));
        Ok(())
    }

    /// Only these names are eligible. An empty list disables the whitelist.
    pub fn set_whitelist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.whitelist = names.into_iter().map(Into::into).collect();
    }

    /// These names are always excluded, after the whitelist is applied.
    pub fn set_blacklist<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blacklist = names.into_iter().map(Into::into).collect();
    }

    /// Names of every registered plugin, ignoring filters.
    pub fn registered_names(&self) -> Vec<String> {
        self.plugins.keys().cloned().collect()
    }

    /// Names that pass the filters, sorted lexicographically.
    pub fn active_names(&self) -> Vec<String> {
        self.plugins
            .keys()
            .filter(|name| self.whitelist.is_empty() || self.whitelist.contains(*name))
            .filter(|name| !self.blacklist.contains(*name))
            .cloned()
            .collect()
    }

    /// Active plugins paired with their names, in name order.
    pub fn active(&self) -> Vec<(String, SharedPlugin)> {
        self.active_names()
            .into_iter()
            .filter_map(|name| {
                let plugin = self.plugins.get(&name).cloned()?;
                Some((name, plugin))
            })
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<SharedPlugin> {
        self.plugins.get(name).cloned()
    }

    /// One active plugin name per line.
    pub fn display(&self) -> String {
        let mut out = self.active_names().join("\n");
        out.push('\n');
        out
    }
}
