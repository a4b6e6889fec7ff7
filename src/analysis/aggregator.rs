//! Cross-plugin aggregation.
//!
//! Builds one report section per plugin plus the merged `all` section.
//! Every merged fact carries the name of the plugin that produced it.
//! Nothing is filtered here; thresholds were applied by the plugin tasks.

use crate::analysis::runner::ProviderOutcome;
use crate::models::{AggregateReport, Asset, PluginReport, RequestDescriptor};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Build the full report from every plugin's outcome.
///
/// Plugins are processed in name order and assets are emitted in item-name
/// order, so the result does not depend on completion order.
pub fn build_report(request: &RequestDescriptor, mut outcomes: Vec<ProviderOutcome>) -> AggregateReport {
    outcomes.sort_by(|a, b| a.name.cmp(&b.name));

    let mut report = AggregateReport::default();
    let mut merged: BTreeMap<String, Asset> = BTreeMap::new();

    for outcome in &outcomes {
        warn_unrequested_items(request, outcome);

        let assets = provider_assets(request, outcome);
        for asset in &assets {
            merge_asset(&mut merged, asset, &outcome.name);
        }

        let errors: Vec<String> = outcome.errors.iter().map(ToString::to_string).collect();
        report.all.errors.extend(errors.iter().cloned());

        report
            .providers
            .insert(outcome.name.clone(), PluginReport { assets, errors });
    }

    report.all.assets = merged.into_values().filter(|a| !a.is_empty()).collect();

    debug!(
        "Aggregated {} plugin(s) into {} merged asset(s) with {} error(s)",
        outcomes.len(),
        report.all.assets.len(),
        report.all.errors.len()
    );

    report
}

/// One asset per requested item the plugin returned an entry for.
///
/// An item the plugin analyzed but found nothing in still gets an (empty)
/// asset here; only the merged view drops empty assets.
pub fn provider_assets(request: &RequestDescriptor, outcome: &ProviderOutcome) -> Vec<Asset> {
    let mut names: Vec<&str> = request
        .items()
        .iter()
        .map(|item| item.name.as_str())
        .filter(|name| outcome.covers(name))
        .collect();
    names.sort_unstable();

    names
        .into_iter()
        .map(|name| {
            let mut asset = Asset::new(name);

            if let Some(tags) = outcome.tags.get(name) {
                for (key, tag) in tags {
                    let mut tag = tag.clone();
                    tag.source = None;
                    asset.tags.entry(key.clone()).or_default().push(tag);
                }
            }

            if let Some(colors) = outcome.colors.get(name) {
                for (key, color) in colors {
                    let mut color = color.clone();
                    color.source = None;
                    let hex = if color.hex.is_empty() {
                        key.clone()
                    } else {
                        color.hex.clone()
                    };
                    asset.colors.entry(hex).or_default().push(color);
                }
            }

            if let Some(faces) = outcome.faces.get(name) {
                asset.faces = faces
                    .iter()
                    .cloned()
                    .map(|mut face| {
                        face.source = None;
                        face
                    })
                    .collect();
            }

            asset
        })
        .collect()
}

/// Append one plugin's asset to the merged asset of the same name.
fn merge_asset(merged: &mut BTreeMap<String, Asset>, asset: &Asset, source: &str) {
    let target = merged
        .entry(asset.name.clone())
        .or_insert_with(|| Asset::new(asset.name.clone()));

    for (name, tags) in &asset.tags {
        let entry = target.tags.entry(name.clone()).or_default();
        entry.extend(tags.iter().cloned().map(|mut tag| {
            tag.source = Some(source.to_string());
            tag
        }));
    }

    for (hex, colors) in &asset.colors {
        let entry = target.colors.entry(hex.clone()).or_default();
        entry.extend(colors.iter().cloned().map(|mut color| {
            color.source = Some(source.to_string());
            color
        }));
    }

    target
        .faces
        .extend(asset.faces.iter().cloned().map(|mut face| {
            face.source = Some(source.to_string());
            face
        }));
}

fn warn_unrequested_items(request: &RequestDescriptor, outcome: &ProviderOutcome) {
    let keys = outcome
        .tags
        .keys()
        .chain(outcome.colors.keys())
        .chain(outcome.faces.keys());

    for key in keys {
        if !request.contains(key) {
            warn!(
                "{} returned results for {:?}, which was not requested; ignoring",
                outcome.name, key
            );
        }
    }
}
