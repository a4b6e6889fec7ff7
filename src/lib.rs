//! Visago - visual AI aggregator.
//!
//! Sends the same set of images to several vision backends concurrently,
//! waits for every backend to report, and merges the tags, colors and faces
//! they found into one report that keeps track of which backend said what.
//!
//! ```no_run
//! use visago::{default_registry, RequestDescriptor, Runner};
//!
//! # async fn demo() -> Result<(), visago::error::RunError> {
//! let registry = default_registry(reqwest::Client::new());
//! let request = RequestDescriptor::new(vec!["https://example.com/dog.jpg"], Vec::<String>::new());
//! let report = Runner::new(&registry).run(request).await?;
//! println!("{} merged asset(s)", report.all.assets.len());
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod error;
pub mod input;
pub mod models;
pub mod plugins;
pub mod report;

pub use analysis::{build_report, OutcomeCollector, ProviderOutcome, Runner};
pub use models::{AggregateReport, Asset, Feature, Item, PluginReport, RequestDescriptor};
pub use plugins::{default_registry, Plugin, PluginRegistry, RequestHandle};
