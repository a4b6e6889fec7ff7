//! Fan-out over plugins and cross-plugin aggregation.

pub mod aggregator;
pub mod runner;

pub use aggregator::build_report;
pub use runner::{OutcomeCollector, ProviderOutcome, Runner};
