//! Data models and structures for the network monitor

pub mod config;
pub mod measurement;

// Re-export main model types
pub use config::{Config, MetricSettings};
pub use measurement::{PingSample, Record, ReferenceEndpoint};
