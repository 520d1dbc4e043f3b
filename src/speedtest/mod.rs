//! Throughput measurement and reference endpoint discovery

pub mod http;

pub use http::{HttpSpeedTestProvider, ProviderSettings};

use crate::{error::Result, models::ReferenceEndpoint};
use async_trait::async_trait;

/// Endpoint discovery and throughput measurement, in Mbit/s
#[async_trait]
pub trait SpeedTestProvider: Send + Sync {
    /// Discover candidate servers and return the best one
    async fn select_best_endpoint(&self) -> Result<ReferenceEndpoint>;

    async fn measure_download(&self, endpoint: &ReferenceEndpoint) -> Result<f64>;

    async fn measure_upload(&self, endpoint: &ReferenceEndpoint) -> Result<f64>;
}

/// Megabits per second for `bytes` transferred in `elapsed`
pub fn mbps(bytes: u64, elapsed: std::time::Duration) -> f64 {
    let secs = elapsed.as_secs_f64().max(1e-6);
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}
