//! Net Monitor
//!
//! A long-running network monitor: ICMP round-trip times to a set of hosts
//! and download/upload throughput against an automatically selected speed
//! test server, each on its own cadence and appended to its own CSV file.

pub mod app;
pub mod cli;
pub mod config;
pub mod dns;
pub mod error;
pub mod logging;
pub mod models;
pub mod ping;
pub mod registry;
pub mod saver;
pub mod scheduler;
pub mod speedtest;
pub mod types;

// Re-export commonly used types
pub use app::{App, Components, RunReport};
pub use error::{AppError, Result};
pub use models::{Config, PingSample, Record, ReferenceEndpoint};
pub use registry::ReferenceEndpointRegistry;
pub use saver::{RecordWriter, Saver};
pub use scheduler::{MetricScheduler, MetricSummary};
pub use types::{MetricKind, ProbeState};

/// Application version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Default configuration values
pub mod defaults {
    use std::time::Duration;

    pub const PING_INTERVAL_SECS: u64 = 2;
    pub const DOWNLOAD_INTERVAL_SECS: u64 = 900;
    pub const UPLOAD_INTERVAL_SECS: u64 = 900;

    pub const PING_OUTPUT: &str = "ping.csv";
    pub const DOWNLOAD_OUTPUT: &str = "download.csv";
    pub const UPLOAD_OUTPUT: &str = "upload.csv";

    pub const REFRESH_INTERVAL_SECS: u64 = 3600;

    /// Longest accepted scan or refresh interval: one year
    pub const MAX_INTERVAL_SECS: u64 = 365 * 24 * 3600;
    pub const SERVERS_URL: &str = "https://www.speedtest.net/api/js/servers?engine=js&limit=10";

    pub const HTTP_TIMEOUT: Duration = Duration::from_secs(15);
    pub const PING_TIMEOUT: Duration = Duration::from_millis(1000);
}
