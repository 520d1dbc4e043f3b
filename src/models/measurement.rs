//! Measurement data models: reference endpoints, ping samples and records

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

/// The remote server throughput is measured against
///
/// Immutable once selected; a refresh replaces it wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceEndpoint {
    /// Provider-side identifier
    pub id: String,
    /// Display name, usually the city
    pub name: String,
    /// Sponsor / operator label
    pub sponsor: String,
    /// Upload URL of the server; other resources live next to it
    pub url: String,
    /// Average latency measured while ranking candidates
    pub latency: Duration,
}

impl ReferenceEndpoint {
    /// Host part of the endpoint URL, without port
    pub fn host(&self) -> Option<String> {
        url::Url::parse(&self.url)
            .ok()
            .and_then(|u| u.host_str().map(|h| h.trim_matches(|c| c == '[' || c == ']').to_string()))
    }

    /// URL of a sibling resource, e.g. `latency.txt` next to `upload.php`
    pub fn resource_url(&self, resource: &str) -> Option<String> {
        let base = url::Url::parse(&self.url).ok()?;
        base.join(resource).ok().map(|u| u.to_string())
    }

    /// Selection latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// One ICMP echo reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingSample {
    /// Burst the echo request belonged to
    pub burst: u16,
    pub rtt: Duration,
    pub addr: IpAddr,
}

impl PingSample {
    pub fn new(burst: u16, addr: IpAddr, rtt: Duration) -> Self {
        Self { burst, rtt, addr }
    }

    /// Round-trip time in milliseconds
    pub fn rtt_ms(&self) -> f64 {
        self.rtt.as_secs_f64() * 1000.0
    }
}

/// One persisted measurement: `(timestamp, value, label)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
    pub label: String,
}

impl Record {
    pub fn new(timestamp: DateTime<Utc>, value: f64, label: impl Into<String>) -> Self {
        Self {
            timestamp,
            value,
            label: label.into(),
        }
    }

    /// Record for a ping sample; the label is the replying address
    pub fn from_ping(timestamp: DateTime<Utc>, sample: &PingSample) -> Self {
        Self::new(timestamp, sample.rtt_ms(), sample.addr.to_string())
    }

    /// Record for a throughput result; the label is the endpoint URL
    pub fn from_throughput(timestamp: DateTime<Utc>, mbps: f64, endpoint: &ReferenceEndpoint) -> Self {
        Self::new(timestamp, mbps, endpoint.url.clone())
    }

    /// Text columns as written to the output file
    pub fn to_row(&self) -> [String; 3] {
        [
            self.timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
            format!("{:.4}", self.value),
            self.label.clone(),
        ]
    }
}
