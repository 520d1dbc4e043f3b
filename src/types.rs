//! Type definitions and aliases

use serde::{Deserialize, Serialize};
use std::fmt;

// Re-export commonly used types
pub use crate::error::{AppError, Result};

/// The three measured metrics, each with its own cadence and output stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricKind {
    /// ICMP echo round-trip time
    Ping,
    /// Download throughput against the reference endpoint
    Download,
    /// Upload throughput against the reference endpoint
    Upload,
}

impl MetricKind {
    /// All metrics in startup order
    pub const ALL: [MetricKind; 3] = [MetricKind::Ping, MetricKind::Download, MetricKind::Upload];

    /// Lowercase name used in logs, flags and default file names
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Ping => "ping",
            MetricKind::Download => "download",
            MetricKind::Upload => "upload",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of one metric's scheduling loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProbeState {
    /// Waiting for the next tick
    Idle,
    /// Running the metric's probe
    Probing,
    /// Handing Records to the persistence stream
    Publishing,
    /// Stop signal observed, loop exited
    Stopped,
}

impl ProbeState {
    /// Whether `next` is a legal successor of this state
    pub fn can_transition_to(&self, next: ProbeState) -> bool {
        matches!(
            (self, next),
            (ProbeState::Idle, ProbeState::Probing)
                | (ProbeState::Probing, ProbeState::Publishing)
                | (ProbeState::Probing, ProbeState::Idle)
                | (ProbeState::Publishing, ProbeState::Idle)
                | (ProbeState::Idle, ProbeState::Stopped)
                | (ProbeState::Probing, ProbeState::Stopped)
                | (ProbeState::Publishing, ProbeState::Stopped)
        )
    }
}
