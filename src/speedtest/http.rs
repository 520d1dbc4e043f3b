//! Speed test provider over plain HTTP, compatible with speedtest.net servers
//!
//! Discovery fetches the JSON server list, probes the closest candidates for
//! latency and keeps the fastest. Download pulls the server's random JPEG
//! images, upload posts zero-filled payloads to the server URL.

use super::{mbps, SpeedTestProvider};
use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::ReferenceEndpoint,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::{Duration, Instant};

/// Tunables of the HTTP provider
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub servers_url: String,
    pub timeout: Duration,
    /// How many list entries (closest first) are probed for latency
    pub closest_count: usize,
    pub latency_samples: usize,
    /// Edge lengths of the `random{N}x{N}.jpg` images
    pub download_sizes: Vec<u32>,
    /// Upload payload sizes in bytes
    pub upload_sizes: Vec<usize>,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            servers_url: crate::defaults::SERVERS_URL.to_string(),
            timeout: crate::defaults::HTTP_TIMEOUT,
            closest_count: 5,
            latency_samples: 3,
            download_sizes: vec![350, 500, 750, 1000, 1500],
            upload_sizes: vec![256 * 1024, 512 * 1024, 1024 * 1024],
        }
    }
}

/// One entry of the server list
#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    pub url: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sponsor: String,
    #[serde(default)]
    pub country: String,
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

/// HTTP speed test provider
pub struct HttpSpeedTestProvider {
    client: Client,
    settings: ProviderSettings,
    logger: Logger,
}

impl HttpSpeedTestProvider {
    pub fn new(settings: ProviderSettings, logger: Logger) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .user_agent(concat!("net-monitor/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            settings,
            logger,
        })
    }

    /// Fetch the candidate server list
    pub async fn fetch_servers(&self) -> Result<Vec<ServerEntry>> {
        let response = self
            .client
            .get(&self.settings.servers_url)
            .send()
            .await?
            .error_for_status()?;
        let servers: Vec<ServerEntry> = response.json().await?;
        Ok(servers)
    }

    /// Average latency of `latency.txt` on one server
    pub async fn measure_latency(&self, server: &ServerEntry) -> Result<Duration> {
        let endpoint = to_endpoint(server, Duration::ZERO);
        let latency_url = endpoint
            .resource_url("latency.txt")
            .ok_or_else(|| AppError::parse(format!("Invalid server URL: {}", server.url)))?;

        let samples = self.settings.latency_samples.max(1);
        let mut total = Duration::ZERO;
        for _ in 0..samples {
            let started = Instant::now();
            self.client
                .get(&latency_url)
                .send()
                .await?
                .error_for_status()?
                .bytes()
                .await?;
            total += started.elapsed();
        }
        Ok(total / samples as u32)
    }
}

fn to_endpoint(server: &ServerEntry, latency: Duration) -> ReferenceEndpoint {
    ReferenceEndpoint {
        id: server.id.clone(),
        name: server.name.clone(),
        sponsor: server.sponsor.clone(),
        url: server.url.clone(),
        latency,
    }
}

#[async_trait]
impl SpeedTestProvider for HttpSpeedTestProvider {
    async fn select_best_endpoint(&self) -> Result<ReferenceEndpoint> {
        let servers = self
            .fetch_servers()
            .await
            .map_err(|e| AppError::discovery(format!("cannot get server list: {}", e)))?;

        let mut best: Option<ReferenceEndpoint> = None;
        for server in servers.iter().take(self.settings.closest_count) {
            match self.measure_latency(server).await {
                Ok(latency) => {
                    self.logger
                        .debug("Candidate latency")
                        .field("id", &server.id)
                        .field("sponsor", &server.sponsor)
                        .field("latency_ms", latency.as_secs_f64() * 1000.0)
                        .log()
                        .await;
                    if best.as_ref().map_or(true, |b| latency < b.latency) {
                        best = Some(to_endpoint(server, latency));
                    }
                }
                Err(e) => {
                    self.logger
                        .debug("Candidate unreachable")
                        .field("id", &server.id)
                        .error_info(&e)
                        .log()
                        .await;
                }
            }
        }

        best.ok_or_else(|| AppError::discovery("no reachable speed test server"))
    }

    async fn measure_download(&self, endpoint: &ReferenceEndpoint) -> Result<f64> {
        let started = Instant::now();
        let mut bytes = 0u64;
        for size in &self.settings.download_sizes {
            let url = endpoint
                .resource_url(&format!("random{}x{}.jpg", size, size))
                .ok_or_else(|| AppError::parse(format!("Invalid endpoint URL: {}", endpoint.url)))?;
            let body = self.client.get(&url).send().await?.error_for_status()?.bytes().await?;
            bytes += body.len() as u64;
        }
        Ok(mbps(bytes, started.elapsed()))
    }

    async fn measure_upload(&self, endpoint: &ReferenceEndpoint) -> Result<f64> {
        let started = Instant::now();
        let mut bytes = 0u64;
        for size in &self.settings.upload_sizes {
            self.client
                .post(&endpoint.url)
                .body(vec![b'0'; *size])
                .send()
                .await?
                .error_for_status()?;
            bytes += *size as u64;
        }
        Ok(mbps(bytes, started.elapsed()))
    }
}
