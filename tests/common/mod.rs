//! Shared doubles for the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use net_monitor::{
    dns::{parse_ip_literal, HostResolver},
    error::{AppError, Result},
    logging::Logger,
    ping::{reply_channel, PingCollector, Pinger},
    saver::RecordWriter,
    speedtest::SpeedTestProvider,
    PingSample, Record, ReferenceEndpoint,
};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn endpoint(host: &str) -> ReferenceEndpoint {
    ReferenceEndpoint {
        id: host.to_string(),
        name: format!("server {}", host),
        sponsor: "test".to_string(),
        url: format!("http://{}:8080/speedtest/upload.php", host),
        latency: Duration::from_millis(10),
    }
}

/// Hands out the scripted hosts in turn, repeating the last one.
/// `None` makes that selection fail.
pub struct MockProvider {
    script: Mutex<Vec<Option<String>>>,
    cursor: AtomicUsize,
    pub download_mbps: f64,
    pub upload_mbps: f64,
    pub probe_delay: Duration,
    pub fail_probes: bool,
    /// Ids of the endpoints each throughput probe ran against
    pub probed: Mutex<Vec<String>>,
}

impl MockProvider {
    pub fn new(hosts: &[&str]) -> Self {
        Self::scripted(hosts.iter().map(|h| Some(h.to_string())).collect())
    }

    pub fn scripted(script: Vec<Option<String>>) -> Self {
        Self {
            script: Mutex::new(script),
            cursor: AtomicUsize::new(0),
            download_mbps: 93.5,
            upload_mbps: 11.25,
            probe_delay: Duration::ZERO,
            fail_probes: false,
            probed: Mutex::new(Vec::new()),
        }
    }

    async fn probe(&self, endpoint: &ReferenceEndpoint, value: f64) -> Result<f64> {
        if !self.probe_delay.is_zero() {
            tokio::time::sleep(self.probe_delay).await;
        }
        self.probed.lock().unwrap().push(endpoint.id.clone());
        if self.fail_probes {
            return Err(AppError::http_request("connection reset"));
        }
        Ok(value)
    }
}

#[async_trait]
impl SpeedTestProvider for MockProvider {
    async fn select_best_endpoint(&self) -> Result<ReferenceEndpoint> {
        let script = self.script.lock().unwrap().clone();
        let index = self.cursor.fetch_add(1, Ordering::SeqCst).min(script.len().saturating_sub(1));
        match script.get(index).cloned().flatten() {
            Some(host) => Ok(endpoint(&host)),
            None => Err(AppError::discovery("no reachable speed test server")),
        }
    }

    async fn measure_download(&self, endpoint: &ReferenceEndpoint) -> Result<f64> {
        self.probe(endpoint, self.download_mbps).await
    }

    async fn measure_upload(&self, endpoint: &ReferenceEndpoint) -> Result<f64> {
        self.probe(endpoint, self.upload_mbps).await
    }
}

/// Resolves IP literals only
pub struct LiteralResolver;

#[async_trait]
impl HostResolver for LiteralResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        parse_ip_literal(host).ok_or_else(|| AppError::dns_resolution(format!("unable to resolve {}", host)))
    }
}

/// Answers every echo immediately, last registered target first
pub struct EchoPinger {
    targets: Mutex<Vec<IpAddr>>,
    replies: mpsc::Sender<PingSample>,
    rtt: Duration,
    /// Targets that never answer
    pub silent: Mutex<Vec<IpAddr>>,
    /// Number of upcoming `send` calls that fail
    pub failing_sends: AtomicUsize,
    pub sends: AtomicUsize,
}

impl EchoPinger {
    pub fn new(replies: mpsc::Sender<PingSample>) -> Self {
        Self {
            targets: Mutex::new(Vec::new()),
            replies,
            rtt: Duration::from_micros(12_500),
            silent: Mutex::new(Vec::new()),
            failing_sends: AtomicUsize::new(0),
            sends: AtomicUsize::new(0),
        }
    }

    pub fn targets(&self) -> Vec<IpAddr> {
        self.targets.lock().unwrap().clone()
    }
}

#[async_trait]
impl Pinger for EchoPinger {
    async fn add_target(&self, addr: IpAddr) {
        let mut targets = self.targets.lock().unwrap();
        if !targets.contains(&addr) {
            targets.push(addr);
        }
    }

    async fn remove_target(&self, addr: IpAddr) {
        self.targets.lock().unwrap().retain(|a| *a != addr);
    }

    async fn send(&self, burst: u16) -> Result<()> {
        self.sends.fetch_add(1, Ordering::SeqCst);
        let pending = self.failing_sends.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_sends.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::ping("sendto: network is unreachable"));
        }

        let silent = self.silent.lock().unwrap().clone();
        for addr in self.targets().into_iter().rev() {
            if !silent.contains(&addr) {
                let _ = self.replies.try_send(PingSample::new(burst, addr, self.rtt));
            }
        }
        Ok(())
    }
}

/// Pinger and collector wired to the same reply queue
pub fn echo_collector() -> (Arc<EchoPinger>, Arc<PingCollector>) {
    let (tx, rx) = reply_channel();
    let pinger = Arc::new(EchoPinger::new(tx));
    let collector = Arc::new(PingCollector::new(pinger.clone(), rx, Logger::quiet()));
    (pinger, collector)
}

/// In-memory destination; `fail_writes` makes the next writes fail
#[derive(Clone, Default)]
pub struct MemoryWriter {
    pub rows: Arc<Mutex<Vec<Record>>>,
    pub fail_writes: Arc<AtomicUsize>,
    pending: Option<Record>,
}

#[async_trait]
impl RecordWriter for MemoryWriter {
    async fn write(&mut self, record: &Record) -> Result<()> {
        let pending = self.fail_writes.load(Ordering::SeqCst);
        if pending > 0 {
            self.fail_writes.store(pending - 1, Ordering::SeqCst);
            return Err(AppError::persistence("no space left on device"));
        }
        self.pending = Some(record.clone());
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        if let Some(record) = self.pending.take() {
            self.rows.lock().unwrap().push(record);
        }
        Ok(())
    }
}
