//! ICMP echo collection
//!
//! A [`Pinger`] owns the transport: it keeps the live target set and, on
//! [`Pinger::send`], fires one echo per target. Replies arrive asynchronously
//! on the bounded channel handed to the pinger at construction. The
//! [`PingCollector`] is the single consumer of that channel and turns one burst
//! into exactly one [`PingSample`] per registered address, in arrival order.
//! Every burst carries a sequence number so a late reply to an earlier burst
//! is never counted twice.

pub mod surge;

pub use surge::SurgePinger;

use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::PingSample,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

/// Capacity of the shared reply queue between pinger and collector
pub const REPLY_BUFFER: usize = 64;

/// ICMP echo transport
#[async_trait]
pub trait Pinger: Send + Sync {
    /// Add an address to the live target set; adding twice is a no-op
    async fn add_target(&self, addr: IpAddr);

    /// Remove an address; removing an unknown address is a no-op
    async fn remove_target(&self, addr: IpAddr);

    /// Send one echo to every target. Replies are delivered on the reply
    /// channel, tagged with `burst`.
    async fn send(&self, burst: u16) -> Result<()>;
}

/// Sending and receiving halves of the shared reply queue
pub fn reply_channel() -> (mpsc::Sender<PingSample>, mpsc::Receiver<PingSample>) {
    mpsc::channel(REPLY_BUFFER)
}

#[derive(Debug, Default)]
struct TargetSet {
    /// Configured hosts, registered for the process lifetime
    pinned: HashSet<IpAddr>,
    /// Addresses that follow the reference endpoint
    dynamic: HashSet<IpAddr>,
}

impl TargetSet {
    fn contains(&self, addr: &IpAddr) -> bool {
        self.pinned.contains(addr) || self.dynamic.contains(addr)
    }

    fn len(&self) -> usize {
        self.pinned.union(&self.dynamic).count()
    }
}

/// Receiving half of the reply queue and the sequence of the last burst
struct ReplyQueue {
    rx: mpsc::Receiver<PingSample>,
    burst: u16,
}

/// Collects one RTT sample per registered address per cycle
pub struct PingCollector {
    pinger: Arc<dyn Pinger>,
    targets: Mutex<TargetSet>,
    // Held for the whole cycle: two cycles never share the reply queue
    replies: Mutex<ReplyQueue>,
    logger: Logger,
}

impl PingCollector {
    pub fn new(pinger: Arc<dyn Pinger>, replies: mpsc::Receiver<PingSample>, logger: Logger) -> Self {
        Self {
            pinger,
            targets: Mutex::new(TargetSet::default()),
            replies: Mutex::new(ReplyQueue { rx: replies, burst: 0 }),
            logger,
        }
    }

    /// Register a configured host that stays registered for the process lifetime
    pub async fn pin_address(&self, addr: IpAddr) {
        let mut targets = self.targets.lock().await;
        if !targets.contains(&addr) {
            self.pinger.add_target(addr).await;
        }
        targets.pinned.insert(addr);
    }

    /// Register an address; idempotent
    pub async fn register_address(&self, addr: IpAddr) {
        let mut targets = self.targets.lock().await;
        if !targets.contains(&addr) {
            self.pinger.add_target(addr).await;
            self.logger.debug("Registered ping target").field("addr", addr).log().await;
        }
        targets.dynamic.insert(addr);
    }

    /// Deregister an address; idempotent, pinned hosts stay registered
    pub async fn deregister_address(&self, addr: IpAddr) {
        let mut targets = self.targets.lock().await;
        if targets.dynamic.remove(&addr) && !targets.pinned.contains(&addr) {
            self.pinger.remove_target(addr).await;
            self.logger.debug("Deregistered ping target").field("addr", addr).log().await;
        }
    }

    /// Number of distinct registered addresses
    pub async fn target_count(&self) -> usize {
        self.targets.lock().await.len()
    }

    /// Registered addresses, sorted
    pub async fn targets(&self) -> Vec<IpAddr> {
        let targets = self.targets.lock().await;
        let mut all: Vec<IpAddr> = targets.pinned.union(&targets.dynamic).copied().collect();
        all.sort();
        all
    }

    /// Fire one burst and collect one sample per registered address, in
    /// arrival order
    ///
    /// Only the first reply of this burst from each registered address counts.
    /// Replies to earlier bursts, duplicates and replies from unregistered
    /// addresses are discarded. Fails with a timeout error if an address has
    /// not answered before `deadline` elapses; no partial result is returned.
    pub async fn run_cycle(&self, deadline: Duration) -> Result<Vec<PingSample>> {
        let mut queue = self.replies.lock().await;

        let mut stale = 0usize;
        while queue.rx.try_recv().is_ok() {
            stale += 1;
        }
        if stale > 0 {
            self.logger
                .debug("Discarded replies from a previous cycle")
                .field("count", stale)
                .log()
                .await;
        }

        let mut outstanding: HashSet<IpAddr> = self.targets().await.into_iter().collect();
        let expected = outstanding.len();
        if expected == 0 {
            return Ok(Vec::new());
        }

        queue.burst = queue.burst.wrapping_add(1);
        let burst = queue.burst;
        self.pinger.send(burst).await?;

        let until = Instant::now() + deadline;
        let mut samples = Vec::with_capacity(expected);
        while !outstanding.is_empty() {
            match tokio::time::timeout_at(until, queue.rx.recv()).await {
                Ok(Some(sample)) if sample.burst == burst && outstanding.remove(&sample.addr) => {
                    self.logger
                        .debug("Echo reply")
                        .field("addr", sample.addr)
                        .field("rtt_ms", sample.rtt_ms())
                        .log()
                        .await;
                    samples.push(sample);
                }
                Ok(Some(sample)) => {
                    self.logger
                        .debug("Discarded reply outside the current burst")
                        .field("addr", sample.addr)
                        .field("burst", sample.burst)
                        .log()
                        .await;
                }
                Ok(None) => return Err(AppError::ping("reply channel closed")),
                Err(_) => {
                    return Err(AppError::timeout(format!(
                        "collected {}/{} echo replies within {:?}",
                        samples.len(),
                        expected,
                        deadline
                    )))
                }
            }
        }

        Ok(samples)
    }
}
