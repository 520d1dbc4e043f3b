//! Per-metric scheduling loops
//!
//! Every enabled metric runs its own loop on its own timer:
//! `Idle -> Probing -> Publishing -> Idle` until the shutdown signal, then
//! `Stopped`. A probe that outlives its period is abandoned and the cycle is
//! skipped. Publishing waits on the stream's channel rather than dropping.

use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::Record,
    ping::PingCollector,
    registry::ReferenceEndpointRegistry,
    saver::RecordSender,
    speedtest::SpeedTestProvider,
    types::{MetricKind, ProbeState},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Counters returned by a metric loop when it stops
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetricSummary {
    pub kind: MetricKind,
    /// Ticks that started a probe
    pub cycles: u64,
    /// Records handed to the persistence stream
    pub records: u64,
    /// Cycles that failed or timed out
    pub skipped: u64,
}

impl MetricSummary {
    fn new(kind: MetricKind) -> Self {
        Self {
            kind,
            cycles: 0,
            records: 0,
            skipped: 0,
        }
    }
}

/// Cloneable trigger for stopping every loop of a scheduler
#[derive(Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_triggered(&self) -> bool {
        *self.tx.borrow()
    }
}

enum Probe {
    Ping(Arc<PingCollector>),
    Download,
    Upload,
}

struct LoopContext {
    kind: MetricKind,
    /// First tick, one period after the loop was spawned
    start: Instant,
    period: Duration,
    probe: Probe,
    registry: Arc<ReferenceEndpointRegistry>,
    provider: Arc<dyn SpeedTestProvider>,
    sink: RecordSender,
    logger: Logger,
}

impl LoopContext {
    async fn run_probe(&self, tick: DateTime<Utc>) -> Result<Vec<Record>> {
        match &self.probe {
            Probe::Ping(collector) => {
                // the whole cycle under one read lock: a refresh cannot swap
                // addresses between the target snapshot and the burst
                let published = self.registry.read().await;
                let samples = collector.run_cycle(self.period).await?;
                drop(published);

                let mut records = Vec::with_capacity(samples.len());
                for sample in &samples {
                    self.logger
                        .info("Ping scan result")
                        .field("addr", sample.addr)
                        .field("rtt_ms", sample.rtt_ms())
                        .log()
                        .await;
                    records.push(Record::from_ping(tick, sample));
                }
                Ok(records)
            }
            Probe::Download | Probe::Upload => {
                let published = self.registry.read().await;
                let endpoint = published.endpoint().clone();
                let value = match self.probe {
                    Probe::Download => self.provider.measure_download(&endpoint).await?,
                    _ => self.provider.measure_upload(&endpoint).await?,
                };
                drop(published);

                self.logger
                    .info(&format!("{} scan result", capitalize(self.kind.as_str())))
                    .field("mbps", value)
                    .field("endpoint", &endpoint.url)
                    .log()
                    .await;
                Ok(vec![Record::from_throughput(tick, value, &endpoint)])
            }
        }
    }

    async fn transition(&self, state: &mut ProbeState, next: ProbeState) {
        debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", state, next);
        self.logger
            .trace("State change")
            .field("from", *state)
            .field("to", next)
            .log()
            .await;
        *state = next;
    }

    async fn run(self, mut shutdown: watch::Receiver<bool>) -> MetricSummary {
        let mut summary = MetricSummary::new(self.kind);
        let mut state = ProbeState::Idle;

        let mut ticker = tokio::time::interval_at(self.start, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        self.logger
            .debug("Scheduling loop started")
            .field("interval_secs", self.period.as_secs_f64())
            .log()
            .await;

        'ticks: loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
                _ = ticker.tick() => {}
            }

            let tick = Utc::now();
            summary.cycles += 1;
            self.logger.debug("New tick").field("tick", tick).log().await;
            self.transition(&mut state, ProbeState::Probing).await;

            let records = match tokio::time::timeout(self.period, self.run_probe(tick)).await {
                Ok(Ok(records)) => records,
                Ok(Err(e)) => {
                    summary.skipped += 1;
                    self.logger.warn("Cycle skipped").error_info(&e).log().await;
                    self.transition(&mut state, ProbeState::Idle).await;
                    continue;
                }
                Err(elapsed) => {
                    summary.skipped += 1;
                    let e = AppError::from(elapsed);
                    self.logger
                        .warn("Cycle exceeded its period, skipped")
                        .field("interval_secs", self.period.as_secs_f64())
                        .error_info(&e)
                        .log()
                        .await;
                    self.transition(&mut state, ProbeState::Idle).await;
                    continue;
                }
            };

            self.transition(&mut state, ProbeState::Publishing).await;
            for record in records {
                if self.sink.send(record).await.is_err() {
                    self.logger
                        .error("Persistence stream closed, stopping metric")
                        .log()
                        .await;
                    break 'ticks;
                }
                summary.records += 1;
            }
            self.transition(&mut state, ProbeState::Idle).await;
        }

        self.transition(&mut state, ProbeState::Stopped).await;
        self.logger
            .debug("Scheduling loop stopped")
            .field("summary", summary)
            .log()
            .await;
        summary
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Owns the metric loops and the endpoint refresh loop
pub struct MetricScheduler {
    registry: Arc<ReferenceEndpointRegistry>,
    provider: Arc<dyn SpeedTestProvider>,
    collector: Option<Arc<PingCollector>>,
    shutdown: ShutdownHandle,
    loops: Vec<(MetricKind, JoinHandle<MetricSummary>)>,
    refresh: Option<JoinHandle<()>>,
    logger: Logger,
}

impl MetricScheduler {
    pub fn new(
        registry: Arc<ReferenceEndpointRegistry>,
        provider: Arc<dyn SpeedTestProvider>,
        collector: Option<Arc<PingCollector>>,
        logger: Logger,
    ) -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            registry,
            provider,
            collector,
            shutdown: ShutdownHandle { tx: Arc::new(tx) },
            loops: Vec::new(),
            refresh: None,
            logger,
        }
    }

    /// Handle that stops every loop when triggered
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Metrics with a running loop, in start order
    pub fn running(&self) -> Vec<MetricKind> {
        self.loops.iter().map(|(kind, _)| *kind).collect()
    }

    /// Start the loop of one metric, writing into `sink`
    pub fn spawn_metric(&mut self, kind: MetricKind, period: Duration, sink: RecordSender) -> Result<()> {
        if period.is_zero() {
            return Err(AppError::config(format!("{} interval must be greater than 0", kind)));
        }
        let start = first_tick(period)?;
        if self.loops.iter().any(|(k, _)| *k == kind) {
            return Err(AppError::internal(format!("{} loop already running", kind)));
        }

        let probe = match kind {
            MetricKind::Ping => {
                let collector = self
                    .collector
                    .clone()
                    .ok_or_else(|| AppError::ping("ping metric enabled without an ICMP collector"))?;
                Probe::Ping(collector)
            }
            MetricKind::Download => Probe::Download,
            MetricKind::Upload => Probe::Upload,
        };

        let ctx = LoopContext {
            kind,
            start,
            period,
            probe,
            registry: self.registry.clone(),
            provider: self.provider.clone(),
            sink,
            logger: self.logger.named(format!("scheduler:{}", kind)),
        };
        let handle = tokio::spawn(ctx.run(self.shutdown.tx.subscribe()));
        self.loops.push((kind, handle));
        Ok(())
    }

    /// Refresh the reference endpoint every `period`
    pub fn spawn_refresh(&mut self, period: Duration) -> Result<()> {
        if period.is_zero() {
            return Err(AppError::config("refresh interval must be greater than 0"));
        }
        first_tick(period)?;
        let registry = self.registry.clone();
        let rx = self.shutdown.tx.subscribe();
        self.refresh = Some(tokio::spawn(registry.run_refresh_loop(period, rx)));
        Ok(())
    }

    /// Signal every loop to stop and wait until all of them have exited
    ///
    /// A loop in the middle of a cycle finishes publishing first. Each loop
    /// drops its stream sender on exit, which lets the writer tasks drain.
    pub async fn shutdown(self) -> Vec<MetricSummary> {
        self.shutdown.trigger();

        let (kinds, handles): (Vec<MetricKind>, Vec<_>) = self.loops.into_iter().unzip();
        let results = futures::future::join_all(handles).await;

        let mut summaries = Vec::with_capacity(results.len());
        for (kind, result) in kinds.into_iter().zip(results) {
            match result {
                Ok(summary) => summaries.push(summary),
                Err(e) => {
                    self.logger
                        .error("Scheduling loop aborted")
                        .field("metric", kind)
                        .field("error", e.to_string())
                        .log()
                        .await;
                }
            }
        }

        if let Some(refresh) = self.refresh {
            if let Err(e) = refresh.await {
                self.logger
                    .error("Refresh loop aborted")
                    .field("error", e.to_string())
                    .log()
                    .await;
            }
        }

        summaries
    }
}

/// Instant of the first tick of a loop with the given period
fn first_tick(period: Duration) -> Result<Instant> {
    Instant::now()
        .checked_add(period)
        .ok_or_else(|| AppError::config(format!("interval of {} seconds is out of range", period.as_secs())))
}
