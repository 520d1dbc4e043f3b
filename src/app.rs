//! Application wiring: components, streams, loops and shutdown

use crate::{
    config::display_config_summary,
    dns::{HostResolver, TargetResolver},
    error::{AppError, Result},
    logging::Logger,
    models::{Config, PingSample},
    ping::{reply_channel, PingCollector, Pinger, SurgePinger},
    registry::ReferenceEndpointRegistry,
    saver::{CsvRecordWriter, RecordSender, Saver, StreamStats},
    scheduler::{MetricScheduler, MetricSummary},
    speedtest::{HttpSpeedTestProvider, ProviderSettings, SpeedTestProvider},
    types::MetricKind,
};
use std::future::Future;
use std::sync::Arc;
use tokio::sync::mpsc;

/// External collaborators of the application
pub struct Components {
    pub provider: Arc<dyn SpeedTestProvider>,
    pub resolver: Arc<dyn HostResolver>,
    /// ICMP transport and the receiving half of its reply queue
    pub ping: Option<(Arc<dyn Pinger>, mpsc::Receiver<PingSample>)>,
}

impl Components {
    /// Production components: HTTP speed test provider, system DNS, raw ICMP
    ///
    /// A raw socket needs privileges; when it cannot be opened the ping
    /// transport is left out and the ping metric is disabled at startup.
    pub async fn system(config: &Config, logger: &Logger) -> Result<Self> {
        let settings = ProviderSettings {
            servers_url: config.servers_url.clone(),
            timeout: config.http_timeout(),
            ..ProviderSettings::default()
        };
        let provider = HttpSpeedTestProvider::new(settings, logger.named("speedtest"))?;

        let ping = if config.ping.enabled {
            let (tx, rx) = reply_channel();
            match SurgePinger::new(tx, config.ping_timeout(), logger.named("pinger")) {
                Ok(pinger) => Some((Arc::new(pinger) as Arc<dyn Pinger>, rx)),
                Err(e) => {
                    logger
                        .error("Cannot open ICMP socket, ping scan disabled")
                        .error_info(&e)
                        .log()
                        .await;
                    None
                }
            }
        } else {
            None
        };

        Ok(Self {
            provider: Arc::new(provider),
            resolver: Arc::new(TargetResolver::from_system()),
            ping,
        })
    }
}

/// What the application produced before it stopped
#[derive(Debug, Clone, Default)]
pub struct RunReport {
    /// Session id attached to every log entry of the run
    pub session_id: String,
    pub metrics: Vec<MetricSummary>,
    pub streams: Vec<(String, StreamStats)>,
}

impl RunReport {
    pub fn metric(&self, kind: MetricKind) -> Option<&MetricSummary> {
        self.metrics.iter().find(|m| m.kind == kind)
    }
}

/// Main application struct that coordinates all components
pub struct App {
    config: Config,
    components: Components,
    logger: Logger,
}

impl App {
    /// Application with production components
    pub async fn new(config: Config) -> Result<Self> {
        let logger = Logger::with_settings(
            crate::PKG_NAME,
            config.log_level,
            config.log_format,
            config.enable_color,
        );
        let components = Components::system(&config, &logger).await?;
        Ok(Self::with_components(config, components, logger))
    }

    /// Application around caller-provided components
    pub fn with_components(config: Config, components: Components, logger: Logger) -> Self {
        Self {
            config,
            components,
            logger,
        }
    }

    /// Run until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<RunReport> {
        let logger = self.logger.clone();
        self.run_until(shutdown_signal(logger)).await
    }

    /// Start every enabled metric and run until `shutdown` resolves
    ///
    /// Startup failures of a single metric (unwritable output, no ICMP
    /// socket) disable that metric only. Failing to resolve a configured ping
    /// host or to select the first reference endpoint aborts the run.
    pub async fn run_until<F>(self, shutdown: F) -> Result<RunReport>
    where
        F: Future<Output = ()>,
    {
        let Self {
            mut config,
            components,
            logger,
        } = self;

        let session_id = logger.start_session().await;
        logger
            .info("Starting")
            .field("version", crate::VERSION)
            .field("session", &session_id)
            .log()
            .await;
        for line in display_config_summary(&config).lines() {
            logger.debug(line).log().await;
        }

        // output destinations first: a metric without one never starts
        let mut writers = Vec::new();
        for kind in config.enabled_metrics() {
            let path = config.metric(kind).output.clone();
            match CsvRecordWriter::open(&path).await {
                Ok(writer) => writers.push((kind, writer)),
                Err(e) => {
                    logger
                        .error("Output unavailable, metric disabled")
                        .field("metric", kind)
                        .field("path", path.display().to_string())
                        .error_info(&e)
                        .log()
                        .await;
                    config.metric_mut(kind).enabled = false;
                }
            }
        }

        let collector = match (config.ping.enabled, components.ping) {
            (true, Some((pinger, replies))) => Some(Arc::new(PingCollector::new(
                pinger,
                replies,
                logger.named("ping"),
            ))),
            (true, None) => {
                logger
                    .error("No ICMP transport available, ping scan disabled")
                    .log()
                    .await;
                config.ping.enabled = false;
                writers.retain(|(kind, _)| *kind != MetricKind::Ping);
                None
            }
            (false, _) => None,
        };

        if writers.is_empty() {
            return Err(AppError::config("No metric left enabled"));
        }

        if let Some(collector) = &collector {
            for host in &config.additional_ping_hosts {
                let addr = components.resolver.resolve(host).await?;
                collector.pin_address(addr).await;
                logger
                    .info("Additional ping host")
                    .field("host", host)
                    .field("addr", addr)
                    .log()
                    .await;
            }
        }

        let registry = Arc::new(
            ReferenceEndpointRegistry::initialize(
                components.provider.clone(),
                components.resolver.clone(),
                collector.clone(),
                logger.named("registry"),
            )
            .await?,
        );

        let mut saver = Saver::new(logger.clone());
        let mut scheduler = MetricScheduler::new(
            registry,
            components.provider.clone(),
            collector,
            logger.clone(),
        );

        for (kind, writer) in writers {
            let sink: RecordSender = saver.register_stream(kind.as_str(), Box::new(writer));
            scheduler.spawn_metric(kind, config.metric(kind).interval(), sink)?;
            logger
                .info("Scan scheduled")
                .field("metric", kind)
                .field("interval_secs", config.metric(kind).interval_seconds)
                .log()
                .await;
        }
        if let Some(period) = config.refresh_interval() {
            scheduler.spawn_refresh(period)?;
        }

        shutdown.await;
        logger.info("Shutting down").log().await;

        // loops drop their senders on exit, which lets the writers drain
        let metrics = scheduler.shutdown().await;
        let streams = saver.shutdown().await;

        for summary in &metrics {
            logger
                .info("Metric stopped")
                .field("metric", summary.kind)
                .field("cycles", summary.cycles)
                .field("records", summary.records)
                .field("skipped", summary.skipped)
                .log()
                .await;
        }

        Ok(RunReport {
            session_id,
            metrics,
            streams,
        })
    }
}

async fn shutdown_signal(logger: Logger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            logger
                .error("Cannot listen for Ctrl-C")
                .field("error", e.to_string())
                .log()
                .await;
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
