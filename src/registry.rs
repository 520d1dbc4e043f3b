//! Currently selected reference endpoint
//!
//! `select` holds the write lock for the whole discovery, network calls
//! included, so no reader ever sees a half-updated endpoint. Readers that
//! arrive while a refresh is queued wait for it to publish.

use crate::{
    dns::HostResolver,
    error::{AppError, Result},
    logging::Logger,
    models::ReferenceEndpoint,
    ping::PingCollector,
    speedtest::SpeedTestProvider,
};
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, RwLock, RwLockReadGuard};
use tokio::time::MissedTickBehavior;

/// The published endpoint and the ping address derived from it
#[derive(Debug)]
pub struct Published {
    endpoint: Arc<ReferenceEndpoint>,
    ping_addr: Option<IpAddr>,
    generation: u64,
}

impl Published {
    pub fn endpoint(&self) -> &Arc<ReferenceEndpoint> {
        &self.endpoint
    }

    /// Address registered with the ping collector for this endpoint
    pub fn ping_addr(&self) -> Option<IpAddr> {
        self.ping_addr
    }

    /// Number of successful selections so far, starting at 1
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Holds the reference endpoint and keeps the ping target set in step with it
pub struct ReferenceEndpointRegistry {
    provider: Arc<dyn SpeedTestProvider>,
    resolver: Arc<dyn HostResolver>,
    ping: Option<Arc<PingCollector>>,
    state: RwLock<Published>,
    logger: Logger,
}

impl ReferenceEndpointRegistry {
    /// Run the initial selection and build the registry around its result
    ///
    /// Any failure here is fatal to the caller: without a reference endpoint
    /// no throughput metric can be produced.
    pub async fn initialize(
        provider: Arc<dyn SpeedTestProvider>,
        resolver: Arc<dyn HostResolver>,
        ping: Option<Arc<PingCollector>>,
        logger: Logger,
    ) -> Result<Self> {
        let (endpoint, addr) = discover(provider.as_ref(), resolver.as_ref(), ping.is_some()).await?;
        if let (Some(collector), Some(addr)) = (&ping, addr) {
            collector.register_address(addr).await;
        }
        log_selection(&logger, &endpoint, 1).await;

        Ok(Self {
            provider,
            resolver,
            ping,
            state: RwLock::new(Published {
                endpoint: Arc::new(endpoint),
                ping_addr: addr,
                generation: 1,
            }),
            logger,
        })
    }

    /// Re-run discovery and publish the result
    ///
    /// On failure nothing changes: the previous endpoint and its ping target
    /// stay in place.
    pub async fn select(&self) -> Result<Arc<ReferenceEndpoint>> {
        let mut state = self.state.write().await;

        let (endpoint, addr) = discover(self.provider.as_ref(), self.resolver.as_ref(), self.ping.is_some()).await?;

        if let Some(collector) = &self.ping {
            if state.ping_addr != addr {
                if let Some(old) = state.ping_addr {
                    collector.deregister_address(old).await;
                }
                if let Some(new) = addr {
                    collector.register_address(new).await;
                }
            }
        }

        let endpoint = Arc::new(endpoint);
        state.endpoint = endpoint.clone();
        state.ping_addr = addr;
        state.generation += 1;
        log_selection(&self.logger, &endpoint, state.generation).await;

        Ok(endpoint)
    }

    /// Refresh, keeping the last-known-good endpoint when discovery fails
    pub async fn refresh(&self) -> bool {
        match self.select().await {
            Ok(_) => true,
            Err(e) => {
                let current = self.current().await;
                self.logger
                    .warn("Endpoint refresh failed, keeping previous endpoint")
                    .field("endpoint", &current.url)
                    .error_info(&e)
                    .log()
                    .await;
                false
            }
        }
    }

    /// Most recently published endpoint
    pub async fn current(&self) -> Arc<ReferenceEndpoint> {
        self.state.read().await.endpoint.clone()
    }

    /// Shared lock on the published state; a refresh waits until it is dropped
    pub async fn read(&self) -> RwLockReadGuard<'_, Published> {
        self.state.read().await
    }

    /// Refresh every `period` until `shutdown` flips to true
    pub async fn run_refresh_loop(self: Arc<Self>, period: Duration, mut shutdown: watch::Receiver<bool>) {
        let Some(start) = tokio::time::Instant::now().checked_add(period) else {
            self.logger
                .error("Refresh interval out of range, periodic refresh disabled")
                .field("interval_secs", period.as_secs())
                .log()
                .await;
            return;
        };
        let mut ticker = tokio::time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    // the flag itself is checked at the top of the loop
                    if changed.is_err() {
                        break;
                    }
                }
                _ = ticker.tick() => {
                    self.logger.debug("Refreshing reference endpoint").log().await;
                    self.refresh().await;
                }
            }
        }

        self.logger.debug("Refresh loop stopped").log().await;
    }
}

async fn discover(
    provider: &dyn SpeedTestProvider,
    resolver: &dyn HostResolver,
    resolve_host: bool,
) -> Result<(ReferenceEndpoint, Option<IpAddr>)> {
    let endpoint = provider.select_best_endpoint().await?;

    let addr = if resolve_host {
        let host = endpoint
            .host()
            .ok_or_else(|| AppError::discovery(format!("endpoint URL has no host: {}", endpoint.url)))?;
        Some(resolver.resolve(&host).await?)
    } else {
        None
    };

    Ok((endpoint, addr))
}

async fn log_selection(logger: &Logger, endpoint: &ReferenceEndpoint, generation: u64) {
    logger
        .info("Testing server selected")
        .field("id", &endpoint.id)
        .field("name", &endpoint.name)
        .field("sponsor", &endpoint.sponsor)
        .field("url", &endpoint.url)
        .field("latency_ms", endpoint.latency_ms())
        .field("generation", generation)
        .log()
        .await;
}
