//! ICMP transport on top of surge-ping

use super::Pinger;
use crate::{
    error::{AppError, Result},
    logging::Logger,
    models::PingSample,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::net::IpAddr;
use std::time::Duration;
use surge_ping::{Client, Config, PingIdentifier, PingSequence, ICMP};
use tokio::sync::{mpsc, Mutex};

const PAYLOAD: [u8; 56] = [0; 56];

/// Sends echoes through unprivileged (datagram) ICMP sockets where the OS
/// allows it, raw sockets otherwise.
pub struct SurgePinger {
    client_v4: Client,
    client_v6: Option<Client>,
    targets: Mutex<HashSet<IpAddr>>,
    replies: mpsc::Sender<PingSample>,
    timeout: Duration,
    ident: u16,
    logger: Logger,
}

impl SurgePinger {
    /// Open the ICMP sockets. Fails when the process may not create them.
    pub fn new(replies: mpsc::Sender<PingSample>, timeout: Duration, logger: Logger) -> Result<Self> {
        let client_v4 = Client::new(&Config::default())
            .map_err(|e| AppError::ping(format!("cannot open ICMPv4 socket: {}", e)))?;
        // IPv6 is optional; many embedded nodes have no v6 stack
        let client_v6 = Client::new(&Config::builder().kind(ICMP::V6).build()).ok();

        Ok(Self {
            client_v4,
            client_v6,
            targets: Mutex::new(HashSet::new()),
            replies,
            timeout,
            ident: (std::process::id() & 0xffff) as u16,
            logger,
        })
    }

    fn client_for(&self, addr: &IpAddr) -> Option<Client> {
        match addr {
            IpAddr::V4(_) => Some(self.client_v4.clone()),
            IpAddr::V6(_) => self.client_v6.clone(),
        }
    }
}

#[async_trait]
impl Pinger for SurgePinger {
    async fn add_target(&self, addr: IpAddr) {
        self.targets.lock().await.insert(addr);
    }

    async fn remove_target(&self, addr: IpAddr) {
        self.targets.lock().await.remove(&addr);
    }

    async fn send(&self, burst: u16) -> Result<()> {
        let targets: Vec<IpAddr> = self.targets.lock().await.iter().copied().collect();
        let seq = PingSequence(burst);

        for addr in targets {
            let client = self
                .client_for(&addr)
                .ok_or_else(|| AppError::ping(format!("no ICMPv6 socket available for {}", addr)))?;
            let replies = self.replies.clone();
            let logger = self.logger.clone();
            let ident = PingIdentifier(self.ident);
            let timeout = self.timeout;

            tokio::spawn(async move {
                let mut pinger = client.pinger(addr, ident).await;
                pinger.timeout(timeout);
                match pinger.ping(seq, &PAYLOAD).await {
                    Ok((_packet, rtt)) => {
                        // a closed queue means the collector is gone; nothing left to do
                        let _ = replies.send(PingSample::new(burst, addr, rtt)).await;
                    }
                    Err(e) => {
                        logger
                            .debug("No echo reply")
                            .field("addr", addr)
                            .error_info(&AppError::from(e))
                            .log()
                            .await;
                    }
                }
            });
        }

        Ok(())
    }
}
