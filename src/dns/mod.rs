//! Resolution of ping target hosts to IP addresses

use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::net::IpAddr;
use trust_dns_resolver::{
    config::{ResolverConfig, ResolverOpts},
    system_conf, TokioAsyncResolver,
};

/// Turns a host name or IP literal into the address that gets pinged
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve(&self, host: &str) -> Result<IpAddr>;
}

/// Resolver backed by the system DNS configuration
#[derive(Clone)]
pub struct TargetResolver {
    resolver: TokioAsyncResolver,
}

impl TargetResolver {
    /// Build from the system configuration, falling back to public defaults
    pub fn from_system() -> Self {
        let resolver = match system_conf::read_system_conf() {
            Ok((config, opts)) => TokioAsyncResolver::tokio(config, opts),
            Err(_) => TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
        };
        Self { resolver }
    }
}

#[async_trait]
impl HostResolver for TargetResolver {
    async fn resolve(&self, host: &str) -> Result<IpAddr> {
        if let Some(ip) = parse_ip_literal(host) {
            return Ok(ip);
        }

        let response = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| AppError::dns_resolution(format!("unable to resolve {}: {}", host, e)))?;

        let ips: Vec<IpAddr> = response.iter().collect();
        pick_address(&ips).ok_or_else(|| AppError::dns_resolution(format!("no addresses for {}", host)))
    }
}

/// Accept bare and bracketed IP literals
pub fn parse_ip_literal(host: &str) -> Option<IpAddr> {
    host.trim()
        .trim_start_matches('[')
        .trim_end_matches(']')
        .parse()
        .ok()
}

/// Prefer the first IPv4 address, otherwise the first address
pub fn pick_address(ips: &[IpAddr]) -> Option<IpAddr> {
    ips.iter().find(|ip| ip.is_ipv4()).or_else(|| ips.first()).copied()
}
