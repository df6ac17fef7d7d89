//! Server orchestration.
//!
//! Wires the blocklist, forwarder and transports together and runs the
//! server until the process is stopped.

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use crate::filter::Blocklist;
use crate::forward::{ForwardError, Forwarder, UpstreamTarget};
use crate::resolver::Resolver;
use crate::transport::{tcp::TcpTransport, udp::UdpTransport};

/// Configuration for the DNS server.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// UDP listen address.
    pub udp_bind: SocketAddr,
    /// TCP listen address.
    pub tcp_bind: SocketAddr,
    /// Upstream resolver.
    pub upstream: UpstreamTarget,
    /// Address answered for blocked A queries.
    pub sentinel: Ipv4Addr,
    /// TTL in seconds for synthesized block answers.
    pub block_ttl: u32,
    /// Skip the start-up upstream reachability probe.
    pub skip_probe: bool,
}

/// Fatal start-up configuration problems, reported before any listener
/// socket is opened.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid address {addr}: {source}")]
    InvalidAddr {
        addr: String,
        #[source]
        source: std::net::AddrParseError,
    },
    #[error("upstream {addr} is unreachable: {source}")]
    UpstreamUnreachable {
        addr: SocketAddr,
        #[source]
        source: ForwardError,
    },
}

/// Run the DNS server with the given configuration.
///
/// Probes the upstream, binds the UDP and TCP transports and serves
/// indefinitely.
pub async fn run(config: ProxyConfig, blocklist: Blocklist) -> anyhow::Result<()> {
    let forwarder = Forwarder::new(config.upstream);

    if !config.skip_probe {
        forwarder
            .probe()
            .await
            .map_err(|source| ConfigError::UpstreamUnreachable {
                addr: config.upstream.addr,
                source,
            })?;
    }

    let resolver = Arc::new(Resolver::new(
        blocklist,
        forwarder,
        config.sentinel,
        config.block_ttl,
    ));

    let udp = UdpTransport::bind(config.udp_bind).await?;
    let tcp = TcpTransport::bind(config.tcp_bind).await?;

    info!(
        udp = %config.udp_bind,
        tcp = %config.tcp_bind,
        blocked_domains = resolver.blocked_count(),
        "dns filtering resolver listening"
    );
    info!(upstream = %config.upstream.addr, "forwarding unblocked queries");

    udp.start(resolver.clone());
    tcp.start(resolver.clone());

    // Stats line every minute.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.tick().await; // skip the immediate first tick
        loop {
            interval.tick().await;
            let stats = resolver.stats_snapshot_and_reset();
            info!(
                requests = stats.requests,
                forwarded = stats.forwarded,
                blocked = stats.blocked,
                failed = stats.failed,
                avg_response_ms = stats.avg_response_ms,
                "stats"
            );
        }
    });

    // Serve until killed.
    std::future::pending::<()>().await;

    Ok(())
}
