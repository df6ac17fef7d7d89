use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use sinkhole::filter::Blocklist;
use sinkhole::forward::UpstreamTarget;
use sinkhole::proxy::{self, ConfigError, ProxyConfig};

#[derive(Parser)]
#[command(name = "sinkhole")]
#[command(about = "Blocklist-driven DNS filtering resolver", long_about = None)]
struct Args {
    /// Bind address for both listeners
    #[arg(short, long, default_value = "0.0.0.0", env = "DNS_BIND_ADDRESS")]
    bind: String,

    /// Listen port for UDP and TCP
    #[arg(short, long, default_value = "53", env = "DNS_SERVER_PORT")]
    port: u16,

    /// Override the UDP listen port
    #[arg(long, env = "DNS_UDP_PORT")]
    udp_port: Option<u16>,

    /// Override the TCP listen port
    #[arg(long, env = "DNS_TCP_PORT")]
    tcp_port: Option<u16>,

    /// Upstream DNS server (host:port)
    #[arg(short, long, default_value = "8.8.8.8:53", env = "DNS_UPSTREAM")]
    upstream: String,

    /// Newline-delimited blocklist file
    #[arg(
        long,
        default_value = "data/blocked-domains.txt",
        env = "DNS_BLOCKLIST"
    )]
    blocklist: PathBuf,

    /// Address answered for blocked A queries
    #[arg(long, default_value = "0.0.0.0", env = "DNS_SINKHOLE_ADDRESS")]
    sinkhole_address: Ipv4Addr,

    /// TTL in seconds for synthesized block answers
    #[arg(long, default_value = "300", env = "DNS_BLOCK_TTL")]
    block_ttl: u32,

    /// Per-attempt upstream timeout in milliseconds
    #[arg(long, default_value = "2000")]
    timeout_ms: u64,

    /// Upstream retries after the first attempt
    #[arg(long, default_value = "2")]
    retries: u32,

    /// Skip the start-up upstream reachability check
    #[arg(long)]
    no_probe: bool,
}

/// Load the blocklist file. An unreadable file is not fatal: the server
/// starts with an empty blocklist and forwards everything.
fn load_blocklist(path: &Path) -> Blocklist {
    match std::fs::read_to_string(path) {
        Ok(text) => Blocklist::from_lines(text.lines()),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "could not read blocklist, blocking nothing");
            Blocklist::empty()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();

    let bind_ip: IpAddr = args.bind.parse().map_err(|source| ConfigError::InvalidAddr {
        addr: args.bind.clone(),
        source,
    })?;
    let upstream_addr: SocketAddr =
        args.upstream
            .parse()
            .map_err(|source| ConfigError::InvalidAddr {
                addr: args.upstream.clone(),
                source,
            })?;

    let config = ProxyConfig {
        udp_bind: SocketAddr::new(bind_ip, args.udp_port.unwrap_or(args.port)),
        tcp_bind: SocketAddr::new(bind_ip, args.tcp_port.unwrap_or(args.port)),
        upstream: UpstreamTarget {
            addr: upstream_addr,
            timeout: Duration::from_millis(args.timeout_ms),
            retries: args.retries,
        },
        sentinel: args.sinkhole_address,
        block_ttl: args.block_ttl,
        skip_probe: args.no_probe,
    };

    let blocklist = load_blocklist(&args.blocklist);

    proxy::run(config, blocklist).await
}
