//! UDP transport for DNS queries.
//!
//! One socket receives all datagrams; each query is decoded, resolved
//! and answered in its own task so a slow upstream never blocks other
//! in-flight queries. Responses are bounded to the payload size the
//! client advertised and truncated with TC when they do not fit.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tracing::{Instrument, debug, debug_span};

use crate::dns::{DecodeError, Message, rcode};
use crate::resolver::Resolver;

use super::{MAX_DNS_PACKET_SIZE, Protocol};

/// UDP listener for the DNS server.
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
}

impl UdpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        Ok(Self { socket })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Start the receive loop.
    pub fn start(self, resolver: Arc<Resolver>) {
        tokio::spawn(run(self.socket, resolver));
    }
}

/// Receive loop: hands every datagram to its own handler task.
async fn run(socket: Arc<UdpSocket>, resolver: Arc<Resolver>) {
    let mut buf = [0u8; MAX_DNS_PACKET_SIZE];

    loop {
        let (len, src) = match socket.recv_from(&mut buf).await {
            Ok(r) => r,
            Err(e) => {
                debug!(error = %e, "udp recv error");
                continue;
            }
        };

        let packet = buf[..len].to_vec();
        let span = debug_span!("query", proto = Protocol::Udp.as_str(), client = %src);
        tokio::spawn(
            handle_datagram(socket.clone(), resolver.clone(), packet, src).instrument(span),
        );
    }
}

/// Decode, resolve and answer a single datagram.
async fn handle_datagram(
    socket: Arc<UdpSocket>,
    resolver: Arc<Resolver>,
    packet: Vec<u8>,
    src: SocketAddr,
) {
    let response = match Message::decode(&packet) {
        Ok(query) => {
            if query.flags.response {
                // A response aimed at our listening port is not ours to
                // answer.
                return;
            }
            let limit = query.requested_udp_payload();
            resolver.resolve(&query).await.encode_bounded(limit)
        }
        // Not even a header; nothing to echo back.
        Err(DecodeError::ShortHeader) => return,
        Err(e) => {
            debug!(error = %e, "answering unparseable query with FORMERR");
            let id = u16::from_be_bytes([packet[0], packet[1]]);
            Message::error_response(id, rcode::FORMERR).encode()
        }
    };

    if let Err(e) = socket.send_to(&response, src).await {
        // Client may be gone; it will retry.
        debug!(error = %e, client = %src, "udp send failed");
    }
}
