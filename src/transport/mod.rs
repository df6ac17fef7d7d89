//! Transport layer for the DNS server.
//!
//! UDP and TCP listeners that decode inbound queries, hand them to the
//! resolver, and write back encoded responses. Each query is handled in
//! its own task so no client can block another.

pub mod tcp;
pub mod udp;

/// Maximum size of a DNS packet we buffer (headroom over the largest
/// EDNS payload we honor).
pub const MAX_DNS_PACKET_SIZE: usize = 4096;

/// Transport protocol label for logging.
#[derive(Debug, Clone, Copy)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl Protocol {
    pub fn as_str(self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
        }
    }
}
