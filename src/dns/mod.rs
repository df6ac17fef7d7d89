//! DNS message model and wire codec.
//!
//! Messages are decoded into an owned structure, inspected and rebuilt,
//! then encoded back to wire format. Decoding and encoding are pure
//! transforms; framing (UDP datagram vs. TCP length prefix) belongs to
//! the transports.

mod decode;
mod encode;

use std::net::Ipv4Addr;

use thiserror::Error;

/// Length of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Classic UDP payload limit without EDNS0.
pub const DEFAULT_UDP_PAYLOAD: usize = 512;

/// Largest EDNS0-advertised UDP payload we honor.
pub const MAX_UDP_PAYLOAD: usize = 4096;

/// Hard upper bound of a DNS message (16-bit TCP length prefix).
pub const MAX_MESSAGE_SIZE: usize = 65535;

/// Record type constants for the types this server inspects. Unknown
/// types flow through untouched, so this is not an exhaustive enum.
pub mod rtype {
    pub const A: u16 = 1;
    pub const NS: u16 = 2;
    pub const CNAME: u16 = 5;
    pub const SOA: u16 = 6;
    pub const PTR: u16 = 12;
    pub const MX: u16 = 15;
    pub const AAAA: u16 = 28;
    pub const OPT: u16 = 41;
}

/// Class constants.
pub mod class {
    pub const IN: u16 = 1;
}

/// Response code constants.
pub mod rcode {
    pub const NOERROR: u8 = 0;
    pub const FORMERR: u8 = 1;
    pub const SERVFAIL: u8 = 2;
    pub const NXDOMAIN: u8 = 3;
    pub const NOTIMP: u8 = 4;
}

/// Error produced when inbound bytes cannot be parsed as a DNS message.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("message shorter than the 12-octet header")]
    ShortHeader,
    #[error("message ended before the header's record counts were satisfied")]
    UnexpectedEof,
    #[error("malformed domain name")]
    MalformedName,
}

/// Structured view of the 16 header flag bits. Reserved Z bits are not
/// preserved across a decode/encode round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Flags {
    pub response: bool,
    pub opcode: u8,
    pub authoritative: bool,
    pub truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub rcode: u8,
}

impl Flags {
    pub fn from_bits(bits: u16) -> Self {
        Self {
            response: bits & 0x8000 != 0,
            opcode: ((bits >> 11) & 0x0F) as u8,
            authoritative: bits & 0x0400 != 0,
            truncated: bits & 0x0200 != 0,
            recursion_desired: bits & 0x0100 != 0,
            recursion_available: bits & 0x0080 != 0,
            rcode: (bits & 0x000F) as u8,
        }
    }

    pub fn to_bits(self) -> u16 {
        let mut bits = 0u16;
        if self.response {
            bits |= 0x8000;
        }
        bits |= u16::from(self.opcode & 0x0F) << 11;
        if self.authoritative {
            bits |= 0x0400;
        }
        if self.truncated {
            bits |= 0x0200;
        }
        if self.recursion_desired {
            bits |= 0x0100;
        }
        if self.recursion_available {
            bits |= 0x0080;
        }
        bits | u16::from(self.rcode & 0x0F)
    }
}

/// A question section entry.
///
/// Names keep the spelling the client sent so the echoed question
/// section byte-matches the request; lower-casing for blocklist lookup
/// happens at match time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    pub name: String,
    pub qtype: u16,
    pub qclass: u16,
}

/// A resource record.
///
/// `rdata` is always canonical wire form: name-bearing types (CNAME,
/// NS, PTR, MX, SOA) are decompressed at decode time so a record copied
/// out of a compressed message re-encodes correctly at a new offset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub name: String,
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub rdata: Vec<u8>,
}

impl Record {
    /// Synthesize an A record pointing at `addr`.
    pub fn a(name: &str, addr: Ipv4Addr, ttl: u32) -> Self {
        Self {
            name: name.to_string(),
            rtype: rtype::A,
            class: class::IN,
            ttl,
            rdata: addr.octets().to_vec(),
        }
    }
}

/// A complete DNS message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Message {
    pub id: u16,
    pub flags: Flags,
    pub questions: Vec<Question>,
    pub answers: Vec<Record>,
    pub authority: Vec<Record>,
    pub additional: Vec<Record>,
}

impl Message {
    /// Build a recursion-desired query for a single question.
    pub fn query(id: u16, question: Question) -> Self {
        Self {
            id,
            flags: Flags {
                recursion_desired: true,
                ..Flags::default()
            },
            questions: vec![question],
            ..Self::default()
        }
    }

    /// Build an empty response skeleton echoing `query`'s id, opcode,
    /// RD bit and question section.
    pub fn response_to(query: &Message) -> Self {
        Self {
            id: query.id,
            flags: Flags {
                response: true,
                opcode: query.flags.opcode,
                recursion_desired: query.flags.recursion_desired,
                recursion_available: true,
                ..Flags::default()
            },
            questions: query.questions.clone(),
            ..Self::default()
        }
    }

    /// Build an error response with no question section, for requests
    /// whose question could not be parsed.
    pub fn error_response(id: u16, rcode: u8) -> Self {
        Self {
            id,
            flags: Flags {
                response: true,
                rcode,
                ..Flags::default()
            },
            ..Self::default()
        }
    }

    /// UDP payload size the client advertised via an EDNS0 OPT record,
    /// clamped to [512, 4096]; 512 when no OPT record is present.
    pub fn requested_udp_payload(&self) -> usize {
        self.additional
            .iter()
            .find(|r| r.rtype == rtype::OPT)
            .map(|r| (r.class as usize).clamp(DEFAULT_UDP_PAYLOAD, MAX_UDP_PAYLOAD))
            .unwrap_or(DEFAULT_UDP_PAYLOAD)
    }
}
