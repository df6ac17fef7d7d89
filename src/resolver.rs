//! DNS query resolution logic.
//!
//! The dispatcher at the center of the pipeline: transports hand it a
//! decoded query and always get a complete response back, whether
//! synthesized locally for a blocked name or relayed from upstream.
//! Transports handle the I/O, the resolver handles decisions.

use std::net::Ipv4Addr;
use std::time::Instant;

use tracing::{debug, warn};

use crate::dns::{Message, Question, Record, rcode, rtype};
use crate::filter::{BlockDecision, Blocklist, decide};
use crate::forward::Forwarder;
use crate::stats::{Stats, StatsSnapshot};

/// Per-query decision engine shared by all transports.
pub struct Resolver {
    blocklist: Blocklist,
    forwarder: Forwarder,
    sentinel: Ipv4Addr,
    block_ttl: u32,
    stats: Stats,
}

impl Resolver {
    pub fn new(
        blocklist: Blocklist,
        forwarder: Forwarder,
        sentinel: Ipv4Addr,
        block_ttl: u32,
    ) -> Self {
        Self {
            blocklist,
            forwarder,
            sentinel,
            block_ttl,
            stats: Stats::new(),
        }
    }

    /// Process one query and produce the response to send back.
    ///
    /// Never fails: a missing question yields FORMERR and upstream
    /// failure yields SERVFAIL, so the client always gets a valid DNS
    /// response.
    pub async fn resolve(&self, query: &Message) -> Message {
        let start = Instant::now();

        if query.flags.opcode != 0 {
            let mut response = Message::response_to(query);
            response.flags.rcode = rcode::NOTIMP;
            return response;
        }

        let Some(question) = query.questions.first() else {
            let mut response = Message::response_to(query);
            response.flags.rcode = rcode::FORMERR;
            return response;
        };

        match decide(&self.blocklist, &question.name, self.sentinel) {
            BlockDecision::Block(sentinel) => {
                let response = self.blocked_response(query, question, sentinel);
                self.stats.record_blocked(elapsed_ms(start));
                debug!(domain = %question.name, qtype = question.qtype, "blocked");
                response
            }
            BlockDecision::Allow => self.forward(query, question, start).await,
        }
    }

    fn blocked_response(
        &self,
        query: &Message,
        question: &Question,
        sentinel: Ipv4Addr,
    ) -> Message {
        let mut response = Message::response_to(query);
        // Only A queries carry the sinkhole address; other types get an
        // empty NOERROR answer set rather than a type-mismatched record.
        if question.qtype == rtype::A {
            response
                .answers
                .push(Record::a(&question.name, sentinel, self.block_ttl));
        }
        response
    }

    async fn forward(&self, query: &Message, question: &Question, start: Instant) -> Message {
        match self.forwarder.forward(question).await {
            Ok(reply) => {
                // The upstream exchange ran under its own transaction
                // id; the response keeps the client's id and question.
                let mut response = Message::response_to(query);
                response.flags.authoritative = reply.flags.authoritative;
                response.flags.recursion_available = reply.flags.recursion_available;
                response.flags.rcode = reply.flags.rcode;
                response.answers = reply.answers;
                response.authority = reply.authority;
                response.additional = reply.additional;
                self.stats.record_forwarded(elapsed_ms(start));
                debug!(
                    domain = %question.name,
                    rcode = response.flags.rcode,
                    answers = response.answers.len(),
                    "forwarded"
                );
                response
            }
            Err(err) => {
                warn!(domain = %question.name, error = %err, "upstream resolution failed");
                let mut response = Message::response_to(query);
                response.flags.rcode = rcode::SERVFAIL;
                self.stats.record_failed(elapsed_ms(start));
                response
            }
        }
    }

    /// Number of domains in the blocklist.
    pub fn blocked_count(&self) -> usize {
        self.blocklist.len()
    }

    pub fn stats_snapshot_and_reset(&self) -> StatsSnapshot {
        self.stats.snapshot_and_reset()
    }
}

fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dns::{Flags, class};
    use crate::forward::UpstreamTarget;
    use std::net::SocketAddr;
    use std::time::Duration;
    use tokio::net::UdpSocket;

    const SENTINEL: Ipv4Addr = Ipv4Addr::new(0, 0, 0, 0);

    fn resolver(blocklist: Blocklist, upstream: SocketAddr, timeout_ms: u64) -> Resolver {
        let forwarder = Forwarder::new(UpstreamTarget {
            addr: upstream,
            timeout: Duration::from_millis(timeout_ms),
            retries: 0,
        });
        Resolver::new(blocklist, forwarder, SENTINEL, 300)
    }

    /// Upstream address that no test ever sends to.
    fn unused_upstream() -> SocketAddr {
        "127.0.0.1:1".parse().unwrap()
    }

    fn a_query(id: u16, name: &str) -> Message {
        Message::query(
            id,
            Question {
                name: name.to_string(),
                qtype: rtype::A,
                qclass: class::IN,
            },
        )
    }

    #[tokio::test]
    async fn blocked_a_query_gets_sentinel_answer() {
        let resolver = resolver(
            Blocklist::from_lines(["ads.example.com"]),
            unused_upstream(),
            100,
        );
        let query = a_query(0x1234, "ads.example.com");

        let response = resolver.resolve(&query).await;

        assert_eq!(response.id, 0x1234);
        assert!(response.flags.response);
        assert_eq!(response.flags.rcode, rcode::NOERROR);
        assert_eq!(response.questions, query.questions);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].rtype, rtype::A);
        assert_eq!(response.answers[0].ttl, 300);
        assert_eq!(response.answers[0].rdata, vec![0, 0, 0, 0]);
    }

    #[tokio::test]
    async fn blocked_match_ignores_query_case() {
        let resolver = resolver(
            Blocklist::from_lines(["ads.example.com"]),
            unused_upstream(),
            100,
        );
        let query = a_query(1, "Ads.Example.COM");

        let response = resolver.resolve(&query).await;

        assert_eq!(response.answers.len(), 1);
        // The answer carries the client's spelling.
        assert_eq!(response.answers[0].name, "Ads.Example.COM");
    }

    #[tokio::test]
    async fn blocked_non_a_query_gets_empty_noerror() {
        let resolver = resolver(
            Blocklist::from_lines(["ads.example.com"]),
            unused_upstream(),
            100,
        );
        let mut query = a_query(2, "ads.example.com");
        query.questions[0].qtype = rtype::AAAA;

        let response = resolver.resolve(&query).await;

        assert_eq!(response.flags.rcode, rcode::NOERROR);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn empty_question_yields_formerr() {
        let resolver = resolver(Blocklist::empty(), unused_upstream(), 100);
        let query = Message {
            id: 7,
            ..Message::default()
        };

        let response = resolver.resolve(&query).await;

        assert_eq!(response.id, 7);
        assert!(response.flags.response);
        assert_eq!(response.flags.rcode, rcode::FORMERR);
    }

    #[tokio::test]
    async fn non_query_opcode_yields_notimp() {
        let resolver = resolver(Blocklist::empty(), unused_upstream(), 100);
        let mut query = a_query(3, "example.com");
        query.flags.opcode = 5;

        let response = resolver.resolve(&query).await;

        assert_eq!(response.flags.rcode, rcode::NOTIMP);
        assert!(response.answers.is_empty());
    }

    #[tokio::test]
    async fn allowed_query_relays_upstream_answer() {
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        tokio::spawn(async move {
            let mut buf = [0u8; 512];
            let (len, src) = upstream.recv_from(&mut buf).await.unwrap();
            let query = Message::decode(&buf[..len]).unwrap();
            let mut reply = Message::response_to(&query);
            reply.answers.push(Record::a(
                &query.questions[0].name,
                Ipv4Addr::new(93, 184, 216, 34),
                3600,
            ));
            upstream.send_to(&reply.encode(), src).await.unwrap();
        });

        let resolver = resolver(Blocklist::from_lines(["ads.example.com"]), addr, 1000);
        let query = a_query(0xABCD, "example.com");

        let response = resolver.resolve(&query).await;

        assert_eq!(response.id, 0xABCD);
        assert_eq!(response.questions, query.questions);
        assert_eq!(response.flags.rcode, rcode::NOERROR);
        assert_eq!(response.answers.len(), 1);
        assert_eq!(response.answers[0].rdata, vec![93, 184, 216, 34]);
        assert_eq!(response.answers[0].ttl, 3600);
    }

    #[tokio::test]
    async fn upstream_timeout_yields_servfail_not_fabricated_answer() {
        // Bound but silent upstream.
        let upstream = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let addr = upstream.local_addr().unwrap();

        let resolver = resolver(Blocklist::empty(), addr, 50);
        let query = a_query(0x5555, "example.com");

        let response = resolver.resolve(&query).await;

        assert_eq!(response.id, 0x5555);
        assert_eq!(response.flags.rcode, rcode::SERVFAIL);
        assert!(response.answers.is_empty());
        drop(upstream);
    }

    #[tokio::test]
    async fn stats_track_outcomes() {
        let resolver = resolver(
            Blocklist::from_lines(["ads.example.com"]),
            unused_upstream(),
            100,
        );

        resolver.resolve(&a_query(1, "ads.example.com")).await;
        resolver.resolve(&a_query(2, "ads.example.com")).await;

        let stats = resolver.stats_snapshot_and_reset();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.blocked, 2);
        assert_eq!(stats.forwarded, 0);

        // Counters reset after a snapshot.
        let stats = resolver.stats_snapshot_and_reset();
        assert_eq!(stats.requests, 0);
    }

    #[test]
    fn response_skeleton_echoes_rd_bit() {
        let mut query = a_query(9, "example.com");
        query.flags = Flags {
            recursion_desired: false,
            ..Flags::default()
        };

        let response = Message::response_to(&query);

        assert!(!response.flags.recursion_desired);
        assert!(response.flags.response);
    }
}
