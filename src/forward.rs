//! Upstream query forwarding.
//!
//! Sends questions to the configured upstream resolver over UDP with a
//! fresh random transaction id per attempt, retries on timeout, and
//! falls back to TCP when the upstream sets the truncation flag.
//! Replies whose id or question do not match what was sent are stray
//! packets and are discarded without ending the wait.

use std::io;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tracing::trace;

use crate::dns::{DecodeError, MAX_UDP_PAYLOAD, Message, Question, class, rtype};

/// Where and how to reach the upstream resolver.
#[derive(Debug, Clone, Copy)]
pub struct UpstreamTarget {
    pub addr: SocketAddr,
    /// Per-attempt wait for a reply.
    pub timeout: Duration,
    /// Additional attempts after the first.
    pub retries: u32,
}

/// Failure of an upstream exchange. Every variant maps to SERVFAIL at
/// the dispatcher.
#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("upstream timed out")]
    Timeout,
    #[error("upstream connection refused")]
    ConnectionRefused(#[source] io::Error),
    #[error("malformed upstream reply: {0}")]
    MalformedReply(#[from] DecodeError),
    #[error("upstream reply did not match the query sent")]
    ReplyMismatch,
    #[error("upstream i/o failed")]
    Io(#[from] io::Error),
}

fn io_error(e: io::Error) -> ForwardError {
    if e.kind() == io::ErrorKind::ConnectionRefused {
        ForwardError::ConnectionRefused(e)
    } else {
        ForwardError::Io(e)
    }
}

/// Forwards questions to a single upstream resolver.
///
/// Each forward uses its own ephemeral socket, so concurrent forwards
/// are independent and cannot collide on transaction ids.
pub struct Forwarder {
    target: UpstreamTarget,
}

impl Forwarder {
    pub fn new(target: UpstreamTarget) -> Self {
        Self { target }
    }

    /// Resolve `question` against the upstream.
    ///
    /// UDP first; each timed-out attempt is retried with a fresh
    /// transaction id up to the configured retry count, then
    /// `ForwardError::Timeout`.
    pub async fn forward(&self, question: &Question) -> Result<Message, ForwardError> {
        let attempts = self.target.retries + 1;
        for attempt in 0..attempts {
            match self.attempt_udp(question).await? {
                Some(reply) => return Ok(reply),
                None => trace!(attempt, "upstream attempt timed out"),
            }
        }
        Err(ForwardError::Timeout)
    }

    /// Single-attempt reachability check used at start-up: asks the
    /// upstream for the root NS set.
    pub async fn probe(&self) -> Result<(), ForwardError> {
        let question = Question {
            name: String::new(),
            qtype: rtype::NS,
            qclass: class::IN,
        };
        match self.attempt_udp(&question).await? {
            Some(_) => Ok(()),
            None => Err(ForwardError::Timeout),
        }
    }

    /// One UDP exchange. `Ok(None)` means this attempt's time budget
    /// ran out and the caller may retry with a fresh transaction id.
    async fn attempt_udp(&self, question: &Question) -> Result<Option<Message>, ForwardError> {
        let id = rand::random::<u16>();
        let query = Message::query(id, question.clone()).encode();

        let socket = UdpSocket::bind("0.0.0.0:0").await.map_err(io_error)?;
        socket.connect(self.target.addr).await.map_err(io_error)?;
        socket.send(&query).await.map_err(io_error)?;

        let deadline = Instant::now() + self.target.timeout;
        let mut buf = [0u8; MAX_UDP_PAYLOAD];

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Ok(None);
            }

            let len = match tokio::time::timeout(remaining, socket.recv(&mut buf)).await {
                Err(_) => return Ok(None),
                Ok(Ok(len)) => len,
                Ok(Err(e)) => return Err(io_error(e)),
            };

            let reply = Message::decode(&buf[..len])?;
            if reply.id != id || !reply.flags.response || !question_matches(&reply, question) {
                trace!(got = reply.id, want = id, "discarding mismatched reply");
                continue;
            }

            if reply.flags.truncated {
                let budget = deadline.saturating_duration_since(Instant::now());
                if budget.is_zero() {
                    return Ok(None);
                }
                return match self.exchange_tcp(question, budget).await {
                    Ok(full) => Ok(Some(full)),
                    // The retry budget decides what a TCP timeout means.
                    Err(ForwardError::Timeout) => Ok(None),
                    Err(err) => Err(err),
                };
            }

            return Ok(Some(reply));
        }
    }

    /// Re-issue the question over TCP after a truncated UDP reply. The
    /// whole exchange must finish within `budget`.
    async fn exchange_tcp(
        &self,
        question: &Question,
        budget: Duration,
    ) -> Result<Message, ForwardError> {
        let id = rand::random::<u16>();
        let query = Message::query(id, question.clone()).encode();
        let addr = self.target.addr;

        let exchange = async move {
            let mut stream = TcpStream::connect(addr).await.map_err(io_error)?;
            stream
                .write_all(&(query.len() as u16).to_be_bytes())
                .await
                .map_err(io_error)?;
            stream.write_all(&query).await.map_err(io_error)?;

            let mut prefix = [0u8; 2];
            stream.read_exact(&mut prefix).await.map_err(io_error)?;
            let mut body = vec![0u8; u16::from_be_bytes(prefix) as usize];
            stream.read_exact(&mut body).await.map_err(io_error)?;

            Ok::<Vec<u8>, ForwardError>(body)
        };

        let body = match tokio::time::timeout(budget, exchange).await {
            Ok(result) => result?,
            Err(_) => return Err(ForwardError::Timeout),
        };

        let reply = Message::decode(&body)?;
        if reply.id != id || !reply.flags.response || !question_matches(&reply, question) {
            return Err(ForwardError::ReplyMismatch);
        }
        Ok(reply)
    }
}

fn question_matches(reply: &Message, question: &Question) -> bool {
    reply.questions.first().is_some_and(|q| {
        q.qtype == question.qtype
            && q.qclass == question.qclass
            && q.name.eq_ignore_ascii_case(&question.name)
    })
}
