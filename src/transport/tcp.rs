//! TCP transport for DNS queries.
//!
//! Messages are framed with a 2-octet big-endian length prefix
//! (RFC 1035 section 4.2.2). A connection may carry several queries in
//! sequence; each connection runs in its own task and its queries are
//! answered in order until the client closes.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{Instrument, debug, debug_span};

use crate::dns::{MAX_MESSAGE_SIZE, Message, rcode};
use crate::resolver::Resolver;

use super::Protocol;

/// TCP listener for the DNS server.
pub struct TcpTransport {
    listener: TcpListener,
}

impl TcpTransport {
    /// Bind the listening socket.
    pub async fn bind(addr: SocketAddr) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Start the accept loop.
    pub fn start(self, resolver: Arc<Resolver>) {
        tokio::spawn(run_accept_loop(self.listener, resolver));
    }
}

/// Accept loop: spawns a handler task per connection.
async fn run_accept_loop(listener: TcpListener, resolver: Arc<Resolver>) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let span = debug_span!("conn", proto = Protocol::Tcp.as_str(), client = %peer);
                tokio::spawn(handle_connection(stream, resolver.clone()).instrument(span));
            }
            Err(e) => debug!(error = %e, "tcp accept error"),
        }
    }
}

/// Serve queries on one connection until the client closes it.
async fn handle_connection(mut stream: TcpStream, resolver: Arc<Resolver>) {
    loop {
        let query_bytes = match read_frame(&mut stream).await {
            Ok(Some(bytes)) => bytes,
            // Clean close between frames.
            Ok(None) => return,
            Err(e) => {
                debug!(error = %e, "tcp read error");
                return;
            }
        };

        let response = match Message::decode(&query_bytes) {
            Ok(query) => {
                if query.flags.response {
                    continue;
                }
                resolver.resolve(&query).await.encode_bounded(MAX_MESSAGE_SIZE)
            }
            Err(e) if query_bytes.len() >= 2 => {
                debug!(error = %e, "answering unparseable query with FORMERR");
                let id = u16::from_be_bytes([query_bytes[0], query_bytes[1]]);
                Message::error_response(id, rcode::FORMERR).encode()
            }
            Err(_) => return,
        };

        if write_frame(&mut stream, &response).await.is_err() {
            return;
        }
    }
}

/// Read one length-prefixed message. `Ok(None)` on EOF before a new
/// frame; partial frames are buffered by `read_exact` until complete.
async fn read_frame(stream: &mut TcpStream) -> io::Result<Option<Vec<u8>>> {
    let mut prefix = [0u8; 2];
    match stream.read_exact(&mut prefix).await {
        Ok(_) => {}
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e),
    }

    let len = u16::from_be_bytes(prefix) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    Ok(Some(body))
}

async fn write_frame(stream: &mut TcpStream, message: &[u8]) -> io::Result<()> {
    stream.write_all(&(message.len() as u16).to_be_bytes()).await?;
    stream.write_all(message).await?;
    Ok(())
}
