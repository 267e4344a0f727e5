//! Per-Connection Handler
//!
//! One task per accepted socket. The task owns the connection's buffers and
//! walks the same state cycle for every request:
//!
//! ```text
//! READING ──full line──> PROCESSING ──reply buffered──> WRITING ──flushed──┐
//!    ▲                                                                     │
//!    └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Reads accumulate in a `BytesMut`; every complete line is dispatched
//! before the next read, so replies always come back in command order.
//! Replies gather in a growable write buffer that is flushed to the socket
//! after each pass, so a connection is either reading or writing, never both.
//!
//! The task ends on peer EOF, I/O error, an overlong line, QUIT, or a close
//! notification from the reaper/shutdown path.

use crate::commands::CommandHandler;
use crate::connection::registry::{ConnectionEntry, ConnectionRegistry};
use crate::protocol::parser::{next_line, tokenize, FrameError};
use crate::protocol::Reply;
use bytes::BytesMut;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Initial read-buffer capacity; it grows on demand up to the line limit.
const INITIAL_BUFFER_SIZE: usize = 4096;

/// Server-wide counters, shared by the accept loop, the connection tasks,
/// and INFO.
#[derive(Debug, Default)]
pub struct ServerStats {
    connections_accepted: AtomicU64,
    active_connections: AtomicUsize,
    total_requests: AtomicU64,
    total_errors: AtomicU64,
}

impl ServerStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
        self.active_connections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.active_connections.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.total_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connections_accepted(&self) -> u64 {
        self.connections_accepted.load(Ordering::Relaxed)
    }

    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.total_errors.load(Ordering::Relaxed)
    }
}

/// Errors that end a connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Frame(#[from] FrameError),

    /// Peer closed the socket between commands.
    #[error("client disconnected")]
    ClientDisconnected,

    /// Peer closed the socket mid-line.
    #[error("unexpected end of stream")]
    UnexpectedEof,
}

/// State for one client connection.
pub struct ConnectionHandler {
    stream: TcpStream,
    addr: SocketAddr,
    entry: Arc<ConnectionEntry>,
    registry: Arc<ConnectionRegistry>,
    commands: CommandHandler,
    stats: Arc<ServerStats>,
    read_buf: BytesMut,
    write_buf: BytesMut,
}

impl ConnectionHandler {
    pub fn new(
        stream: TcpStream,
        addr: SocketAddr,
        entry: Arc<ConnectionEntry>,
        registry: Arc<ConnectionRegistry>,
        commands: CommandHandler,
        stats: Arc<ServerStats>,
    ) -> Self {
        stats.connection_opened();

        Self {
            stream,
            addr,
            entry,
            registry,
            commands,
            stats,
            read_buf: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            write_buf: BytesMut::new(),
        }
    }

    /// Runs the connection to completion and releases its registry entry.
    pub async fn run(mut self) -> Result<(), ConnectionError> {
        info!(client = %self.addr, "Client connected");

        let result = self.main_loop().await;

        match &result {
            Ok(()) => debug!(client = %self.addr, "Connection closed"),
            Err(ConnectionError::ClientDisconnected) => {
                debug!(client = %self.addr, "Client disconnected")
            }
            Err(ConnectionError::Io(e))
                if e.kind() == std::io::ErrorKind::ConnectionReset =>
            {
                debug!(client = %self.addr, "Connection reset by client")
            }
            Err(e) => warn!(client = %self.addr, error = %e, "Connection error"),
        }

        self.registry.deregister(&self.entry);
        self.stats.connection_closed();
        result
    }

    async fn main_loop(&mut self) -> Result<(), ConnectionError> {
        loop {
            // Dispatch everything already buffered, then flush the replies,
            // even when a framing error makes this the final pass.
            let drained = self.drain_lines();
            self.flush().await?;
            match drained {
                Ok(true) => return Ok(()),
                Ok(false) => {}
                Err(e) => return Err(e),
            }

            tokio::select! {
                _ = self.entry.closed() => {
                    debug!(client = %self.addr, "Close requested");
                    return Ok(());
                }
                read = self.stream.read_buf(&mut self.read_buf) => {
                    let n = read?;
                    if n == 0 {
                        return if self.read_buf.is_empty() {
                            Err(ConnectionError::ClientDisconnected)
                        } else {
                            Err(ConnectionError::UnexpectedEof)
                        };
                    }
                    self.entry.touch();
                    trace!(client = %self.addr, bytes = n, "Read data");
                }
            }
        }
    }

    /// Dispatches every complete line in the read buffer. Returns `Ok(true)`
    /// when the connection should close after the pending flush.
    fn drain_lines(&mut self) -> Result<bool, ConnectionError> {
        loop {
            match next_line(&mut self.read_buf) {
                Ok(Some(line)) => {
                    let tokens = tokenize(&line);
                    if tokens.is_empty() {
                        continue; // blank line
                    }

                    let outcome = self.commands.execute(&tokens);
                    outcome.reply.write_to(&mut self.write_buf);
                    if outcome.close {
                        return Ok(true);
                    }
                }
                Ok(None) => return Ok(false),
                Err(e) => {
                    // Best effort: tell the peer why before dropping it.
                    Reply::error(e.to_string()).write_to(&mut self.write_buf);
                    self.stats.record_error();
                    return Err(e.into());
                }
            }
        }
    }

    async fn flush(&mut self) -> Result<(), ConnectionError> {
        if self.write_buf.is_empty() {
            return Ok(());
        }
        self.stream.write_all(&self.write_buf).await?;
        trace!(client = %self.addr, bytes = self.write_buf.len(), "Sent replies");
        self.write_buf.clear();
        Ok(())
    }
}

/// Accepts one connection into the serving loop: admission, socket options,
/// then the handler task body.
pub async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    registry: Arc<ConnectionRegistry>,
    commands: CommandHandler,
    stats: Arc<ServerStats>,
) {
    let Some(entry) = registry.register(addr) else {
        // Admission refused; the socket drops on return.
        return;
    };

    if let Err(e) = stream.set_nodelay(true) {
        warn!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
    }

    let handler = ConnectionHandler::new(stream, addr, entry, registry, commands, stats);
    let _ = handler.run().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::reaper::{Reaper, ReaperConfig};
    use crate::storage::KvEngine;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    async fn create_test_server() -> (SocketAddr, Arc<ConnectionRegistry>, Arc<ServerStats>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let engine = Arc::new(KvEngine::in_memory());
        let registry = Arc::new(ConnectionRegistry::new());
        let stats = Arc::new(ServerStats::new());
        let commands = CommandHandler::new(engine, Arc::clone(&stats));

        let accept_registry = Arc::clone(&registry);
        let accept_stats = Arc::clone(&stats);
        tokio::spawn(async move {
            while let Ok((stream, client_addr)) = listener.accept().await {
                tokio::spawn(handle_connection(
                    stream,
                    client_addr,
                    Arc::clone(&accept_registry),
                    commands.clone(),
                    Arc::clone(&accept_stats),
                ));
            }
        });

        (addr, registry, stats)
    }

    async fn read_exactly(client: &mut TcpStream, len: usize) -> Vec<u8> {
        let mut buf = vec![0u8; len];
        client.read_exact(&mut buf).await.unwrap();
        buf
    }

    #[tokio::test]
    async fn test_ping_pong() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 7).await, b"+PONG\r\n");

        client.write_all(b"PING hello\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 11).await, b"$5\r\nhello\r\n");
    }

    #[tokio::test]
    async fn test_set_get_del_cycle() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"SET name Alice\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"+OK\r\n");

        client.write_all(b"GET name\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 11).await, b"$5\r\nAlice\r\n");

        client.write_all(b"EXISTS name\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 4).await, b":1\r\n");

        client.write_all(b"DEL name\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 4).await, b":1\r\n");

        client.write_all(b"GET name\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"$-1\r\n");
    }

    #[tokio::test]
    async fn test_multiword_set_value() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"SET greeting Hello there world\r\n")
            .await
            .unwrap();
        assert_eq!(read_exactly(&mut client, 5).await, b"+OK\r\n");

        client.write_all(b"GET greeting\r\n").await.unwrap();
        assert_eq!(
            read_exactly(&mut client, 24).await,
            b"$17\r\nHello there world\r\n"
        );
    }

    #[tokio::test]
    async fn test_pipelined_commands_reply_in_order() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client
            .write_all(b"SET a 1\nSET b 2\nGET a\nGET b\n")
            .await
            .unwrap();

        let expected = b"+OK\r\n+OK\r\n$1\r\n1\r\n$1\r\n2\r\n";
        assert_eq!(read_exactly(&mut client, expected.len()).await, expected);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"\r\n\n   \nPING\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_overlong_line_is_fatal() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        let junk = vec![b'x'; 64 * 1024];
        client.write_all(&junk).await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        assert_eq!(&response, b"-ERR Command too long\r\n");
    }

    #[tokio::test]
    async fn test_quit_closes_connection() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"QUIT\r\n").await.unwrap();

        let mut response = Vec::new();
        client.read_to_end(&mut response).await.unwrap();
        // +OK, then server-side close.
        assert_eq!(&response, b"+OK\r\n");
    }

    #[tokio::test]
    async fn test_unknown_command_keeps_connection() {
        let (addr, _, _) = create_test_server().await;
        let mut client = TcpStream::connect(addr).await.unwrap();

        client.write_all(b"BOGUS\r\n").await.unwrap();
        assert_eq!(
            read_exactly(&mut client, 22).await,
            b"-ERR Unknown command\r\n"
        );

        client.write_all(b"PING\r\n").await.unwrap();
        assert_eq!(read_exactly(&mut client, 7).await, b"+PONG\r\n");
    }

    #[tokio::test]
    async fn test_stats_track_connections() {
        let (addr, registry, stats) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PING\r\n").await.unwrap();
        let _ = read_exactly(&mut client, 7).await;

        assert_eq!(stats.connections_accepted(), 1);
        assert_eq!(stats.active_connections(), 1);
        assert_eq!(registry.len(), 1);
        assert!(stats.total_requests() >= 1);

        drop(client);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(stats.active_connections(), 0);
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn test_reaper_closes_idle_client() {
        let (addr, registry, _) = create_test_server().await;

        let mut client = TcpStream::connect(addr).await.unwrap();
        client.write_all(b"PING\r\n").await.unwrap();
        let _ = read_exactly(&mut client, 7).await;

        let _reaper = Reaper::start(
            Arc::clone(&registry),
            ReaperConfig {
                sweep_interval: Duration::from_millis(20),
                idle_timeout: Duration::from_millis(50),
            },
        );

        // Stay silent; the reaper should hang up for us.
        let mut response = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            client.read_to_end(&mut response),
        )
        .await
        .expect("reaper never closed the connection")
        .unwrap();
        assert!(response.is_empty());
    }
}
