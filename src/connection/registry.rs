//! Live-Connection Registry
//!
//! Every accepted connection registers an entry here; the reaper walks the
//! same list. The registry enforces the client ceiling at admission time
//! and is the single source of truth for the active-connection count.
//!
//! Closing is cooperative: the reaper (or shutdown) fires an entry's
//! [`Notify`]; the owning connection task observes it at its next await
//! point, tears the socket down, and deregisters itself.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, warn};

/// Hard ceiling on simultaneous connections.
pub const MAX_CLIENTS: usize = 10_000;

/// Shared per-connection record.
#[derive(Debug)]
pub struct ConnectionEntry {
    id: u64,
    addr: SocketAddr,
    last_activity: Mutex<Instant>,
    closing: AtomicBool,
    close: Notify,
}

impl ConnectionEntry {
    fn new(id: u64, addr: SocketAddr) -> Self {
        Self {
            id,
            addr,
            last_activity: Mutex::new(Instant::now()),
            closing: AtomicBool::new(false),
            close: Notify::new(),
        }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stamps the entry with the current time. Called on every read.
    pub fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    /// Time since the last touch.
    pub fn idle_time(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    /// Marks the entry closing and wakes its task.
    pub fn request_close(&self) {
        self.closing.store(true, Ordering::Relaxed);
        self.close.notify_one();
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Relaxed)
    }

    /// Resolves when a close has been requested.
    pub async fn closed(&self) {
        self.close.notified().await;
    }

    #[cfg(test)]
    pub(crate) fn backdate(&self, by: Duration) {
        *self.last_activity.lock().unwrap() = Instant::now() - by;
    }
}

/// Registry of all live connections, shared between the accept loop, the
/// connection tasks, and the reaper.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: Mutex<Vec<Arc<ConnectionEntry>>>,
    next_id: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Admits a connection, or refuses it at [`MAX_CLIENTS`].
    pub fn register(&self, addr: SocketAddr) -> Option<Arc<ConnectionEntry>> {
        let mut connections = self.connections.lock().unwrap();
        if connections.len() >= MAX_CLIENTS {
            warn!(client = %addr, "Max clients reached, rejecting connection");
            return None;
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let entry = Arc::new(ConnectionEntry::new(id, addr));
        connections.push(Arc::clone(&entry));
        Some(entry)
    }

    /// Removes an entry; called by the owning task on its way out.
    pub fn deregister(&self, entry: &ConnectionEntry) {
        let mut connections = self.connections.lock().unwrap();
        connections.retain(|c| c.id != entry.id);
    }

    /// Number of live connections.
    pub fn len(&self) -> usize {
        self.connections.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// One reaper pass: requests close on every entry idle past the timeout
    /// or already marked closing. Returns how many were told to go.
    pub fn sweep(&self, idle_timeout: Duration) -> usize {
        let connections = self.connections.lock().unwrap();
        let mut closed = 0;
        for entry in connections.iter() {
            let idle = entry.idle_time();
            if idle > idle_timeout || entry.is_closing() {
                debug!(
                    client = %entry.addr,
                    idle_secs = idle.as_secs(),
                    "Closing inactive connection"
                );
                entry.request_close();
                closed += 1;
            }
        }
        closed
    }

    /// Requests close on everything; used during shutdown.
    pub fn close_all(&self) {
        let connections = self.connections.lock().unwrap();
        for entry in connections.iter() {
            entry.request_close();
        }
    }
}
